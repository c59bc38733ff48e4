#![no_main]
use amf_stream::core::range::RangeTracker;
use libfuzzer_sys::{arbitrary::{Arbitrary, Unstructured}, fuzz_target};

#[derive(Debug, Arbitrary)]
enum Op {
    Write(u8),
    Start,
    End,
    Pointer,
}

// Properly nested ranges with pointers to closed ones must flatten to a
// permutation of the input
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);
    let ops: Vec<Op> = match u.arbitrary() {
        Ok(ops) => ops,
        Err(_) => return,
    };

    let mut buf = Vec::new();
    let mut tracker = RangeTracker::new();
    let mut open = Vec::new();
    let mut closed = Vec::new();

    for op in ops.iter().take(256) {
        match op {
            Op::Write(b) => buf.push(*b),
            Op::Start => open.push(tracker.start_range(buf.len())),
            Op::End => {
                if let Some(range) = open.pop() {
                    tracker.end_range(range, buf.len());
                    closed.push(range);
                }
            }
            Op::Pointer => {
                // Only ranges closed outside every still-open range
                if open.is_empty() {
                    if let Some(range) = closed.pop() {
                        tracker.add_pointer(buf.len(), range);
                    }
                }
            }
        }
    }
    while let Some(range) = open.pop() {
        tracker.end_range(range, buf.len());
    }

    let mut out = Vec::new();
    let written = tracker.flatten(&buf, 0, buf.len(), &mut out);
    assert_eq!(written, buf.len());

    let mut expected = buf.clone();
    expected.sort_unstable();
    out.sort_unstable();
    assert_eq!(expected, out);
});
