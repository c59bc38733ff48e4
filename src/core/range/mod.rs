//! Nested byte ranges over a flat arena
//!
//! Object graphs are written depth-first into one arena, but the order in
//! which bytes are produced is not always the order in which they must be
//! sent. A region can be registered as a [`ByteRange`]; a range can later be
//! *detached* by a pointer, which moves its content to the pointer's
//! position when the block is flattened.
//!
//! ```text
//! arena:   [ A | C1: B | - | C2: C | D ]        P spans everything
//! markers: P, C1, C2                            (registration = pre-order)
//!
//! flatten: A + emit(C1) + - + emit(C2) + D
//! ```
//!
//! Membership is decided by registration order, not by offsets: a marker
//! belongs to a range when its index lies strictly between the range's
//! registration index and its close index (the marker count at the time
//! the range was closed). A pointer added right after a range closes is
//! therefore outside it even when both sit at the same offset.
//!
//! Flattening walks the markers once:
//! - gaps between markers are copied verbatim
//! - an attached range is emitted in place by recursively walking its own
//!   children
//! - a detached range is skipped in place and emitted at its pointer,
//!   through the same recursive walk

use tracing::trace;


/// Handle to a registered range
///
/// Handles are only valid until the tracker is cleared (every flatten
/// clears it); using a stale handle panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    id: usize,
    generation: u32,
}

#[derive(Debug)]
struct RangeEntry {
    start: usize,
    end: Option<usize>,
    /// Position in the marker list
    index: usize,
    /// Marker count when the range was closed
    close_index: Option<usize>,
    own_length: Option<usize>,
    /// Claimed by a pointer
    consumed: bool,
}

#[derive(Debug, Clone, Copy)]
enum Marker {
    Range(usize),
    Pointer { at: usize, range: usize },
}

/// Ordered registry of ranges and pointers for one block
#[derive(Debug, Default)]
pub struct RangeTracker {
    markers: Vec<Marker>,
    ranges: Vec<RangeEntry>,
    generation: u32,
}

impl RangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if no range or pointer is registered
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Registration slot the next marker will take
    ///
    /// Reserve it before writing content that may turn out to need a
    /// range, then pass it to [`start_range_at`](Self::start_range_at).
    pub fn next_marker_index(&self) -> usize {
        self.markers.len()
    }

    fn resolve(&self, range: ByteRange) -> usize {
        assert!(
            range.generation == self.generation && range.id < self.ranges.len(),
            "stale byte range handle"
        );
        range.id
    }

    /// Register a range starting at `at`
    pub fn start_range(&mut self, at: usize) -> ByteRange {
        let index = self.markers.len();
        self.start_range_at(at, index)
    }

    /// Register a range starting at `at` in registration slot `index`
    ///
    /// Markers at or after `index` move up by one.
    ///
    /// # Panics
    /// Panics if `index` is past the end of the marker list.
    pub fn start_range_at(&mut self, at: usize, index: usize) -> ByteRange {
        assert!(
            index <= self.markers.len(),
            "marker index {} past end ({} markers)",
            index,
            self.markers.len()
        );

        if index < self.markers.len() {
            for entry in &mut self.ranges {
                if entry.index >= index {
                    entry.index += 1;
                }
                if let Some(close) = entry.close_index.as_mut() {
                    if *close > index {
                        *close += 1;
                    }
                }
            }
        }

        let id = self.ranges.len();
        self.ranges.push(RangeEntry {
            start: at,
            end: None,
            index,
            close_index: None,
            own_length: None,
            consumed: false,
        });
        self.markers.insert(index, Marker::Range(id));
        trace!(id, at, index, "Started byte range");

        ByteRange {
            id,
            generation: self.generation,
        }
    }

    /// Close `range` at `at`
    ///
    /// # Panics
    /// Panics if the range is already closed or `at` precedes its start.
    pub fn end_range(&mut self, range: ByteRange, at: usize) {
        let id = self.resolve(range);
        let close_index = self.markers.len();
        let entry = &mut self.ranges[id];
        assert!(entry.end.is_none(), "byte range already closed");
        assert!(at >= entry.start, "byte range ends before it starts");
        entry.end = Some(at);
        entry.close_index = Some(close_index);
        trace!(id, start = entry.start, end = at, "Closed byte range");
    }

    /// Emit `range` at `at` instead of at its physical location
    ///
    /// # Panics
    /// Panics if the range is open or already claimed by a pointer.
    pub fn add_pointer(&mut self, at: usize, range: ByteRange) {
        let id = self.resolve(range);
        let entry = &mut self.ranges[id];
        assert!(entry.end.is_some(), "pointer to an open byte range");
        assert!(!entry.consumed, "byte range already consumed by a pointer");
        entry.consumed = true;
        self.markers.push(Marker::Pointer { at, range: id });
        trace!(id, at, "Added range pointer");
    }

    /// `(start, end)` of a range; `end` is `None` while open
    pub fn bounds(&self, range: ByteRange) -> (usize, Option<usize>) {
        let entry = &self.ranges[self.resolve(range)];
        (entry.start, entry.end)
    }

    /// Bytes directly owned by `range`, excluding every registered child range
    ///
    /// Computed once per range.
    ///
    /// # Panics
    /// Panics if the range or one of its children is still open.
    pub fn own_length(&mut self, range: ByteRange) -> usize {
        let id = self.resolve(range);
        if let Some(length) = self.ranges[id].own_length {
            return length;
        }

        let entry = &self.ranges[id];
        let (start, end, close) = match (entry.end, entry.close_index) {
            (Some(end), Some(close)) => (entry.start, end, close),
            _ => panic!("own length of an open byte range"),
        };

        let mut own = 0;
        let mut cursor = start;
        let mut i = entry.index + 1;
        while i < close {
            match self.markers[i] {
                Marker::Range(child_id) => {
                    let child = &self.ranges[child_id];
                    let (child_end, child_close) = match (child.end, child.close_index) {
                        (Some(end), Some(close)) => (end, close),
                        _ => panic!("child byte range still open"),
                    };
                    own += child.start - cursor;
                    cursor = child_end;
                    i = child_close;
                }
                Marker::Pointer { .. } => i += 1,
            }
        }
        own += end - cursor;

        self.ranges[id].own_length = Some(own);
        own
    }

    /// Move every recorded offset at or past `from` by `delta`
    ///
    /// Used when content is inserted at `from` after ranges were recorded.
    pub fn shift(&mut self, from: usize, delta: usize) {
        for entry in &mut self.ranges {
            let started_after = entry.start >= from;
            if started_after {
                entry.start += delta;
            }
            if let Some(end) = entry.end.as_mut() {
                if *end > from || (*end == from && started_after) {
                    *end += delta;
                }
            }
        }
        for marker in &mut self.markers {
            if let Marker::Pointer { at, .. } = marker {
                if *at >= from {
                    *at += delta;
                }
            }
        }
    }

    /// Write `buf[from..to]` to `out` in send order, then clear
    ///
    /// Returns the number of bytes emitted.
    pub fn flatten(&mut self, buf: &[u8], from: usize, to: usize, out: &mut Vec<u8>) -> usize {
        let before = out.len();
        if self.markers.is_empty() {
            out.extend_from_slice(&buf[from..to]);
        } else {
            self.emit_span(buf, from, to, 0, self.markers.len(), out);
        }
        self.clear();
        out.len() - before
    }

    fn closed(&self, id: usize) -> (usize, usize, usize, usize) {
        let entry = &self.ranges[id];
        match (entry.end, entry.close_index) {
            (Some(end), Some(close)) => (entry.start, end, entry.index, close),
            _ => panic!("byte range still open at flatten"),
        }
    }

    fn emit_span(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        first: usize,
        last: usize,
        out: &mut Vec<u8>,
    ) {
        let mut cursor = start;
        let mut i = first;
        while i < last {
            match self.markers[i] {
                Marker::Range(id) => {
                    let (range_start, range_end, index, close) = self.closed(id);
                    assert!(
                        cursor <= range_start && close <= last,
                        "byte ranges overlap"
                    );
                    out.extend_from_slice(&buf[cursor..range_start]);
                    if !self.ranges[id].consumed {
                        self.emit_span(buf, range_start, range_end, index + 1, close, out);
                    }
                    cursor = range_end;
                    i = close;
                }
                Marker::Pointer { at, range } => {
                    assert!(cursor <= at, "pointer precedes preceding content");
                    out.extend_from_slice(&buf[cursor..at]);
                    cursor = at;
                    let (range_start, range_end, index, close) = self.closed(range);
                    self.emit_span(buf, range_start, range_end, index + 1, close, out);
                    i += 1;
                }
            }
        }
        out.extend_from_slice(&buf[cursor..end]);
    }

    /// Drop every marker and invalidate outstanding handles
    pub fn clear(&mut self) {
        self.markers.clear();
        self.ranges.clear();
        self.generation = self.generation.wrapping_add(1);
    }
}
