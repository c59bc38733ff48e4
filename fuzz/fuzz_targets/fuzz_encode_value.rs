#![no_main]
use amf_stream::{AmfStream, MemoryTransport, Object, Value};
use libfuzzer_sys::{arbitrary::{Arbitrary, Unstructured}, fuzz_target};

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Null,
    Bool(bool),
    Int(i32),
    UInt(i32),
    Double(f64),
    String(String),
    Array(Vec<FuzzValue>),
    Object {
        class_name: String,
        sealed: Vec<(String, FuzzValue)>,
        dynamic: Option<Vec<(String, FuzzValue)>>,
    },
    VectorInt(bool, Vec<i32>),
    Dictionary(bool, Vec<(FuzzValue, FuzzValue)>),
    ByteArray(Vec<u8>),
}

impl From<FuzzValue> for Value {
    fn from(value: FuzzValue) -> Self {
        match value {
            FuzzValue::Null => Value::Null,
            FuzzValue::Bool(b) => Value::Bool(b),
            FuzzValue::Int(n) => Value::Int(n),
            FuzzValue::UInt(n) => Value::UInt(n),
            FuzzValue::Double(n) => Value::Double(n),
            FuzzValue::String(s) => Value::String(s),
            FuzzValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            FuzzValue::Object {
                class_name,
                sealed,
                dynamic,
            } => Value::Object(Object {
                class_name,
                sealed: sealed.into_iter().map(|(k, v)| (k, v.into())).collect(),
                dynamic: dynamic.map(|members| {
                    members.into_iter().map(|(k, v)| (k, v.into())).collect()
                }),
            }),
            FuzzValue::VectorInt(fixed, items) => Value::VectorInt { fixed, items },
            FuzzValue::Dictionary(weak_keys, entries) => Value::Dictionary {
                weak_keys,
                entries: entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            },
            FuzzValue::ByteArray(bytes) => Value::ByteArray(bytes),
        }
    }
}

// Every value must encode into exactly one well-formed block
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);
    let values: Vec<FuzzValue> = match u.arbitrary() {
        Ok(values) => values,
        Err(_) => return,
    };

    let mut stream = AmfStream::new(MemoryTransport::new());
    for value in values.into_iter().take(8) {
        let value = Value::from(value);
        if stream.write_message(&value).is_err() {
            return;
        }
    }
    stream.flush().unwrap();

    let mut data = stream.transport().data();
    let mut blocks = 0;
    while !data.is_empty() {
        let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        assert!(data.len() >= 4 + length);
        data = &data[4 + length..];
        blocks += 1;
    }
    assert_eq!(blocks as u64, stream.blocks_written());
});
