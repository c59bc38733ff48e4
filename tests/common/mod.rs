//! Minimal stream reader for integration tests
//!
//! The crate only encodes; this mirrors the reader side closely enough to
//! check what went over the wire.

#![allow(dead_code)]

use amf_stream::core::marker;
use amf_stream::{Object, Value};

/// Split a framed stream into block payloads
pub fn split_blocks(mut data: &[u8]) -> Vec<&[u8]> {
    let mut blocks = Vec::new();
    while !data.is_empty() {
        let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        blocks.push(&data[4..4 + length]);
        data = &data[4 + length..];
    }
    blocks
}

pub struct Reader<'a> {
    bytes: &'a [u8],
    pub pos: usize,
    strings: Vec<String>,
    traits: Vec<(String, Vec<String>, bool)>,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader {
            bytes,
            pos: 0,
            strings: Vec::new(),
            traits: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }

    pub fn u8(&mut self) -> u8 {
        let b = self.bytes[self.pos];
        self.pos += 1;
        b
    }

    pub fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    pub fn uint29(&mut self) -> u32 {
        let mut value: u32 = 0;
        for i in 0..4 {
            let b = self.u8();
            if i == 3 {
                return (value << 8) | u32::from(b);
            }
            value = (value << 7) | u32::from(b & 0x7F);
            if b & 0x80 == 0 {
                break;
            }
        }
        value
    }

    /// UTF-8 that may hold surrogate halves encoded one by one
    pub fn utf(&mut self, len: usize) -> String {
        let bytes = self.take(len);
        let mut units: Vec<u16> = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b < 0x80 {
                units.push(u16::from(b));
                i += 1;
            } else if b & 0xE0 == 0xC0 {
                units.push((u16::from(b & 0x1F) << 6) | u16::from(bytes[i + 1] & 0x3F));
                i += 2;
            } else if b & 0xF0 == 0xE0 {
                units.push(
                    (u16::from(b & 0x0F) << 12)
                        | (u16::from(bytes[i + 1] & 0x3F) << 6)
                        | u16::from(bytes[i + 2] & 0x3F),
                );
                i += 3;
            } else {
                let s = std::str::from_utf8(&bytes[i..i + 4]).unwrap();
                units.extend(s.encode_utf16());
                i += 4;
            }
        }
        String::from_utf16(&units).unwrap()
    }

    /// Message prelude: strings the registry learned with this message
    pub fn string_table(&mut self) -> Vec<String> {
        let count = self.uint29();
        (0..count)
            .map(|_| {
                let len = self.uint29() as usize;
                self.utf(len)
            })
            .collect()
    }

    /// String data (no marker), resolving per-message references
    pub fn string_data(&mut self) -> String {
        let header = self.uint29();
        if header & 1 == 0 {
            return self.strings[(header >> 1) as usize].clone();
        }
        let s = self.utf((header >> 1) as usize);
        if !s.is_empty() {
            self.strings.push(s.clone());
        }
        s
    }

    pub fn value(&mut self) -> Value {
        match self.u8() {
            marker::NULL => Value::Null,
            marker::FALSE => Value::Bool(false),
            marker::TRUE => Value::Bool(true),
            marker::INTEGER => {
                let raw = self.uint29();
                // Sign-extend 29 bits
                Value::Int(((raw << 3) as i32) >> 3)
            }
            marker::DOUBLE => {
                let bytes: [u8; 8] = self.take(8).try_into().unwrap();
                Value::Double(f64::from_bits(u64::from_be_bytes(bytes)))
            }
            marker::STRING => Value::String(self.string_data()),
            marker::ARRAY => {
                let len = (self.uint29() >> 1) as usize;
                assert_eq!(self.u8(), 0x01, "associative part must be empty");
                Value::Array((0..len).map(|_| self.value()).collect())
            }
            marker::OBJECT => Value::Object(self.object()),
            marker::BYTE_ARRAY => {
                let len = (self.uint29() >> 1) as usize;
                Value::ByteArray(self.take(len).to_vec())
            }
            marker::VECTOR_INT => {
                let len = (self.uint29() >> 1) as usize;
                let fixed = self.u8() != 0;
                let items = (0..len)
                    .map(|_| i32::from_be_bytes(self.take(4).try_into().unwrap()))
                    .collect();
                Value::VectorInt { fixed, items }
            }
            marker::VECTOR_OBJECT => {
                let len = (self.uint29() >> 1) as usize;
                let fixed = self.u8() != 0;
                let type_name = self.string_data();
                let items = (0..len).map(|_| self.value()).collect();
                Value::VectorObject {
                    type_name,
                    fixed,
                    items,
                }
            }
            marker::DICTIONARY => {
                let len = (self.uint29() >> 1) as usize;
                let weak_keys = self.u8() != 0;
                let entries = (0..len).map(|_| (self.value(), self.value())).collect();
                Value::Dictionary { weak_keys, entries }
            }
            other => panic!("unknown marker {} at {}", other, self.pos - 1),
        }
    }

    fn object(&mut self) -> Object {
        let header = self.uint29();
        assert_eq!(header & 1, 1, "object references are never written");

        let (class_name, names, dynamic) = if header & 0b10 == 0 {
            self.traits[(header >> 2) as usize].clone()
        } else {
            let dynamic = header & 0b1000 != 0;
            let class_name = self.string_data();
            let names: Vec<String> = (0..header >> 4).map(|_| self.string_data()).collect();
            let traits = (class_name, names, dynamic);
            self.traits.push(traits.clone());
            traits
        };

        let sealed = names.into_iter().map(|name| (name, self.value())).collect();
        let dynamic = if dynamic {
            let mut members = Vec::new();
            loop {
                let name = self.string_data();
                if name.is_empty() {
                    break;
                }
                members.push((name, self.value()));
            }
            Some(members)
        } else {
            None
        };

        Object {
            class_name,
            sealed,
            dynamic,
        }
    }
}
