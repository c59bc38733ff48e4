//! AMF3 value encoding
//!
//! [`ObjectEncoder`] owns the per-message reference tables (strings and
//! object traits) and writes [`Value`] trees through any
//! [`PrimitiveEncoder`]. Tables are cleared between messages with
//! [`ObjectEncoder::reset`]; a string or trait repeated inside one message
//! is written once and referenced afterwards.
//!
//! ```text
//! string    literal: U29 (len << 1) | 1, bytes      reference: U29 idx << 1
//! traits    new:     U29 (sealed << 4) | 0b0011 (| 0b1000 dynamic)
//!           ref:     U29 (idx << 2) | 0b01
//! ```

use crate::core::collection::{Collection, DictionaryWriter, Entry, VectorWriter};
use crate::core::error::{CodecError, Result};
use crate::core::marker;
use crate::core::primitive::PrimitiveEncoder;
use crate::core::reference::{Interned, ReferenceTable};
use serde::{Deserialize, Serialize};

/// A value that can be written to the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    /// Written as INTEGER when it fits 28 signed bits
    Int(i32),
    /// Unsigned 24-bit convention, see [`PrimitiveEncoder::write_amf_uint`]
    UInt(i32),
    Double(f64),
    String(String),
    /// Dense array
    Array(Vec<Value>),
    Object(Object),
    VectorInt {
        fixed: bool,
        items: Vec<i32>,
    },
    VectorObject {
        type_name: String,
        fixed: bool,
        items: Vec<Value>,
    },
    Dictionary {
        weak_keys: bool,
        entries: Vec<(Value, Value)>,
    },
    ByteArray(Vec<u8>),
}

/// A typed or anonymous object
///
/// Sealed members are described by the traits and written in order;
/// dynamic members (only when the object is dynamic) follow as name/value
/// pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Object {
    /// Empty for anonymous objects
    pub class_name: String,
    pub sealed: Vec<(String, Value)>,
    /// `Some` for dynamic objects
    pub dynamic: Option<Vec<(String, Value)>>,
}

impl Object {
    /// Anonymous dynamic object (`{}` in script)
    pub fn anonymous() -> Self {
        Object {
            class_name: String::new(),
            sealed: Vec::new(),
            dynamic: Some(Vec::new()),
        }
    }

    /// Sealed instance of `class_name`
    pub fn typed<S: Into<String>>(class_name: S) -> Self {
        Object {
            class_name: class_name.into(),
            sealed: Vec::new(),
            dynamic: None,
        }
    }

    pub fn with_sealed<S: Into<String>>(mut self, name: S, value: Value) -> Self {
        self.sealed.push((name.into(), value));
        self
    }

    /// Add a dynamic member, making the object dynamic if it was not
    pub fn with_dynamic<S: Into<String>>(mut self, name: S, value: Value) -> Self {
        self.dynamic
            .get_or_insert_with(Vec::new)
            .push((name.into(), value));
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic.is_some()
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(members) => Value::Object(Object {
                class_name: String::new(),
                sealed: Vec::new(),
                dynamic: Some(
                    members
                        .into_iter()
                        .map(|(name, value)| (name, Value::from(value)))
                        .collect(),
                ),
            }),
        }
    }
}

/// Identity of an object's traits within one message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TraitKey {
    class_name: String,
    sealed: Vec<String>,
    dynamic: bool,
}

impl TraitKey {
    fn of(object: &Object) -> Self {
        TraitKey {
            class_name: object.class_name.clone(),
            sealed: object.sealed.iter().map(|(name, _)| name.clone()).collect(),
            dynamic: object.is_dynamic(),
        }
    }
}

/// `(len << 1) | 1` header shared by arrays, vectors, dictionaries and byte arrays
pub(crate) fn inline_length(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .and_then(|l| l.checked_mul(2))
        .map(|l| l | 1)
        .ok_or(CodecError::LengthOverflow(len))
}

fn reference_header(index: usize, shift: u32, flags: u32) -> Result<u32> {
    u32::try_from(index)
        .ok()
        .and_then(|i| i.checked_shl(shift))
        .filter(|i| i >> shift == index as u32)
        .map(|i| i | flags)
        .ok_or(CodecError::LengthOverflow(index))
}

/// Writes [`Value`]s with per-message string and trait tables
#[derive(Debug, Default)]
pub struct ObjectEncoder {
    strings: ReferenceTable<String>,
    traits: ReferenceTable<TraitKey>,
}

impl ObjectEncoder {
    pub fn new() -> Self {
        ObjectEncoder {
            strings: ReferenceTable::new(),
            traits: ReferenceTable::new(),
        }
    }

    /// Strings interned in the current message
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Traits interned in the current message
    pub fn trait_count(&self) -> usize {
        self.traits.len()
    }

    /// Forget every string and trait (end of message)
    pub fn reset(&mut self) {
        self.strings.clear();
        self.traits.clear();
    }

    /// Write any value, marker included
    pub fn write_value<E>(&mut self, out: &mut E, value: &Value) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        match value {
            Value::Null => out.write_u8(marker::NULL),
            Value::Bool(b) => out.write_amf_boolean(*b),
            Value::Int(n) => out.write_amf_int(*n)?,
            Value::UInt(n) => out.write_amf_uint(*n)?,
            Value::Double(n) => out.write_amf_double(*n),
            Value::String(s) => self.write_string(out, s)?,
            Value::Array(items) => self.write_array(out, items)?,
            Value::Object(object) => self.write_object(out, object)?,
            Value::VectorInt { fixed, items } => {
                self.write_collection(out, &VectorWriter::int(*fixed, items))?
            }
            Value::VectorObject {
                type_name,
                fixed,
                items,
            } => self.write_collection(out, &VectorWriter::object(type_name, *fixed, items))?,
            Value::Dictionary { weak_keys, entries } => {
                self.write_collection(out, &DictionaryWriter::new(*weak_keys, entries))?
            }
            Value::ByteArray(bytes) => self.write_byte_array(out, bytes)?,
        }
        Ok(())
    }

    /// STRING marker, then the string or its back-reference
    pub fn write_string<E>(&mut self, out: &mut E, s: &str) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        out.write_u8(marker::STRING);
        self.write_string_data(out, s)
    }

    /// NULL marker for `None`, a string otherwise
    pub fn write_nullable_string<E>(&mut self, out: &mut E, s: Option<&str>) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        match s {
            Some(s) => self.write_string(out, s),
            None => {
                out.write_u8(marker::NULL);
                Ok(())
            }
        }
    }

    /// String without a marker (class and member names, string values)
    ///
    /// The empty string is always the literal `0x01` and is never interned.
    pub fn write_string_data<E>(&mut self, out: &mut E, s: &str) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        if s.is_empty() {
            out.write_u8(0x01);
            return Ok(());
        }

        match self.strings.intern(s) {
            Interned::Existing(index) => out.write_uint29(reference_header(index, 1, 0)?),
            Interned::New(_) => out.write_amf_utf(s, true),
        }
    }

    /// Dense array: no associative part
    pub fn write_array<E>(&mut self, out: &mut E, items: &[Value]) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        out.write_u8(marker::ARRAY);
        out.write_uint29(inline_length(items.len())?)?;
        out.write_u8(0x01);
        for item in items {
            self.write_value(out, item)?;
        }
        Ok(())
    }

    pub fn write_object<E>(&mut self, out: &mut E, object: &Object) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        out.write_u8(marker::OBJECT);

        match self.traits.intern(&TraitKey::of(object)) {
            Interned::Existing(index) => {
                out.write_uint29(reference_header(index, 2, 0b01)?)?;
            }
            Interned::New(_) => {
                let dynamic = if object.is_dynamic() { 0b1000 } else { 0 };
                out.write_uint29(reference_header(object.sealed.len(), 4, 0b0011 | dynamic)?)?;
                self.write_string_data(out, &object.class_name)?;
                for (name, _) in &object.sealed {
                    self.write_string_data(out, name)?;
                }
            }
        }

        for (_, value) in &object.sealed {
            self.write_value(out, value)?;
        }

        if let Some(members) = &object.dynamic {
            for (name, value) in members {
                // An empty name would end the member list early
                if name.is_empty() {
                    continue;
                }
                self.write_string_data(out, name)?;
                self.write_value(out, value)?;
            }
            out.write_u8(0x01);
        }
        Ok(())
    }

    pub fn write_byte_array<E>(&mut self, out: &mut E, bytes: &[u8]) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        out.write_u8(marker::BYTE_ARRAY);
        out.write_uint29(inline_length(bytes.len())?)?;
        out.write_bytes(bytes);
        Ok(())
    }

    /// Header, then every entry the collection yields
    pub fn write_collection<E, C>(&mut self, out: &mut E, collection: &C) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
        C: Collection,
    {
        collection.write_header(self, out)?;
        let count = collection.prepare_iteration();
        for index in 0..count {
            match collection.get(index) {
                Entry::Int(n) => out.write_int(n),
                Entry::Value(value) => self.write_value(out, value)?,
                Entry::Pair(key, value) => {
                    self.write_value(out, key)?;
                    self.write_value(out, value)?;
                }
            }
        }
        Ok(())
    }
}
