//! Length-prefixed collections
//!
//! Vectors and dictionaries share one shape on the wire: a marker, an
//! inline length, a flag byte, then the items. [`Collection`] captures that
//! shape; [`ObjectEncoder::write_collection`] drives any implementation.

use crate::core::error::Result;
use crate::core::marker;
use crate::core::object::{inline_length, ObjectEncoder, Value};
use crate::core::primitive::PrimitiveEncoder;

/// One item yielded by a [`Collection`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entry<'a> {
    /// Raw big-endian int (int vectors)
    Int(i32),
    Value(&'a Value),
    /// Key followed by value (dictionaries)
    Pair(&'a Value, &'a Value),
}

/// A collection [`ObjectEncoder`] can write
pub trait Collection {
    /// Marker, length and flags
    ///
    /// May write strings through `encoder` (element type names).
    fn write_header<E>(&self, encoder: &mut ObjectEncoder, out: &mut E) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized;

    /// Number of entries that follow the header
    fn prepare_iteration(&self) -> usize;

    /// Entry at `index`, for `index < prepare_iteration()`
    fn get(&self, index: usize) -> Entry<'_>;
}

#[derive(Debug, Clone, Copy)]
enum VectorItems<'a> {
    Int(&'a [i32]),
    Object {
        type_name: &'a str,
        items: &'a [Value],
    },
}

/// `Vector.<int>` or `Vector.<T>`
#[derive(Debug, Clone, Copy)]
pub struct VectorWriter<'a> {
    fixed: bool,
    items: VectorItems<'a>,
}

impl<'a> VectorWriter<'a> {
    pub fn int(fixed: bool, items: &'a [i32]) -> Self {
        VectorWriter {
            fixed,
            items: VectorItems::Int(items),
        }
    }

    /// Vector of objects; `type_name` is the element class (empty for `*`)
    pub fn object(type_name: &'a str, fixed: bool, items: &'a [Value]) -> Self {
        VectorWriter {
            fixed,
            items: VectorItems::Object { type_name, items },
        }
    }

    pub fn len(&self) -> usize {
        match self.items {
            VectorItems::Int(items) => items.len(),
            VectorItems::Object { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Collection for VectorWriter<'_> {
    fn write_header<E>(&self, encoder: &mut ObjectEncoder, out: &mut E) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        match self.items {
            VectorItems::Int(items) => {
                out.write_u8(marker::VECTOR_INT);
                out.write_uint29(inline_length(items.len())?)?;
                out.write_boolean(self.fixed);
            }
            VectorItems::Object { type_name, items } => {
                out.write_u8(marker::VECTOR_OBJECT);
                out.write_uint29(inline_length(items.len())?)?;
                out.write_boolean(self.fixed);
                encoder.write_string_data(out, type_name)?;
            }
        }
        Ok(())
    }

    fn prepare_iteration(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> Entry<'_> {
        match self.items {
            VectorItems::Int(items) => Entry::Int(items[index]),
            VectorItems::Object { items, .. } => Entry::Value(&items[index]),
        }
    }
}

/// AMF3 `Dictionary`
#[derive(Debug, Clone, Copy)]
pub struct DictionaryWriter<'a> {
    weak_keys: bool,
    entries: &'a [(Value, Value)],
}

impl<'a> DictionaryWriter<'a> {
    pub fn new(weak_keys: bool, entries: &'a [(Value, Value)]) -> Self {
        DictionaryWriter { weak_keys, entries }
    }
}

impl Collection for DictionaryWriter<'_> {
    fn write_header<E>(&self, _encoder: &mut ObjectEncoder, out: &mut E) -> Result<()>
    where
        E: PrimitiveEncoder + ?Sized,
    {
        out.write_u8(marker::DICTIONARY);
        out.write_uint29(inline_length(self.entries.len())?)?;
        out.write_boolean(self.weak_keys);
        Ok(())
    }

    fn prepare_iteration(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Entry<'_> {
        let (key, value) = &self.entries[index];
        Entry::Pair(key, value)
    }
}
