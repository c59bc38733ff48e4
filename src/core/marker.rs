//! AMF3 type markers
//!
//! One byte written ahead of every typed value.

pub const NULL: u8 = 1;
pub const FALSE: u8 = 2;
pub const TRUE: u8 = 3;
pub const INTEGER: u8 = 4;
pub const DOUBLE: u8 = 5;
pub const STRING: u8 = 6;
pub const ARRAY: u8 = 9;
pub const OBJECT: u8 = 10;
pub const BYTE_ARRAY: u8 = 12;
pub const VECTOR_INT: u8 = 13;
pub const VECTOR_OBJECT: u8 = 16;
pub const DICTIONARY: u8 = 17;
