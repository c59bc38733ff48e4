//! Codec building blocks
//!
//! - [`arena`] - Growable append-only byte buffer
//! - [`primitive`] - UInt29, AMF strings, big-endian numerics
//! - [`reference`] - Interning tables and the process-scoped string registry
//! - [`range`] - Nested byte ranges and pointer-driven flattening
//! - [`object`] - AMF3 values, objects and per-message tables
//! - [`collection`] - Vectors and dictionaries
//! - [`framer`] - Length-prefixed blocks with buffered flush
//! - [`transport`] - Output sinks
//! - [`message`] - One framed unit of work with its string table
//! - [`config`] - Encoder configuration
//! - [`error`] - Error types

pub mod arena;
pub mod collection;
pub mod config;
pub mod error;
pub mod framer;
pub mod marker;
pub mod message;
pub mod object;
pub mod primitive;
pub mod range;
pub mod reference;
pub mod transport;
