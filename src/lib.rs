//! # amf-stream - Encode-only AMF3 object stream
//!
//! `amf-stream` writes object graphs as AMF3-flavored binary messages for an
//! out-of-process reader:
//!
//! - **Variable-length encoding**: UInt29 integers and length-prefixed UTF-8
//! - **Reference tables**: repeated strings and object traits are written
//!   once per message and referenced afterwards
//! - **Process-scoped string registry** with transactional sessions that roll
//!   back when a message is abandoned
//! - **Nested byte ranges**: content written depth-first can be re-ordered
//!   through pointers before the block is sent
//! - **Block framing**: `[u32 BE length][payload]` with buffered flush
//!
//! ## Quick Start
//!
//! ```rust
//! use amf_stream::{AmfStream, MemoryTransport, Result, Value};
//!
//! # fn main() -> Result<()> {
//! let mut stream = AmfStream::new(MemoryTransport::new());
//!
//! let value = Value::from(serde_json::json!({"name": "button", "width": 120}));
//! stream.write_message(&value)?;
//! stream.flush()?;
//!
//! let data = stream.transport().data();
//! let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
//! assert_eq!(data.len(), length + 4);
//! # Ok(())
//! # }
//! ```
//!
//! ## Messages and the registry
//!
//! ```rust
//! use amf_stream::{AmfStreamBuilder, MemoryTransport, Result, Value};
//!
//! # fn main() -> Result<()> {
//! let mut stream = AmfStreamBuilder::new()
//!     .flush_threshold(1024)
//!     .build(MemoryTransport::new())?;
//!
//! let mut message = stream.start_message()?;
//! message.string_reference(Some("mx.controls.Button"))?;
//! message.write_value(&Value::Int(42))?;
//! message.finish()?;
//!
//! assert_eq!(stream.registry().get("mx.controls.Button"), Some(0));
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    arena::ByteArena,
    collection::{Collection, DictionaryWriter, Entry, VectorWriter},
    config::{EncoderConfig, SurrogateEncoding},
    error::{CodecError, Result},
    framer::BlockFramer,
    message::Message,
    object::{Object, ObjectEncoder, Value},
    primitive::{PrimitiveEncoder, UINT29_LIMIT, UINT29_MAX},
    range::ByteRange,
    reference::{ChangeSession, Interned, ReferenceTable, StringRegistry},
    transport::{MemoryTransport, Transport, WriteTransport},
};

use tracing::debug;

/// High-level encoder: framer, per-message tables and the string registry
///
/// # Examples
///
/// ```rust
/// use amf_stream::{AmfStream, Object, Value, WriteTransport};
///
/// # fn main() -> amf_stream::Result<()> {
/// let mut stream = AmfStream::new(WriteTransport::new(Vec::new()));
/// let point = Object::typed("Point")
///     .with_sealed("x", Value::Int(1))
///     .with_sealed("y", Value::Int(2));
/// stream.write_message(&point.into())?;
/// stream.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AmfStream<T: Transport> {
    framer: BlockFramer<T>,
    encoder: ObjectEncoder,
    registry: StringRegistry,
}

impl<T: Transport> AmfStream<T> {
    /// Stream with the default configuration and a fresh registry
    pub fn new(transport: T) -> Self {
        AmfStream {
            framer: BlockFramer::new(transport, EncoderConfig::default()),
            encoder: ObjectEncoder::new(),
            registry: StringRegistry::new(),
        }
    }

    /// Stream sharing `registry` with other writers
    pub fn with_registry(
        transport: T,
        config: EncoderConfig,
        registry: StringRegistry,
    ) -> Result<Self> {
        config.validate()?;
        Ok(AmfStream {
            framer: BlockFramer::new(transport, config),
            encoder: ObjectEncoder::new(),
            registry,
        })
    }

    /// Open a message; finish it to commit, drop it to discard
    pub fn start_message(&mut self) -> Result<Message<'_, T>> {
        Message::begin(&mut self.framer, &mut self.encoder, &self.registry)
    }

    /// Write `value` as one complete message
    ///
    /// Returns the block payload length.
    pub fn write_message(&mut self, value: &Value) -> Result<usize> {
        let mut message = self.start_message()?;
        message.write_value(value)?;
        message.finish()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.framer.flush()
    }

    /// Flush buffered messages and close the transport
    pub fn close(&mut self) -> Result<()> {
        debug!(
            blocks = self.framer.blocks_written(),
            strings = self.registry.len(),
            "Closing stream"
        );
        self.framer.close()
    }

    pub fn registry(&self) -> &StringRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EncoderConfig {
        self.framer.config()
    }

    pub fn framer(&self) -> &BlockFramer<T> {
        &self.framer
    }

    pub fn transport(&self) -> &T {
        self.framer.transport()
    }

    /// Messages finished so far
    pub fn blocks_written(&self) -> u64 {
        self.framer.blocks_written()
    }

    /// Bytes handed to the transport so far
    pub fn bytes_flushed(&self) -> u64 {
        self.framer.bytes_flushed()
    }

    /// Consume the stream without flushing
    pub fn into_transport(self) -> T {
        self.framer.into_transport()
    }
}

/// Builder for customizing [`AmfStream`] creation
///
/// # Examples
///
/// ```rust
/// use amf_stream::{AmfStreamBuilder, MemoryTransport, SurrogateEncoding};
///
/// # fn main() -> amf_stream::Result<()> {
/// let stream = AmfStreamBuilder::new()
///     .flush_threshold(64 * 1024)
///     .initial_capacity(16 * 1024)
///     .surrogate_encoding(SurrogateEncoding::Standard)
///     .build(MemoryTransport::new())?;
/// assert_eq!(stream.config().flush_threshold, 65536);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AmfStreamBuilder {
    config: EncoderConfig,
    registry: Option<StringRegistry>,
}

impl AmfStreamBuilder {
    /// Create a new AmfStreamBuilder with default settings
    pub fn new() -> Self {
        AmfStreamBuilder {
            config: EncoderConfig::default(),
            registry: None,
        }
    }

    /// Start from a loaded configuration
    pub fn config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Buffered bytes that trigger a transport write
    pub fn flush_threshold(mut self, bytes: usize) -> Self {
        self.config.flush_threshold = bytes;
        self
    }

    /// Initial arena capacity
    pub fn initial_capacity(mut self, bytes: usize) -> Self {
        self.config.initial_capacity = bytes;
        self
    }

    /// Supplementary character handling in strings
    pub fn surrogate_encoding(mut self, encoding: SurrogateEncoding) -> Self {
        self.config.surrogate_encoding = encoding;
        self
    }

    /// Share an existing registry instead of creating one
    pub fn registry(mut self, registry: StringRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the configuration and build the stream
    pub fn build<T: Transport>(self, transport: T) -> Result<AmfStream<T>> {
        let registry = self.registry.unwrap_or_default();
        AmfStream::with_registry(transport, self.config, registry)
    }
}
