//! One unit of work on the stream
//!
//! A [`Message`] is a single framed block:
//!
//! ```text
//! [u32 BE length][U29 new-string count][amf-utf string]*[body]
//! ```
//!
//! Strings referenced through [`Message::string_reference`] live in the
//! process-scoped [`StringRegistry`](crate::core::reference::StringRegistry);
//! the body carries only `index + 1` (0 means "no string"). Strings the
//! registry learned during this message are shipped in the table ahead of
//! the body, so the reader can extend its own copy before decoding.
//!
//! The message holds the registry's change session for its whole lifetime.
//! [`Message::finish`] commits it; dropping the message instead discards
//! the block and rolls the registry back.

use crate::core::arena::ByteArena;
use crate::core::collection::Collection;
use crate::core::config::SurrogateEncoding;
use crate::core::error::{CodecError, Result};
use crate::core::framer::BlockFramer;
use crate::core::object::{ObjectEncoder, Value};
use crate::core::primitive::PrimitiveEncoder;
use crate::core::range::ByteRange;
use crate::core::reference::{ChangeSession, StringRegistry};
use crate::core::transport::Transport;
use tracing::{debug, warn};

/// Scratch arena for the string table, honoring the stream's surrogate mode
struct StringTable {
    arena: ByteArena,
    encoding: SurrogateEncoding,
}

impl PrimitiveEncoder for StringTable {
    fn arena(&mut self) -> &mut ByteArena {
        &mut self.arena
    }

    fn arena_ref(&self) -> &ByteArena {
        &self.arena
    }

    fn surrogate_encoding(&self) -> SurrogateEncoding {
        self.encoding
    }
}

/// An open message; see the [module docs](self)
pub struct Message<'s, T: Transport> {
    framer: &'s mut BlockFramer<T>,
    encoder: &'s mut ObjectEncoder,
    session: Option<ChangeSession<'s>>,
    body_start: usize,
}

impl<'s, T: Transport> Message<'s, T> {
    /// Take the registry session and open a block
    ///
    /// The session is taken first, so a busy registry leaves the framer
    /// untouched; a framing error rolls the session back.
    pub fn begin(
        framer: &'s mut BlockFramer<T>,
        encoder: &'s mut ObjectEncoder,
        registry: &'s StringRegistry,
    ) -> Result<Self> {
        let session = registry.start_change();
        let body_start = match framer.start_block() {
            Ok(body_start) => body_start,
            Err(err) => {
                session.rollback_change();
                return Err(err);
            }
        };
        Ok(Message {
            framer,
            encoder,
            session: Some(session),
            body_start,
        })
    }

    /// Strings this message added to the registry so far
    pub fn new_string_count(&self) -> usize {
        self.session.as_ref().map_or(0, ChangeSession::added_count)
    }

    /// Body bytes written so far
    pub fn body_len(&self) -> usize {
        self.framer.position().saturating_sub(self.body_start)
    }

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.encoder.write_value(&mut *self.framer, value)
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.encoder.write_string(&mut *self.framer, s)
    }

    pub fn write_nullable_string(&mut self, s: Option<&str>) -> Result<()> {
        self.encoder.write_nullable_string(&mut *self.framer, s)
    }

    pub fn write_collection<C: Collection>(&mut self, collection: &C) -> Result<()> {
        self.encoder.write_collection(&mut *self.framer, collection)
    }

    /// Registry reference: `U29 index + 1`, or `0` for `None`
    pub fn string_reference(&mut self, s: Option<&str>) -> Result<()> {
        let Some(s) = s else {
            return self.framer.write_uint29(0);
        };

        let session = self
            .session
            .as_mut()
            .ok_or(CodecError::NoBlockInProgress)?;
        let index = session.intern(s).index();
        let id = u32::try_from(index + 1).map_err(|_| CodecError::LengthOverflow(index))?;
        self.framer.write_uint29(id)
    }

    /// Start a range at the body cursor
    pub fn start_range(&mut self) -> ByteRange {
        self.framer.start_range()
    }

    pub fn next_marker_index(&self) -> usize {
        self.framer.next_marker_index()
    }

    pub fn start_range_at(&mut self, at: usize, index: usize) -> ByteRange {
        self.framer.start_range_at(at, index)
    }

    pub fn end_range(&mut self, range: ByteRange) {
        self.framer.end_range(range);
    }

    pub fn add_pointer(&mut self, range: ByteRange) {
        self.framer.add_pointer(range);
    }

    pub fn own_length(&mut self, range: ByteRange) -> usize {
        self.framer.own_length(range)
    }

    fn write_string_table(&self) -> Result<StringTable> {
        let mut table = StringTable {
            arena: ByteArena::new(),
            encoding: self.framer.surrogate_encoding(),
        };
        if let Some(session) = self.session.as_ref() {
            let count = session.added_count();
            let count = u32::try_from(count).map_err(|_| CodecError::LengthOverflow(count))?;
            table.write_uint29(count)?;
            for s in session.added() {
                table.write_amf_utf(&s, false)?;
            }
        }
        Ok(table)
    }

    /// Prepend the string table, end the block and commit the registry
    ///
    /// Returns the block payload length. On error the block is discarded
    /// and the registry rolled back. An I/O error after the commit keeps
    /// the finished block with the framer, so a later flush delivers it.
    pub fn finish(mut self) -> Result<usize> {
        let table = self.write_string_table()?;
        self.framer.prepend(self.body_start, &table.arena);
        let length = self.framer.finalize_block()?;

        let added = self.new_string_count();
        if let Some(session) = self.session.take() {
            session.finish_change();
        }
        self.encoder.reset();
        debug!(length, new_strings = added, "Finished message");

        self.framer.flush_if_full()?;
        Ok(length)
    }

    /// Discard the message explicitly
    pub fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if let Some(session) = self.session.take() {
            self.framer.discard_block();
            self.encoder.reset();
            session.rollback_change();
        }
    }
}

impl<T: Transport> PrimitiveEncoder for Message<'_, T> {
    fn arena(&mut self) -> &mut ByteArena {
        self.framer.arena()
    }

    fn arena_ref(&self) -> &ByteArena {
        self.framer.arena_ref()
    }

    fn surrogate_encoding(&self) -> SurrogateEncoding {
        self.framer.surrogate_encoding()
    }
}

impl<T: Transport> Drop for Message<'_, T> {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                body = self.body_len(),
                "Message dropped without finishing; discarding block"
            );
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EncoderConfig;
    use crate::core::primitive::read;
    use crate::core::transport::MemoryTransport;

    struct Fixture {
        framer: BlockFramer<MemoryTransport>,
        encoder: ObjectEncoder,
        registry: StringRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                framer: BlockFramer::new(MemoryTransport::new(), EncoderConfig::default()),
                encoder: ObjectEncoder::new(),
                registry: StringRegistry::new(),
            }
        }

        fn begin(&mut self) -> Message<'_, MemoryTransport> {
            Message::begin(&mut self.framer, &mut self.encoder, &self.registry).unwrap()
        }

        fn output(&mut self) -> Vec<u8> {
            self.framer.flush().unwrap();
            self.framer.transport().data().to_vec()
        }
    }

    #[test]
    fn test_string_table_precedes_body() {
        let mut fx = Fixture::new();
        let mut message = fx.begin();
        message.string_reference(Some("width")).unwrap();
        message.string_reference(None).unwrap();
        message.string_reference(Some("width")).unwrap();
        message.write_value(&Value::Int(3)).unwrap();
        let length = message.finish().unwrap();

        let data = fx.output();
        assert_eq!(length, data.len() - 4);
        assert_eq!(
            &data[4..],
            &[1, 0x05, b'w', b'i', b'd', b't', b'h', 1, 0, 1, 0x04, 3]
        );
        assert_eq!(fx.registry.get("width"), Some(0));
    }

    #[test]
    fn test_framing_error_releases_registry() {
        let mut fx = Fixture::new();
        fx.framer.start_block().unwrap();

        let result = Message::begin(&mut fx.framer, &mut fx.encoder, &fx.registry);
        assert!(matches!(result, Err(CodecError::BlockInProgress(0))));
        assert!(!fx.registry.is_changing());
    }

    #[test]
    fn test_known_strings_are_not_resent() {
        let mut fx = Fixture::new();
        let mut first = fx.begin();
        first.string_reference(Some("a")).unwrap();
        first.finish().unwrap();

        let mut second = fx.begin();
        second.string_reference(Some("a")).unwrap();
        second.string_reference(Some("b")).unwrap();
        second.finish().unwrap();

        let data = fx.output();
        // Block 1: [1, "a"] [ref 1]
        assert_eq!(&data[..4], &[0, 0, 0, 4]);
        assert_eq!(&data[4..8], &[1, 0x01, b'a', 1]);
        // Block 2: only "b" is new
        assert_eq!(&data[8..12], &[0, 0, 0, 5]);
        assert_eq!(&data[12..], &[1, 0x01, b'b', 1, 2]);
    }

    #[test]
    fn test_drop_discards_block_and_rolls_back() {
        let mut fx = Fixture::new();
        {
            let mut message = fx.begin();
            message.string_reference(Some("lost")).unwrap();
            message.write_string("body").unwrap();
        }

        assert!(!fx.framer.is_block_open());
        assert_eq!(fx.framer.buffered(), 0);
        assert_eq!(fx.registry.get("lost"), None);
        assert!(!fx.registry.is_changing());
        assert_eq!(fx.encoder.string_count(), 0);
    }

    #[test]
    fn test_abort_then_reuse() {
        let mut fx = Fixture::new();
        let mut message = fx.begin();
        message.string_reference(Some("x")).unwrap();
        message.abort();

        let mut message = fx.begin();
        message.string_reference(Some("y")).unwrap();
        message.finish().unwrap();

        // Index 0 is reused after rollback
        assert_eq!(fx.registry.get("y"), Some(0));
        assert_eq!(fx.registry.len(), 1);
    }

    #[test]
    fn test_per_message_tables_reset() {
        let mut fx = Fixture::new();
        for _ in 0..2 {
            let mut message = fx.begin();
            message.write_string("dup").unwrap();
            message.write_string("dup").unwrap();
            message.finish().unwrap();
        }

        let data = fx.output();
        let block = [0, marker_string(), 0x07, b'd', b'u', b'p', marker_string(), 0x00];
        assert_eq!(&data[4..12], &block);
        assert_eq!(&data[16..24], &block);
    }

    fn marker_string() -> u8 {
        crate::core::marker::STRING
    }

    #[test]
    fn test_deferred_range_inside_message() {
        let mut fx = Fixture::new();
        let mut message = fx.begin();

        let children = message.start_range();
        message.write_u8(b'c');
        message.write_u8(b'c');
        message.end_range(children);

        // Child count is only known once the children are written
        let slot = message.allocate_short();
        message.put_short(2, slot);
        message.add_pointer(children);
        message.string_reference(Some("s")).unwrap();
        message.finish().unwrap();

        let data = fx.output();
        let payload = &data[4..];
        let mut pos = 0;
        assert_eq!(read::uint29(payload, &mut pos), 1);
        assert_eq!(&payload[pos..pos + 2], &[0x01, b's']);
        assert_eq!(&payload[pos + 2..], &[0, 2, b'c', b'c', 1]);
    }
}
