//! Length-prefixed block framing with buffered flush
//!
//! Every block on the wire is `[u32 BE payload length][payload]`. The
//! header is reserved when the block starts and backpatched when it ends;
//! if byte ranges were registered while the block was open, the payload is
//! flattened into send order first.
//!
//! Finished blocks stay in the arena until the buffered size reaches the
//! flush threshold or the caller flushes explicitly.

use crate::core::arena::ByteArena;
use crate::core::config::{EncoderConfig, SurrogateEncoding};
use crate::core::error::{CodecError, Result};
use crate::core::primitive::PrimitiveEncoder;
use crate::core::range::{ByteRange, RangeTracker};
use crate::core::transport::Transport;
use tracing::debug;

/// Size of the block length header
pub const BLOCK_HEADER_SIZE: usize = 4;

/// Frames blocks into an arena and hands them to a [`Transport`]
#[derive(Debug)]
pub struct BlockFramer<T: Transport> {
    arena: ByteArena,
    tracker: RangeTracker,
    transport: T,
    config: EncoderConfig,
    /// Header offset of the open block
    block_start: Option<usize>,
    blocks_written: u64,
    bytes_flushed: u64,
    /// Bytes were handed to the transport but its flush has not succeeded
    flush_pending: bool,
}

impl<T: Transport> BlockFramer<T> {
    pub fn new(transport: T, config: EncoderConfig) -> Self {
        BlockFramer {
            arena: ByteArena::with_capacity(config.initial_capacity),
            tracker: RangeTracker::new(),
            transport,
            config,
            block_start: None,
            blocks_written: 0,
            bytes_flushed: 0,
            flush_pending: false,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the framer; buffered bytes that were not flushed are lost
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Bytes waiting for the next flush (including an open block)
    pub fn buffered(&self) -> usize {
        self.arena.len()
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    pub fn bytes_flushed(&self) -> u64 {
        self.bytes_flushed
    }

    pub fn is_block_open(&self) -> bool {
        self.block_start.is_some()
    }

    /// First payload byte of the open block
    pub fn payload_start(&self) -> Option<usize> {
        self.block_start.map(|start| start + BLOCK_HEADER_SIZE)
    }

    /// Reserve the length header of a new block
    ///
    /// Returns the offset of the first payload byte.
    pub fn start_block(&mut self) -> Result<usize> {
        if let Some(start) = self.block_start {
            return Err(CodecError::BlockInProgress(start));
        }

        let start = self.arena.allocate(BLOCK_HEADER_SIZE);
        self.block_start = Some(start);
        Ok(start + BLOCK_HEADER_SIZE)
    }

    /// Finalize the open block, then flush if the buffer is over threshold
    ///
    /// Returns the payload length written into the header.
    pub fn end_block(&mut self) -> Result<usize> {
        let length = self.finalize_block()?;
        self.flush_if_full()?;
        Ok(length)
    }

    /// Flatten and backpatch the open block without touching the transport
    pub(crate) fn finalize_block(&mut self) -> Result<usize> {
        let start = self.block_start.ok_or(CodecError::NoBlockInProgress)?;
        let payload_start = start + BLOCK_HEADER_SIZE;

        if !self.tracker.is_empty() {
            let mut flat = Vec::with_capacity(self.arena.len() - payload_start);
            self.tracker
                .flatten(self.arena.as_slice(), payload_start, self.arena.len(), &mut flat);
            self.arena.set_position(payload_start);
            self.arena.write_bytes(&flat);
        }

        let length = self.arena.len() - payload_start;
        let header = u32::try_from(length).map_err(|_| CodecError::BlockTooLarge(length))?;
        self.arena.put_u32_at(start, header);
        self.block_start = None;
        self.blocks_written += 1;

        debug!(length, buffered = self.arena.len(), "Ended block");
        Ok(length)
    }

    pub(crate) fn flush_if_full(&mut self) -> Result<()> {
        if self.arena.len() >= self.config.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Send every finished block to the transport
    ///
    /// Does nothing (and does not call the transport) when the buffer is
    /// empty and the last transport flush succeeded. If the transport
    /// rejects the write, the buffered bytes are kept for the next call.
    /// Once the write is accepted the bytes belong to the transport: a
    /// failing transport flush is retried by the next call without
    /// sending them again.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(start) = self.block_start {
            return Err(CodecError::BlockInProgress(start));
        }
        if self.arena.is_empty() && !self.flush_pending {
            return Ok(());
        }

        if !self.arena.is_empty() {
            let length = self.arena.len();
            self.arena.write_to(&mut self.transport)?;
            self.arena.reset();
            self.bytes_flushed += length as u64;
            self.flush_pending = true;
            debug!(bytes = length, total = self.bytes_flushed, "Flushed blocks");
        }

        self.transport.flush()?;
        self.flush_pending = false;
        Ok(())
    }

    /// Flush, then close the transport
    pub fn close(&mut self) -> Result<()> {
        if let Some(start) = self.block_start {
            return Err(CodecError::BlockInProgress(start));
        }
        self.flush()?;
        self.transport.close()?;
        debug!(blocks = self.blocks_written, bytes = self.bytes_flushed, "Closed framer");
        Ok(())
    }

    /// Drop the open block and every range registered in it
    pub fn discard_block(&mut self) {
        if let Some(start) = self.block_start.take() {
            let discarded = self.arena.len() - start;
            self.arena.set_position(start);
            self.tracker.clear();
            debug!(discarded, "Discarded block");
        }
    }

    /// Insert `prefix` at `at`, moving the tail (and its ranges) behind it
    ///
    /// # Panics
    /// Panics if `at` is past the cursor.
    pub fn prepend(&mut self, at: usize, prefix: &ByteArena) {
        if prefix.is_empty() {
            return;
        }

        let mut tail = ByteArena::with_capacity(self.arena.len().saturating_sub(at));
        self.arena.move_to(at, &mut tail);
        self.arena.write_bytes(prefix.as_slice());
        self.arena.write_bytes(tail.as_slice());
        self.tracker.shift(at, prefix.len());

        debug!(at, length = prefix.len(), "Prepended content");
    }

    fn assert_block_open(&self) {
        assert!(self.block_start.is_some(), "byte range outside a block");
    }

    /// Register a range starting at the cursor
    pub fn start_range(&mut self) -> ByteRange {
        self.assert_block_open();
        self.tracker.start_range(self.arena.len())
    }

    /// Registration slot for a range decided later, see
    /// [`RangeTracker::next_marker_index`]
    pub fn next_marker_index(&self) -> usize {
        self.tracker.next_marker_index()
    }

    /// Register a range starting at `at` in a previously reserved slot
    pub fn start_range_at(&mut self, at: usize, index: usize) -> ByteRange {
        self.assert_block_open();
        self.tracker.start_range_at(at, index)
    }

    /// Close `range` at the cursor
    pub fn end_range(&mut self, range: ByteRange) {
        self.tracker.end_range(range, self.arena.len());
    }

    /// Emit `range` at the cursor when the block is flattened
    pub fn add_pointer(&mut self, range: ByteRange) {
        self.assert_block_open();
        self.tracker.add_pointer(self.arena.len(), range);
    }

    pub fn own_length(&mut self, range: ByteRange) -> usize {
        self.tracker.own_length(range)
    }
}

impl<T: Transport> PrimitiveEncoder for BlockFramer<T> {
    fn arena(&mut self) -> &mut ByteArena {
        &mut self.arena
    }

    fn arena_ref(&self) -> &ByteArena {
        &self.arena
    }

    fn surrogate_encoding(&self) -> SurrogateEncoding {
        self.config.surrogate_encoding
    }
}
