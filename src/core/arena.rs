//! Growable append-only byte arena
//!
//! The arena is the single physical buffer every encoder writes into.
//! Content is appended at the logical cursor (`len()`); already written
//! bytes can be patched by index (length headers reserved with
//! [`ByteArena::allocate`]) and the tail can be cut off with
//! [`ByteArena::set_position`] or relocated into another arena with
//! [`ByteArena::move_to`].
//!
//! Capacity only ever grows. On overflow it at least doubles, so appends
//! are amortized O(1) and a `reset` between messages keeps the warmed-up
//! allocation.

use crate::core::transport::Transport;
use std::io;

/// Smallest capacity handed out on first growth
const MIN_CAPACITY: usize = 64;

/// Append-only byte buffer with a logical write cursor
#[derive(Debug, Default, Clone)]
pub struct ByteArena {
    buf: Vec<u8>,
}

impl ByteArena {
    /// Create an empty arena (no allocation until the first write)
    pub fn new() -> Self {
        ByteArena { buf: Vec::new() }
    }

    /// Create an arena with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        ByteArena {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written (the logical cursor)
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current capacity of the backing storage
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Written content
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Make room for `additional` more bytes, at least doubling on growth
    fn ensure_capacity(&mut self, additional: usize) {
        let required = self.buf.len() + additional;
        let capacity = self.buf.capacity();
        if required > capacity {
            let new_capacity = required.max(capacity * 2).max(MIN_CAPACITY);
            self.buf.reserve_exact(new_capacity - self.buf.len());
        }
    }

    /// Append a single byte
    #[inline]
    pub fn write(&mut self, byte: u8) {
        self.ensure_capacity(1);
        self.buf.push(byte);
    }

    /// Append a byte slice
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure_capacity(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    /// Reserve `n` zeroed bytes and return their start offset
    ///
    /// Used for headers whose value is only known after the content that
    /// follows them has been written.
    pub fn allocate(&mut self, n: usize) -> usize {
        let start = self.buf.len();
        self.ensure_capacity(n);
        self.buf.resize(start + n, 0);
        start
    }

    /// Advance the cursor by `n` and return the fresh window for direct writes
    ///
    /// The window is zero-initialized; callers fill it at computed indices.
    pub fn get_buffer(&mut self, n: usize) -> &mut [u8] {
        let start = self.allocate(n);
        &mut self.buf[start..]
    }

    /// Overwrite two bytes at `pos` with a big-endian value
    pub fn put_u16_at(&mut self, pos: usize, value: u16) {
        self.buf[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Overwrite four bytes at `pos` with a big-endian value
    pub fn put_u32_at(&mut self, pos: usize, value: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Move the cursor back to `position`, discarding everything after it
    ///
    /// # Panics
    /// Panics if `position` is past the cursor.
    pub fn set_position(&mut self, position: usize) {
        assert!(
            position <= self.buf.len(),
            "position {} past end of arena ({} bytes)",
            position,
            self.buf.len()
        );
        self.buf.truncate(position);
    }

    /// Append `[position, len)` to `dest` and truncate self to `position`
    ///
    /// # Panics
    /// Panics if `position` is past the cursor.
    pub fn move_to(&mut self, position: usize, dest: &mut ByteArena) {
        assert!(
            position <= self.buf.len(),
            "move_to position {} past end of arena ({} bytes)",
            position,
            self.buf.len()
        );
        dest.write_bytes(&self.buf[position..]);
        self.buf.truncate(position);
    }

    /// Discard all content, keeping the allocation
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Hand the written content to `transport` in one write
    pub fn write_to<T: Transport + ?Sized>(&self, transport: &mut T) -> io::Result<()> {
        transport.write(&self.buf)
    }

    /// Consume the arena, returning the written bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
