//! Fixed- and variable-width primitive encoding
//!
//! [`PrimitiveEncoder`] is an extension trait: anything that can hand out
//! its [`ByteArena`] gets the whole primitive vocabulary. Fixed-width
//! numerics are big-endian.
//!
//! ## UInt29
//!
//! ```text
//! 0x00000000 - 0x0000007F : 0xxxxxxx
//! 0x00000080 - 0x00003FFF : 1xxxxxxx 0xxxxxxx
//! 0x00004000 - 0x001FFFFF : 1xxxxxxx 1xxxxxxx 0xxxxxxx
//! 0x00200000 - 0x3FFFFFFF : 1xxxxxxx 1xxxxxxx 1xxxxxxx xxxxxxxx
//! ```
//!
//! The last byte of the 4-byte form carries a full 8 bits, so the widest
//! form holds 7 + 7 + 7 + 8 = 29 bits. Inputs up to [`UINT29_LIMIT`] are
//! accepted anyway: the leading byte keeps bits 22..=28 and bit 29 is
//! dropped, so `0x20000000..0x40000000` decode as `v & 0x1FFFFFFF`. The
//! renderer has always read it that way; treat it as a known wire defect.

use crate::core::arena::ByteArena;
use crate::core::config::SurrogateEncoding;
use crate::core::error::{CodecError, Result};
use crate::core::marker;

/// Largest value that survives a UInt29 round trip
pub const UINT29_MAX: u32 = 0x1FFF_FFFF;

/// Exclusive upper bound accepted by [`PrimitiveEncoder::write_uint29`]
pub const UINT29_LIMIT: u32 = 0x4000_0000;

/// Smallest signed value written as an AMF integer
pub const INT28_MIN: i32 = -0x1000_0000;

/// Largest signed value written as an AMF integer
pub const INT28_MAX: i32 = 0x0FFF_FFFF;

/// Encoded width of a UInt29, without writing it
pub fn uint29_size_of(value: u32) -> Result<usize> {
    match value {
        0..=0x7F => Ok(1),
        0x80..=0x3FFF => Ok(2),
        0x4000..=0x1F_FFFF => Ok(3),
        0x20_0000..UINT29_LIMIT => Ok(4),
        _ => Err(CodecError::UInt29OutOfRange(value)),
    }
}

/// Byte length of `s` once written by [`PrimitiveEncoder::write_amf_utf`]
///
/// Counted per UTF-16 code unit under [`SurrogateEncoding::Split`]: 1 byte
/// up to 0x7F, 2 bytes up to 0x7FF, 3 bytes otherwise (each surrogate half
/// counts on its own).
pub fn amf_utf_length(s: &str, encoding: SurrogateEncoding) -> usize {
    match encoding {
        SurrogateEncoding::Standard => s.len(),
        SurrogateEncoding::Split => {
            // Two 3-byte halves instead of one 4-byte sequence
            let supplementary = s.chars().filter(|c| (*c as u32) > 0xFFFF).count();
            s.len() + 2 * supplementary
        }
    }
}

fn length_to_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| CodecError::LengthOverflow(len))
}

/// Primitive writers over a [`ByteArena`]
pub trait PrimitiveEncoder {
    /// Backing arena
    fn arena(&mut self) -> &mut ByteArena;

    /// Backing arena, read-only
    fn arena_ref(&self) -> &ByteArena;

    /// Supplementary character handling for [`write_amf_utf`](Self::write_amf_utf)
    fn surrogate_encoding(&self) -> SurrogateEncoding {
        SurrogateEncoding::Split
    }

    /// Current write cursor
    fn position(&self) -> usize {
        self.arena_ref().len()
    }

    fn write_u8(&mut self, value: u8) {
        self.arena().write(value);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.arena().write_bytes(bytes);
    }

    /// Single byte, 1 or 0
    fn write_boolean(&mut self, value: bool) {
        self.arena().write(value as u8);
    }

    fn write_short(&mut self, value: i16) {
        self.arena().write_bytes(&value.to_be_bytes());
    }

    fn write_int(&mut self, value: i32) {
        self.arena().write_bytes(&value.to_be_bytes());
    }

    fn write_long(&mut self, value: i64) {
        self.arena().write_bytes(&value.to_be_bytes());
    }

    /// IEEE-754 bit pattern, big-endian
    fn write_double(&mut self, value: f64) {
        self.arena().write_bytes(&value.to_bits().to_be_bytes());
    }

    /// Reserve a zeroed 2-byte slot, returning its offset
    fn allocate_short(&mut self) -> usize {
        self.arena().allocate(2)
    }

    /// Fill a slot previously reserved with [`allocate_short`](Self::allocate_short)
    fn put_short(&mut self, value: u16, position: usize) {
        self.arena().put_u16_at(position, value);
    }

    /// AMF3 variable-length unsigned integer
    ///
    /// # Errors
    /// `UInt29OutOfRange` when `value` is at or above [`UINT29_LIMIT`]. Signals a
    /// protocol bug in the caller and must not be retried.
    fn write_uint29(&mut self, value: u32) -> Result<()> {
        let size = uint29_size_of(value)?;
        let window = self.arena().get_buffer(size);
        match size {
            1 => {
                window[0] = value as u8;
            }
            2 => {
                window[0] = ((value >> 7) & 0x7F) as u8 | 0x80;
                window[1] = (value & 0x7F) as u8;
            }
            3 => {
                window[0] = ((value >> 14) & 0x7F) as u8 | 0x80;
                window[1] = ((value >> 7) & 0x7F) as u8 | 0x80;
                window[2] = (value & 0x7F) as u8;
            }
            _ => {
                window[0] = ((value >> 22) & 0x7F) as u8 | 0x80;
                window[1] = ((value >> 15) & 0x7F) as u8 | 0x80;
                window[2] = ((value >> 8) & 0x7F) as u8 | 0x80;
                window[3] = (value & 0xFF) as u8;
            }
        }
        Ok(())
    }

    /// Length-prefixed AMF string
    ///
    /// With `shift_length` the prefix is `(len << 1) | 1`, the AMF3 marker
    /// for an inline literal (as opposed to a table reference).
    fn write_amf_utf(&mut self, s: &str, shift_length: bool) -> Result<()> {
        let encoding = self.surrogate_encoding();
        let len = amf_utf_length(s, encoding);
        let prefix = length_to_u32(len)?;
        if shift_length {
            let shifted = prefix
                .checked_mul(2)
                .ok_or(CodecError::LengthOverflow(len))?;
            self.write_uint29(shifted | 1)?;
        } else {
            self.write_uint29(prefix)?;
        }

        if len == s.len() {
            self.arena().write_bytes(s.as_bytes());
            return Ok(());
        }

        let window = self.arena().get_buffer(len);
        let mut i = 0;
        for ch in s.chars() {
            if (ch as u32) > 0xFFFF {
                let mut units = [0u16; 2];
                for &unit in ch.encode_utf16(&mut units).iter() {
                    window[i] = 0xE0 | (unit >> 12) as u8;
                    window[i + 1] = 0x80 | ((unit >> 6) & 0x3F) as u8;
                    window[i + 2] = 0x80 | (unit & 0x3F) as u8;
                    i += 3;
                }
            } else {
                i += ch.encode_utf8(&mut window[i..]).len();
            }
        }
        debug_assert_eq!(i, len);
        Ok(())
    }

    /// TRUE or FALSE marker
    fn write_amf_boolean(&mut self, value: bool) {
        self.arena()
            .write(if value { marker::TRUE } else { marker::FALSE });
    }

    /// DOUBLE marker followed by the 8-byte value
    fn write_amf_double(&mut self, value: f64) {
        self.arena().write(marker::DOUBLE);
        self.write_double(value);
    }

    /// INTEGER when `value` fits 28 signed bits, DOUBLE otherwise
    fn write_amf_int(&mut self, value: i32) -> Result<()> {
        if (INT28_MIN..=INT28_MAX).contains(&value) {
            self.arena().write(marker::INTEGER);
            self.write_uint29((value as u32) & UINT29_MAX)
        } else {
            self.write_amf_double(value as f64);
            Ok(())
        }
    }

    /// Unsigned flavor of [`write_amf_int`](Self::write_amf_int)
    ///
    /// Negative inputs are treated as unsigned 24-bit values and wrapped by
    /// adding 2^24 first.
    fn write_amf_uint(&mut self, value: i32) -> Result<()> {
        let value = if value < 0 {
            i64::from(value) + (1 << 24)
        } else {
            i64::from(value)
        };

        if (0..=i64::from(INT28_MAX)).contains(&value) {
            self.arena().write(marker::INTEGER);
            self.write_uint29(value as u32)
        } else {
            self.write_amf_double(value as f64);
            Ok(())
        }
    }
}

impl PrimitiveEncoder for ByteArena {
    fn arena(&mut self) -> &mut ByteArena {
        self
    }

    fn arena_ref(&self) -> &ByteArena {
        self
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn encode_uint29(value: u32) -> Result<Vec<u8>> {
        let mut arena = ByteArena::new();
        arena.write_uint29(value)?;
        Ok(arena.into_vec())
    }

    #[test]
    fn test_uint29_boundaries() {
        let cases = [
            (0, 1),
            (0x7F, 1),
            (0x80, 2),
            (0x3FFF, 2),
            (0x4000, 3),
            (0x1F_FFFF, 3),
            (0x20_0000, 4),
            (UINT29_MAX, 4),
        ];

        for (value, width) in cases {
            let bytes = encode_uint29(value).unwrap();
            assert_eq!(bytes.len(), width, "width of {:#x}", value);
            assert_eq!(uint29_size_of(value).unwrap(), width);

            let mut pos = 0;
            assert_eq!(read::uint29(&bytes, &mut pos), value);
            assert_eq!(pos, width);
        }
    }

    #[test]
    fn test_uint29_known_bytes() {
        assert_eq!(encode_uint29(0x80).unwrap(), vec![0x81, 0x00]);
        assert_eq!(encode_uint29(0x3FFF).unwrap(), vec![0xFF, 0x7F]);
        assert_eq!(encode_uint29(0x20_0000).unwrap(), vec![0x80, 0xC0, 0x80, 0x00]);
        assert_eq!(encode_uint29(UINT29_MAX).unwrap(), vec![0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_uint29_drops_bit_29() {
        assert_eq!(encode_uint29(0x3FFF_FFFF).unwrap(), vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encode_uint29(0x2000_0000).unwrap(), vec![0x80, 0x80, 0x80, 0x00]);
        assert_eq!(uint29_size_of(0x3FFF_FFFF).unwrap(), 4);

        let bytes = encode_uint29(0x2345_6789).unwrap();
        let mut pos = 0;
        assert_eq!(read::uint29(&bytes, &mut pos), 0x0345_6789);
    }

    #[test]
    fn test_uint29_out_of_range() {
        for value in [UINT29_LIMIT, 0x7FFF_FFFF, u32::MAX] {
            assert!(matches!(
                encode_uint29(value),
                Err(CodecError::UInt29OutOfRange(v)) if v == value
            ));
        }
    }

    #[test]
    fn test_uint29_failure_writes_nothing() {
        let mut arena = ByteArena::new();
        arena.write_u8(0xAA);
        assert!(arena.write_uint29(0x4000_0000).is_err());
        assert_eq!(arena.as_slice(), &[0xAA]);
    }

    #[test]
    fn test_fixed_width_big_endian() {
        let mut arena = ByteArena::new();
        arena.write_short(0x0102);
        arena.write_int(0x0304_0506);
        arena.write_long(0x0708_090A_0B0C_0D0E);
        arena.write_boolean(true);
        arena.write_boolean(false);

        assert_eq!(
            arena.as_slice(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 1, 0]
        );
    }

    #[test]
    fn test_double_bit_pattern() {
        let mut arena = ByteArena::new();
        arena.write_double(1.5);
        assert_eq!(arena.as_slice(), &1.5f64.to_bits().to_be_bytes());
    }

    #[test]
    fn test_allocate_and_put_short() {
        let mut arena = ByteArena::new();
        let slot = arena.allocate_short();
        arena.write_bytes(b"abc");
        arena.put_short(3, slot);
        assert_eq!(arena.as_slice(), &[0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_amf_utf_ascii() {
        let mut arena = ByteArena::new();
        arena.write_amf_utf("foo", true).unwrap();
        assert_eq!(arena.as_slice(), &[0x07, b'f', b'o', b'o']);

        let mut plain = ByteArena::new();
        plain.write_amf_utf("foo", false).unwrap();
        assert_eq!(plain.as_slice(), &[0x03, b'f', b'o', b'o']);
    }

    #[test]
    fn test_amf_utf_multibyte_lengths() {
        // 'é' = 2 bytes, '€' = 3 bytes
        assert_eq!(amf_utf_length("é€", SurrogateEncoding::Split), 5);

        let mut arena = ByteArena::new();
        arena.write_amf_utf("é€", false).unwrap();
        assert_eq!(arena.as_slice()[0], 5);
        assert_eq!(&arena.as_slice()[1..], "é€".as_bytes());
    }

    #[test]
    fn test_amf_utf_splits_surrogates() {
        // U+1F600 -> D83D DE00 -> two 3-byte sequences
        let s = "a\u{1F600}";
        assert_eq!(amf_utf_length(s, SurrogateEncoding::Split), 7);
        assert_eq!(amf_utf_length(s, SurrogateEncoding::Standard), 5);

        let mut arena = ByteArena::new();
        arena.write_amf_utf(s, false).unwrap();
        assert_eq!(
            arena.as_slice(),
            &[7, b'a', 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]
        );
        assert_eq!(read::utf(&arena.as_slice()[1..]), s);
    }

    struct StandardArena(ByteArena);

    impl PrimitiveEncoder for StandardArena {
        fn arena(&mut self) -> &mut ByteArena {
            &mut self.0
        }

        fn arena_ref(&self) -> &ByteArena {
            &self.0
        }

        fn surrogate_encoding(&self) -> SurrogateEncoding {
            SurrogateEncoding::Standard
        }
    }

    #[test]
    fn test_amf_utf_standard_mode() {
        let s = "a\u{1F600}";
        let mut out = StandardArena(ByteArena::new());
        out.write_amf_utf(s, false).unwrap();
        assert_eq!(out.0.as_slice()[0], 5);
        assert_eq!(&out.0.as_slice()[1..], s.as_bytes());
    }

    #[test]
    fn test_amf_int_range() {
        let mut arena = ByteArena::new();
        arena.write_amf_int(-1).unwrap();
        assert_eq!(arena.as_slice(), &[marker::INTEGER, 0xFF, 0xFF, 0xFF, 0xFF]);

        let mut arena = ByteArena::new();
        arena.write_amf_int(INT28_MAX).unwrap();
        assert_eq!(arena.as_slice()[0], marker::INTEGER);

        let mut arena = ByteArena::new();
        arena.write_amf_int(INT28_MAX + 1).unwrap();
        assert_eq!(arena.as_slice()[0], marker::DOUBLE);
        assert_eq!(
            &arena.as_slice()[1..],
            &((INT28_MAX + 1) as f64).to_bits().to_be_bytes()
        );

        let mut arena = ByteArena::new();
        arena.write_amf_int(INT28_MIN - 1).unwrap();
        assert_eq!(arena.as_slice()[0], marker::DOUBLE);
    }

    #[test]
    fn test_amf_uint_wraps_negative_24_bit() {
        let mut arena = ByteArena::new();
        arena.write_amf_uint(-1).unwrap();

        let bytes = arena.as_slice();
        assert_eq!(bytes[0], marker::INTEGER);
        let mut pos = 1;
        assert_eq!(read::uint29(bytes, &mut pos), 0xFF_FFFF);
    }

    #[test]
    fn test_amf_uint_large_falls_back_to_double() {
        let mut arena = ByteArena::new();
        arena.write_amf_uint(i32::MAX).unwrap();
        assert_eq!(arena.as_slice()[0], marker::DOUBLE);
        assert_eq!(arena.len(), 9);
    }

    #[test]
    fn test_amf_boolean_markers() {
        let mut arena = ByteArena::new();
        arena.write_amf_boolean(true);
        arena.write_amf_boolean(false);
        assert_eq!(arena.as_slice(), &[marker::TRUE, marker::FALSE]);
    }
}
