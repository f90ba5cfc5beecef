//! Binary encoding helpers shared by blocks, filter blocks and the footer.
//!
//! Fixed-width integers are little-endian. Varints use the usual 7-bits-per-
//! byte encoding with the high bit as a continuation flag.

use byteorder::{ByteOrder, LittleEndian};

/// Maximum encoded length of a varint32.
pub const MAX_VARINT32_BYTES: usize = 5;

/// Maximum encoded length of a varint64.
pub const MAX_VARINT64_BYTES: usize = 10;

pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, value);
    dst.extend_from_slice(&buf);
}

pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, value);
    dst.extend_from_slice(&buf);
}

/// Decodes a fixed32 from the first four bytes of `src`.
///
/// # Panics
///
/// Panics if `src` is shorter than four bytes; callers bounds-check first.
pub fn decode_fixed32(src: &[u8]) -> u32 {
    LittleEndian::read_u32(src)
}

/// Decodes a fixed64 from the first eight bytes of `src`.
pub fn decode_fixed64(src: &[u8]) -> u64 {
    LittleEndian::read_u64(src)
}

pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    put_varint64(dst, value as u64);
}

pub fn put_varint64(dst: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Number of bytes `value` occupies once varint-encoded.
#[must_use]
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decodes a varint32 from the front of `src`.
///
/// Returns the value and the number of bytes consumed, or `None` if `src`
/// ends mid-varint or the encoding overflows 32 bits.
pub fn get_varint32(src: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    for (i, &byte) in src.iter().take(MAX_VARINT32_BYTES).enumerate() {
        let shift = 7 * i as u32;
        if i == MAX_VARINT32_BYTES - 1 && byte > 0x0f {
            return None;
        }
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }
    None
}

/// Decodes a varint64 from the front of `src`.
pub fn get_varint64(src: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    for (i, &byte) in src.iter().take(MAX_VARINT64_BYTES).enumerate() {
        let shift = 7 * i as u32;
        if i == MAX_VARINT64_BYTES - 1 && byte > 0x01 {
            return None;
        }
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed32_layout_is_little_endian() {
        let mut buf = Vec::new();
        put_fixed32(&mut buf, 0x0403_0201);
        assert_eq!(buf, vec![1, 2, 3, 4]);
        assert_eq!(decode_fixed32(&buf), 0x0403_0201);
    }

    #[test]
    fn fixed64_layout_is_little_endian() {
        let mut buf = Vec::new();
        put_fixed64(&mut buf, 0x0807_0605_0403_0201);
        assert_eq!(buf, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decode_fixed64(&buf), 0x0807_0605_0403_0201);
    }

    #[test]
    fn fixed_encodings_append() {
        let mut buf = vec![0xaa];
        put_fixed32(&mut buf, 7);
        put_fixed64(&mut buf, 9);
        assert_eq!(buf.len(), 13);
        assert_eq!(buf[0], 0xaa);
        assert_eq!(decode_fixed32(&buf[1..]), 7);
        assert_eq!(decode_fixed64(&buf[5..]), 9);
    }

    #[test]
    fn varint32_values() {
        let mut values = vec![0u32, 1, 127, 128, 255, 300, 16_383, 16_384, u32::MAX];
        for shift in 0..32 {
            values.push(1 << shift);
            values.push((1u32 << shift).wrapping_sub(1));
        }

        let mut buf = Vec::new();
        for &v in &values {
            put_varint32(&mut buf, v);
        }

        let mut pos = 0;
        for &v in &values {
            let (decoded, used) = get_varint32(&buf[pos..]).expect("decodable");
            assert_eq!(decoded, v);
            assert_eq!(used, varint_length(v as u64));
            pos += used;
        }
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn varint64_max_is_ten_bytes() {
        let mut buf = Vec::new();
        put_varint64(&mut buf, u64::MAX);
        assert_eq!(buf.len(), MAX_VARINT64_BYTES);
        assert_eq!(get_varint64(&buf), Some((u64::MAX, MAX_VARINT64_BYTES)));
    }

    #[test]
    fn truncated_varint_is_rejected() {
        let mut buf = Vec::new();
        put_varint32(&mut buf, u32::MAX);
        for len in 0..buf.len() {
            assert_eq!(get_varint32(&buf[..len]), None);
        }
    }

    #[test]
    fn overflowing_varint32_is_rejected() {
        assert_eq!(get_varint32(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x00]), None);
        assert_eq!(get_varint32(&[0x80, 0x80, 0x80, 0x80, 0x10]), None);
    }

    #[test]
    fn varint64_rejects_eleven_byte_encoding() {
        let buf = [0xffu8; 11];
        assert_eq!(get_varint64(&buf), None);
    }
}
