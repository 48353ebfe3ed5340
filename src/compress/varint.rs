//! Length-prefixed variable-byte integers
//!
//! The two most significant bits of the first byte give the number of
//! bytes that follow (0 to 3); the remaining bits hold the value, most
//! significant byte first.

use std::io::{self, Write};

/// Values must be strictly below this bound
pub const VARINT_BOUND: u32 = 1 << 30;

/// Number of bytes needed to encode the value
#[inline]
pub fn encoded_len(value: u32) -> usize {
    if value < 1 << 6 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 22 {
        3
    } else {
        4
    }
}

/// Encodes a value into a fixed buffer, returning the number of used bytes
pub fn encode_varint(value: u32, buffer: &mut [u8; 4]) -> io::Result<usize> {
    if value >= VARINT_BOUND {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("value {} cannot be encoded as a varint", value),
        ));
    }

    let length = encoded_len(value);
    let bytes = value.to_be_bytes();
    buffer[..length].copy_from_slice(&bytes[4 - length..]);
    buffer[0] |= ((length - 1) as u8) << 6;
    Ok(length)
}

/// Writes a varint, returning the number of written bytes
pub fn write_varint<W: Write + ?Sized>(writer: &mut W, value: u32) -> io::Result<usize> {
    let mut buffer = [0u8; 4];
    let length = encode_varint(value, &mut buffer)?;
    writer.write_all(&buffer[..length])?;
    Ok(length)
}

/// Decodes the varint at the start of `data`
///
/// Returns the value and the number of consumed bytes, or `None` if the data
/// is empty or truncated
#[inline]
pub fn decode_varint(data: &[u8]) -> Option<(u32, usize)> {
    let first = *data.first()?;
    let length = (first >> 6) as usize + 1;
    if data.len() < length {
        return None;
    }

    let mut value = (first & 0x3f) as u32;
    for byte in &data[1..length] {
        value = (value << 8) | (*byte as u32);
    }
    Some((value, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn roundtrip(value: u32) -> usize {
        let mut data = Vec::new();
        let written = write_varint(&mut data, value).expect("value should be encodable");
        assert_eq!(written, data.len());
        let (decoded, read) = decode_varint(&data).expect("could not decode");
        assert_eq!(decoded, value);
        assert_eq!(read, written);
        written
    }

    #[test]
    fn test_length_ranges() {
        assert_eq!(roundtrip(0), 1);
        assert_eq!(roundtrip(63), 1);
        assert_eq!(roundtrip(64), 2);
        assert_eq!(roundtrip(16383), 2);
        assert_eq!(roundtrip(16384), 3);
        assert_eq!(roundtrip(4194303), 3);
        assert_eq!(roundtrip(4194304), 4);
        assert_eq!(roundtrip(VARINT_BOUND - 1), 4);
    }

    #[test]
    fn test_random_values() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            // Uniform over the encoded lengths rather than over the values
            let bits = rng.gen_range(0..=30);
            let value = rng.gen_range(0..VARINT_BOUND) >> (30 - bits);
            assert_eq!(roundtrip(value), encoded_len(value));
        }
    }

    #[test]
    fn test_layout() {
        let mut data = Vec::new();
        write_varint(&mut data, 300).unwrap();
        // 300 = 0x012c, two bytes with length code 1
        assert_eq!(data, vec![0x41, 0x2c]);
    }

    #[test]
    fn test_out_of_range() {
        let mut data = Vec::new();
        let error = write_varint(&mut data, VARINT_BOUND).unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::InvalidInput);
        assert!(data.is_empty());
    }

    #[test]
    fn test_truncated() {
        let mut data = Vec::new();
        write_varint(&mut data, 100_000).unwrap();
        assert!(decode_varint(&data[..2]).is_none());
        assert!(decode_varint(&[]).is_none());
    }
}
