//! BER length decoding (spec §4.6 "BER length").

use aaf_core::errors::{AafError, Result};

use crate::reader::ByteReader;

/// Reads a BER length: a first byte `n` where `n <= 0x7F` is the length
/// itself, or the low 7 bits give a count of following big-endian bytes
/// (bounded to 8, per spec) whose value is the length.
pub fn read_length(reader: &mut ByteReader) -> Result<usize> {
    let first = reader.read_u8()?;
    if first <= 0x7f {
        return Ok(first as usize);
    }

    let follower_count = (first & 0x7f) as usize;
    if follower_count > 8 {
        return Err(AafError::bad_format(format!(
            "BER length follower count {follower_count} exceeds the 8-byte bound"
        )));
    }

    let mut value: u64 = 0;
    for _ in 0..follower_count {
        value = (value << 8) | reader.read_u8()? as u64;
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_length_is_the_byte_itself() {
        let data = [0x05];
        let mut r = ByteReader::new(&data);
        assert_eq!(read_length(&mut r).unwrap(), 5);
    }

    #[test]
    fn long_form_length_reads_follower_bytes() {
        let data = [0x82, 0x01, 0x00];
        let mut r = ByteReader::new(&data);
        assert_eq!(read_length(&mut r).unwrap(), 256);
    }

    #[test]
    fn follower_count_beyond_eight_is_rejected() {
        let data = [0x89, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let mut r = ByteReader::new(&data);
        assert!(read_length(&mut r).is_err());
    }
}
