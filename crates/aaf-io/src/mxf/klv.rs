//! KLV framing: the top-level Key/BER-Length/Value tuples an MXF file is
//! built from, and the inner `(local_tag: u16, size: u16, value)` tuples a
//! metadata set's value carries (spec §4.6 "Wire shape").

use aaf_core::errors::Result;
use aaf_core::ids::Auid;

use super::ber;
use crate::reader::ByteReader;

/// Reads one top-level KLV tuple at the reader's current position, leaving
/// the reader positioned just past the value. Returns `None` at end of
/// input.
pub fn next_kl(reader: &mut ByteReader) -> Result<Option<(Auid, Vec<u8>)>> {
    if reader.remaining() < 16 {
        return Ok(None);
    }
    let key = Auid::from_be_bytes(reader.read_array::<16>()?);
    let length = ber::read_length(reader)?;
    let value = reader.read_bytes(length)?;
    Ok(Some((key, value)))
}

/// Iterates the `(local_tag, size, value)` tuples inside a metadata set's
/// already-extracted value bytes.
pub fn iter_tags(data: &[u8]) -> Result<Vec<(u16, Vec<u8>)>> {
    let mut reader = ByteReader::new(data);
    let mut out = Vec::new();
    while reader.remaining() >= 4 {
        let tag = reader.read_u16_be()?;
        let size = reader.read_u16_be()? as usize;
        if size > 0 {
            out.push((tag, reader.read_bytes(size)?));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    #[test]
    fn next_kl_reads_short_form_value() {
        let mut data = vec![9u8; 16];
        data.push(3); // short-form length
        data.extend_from_slice(&[1, 2, 3]);
        let mut r = ByteReader::new(&data);
        let (key, value) = next_kl(&mut r).unwrap().unwrap();
        assert_eq!(key, Auid::from_be_bytes([9; 16]));
        assert_eq!(value, vec![1, 2, 3]);
        assert!(next_kl(&mut r).unwrap().is_none());
    }

    #[test]
    fn iter_tags_splits_inner_tuples() {
        let mut data = Vec::new();
        data.write_u16::<BigEndian>(0x3c0a).unwrap();
        data.write_u16::<BigEndian>(4).unwrap();
        data.extend_from_slice(&[1, 2, 3, 4]);

        let tags = iter_tags(&data).unwrap();
        assert_eq!(tags, vec![(0x3c0a, vec![1, 2, 3, 4])]);
    }
}
