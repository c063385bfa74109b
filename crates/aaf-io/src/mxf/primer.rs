//! The primer pack: maps a metadata set's local tags to global AUIDs
//! (spec §4.6 "Primer pack").

use std::collections::HashMap;

use aaf_core::errors::{AafError, Result};
use aaf_core::ids::Auid;

use crate::reader::ByteReader;

/// A decoded primer pack, valid for the lifetime of the partition it
/// precedes.
#[derive(Debug, Default, Clone)]
pub struct Primer {
    pub tags: HashMap<u16, Auid>,
}

impl Primer {
    /// Decodes `item_count: u32, item_length: u32, (tag: u16, uid: AUID){item_count}`.
    /// Rejects `item_length != 18` or `item_count > 65536` before consuming
    /// any tag entries (spec §8 "Primer bound").
    pub fn decode(reader: &mut ByteReader) -> Result<Self> {
        let item_count = reader.read_u32_be()?;
        let item_length = reader.read_u32_be()?;

        if item_length != 18 {
            return Err(AafError::bad_format(format!(
                "primer pack item_length {item_length} != 18"
            )));
        }
        if item_count > 65536 {
            return Err(AafError::bad_format(format!(
                "primer pack item_count {item_count} exceeds 65536"
            )));
        }

        let mut tags = HashMap::with_capacity(item_count as usize);
        for _ in 0..item_count {
            let tag = reader.read_u16_be()?;
            let uid = Auid::from_be_bytes(reader.read_array::<16>()?);
            tags.insert(tag, uid);
        }
        Ok(Primer { tags })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    fn encode_primer(item_count: u32, item_length: u32, entries: &[(u16, [u8; 16])]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(item_count).unwrap();
        buf.write_u32::<BigEndian>(item_length).unwrap();
        for (tag, uid) in entries {
            buf.write_u16::<BigEndian>(*tag).unwrap();
            buf.extend_from_slice(uid);
        }
        buf
    }

    #[test]
    fn decodes_tag_to_auid_map() {
        let data = encode_primer(1, 18, &[(0x3c0a, [7; 16])]);
        let mut r = ByteReader::new(&data);
        let primer = Primer::decode(&mut r).unwrap();
        assert_eq!(primer.tags.get(&0x3c0a), Some(&Auid::from_be_bytes([7; 16])));
    }

    #[test]
    fn rejects_wrong_item_length_without_consuming_entries() {
        let data = encode_primer(1, 16, &[(0x3c0a, [7; 16])]);
        let mut r = ByteReader::new(&data);
        assert!(Primer::decode(&mut r).is_err());
        assert_eq!(r.position(), 8);
    }

    #[test]
    fn rejects_item_count_over_bound() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(70_000).unwrap();
        buf.write_u32::<BigEndian>(18).unwrap();
        let mut r = ByteReader::new(&buf);
        assert!(Primer::decode(&mut r).is_err());
    }
}
