//! MXF KLV parser (spec §4.6, C6): reads partitions, the primer pack, and
//! header metadata sets into a lightweight object graph keyed by instance
//! UID, reusing `aaf_core`'s AUID and dictionary types (spec §2: "using the
//! same identifiers").
//!
//! Grounded directly in `original_source/aaf2/mxf.py`'s `MXFFile` class.

pub mod ber;
pub mod dump;
pub mod klv;
pub mod objects;
pub mod op;
pub mod primer;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use aaf_core::dictionary::Dictionary;
use aaf_core::errors::Result;
use aaf_core::ids::Auid;

use self::objects::MxfObject;
use self::primer::Primer;
use crate::reader::ByteReader;

static PRIMER_KEY: Lazy<Auid> =
    Lazy::new(|| Auid::parse_canonical("060e2b34-0205-0101-0d01-020101050100").unwrap());
static HEADER_PARTITION_KEY: Lazy<Auid> =
    Lazy::new(|| Auid::parse_canonical("060e2b34-0205-0101-0d01-020101020400").unwrap());

/// The partition pack fields preceding header metadata (spec §4.6
/// "Partition pack (expansion)"), recorded so the operational pattern is
/// known even before a `Preface` has been read.
#[derive(Clone, Debug)]
pub struct PartitionPack {
    pub major_version: u16,
    pub minor_version: u16,
    pub kag_size: u32,
    pub this_partition: u64,
    pub prev_partition: u64,
    pub footer_partition: u64,
    pub header_byte_count: u64,
    pub index_byte_count: u64,
    pub index_sid: u32,
    pub body_offset: u64,
    pub body_sid: u32,
    pub operational_pattern: Auid,
}

impl PartitionPack {
    fn decode(reader: &mut ByteReader) -> Result<Self> {
        Ok(PartitionPack {
            major_version: reader.read_u16_be()?,
            minor_version: reader.read_u16_be()?,
            kag_size: reader.read_u32_be()?,
            this_partition: reader.read_u64_be()?,
            prev_partition: reader.read_u64_be()?,
            footer_partition: reader.read_u64_be()?,
            header_byte_count: reader.read_u64_be()?,
            index_byte_count: reader.read_u64_be()?,
            index_sid: reader.read_u32_be()?,
            body_offset: reader.read_u64_be()?,
            body_sid: reader.read_u32_be()?,
            operational_pattern: Auid::from_be_bytes(reader.read_array::<16>()?),
        })
    }
}

/// The parsed MXF object graph: every decoded metadata set, keyed by
/// instance UID, plus the primer's local-tag map and the `Preface`'s id if
/// one was read (spec §4.6).
pub struct MxfFile {
    pub objects: HashMap<Auid, MxfObject>,
    pub local_tags: HashMap<u16, Auid>,
    pub preface: Option<Auid>,
    pub header_operation_pattern: Option<Auid>,
}

impl MxfFile {
    /// Parses an MXF byte stream, consuming partitions/primer/header
    /// metadata sets until input is exhausted. Unrecognized top-level keys
    /// are skipped via their BER length rather than treated as fatal (spec
    /// §4.6 "Error recovery (expansion)").
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with_dictionary(data, &Dictionary::with_baseline())
    }

    /// As `parse`, but resolves `DataDef` references against a caller-
    /// supplied dictionary rather than the baseline (for callers sharing a
    /// dictionary with an AAF file opened in the same session).
    pub fn parse_with_dictionary(data: &[u8], dict: &Dictionary) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let mut local_tags: HashMap<u16, Auid> = HashMap::new();
        let mut objects = HashMap::new();
        let mut preface = None;
        let mut header_operation_pattern = None;

        while let Some((key, value)) = klv::next_kl(&mut reader)? {
            if key == *PRIMER_KEY {
                let mut sub = ByteReader::new(&value);
                if let Ok(decoded) = Primer::decode(&mut sub) {
                    local_tags = decoded.tags;
                } else {
                    log::warn!("rejecting malformed primer pack, continuing without local tags");
                }
            }

            if key == *HEADER_PARTITION_KEY {
                let mut sub = ByteReader::new(&value);
                if let Ok(pack) = PartitionPack::decode(&mut sub) {
                    header_operation_pattern = Some(pack.operational_pattern);
                }
            }

            let key_bytes = key.as_be_bytes();
            if key_bytes[5] != 0x53 {
                continue;
            }

            let Some((class_name, kind)) = objects::CLASS_TABLE.get(&key).copied() else {
                continue;
            };

            let obj = objects::decode_object(class_name, kind, &value, &local_tags, dict)?;
            if let Some(id) = obj.instance_id {
                if kind == objects::ObjectKind::Preface {
                    preface = Some(id);
                }
                objects.insert(id, obj);
            }
        }

        Ok(MxfFile { objects, local_tags, preface, header_operation_pattern })
    }

    pub fn object(&self, id: &Auid) -> Option<&MxfObject> {
        self.objects.get(id)
    }

    /// The file's operational pattern, preferring the partition pack's
    /// declared AUID over the `Preface`'s `OperationalPattern` property
    /// (spec §4.6 `operation_pattern`).
    pub fn operation_pattern(&self) -> Option<String> {
        let auid = self.header_operation_pattern.or_else(|| {
            self.preface
                .and_then(|id| self.objects.get(&id))
                .and_then(|preface| match preface.fields.get("OperationalPattern") {
                    Some(objects::MxfValue::Auid(auid)) => Some(*auid),
                    _ => None,
                })
        })?;
        op::classify_operational_pattern(&auid)
    }

    pub fn dump(&self, obj: Option<Auid>) -> String {
        dump::dump(self, obj)
    }

    pub fn dump_flat(&self) -> String {
        dump::dump_flat(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    fn write_kl(out: &mut Vec<u8>, key: &Auid, value: &[u8]) {
        out.extend_from_slice(&key.as_be_bytes());
        if value.len() <= 0x7f {
            out.push(value.len() as u8);
        } else {
            out.push(0x82);
            out.write_u16::<BigEndian>(value.len() as u16).unwrap();
        }
        out.extend_from_slice(value);
    }

    fn primer_value(entries: &[(u16, Auid)]) -> Vec<u8> {
        let mut v = Vec::new();
        v.write_u32::<BigEndian>(entries.len() as u32).unwrap();
        v.write_u32::<BigEndian>(18).unwrap();
        for (tag, auid) in entries {
            v.write_u16::<BigEndian>(*tag).unwrap();
            v.extend_from_slice(&auid.as_be_bytes());
        }
        v
    }

    fn tagged(tag: u16, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u16::<BigEndian>(tag).unwrap();
        out.write_u16::<BigEndian>(data.len() as u16).unwrap();
        out.extend_from_slice(data);
        out
    }

    fn strong_ref_array_value(refs: &[Auid]) -> Vec<u8> {
        let mut v = Vec::new();
        v.write_u32::<BigEndian>(refs.len() as u32).unwrap();
        v.write_u32::<BigEndian>(16).unwrap();
        for r in refs {
            v.extend_from_slice(&r.as_be_bytes());
        }
        v
    }

    #[test]
    fn parses_preface_and_classifies_op1a() {
        let preface_key = Auid::parse_canonical("060e2b34-0253-0101-0d01-010101012f00").unwrap();
        let content_storage_key = Auid::parse_canonical("060e2b34-0253-0101-0d01-010101011800").unwrap();
        let material_package_key = Auid::parse_canonical("060e2b34-0253-0101-0d01-010101013600").unwrap();
        let source_package_key = Auid::parse_canonical("060e2b34-0253-0101-0d01-010101013700").unwrap();

        let mut op_auid_bytes = [0u8; 16];
        op_auid_bytes[..12].copy_from_slice(&[0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0d, 0x01, 0x02, 0x01]);
        op_auid_bytes[12] = 1;
        op_auid_bytes[13] = 1;
        let op_auid = Auid::from_be_bytes(op_auid_bytes);

        let content_storage_instance = Auid::from_be_bytes([0x42; 16]);
        let preface_instance = Auid::from_be_bytes([0x99; 16]);
        let material_package_instance = Auid::from_be_bytes([0x43; 16]);
        let source_package_instance = Auid::from_be_bytes([0x44; 16]);

        let mut preface_value = Vec::new();
        preface_value.extend_from_slice(&tagged(0x3c0a, &preface_instance.as_be_bytes()));
        preface_value.extend_from_slice(&tagged(0x3b09, &op_auid.as_be_bytes()));
        preface_value.extend_from_slice(&tagged(0x3b03, &content_storage_instance.as_be_bytes()));

        let mut content_storage_value = Vec::new();
        content_storage_value.extend_from_slice(&tagged(0x3c0a, &content_storage_instance.as_be_bytes()));
        content_storage_value.extend_from_slice(&tagged(
            0x1901,
            &strong_ref_array_value(&[material_package_instance, source_package_instance]),
        ));

        let mut material_package_value = Vec::new();
        material_package_value.extend_from_slice(&tagged(0x3c0a, &material_package_instance.as_be_bytes()));

        let mut source_package_value = Vec::new();
        source_package_value.extend_from_slice(&tagged(0x3c0a, &source_package_instance.as_be_bytes()));

        let mut data = Vec::new();
        write_kl(&mut data, &PRIMER_KEY, &primer_value(&[]));
        write_kl(&mut data, &preface_key, &preface_value);
        write_kl(&mut data, &content_storage_key, &content_storage_value);
        write_kl(&mut data, &material_package_key, &material_package_value);
        write_kl(&mut data, &source_package_key, &source_package_value);

        let file = MxfFile::parse(&data).unwrap();
        assert!(file.preface.is_some());
        assert_eq!(file.operation_pattern(), Some("OP1a".to_string()));

        let content_storage = file.objects.get(&content_storage_instance).unwrap();
        let packages = match content_storage.fields.get("Packages") {
            Some(objects::MxfValue::RefArray(refs)) => refs.clone(),
            other => panic!("expected ContentStorage.Packages ref array, found {other:?}"),
        };
        assert_eq!(packages, vec![material_package_instance, source_package_instance]);
        assert!(file.objects.contains_key(&material_package_instance));
        assert!(file.objects.contains_key(&source_package_instance));
    }

    #[test]
    fn unknown_top_level_key_is_skipped_not_fatal() {
        let unknown_key = Auid::from_be_bytes([0xaa; 16]);
        let mut data = Vec::new();
        write_kl(&mut data, &unknown_key, &[1, 2, 3]);
        let file = MxfFile::parse(&data).unwrap();
        assert!(file.objects.is_empty());
    }
}
