//! Property stream codec (spec §4.2, §4.5): converts `PropertyValue`s to and
//! from the `(pid: u16, storage_kind: u16, length: u16, data...)` tuples that
//! make up an object's `properties` stream.
//!
//! Composite values (`Record`, `FixedArray`, `VariableArray`) carry their
//! `type_id` ahead of an element count so a reader with no dictionary access
//! can still walk the shape; elements themselves are tagged with their own
//! `(storage_kind, length)` pair, recursively, the same way the outer tuple
//! is.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use aaf_core::errors::{AafError, Result};
use aaf_core::ids::{Auid, MobID};
use aaf_core::value::{InstanceId, PropertyValue, StorageKind};

/// Sentinel inline length marking a property whose encoded payload
/// overflowed the `u16` length prefix. Its real payload lives in the
/// owning object's `ObjID-Property-<pid>` auxiliary stream instead (spec
/// §4.5 "Large values ... are stored in auxiliary streams ... the
/// properties entry pointing to them"), so the tuple carries no inline
/// data once this sentinel is written.
const AUX_STREAM_SENTINEL: u16 = u16::MAX;

/// Name of the auxiliary stream a property `pid`'s overflow payload is
/// written under, alongside the owning object's `properties` stream.
pub fn aux_stream_name(pid: u16) -> String {
    format!("ObjID-Property-{pid}")
}

/// Encodes one `(pid, storage_kind, length, data)` tuple, hard-erroring if
/// the payload would overflow the inline `u16` length prefix. Callers that
/// can fall back to an auxiliary stream should use
/// `encode_property_with_aux` instead.
pub fn encode_property(pid: u16, value: &PropertyValue) -> Result<Vec<u8>> {
    encode_property_with_aux(pid, value, &mut |_, _| {
        Err(AafError::bad_format(format!(
            "property {pid} payload exceeds the u16 length prefix and no auxiliary stream is available"
        )))
    })
}

/// As `encode_property`, but a payload at or beyond the `u16` length
/// prefix's range is handed to `emit_aux(pid, data)` instead of erroring,
/// and the tuple's length field is written as `AUX_STREAM_SENTINEL` so a
/// reader knows to resolve it from `aux_stream_name(pid)` rather than the
/// inline bytes.
pub fn encode_property_with_aux(
    pid: u16,
    value: &PropertyValue,
    emit_aux: &mut dyn FnMut(u16, Vec<u8>) -> Result<()>,
) -> Result<Vec<u8>> {
    let data = encode_value(value)?;
    let mut out = Vec::with_capacity(6 + data.len());
    out.write_u16::<BigEndian>(pid)?;
    out.write_u16::<BigEndian>(value.storage_kind() as u16)?;
    if data.len() >= AUX_STREAM_SENTINEL as usize {
        out.write_u16::<BigEndian>(AUX_STREAM_SENTINEL)?;
        emit_aux(pid, data)?;
    } else {
        out.write_u16::<BigEndian>(data.len() as u16)?;
        out.extend_from_slice(&data);
    }
    Ok(out)
}

/// Encodes a full `properties` stream, one tuple per property in the order
/// given (insertion order — spec §9 "Dynamic properties"). Hard-errors on
/// an oversized value; use `encode_properties_with_aux` where an auxiliary
/// stream can absorb it.
pub fn encode_properties<'a>(
    props: impl Iterator<Item = (u16, &'a PropertyValue)>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (pid, value) in props {
        out.extend_from_slice(&encode_property(pid, value)?);
    }
    Ok(out)
}

/// As `encode_properties`, spilling any oversized value into its auxiliary
/// stream via `emit_aux` instead of erroring.
pub fn encode_properties_with_aux<'a>(
    props: impl Iterator<Item = (u16, &'a PropertyValue)>,
    emit_aux: &mut dyn FnMut(u16, Vec<u8>) -> Result<()>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (pid, value) in props {
        out.extend_from_slice(&encode_property_with_aux(pid, value, emit_aux)?);
    }
    Ok(out)
}

/// Decodes a `properties` stream back into `(pid, value)` pairs, preserving
/// order. A storage kind the reader doesn't recognize is not a hard failure:
/// its bytes are kept as `PropertyValue::Opaque` so an unknown writer
/// extension still round-trips (spec §4.2 "Unknown type_ids are preserved as
/// opaque byte blobs"). Errors if a tuple points at an auxiliary stream;
/// use `decode_properties_with_aux` where one can be resolved.
pub fn decode_properties(data: &[u8]) -> Result<Vec<(u16, PropertyValue)>> {
    decode_properties_with_aux(data, &mut |pid| {
        Err(AafError::bad_format(format!(
            "property {pid} payload is stored in an auxiliary stream and no resolver is available"
        )))
    })
}

/// As `decode_properties`, resolving any sentinel-length tuple's real
/// payload via `resolve_aux(pid)` — expected to read
/// `aux_stream_name(pid)` from the owning object's storage.
pub fn decode_properties_with_aux(
    data: &[u8],
    resolve_aux: &mut dyn FnMut(u16) -> Result<Vec<u8>>,
) -> Result<Vec<(u16, PropertyValue)>> {
    let mut cursor = Cursor::new(data);
    let mut out = Vec::new();
    while (cursor.position() as usize) < data.len() {
        if data.len() - cursor.position() as usize < 6 {
            return Err(AafError::corruption("truncated property tuple header"));
        }
        let pid = cursor.read_u16::<BigEndian>()?;
        let kind_raw = cursor.read_u16::<BigEndian>()?;
        let length = cursor.read_u16::<BigEndian>()?;

        let payload = if length == AUX_STREAM_SENTINEL {
            resolve_aux(pid)?
        } else {
            let mut buf = vec![0u8; length as usize];
            cursor.read_exact(&mut buf).map_err(AafError::Io)?;
            buf
        };

        let value = match StorageKind::from_u16(kind_raw) {
            Some(kind) => decode_value(kind, &payload)?,
            None => PropertyValue::Opaque(payload),
        };
        out.push((pid, value));
    }
    Ok(out)
}

fn encode_value(value: &PropertyValue) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match value {
        PropertyValue::Int8(v) => buf.write_i8(*v)?,
        PropertyValue::UInt8(v) => buf.write_u8(*v)?,
        PropertyValue::Int16(v) => buf.write_i16::<BigEndian>(*v)?,
        PropertyValue::UInt16(v) => buf.write_u16::<BigEndian>(*v)?,
        PropertyValue::Int32(v) => buf.write_i32::<BigEndian>(*v)?,
        PropertyValue::UInt32(v) => buf.write_u32::<BigEndian>(*v)?,
        PropertyValue::Int64(v) => buf.write_i64::<BigEndian>(*v)?,
        PropertyValue::UInt64(v) => buf.write_u64::<BigEndian>(*v)?,
        PropertyValue::Boolean(v) => buf.write_u8(u8::from(*v))?,
        PropertyValue::Enum { type_id, value } => {
            buf.extend_from_slice(&type_id.as_be_bytes());
            buf.write_i64::<BigEndian>(*value)?;
        }
        // UTF-16LE, zero-terminated (spec §4.2).
        PropertyValue::String(s) => {
            for unit in s.encode_utf16() {
                buf.write_u16::<LittleEndian>(unit)?;
            }
            buf.write_u16::<LittleEndian>(0)?;
        }
        PropertyValue::Auid(a) => buf.extend_from_slice(&a.as_be_bytes()),
        // MobIDs on the wire are little-endian UUID form (spec §4.2).
        PropertyValue::MobId(m) => buf.extend_from_slice(&m.bytes_le()),
        PropertyValue::Rational { numerator, denominator } => {
            buf.write_i32::<BigEndian>(*numerator)?;
            buf.write_i32::<BigEndian>(*denominator)?;
        }
        PropertyValue::Record { type_id, members } => {
            buf.extend_from_slice(&type_id.as_be_bytes());
            buf.write_u32::<BigEndian>(members.len() as u32)?;
            for member in members {
                encode_tagged_into(&mut buf, member)?;
            }
        }
        PropertyValue::FixedArray { type_id, elements }
        | PropertyValue::VariableArray { type_id, elements } => {
            buf.extend_from_slice(&type_id.as_be_bytes());
            buf.write_u32::<BigEndian>(elements.len() as u32)?;
            for element in elements {
                encode_tagged_into(&mut buf, element)?;
            }
        }
        PropertyValue::StrongRef(id) | PropertyValue::WeakRef(id) => {
            buf.write_u64::<BigEndian>(*id)?
        }
        PropertyValue::StrongRefArray(ids)
        | PropertyValue::StrongRefSet(ids)
        | PropertyValue::WeakRefArray(ids)
        | PropertyValue::WeakRefSet(ids) => {
            buf.write_u32::<BigEndian>(ids.len() as u32)?;
            for id in ids {
                buf.write_u64::<BigEndian>(*id)?;
            }
        }
        PropertyValue::Opaque(bytes) => buf.extend_from_slice(bytes),
    }
    Ok(buf)
}

fn encode_tagged_into(buf: &mut Vec<u8>, value: &PropertyValue) -> Result<()> {
    let data = encode_value(value)?;
    if data.len() > u16::MAX as usize {
        return Err(AafError::bad_format(
            "composite element payload exceeds the u16 length prefix",
        ));
    }
    buf.write_u16::<BigEndian>(value.storage_kind() as u16)?;
    buf.write_u16::<BigEndian>(data.len() as u16)?;
    buf.extend_from_slice(&data);
    Ok(())
}

fn decode_value(kind: StorageKind, payload: &[u8]) -> Result<PropertyValue> {
    let mut cursor = Cursor::new(payload);
    let value = match kind {
        StorageKind::Int8 => PropertyValue::Int8(cursor.read_i8()?),
        StorageKind::UInt8 => PropertyValue::UInt8(cursor.read_u8()?),
        StorageKind::Int16 => PropertyValue::Int16(cursor.read_i16::<BigEndian>()?),
        StorageKind::UInt16 => PropertyValue::UInt16(cursor.read_u16::<BigEndian>()?),
        StorageKind::Int32 => PropertyValue::Int32(cursor.read_i32::<BigEndian>()?),
        StorageKind::UInt32 => PropertyValue::UInt32(cursor.read_u32::<BigEndian>()?),
        StorageKind::Int64 => PropertyValue::Int64(cursor.read_i64::<BigEndian>()?),
        StorageKind::UInt64 => PropertyValue::UInt64(cursor.read_u64::<BigEndian>()?),
        StorageKind::Boolean => PropertyValue::Boolean(cursor.read_u8()? != 0),
        StorageKind::Enum => {
            let type_id = read_auid(&mut cursor)?;
            let value = cursor.read_i64::<BigEndian>()?;
            PropertyValue::Enum { type_id, value }
        }
        StorageKind::String => PropertyValue::String(decode_utf16le_z(payload)),
        StorageKind::Auid => PropertyValue::Auid(read_auid(&mut cursor)?),
        StorageKind::MobId => {
            let mut bytes = [0u8; 32];
            cursor.read_exact(&mut bytes).map_err(|_| {
                AafError::corruption("truncated MobID payload")
            })?;
            PropertyValue::MobId(MobID::from_bytes_le(bytes))
        }
        StorageKind::Rational => {
            let numerator = cursor.read_i32::<BigEndian>()?;
            let denominator = cursor.read_i32::<BigEndian>()?;
            PropertyValue::Rational { numerator, denominator }
        }
        StorageKind::Record => {
            let type_id = read_auid(&mut cursor)?;
            let count = cursor.read_u32::<BigEndian>()?;
            let members = read_tagged_elements(&mut cursor, count)?;
            PropertyValue::Record { type_id, members }
        }
        StorageKind::FixedArray => {
            let type_id = read_auid(&mut cursor)?;
            let count = cursor.read_u32::<BigEndian>()?;
            let elements = read_tagged_elements(&mut cursor, count)?;
            PropertyValue::FixedArray { type_id, elements }
        }
        StorageKind::VariableArray => {
            let type_id = read_auid(&mut cursor)?;
            let count = cursor.read_u32::<BigEndian>()?;
            let elements = read_tagged_elements(&mut cursor, count)?;
            PropertyValue::VariableArray { type_id, elements }
        }
        StorageKind::StrongRef => PropertyValue::StrongRef(cursor.read_u64::<BigEndian>()?),
        StorageKind::WeakRef => PropertyValue::WeakRef(cursor.read_u64::<BigEndian>()?),
        StorageKind::StrongRefArray => PropertyValue::StrongRefArray(read_id_array(&mut cursor)?),
        StorageKind::StrongRefSet => PropertyValue::StrongRefSet(read_id_array(&mut cursor)?),
        StorageKind::WeakRefArray => PropertyValue::WeakRefArray(read_id_array(&mut cursor)?),
        StorageKind::WeakRefSet => PropertyValue::WeakRefSet(read_id_array(&mut cursor)?),
        StorageKind::Opaque => PropertyValue::Opaque(payload.to_vec()),
    };
    Ok(value)
}

fn read_auid<R: Read>(r: &mut R) -> Result<Auid> {
    let mut bytes = [0u8; 16];
    r.read_exact(&mut bytes).map_err(AafError::Io)?;
    Ok(Auid::from_be_bytes(bytes))
}

fn decode_utf16le_z(payload: &[u8]) -> String {
    let mut units = Vec::with_capacity(payload.len() / 2);
    let mut i = 0;
    while i + 1 < payload.len() {
        let unit = u16::from_le_bytes([payload[i], payload[i + 1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
        i += 2;
    }
    String::from_utf16_lossy(&units)
}

fn read_tagged_elements(cursor: &mut Cursor<&[u8]>, count: u32) -> Result<Vec<PropertyValue>> {
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind_raw = cursor.read_u16::<BigEndian>()?;
        let length = cursor.read_u16::<BigEndian>()? as usize;
        let mut payload = vec![0u8; length];
        cursor.read_exact(&mut payload).map_err(AafError::Io)?;
        let value = match StorageKind::from_u16(kind_raw) {
            Some(kind) => decode_value(kind, &payload)?,
            None => PropertyValue::Opaque(payload),
        };
        out.push(value);
    }
    Ok(out)
}

fn read_id_array(cursor: &mut Cursor<&[u8]>) -> Result<Vec<InstanceId>> {
    let count = cursor.read_u32::<BigEndian>()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(cursor.read_u64::<BigEndian>()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_properties_round_trip() {
        let props: Vec<(u16, PropertyValue)> = vec![
            (1, PropertyValue::Int32(-42)),
            (2, PropertyValue::String("Picture".to_string())),
            (3, PropertyValue::Rational { numerator: 30000, denominator: 1001 }),
            (4, PropertyValue::Boolean(true)),
        ];
        let encoded = encode_properties(props.iter().map(|(p, v)| (*p, v))).unwrap();
        let decoded = decode_properties(&encoded).unwrap();
        assert_eq!(decoded, props);
    }

    #[test]
    fn strong_ref_array_round_trips() {
        let value = PropertyValue::StrongRefArray(vec![10, 11, 12]);
        let encoded = encode_property(0x0101, &value).unwrap();
        let decoded = decode_properties(&encoded).unwrap();
        assert_eq!(decoded, vec![(0x0101, value)]);
    }

    #[test]
    fn record_with_nested_members_round_trips() {
        let type_id = Auid::from_be_bytes([7; 16]);
        let value = PropertyValue::Record {
            type_id,
            members: vec![PropertyValue::UInt32(7), PropertyValue::String("x".to_string())],
        };
        let encoded = encode_property(9, &value).unwrap();
        let decoded = decode_properties(&encoded).unwrap();
        assert_eq!(decoded, vec![(9, value)]);
    }

    #[test]
    fn unknown_storage_kind_round_trips_as_opaque() {
        let mut bytes = Vec::new();
        bytes.write_u16::<BigEndian>(5).unwrap();
        bytes.write_u16::<BigEndian>(999).unwrap();
        bytes.write_u16::<BigEndian>(3).unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);

        let decoded = decode_properties(&bytes).unwrap();
        assert_eq!(decoded, vec![(5, PropertyValue::Opaque(vec![1, 2, 3]))]);
    }

    #[test]
    fn oversized_value_without_aux_resolver_errors() {
        let value = PropertyValue::Opaque(vec![0u8; AUX_STREAM_SENTINEL as usize]);
        assert!(encode_property(1, &value).is_err());
    }

    #[test]
    fn oversized_value_spills_into_auxiliary_stream() {
        let value = PropertyValue::Opaque(vec![0xab; AUX_STREAM_SENTINEL as usize + 16]);
        let mut aux: Vec<(u16, Vec<u8>)> = Vec::new();
        let encoded = encode_property_with_aux(7, &value, &mut |pid, data| {
            aux.push((pid, data));
            Ok(())
        })
        .unwrap();

        // No inline payload beyond the 6-byte tuple header: the value moved
        // entirely to the auxiliary stream.
        assert_eq!(encoded.len(), 6);
        assert_eq!(aux.len(), 1);
        assert_eq!(aux[0].0, 7);

        let decoded = decode_properties_with_aux(&encoded, &mut |pid| {
            Ok(aux.iter().find(|(p, _)| *p == pid).unwrap().1.clone())
        })
        .unwrap();
        assert_eq!(decoded, vec![(7, value)]);
    }

    #[test]
    fn mob_id_round_trips_through_bytes_le() {
        use aaf_core::random::OsRandomSource;
        let mut rng = OsRandomSource;
        let mob_id = MobID::new(&mut rng);
        let value = PropertyValue::MobId(mob_id);
        let encoded = encode_property(1, &value).unwrap();
        let decoded = decode_properties(&encoded).unwrap();
        assert_eq!(decoded, vec![(1, value)]);
    }
}
