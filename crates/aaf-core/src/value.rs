//! Typed property values and their on-wire storage kinds (spec §4.2, C2).
//!
//! `PropertyValue` is the in-memory form every property codec round-trips
//! through; `StorageKind` is the tag persisted alongside it in the
//! `properties` stream (spec §4.5) so an unknown reader can at least skip a
//! value it doesn't understand.

use std::fmt;

use crate::ids::{Auid, MobID};

/// Arena key for an attached object, used by strong/weak reference values.
/// See `crate::object::Arena`.
pub type InstanceId = u64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
pub enum StorageKind {
    Opaque = 0,
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Int64 = 7,
    UInt64 = 8,
    Boolean = 9,
    Enum = 10,
    String = 11,
    Auid = 12,
    MobId = 13,
    Rational = 14,
    Record = 15,
    FixedArray = 16,
    VariableArray = 17,
    StrongRef = 18,
    StrongRefArray = 19,
    StrongRefSet = 20,
    WeakRef = 21,
    WeakRefArray = 22,
    WeakRefSet = 23,
}

impl StorageKind {
    pub fn from_u16(raw: u16) -> Option<Self> {
        use StorageKind::*;
        Some(match raw {
            0 => Opaque,
            1 => Int8,
            2 => UInt8,
            3 => Int16,
            4 => UInt16,
            5 => Int32,
            6 => UInt32,
            7 => Int64,
            8 => UInt64,
            9 => Boolean,
            10 => Enum,
            11 => String,
            12 => Auid,
            13 => MobId,
            14 => Rational,
            15 => Record,
            16 => FixedArray,
            17 => VariableArray,
            18 => StrongRef,
            19 => StrongRefArray,
            20 => StrongRefSet,
            21 => WeakRef,
            22 => WeakRefArray,
            23 => WeakRefSet,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Boolean(bool),
    /// An enum's underlying integer, typed by a `type_id` resolved against
    /// the dictionary's type table.
    Enum { type_id: Auid, value: i64 },
    String(String),
    Auid(Auid),
    MobId(MobID),
    Rational { numerator: i32, denominator: i32 },
    /// A struct-like value, members in declaration order.
    Record { type_id: Auid, members: Vec<PropertyValue> },
    FixedArray { type_id: Auid, elements: Vec<PropertyValue> },
    VariableArray { type_id: Auid, elements: Vec<PropertyValue> },
    StrongRef(InstanceId),
    StrongRefArray(Vec<InstanceId>),
    StrongRefSet(Vec<InstanceId>),
    WeakRef(InstanceId),
    WeakRefArray(Vec<InstanceId>),
    WeakRefSet(Vec<InstanceId>),
    /// An unrecognized `type_id`'s raw bytes, preserved verbatim.
    Opaque(Vec<u8>),
}

impl PropertyValue {
    pub fn storage_kind(&self) -> StorageKind {
        use PropertyValue::*;
        match self {
            Int8(_) => StorageKind::Int8,
            UInt8(_) => StorageKind::UInt8,
            Int16(_) => StorageKind::Int16,
            UInt16(_) => StorageKind::UInt16,
            Int32(_) => StorageKind::Int32,
            UInt32(_) => StorageKind::UInt32,
            Int64(_) => StorageKind::Int64,
            UInt64(_) => StorageKind::UInt64,
            Boolean(_) => StorageKind::Boolean,
            Enum { .. } => StorageKind::Enum,
            String(_) => StorageKind::String,
            Auid(_) => StorageKind::Auid,
            MobId(_) => StorageKind::MobId,
            Rational { .. } => StorageKind::Rational,
            Record { .. } => StorageKind::Record,
            FixedArray { .. } => StorageKind::FixedArray,
            VariableArray { .. } => StorageKind::VariableArray,
            StrongRef(_) => StorageKind::StrongRef,
            StrongRefArray(_) => StorageKind::StrongRefArray,
            StrongRefSet(_) => StorageKind::StrongRefSet,
            WeakRef(_) => StorageKind::WeakRef,
            WeakRefArray(_) => StorageKind::WeakRefArray,
            WeakRefSet(_) => StorageKind::WeakRefSet,
            Opaque(_) => StorageKind::Opaque,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int8(v) => Some(*v as i64),
            PropertyValue::Int16(v) => Some(*v as i64),
            PropertyValue::Int32(v) => Some(*v as i64),
            PropertyValue::Int64(v) => Some(*v),
            PropertyValue::UInt8(v) => Some(*v as i64),
            PropertyValue::UInt16(v) => Some(*v as i64),
            PropertyValue::UInt32(v) => Some(*v as i64),
            PropertyValue::Enum { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Human-readable rendering used by the dump routine (spec §6, "property
/// dumps are implementation-defined"). Composite values render their shape,
/// not their resolved graph — `dump()` walks the graph separately.
impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int8(v) => write!(f, "{v}"),
            PropertyValue::UInt8(v) => write!(f, "{v}"),
            PropertyValue::Int16(v) => write!(f, "{v}"),
            PropertyValue::UInt16(v) => write!(f, "{v}"),
            PropertyValue::Int32(v) => write!(f, "{v}"),
            PropertyValue::UInt32(v) => write!(f, "{v}"),
            PropertyValue::Int64(v) => write!(f, "{v}"),
            PropertyValue::UInt64(v) => write!(f, "{v}"),
            PropertyValue::Boolean(v) => write!(f, "{v}"),
            PropertyValue::Enum { value, .. } => write!(f, "{value}"),
            PropertyValue::String(v) => write!(f, "{v:?}"),
            PropertyValue::Auid(v) => write!(f, "{v}"),
            PropertyValue::MobId(v) => write!(f, "{v}"),
            PropertyValue::Rational { numerator, denominator } => {
                write!(f, "{numerator}/{denominator}")
            }
            PropertyValue::Record { members, .. } => write!(f, "Record({})", members.len()),
            PropertyValue::FixedArray { elements, .. } => write!(f, "FixedArray[{}]", elements.len()),
            PropertyValue::VariableArray { elements, .. } => {
                write!(f, "VariableArray[{}]", elements.len())
            }
            PropertyValue::StrongRef(id) => write!(f, "StrongRef(#{id})"),
            PropertyValue::StrongRefArray(ids) => write!(f, "StrongRefArray[{}]", ids.len()),
            PropertyValue::StrongRefSet(ids) => write!(f, "StrongRefSet[{}]", ids.len()),
            PropertyValue::WeakRef(id) => write!(f, "WeakRef(#{id})"),
            PropertyValue::WeakRefArray(ids) => write!(f, "WeakRefArray[{}]", ids.len()),
            PropertyValue::WeakRefSet(ids) => write!(f, "WeakRefSet[{}]", ids.len()),
            PropertyValue::Opaque(bytes) => write!(f, "Opaque({} bytes)", bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_kind_round_trips_through_u16() {
        let kinds = [
            StorageKind::Opaque,
            StorageKind::Int32,
            StorageKind::String,
            StorageKind::StrongRefSet,
            StorageKind::WeakRefArray,
        ];
        for kind in kinds {
            let raw = kind as u16;
            assert_eq!(StorageKind::from_u16(raw), Some(kind));
        }
    }

    #[test]
    fn unknown_storage_kind_is_none() {
        assert_eq!(StorageKind::from_u16(999), None);
    }

    #[test]
    fn display_renders_scalars_plainly() {
        assert_eq!(PropertyValue::Int32(-7).to_string(), "-7");
        assert_eq!(PropertyValue::Boolean(true).to_string(), "true");
        assert_eq!(
            PropertyValue::Rational { numerator: 30000, denominator: 1001 }.to_string(),
            "30000/1001"
        );
    }
}
