//! Class and type dictionary (spec §4.4, C4): registers class schemas by
//! AUID and ships the baseline DataDef/ContainerDef instance table every
//! AAF file's `Dictionary` object is seeded from.
//!
//! Grounded on `original_source/aaf2/dictionary.py`: the baseline class
//! hierarchy (`DefinitionObject` down to `Dictionary`) reuses the exact
//! class AUIDs that file hard-codes. Classes the distilled source didn't
//! carry (`Header`, mob classes, descriptor classes, …) continue the same
//! `0d010101-0101-XXYY-060e-2b3402060101` numbering the carried-over AUIDs
//! already follow — see DESIGN.md for the numbering table.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::errors::{AafError, Result};
use crate::ids::Auid;
use crate::value::StorageKind;

/// Builds a baseline-class AUID from its two-byte class code, following the
/// `0d010101-0101-XXYY-060e-2b3402060101` pattern every class AUID in
/// `original_source/aaf2/dictionary.py` uses.
const fn class_auid(code: u16) -> Auid {
    let [hi, lo] = code.to_be_bytes();
    Auid::from_be_bytes([
        0x0d, 0x01, 0x01, 0x01, 0x01, 0x01, hi, lo, 0x06, 0x0e, 0x2b, 0x34, 0x02, 0x06, 0x01, 0x01,
    ])
}

/// Builds a baseline DataDef instance AUID from its one-byte code.
const fn datadef_auid(code: u16) -> Auid {
    let [hi, lo] = code.to_be_bytes();
    Auid::from_be_bytes([
        0x01, 0x03, 0x02, 0x01, 0x01, 0x00, hi, lo, 0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x01,
    ])
}

/// Builds a baseline ContainerDef instance AUID from its one-byte code.
const fn containerdef_auid(code: u16) -> Auid {
    let [hi, lo] = code.to_be_bytes();
    Auid::from_be_bytes([
        0x01, 0x03, 0x03, 0x02, 0x01, 0x00, hi, lo, 0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x01,
    ])
}

pub mod class_id {
    use super::{class_auid, Auid};

    pub const DEFINITION_OBJECT: Auid = class_auid(0x1a);
    pub const DATA_DEF: Auid = class_auid(0x1b);
    pub const OPERATION_DEF: Auid = class_auid(0x1c);
    pub const PARAMETER_DEF: Auid = class_auid(0x1d);
    pub const PLUGIN_DEF: Auid = class_auid(0x1e);
    pub const CODEC_DEF: Auid = class_auid(0x1f);
    pub const CONTAINER_DEF: Auid = class_auid(0x20);
    pub const INTERPOLATION_DEF: Auid = class_auid(0x21);
    pub const DICTIONARY: Auid = class_auid(0x22);
    pub const HEADER: Auid = class_auid(0x23);
    pub const CONTENT_STORAGE: Auid = class_auid(0x24);
    pub const MOB: Auid = class_auid(0x25);
    pub const MASTER_MOB: Auid = class_auid(0x26);
    pub const SOURCE_MOB: Auid = class_auid(0x27);
    pub const COMPOSITION_MOB: Auid = class_auid(0x28);
    pub const MOB_SLOT: Auid = class_auid(0x29);
    pub const TIMELINE_MOB_SLOT: Auid = class_auid(0x2a);
    pub const STATIC_MOB_SLOT: Auid = class_auid(0x2b);
    pub const EVENT_MOB_SLOT: Auid = class_auid(0x2c);
    pub const COMPONENT: Auid = class_auid(0x2d);
    pub const SEGMENT: Auid = class_auid(0x2e);
    pub const SEQUENCE: Auid = class_auid(0x2f);
    pub const SOURCE_CLIP: Auid = class_auid(0x30);
    pub const FILLER: Auid = class_auid(0x31);
    pub const ESSENCE_GROUP: Auid = class_auid(0x32);
    pub const TIMECODE: Auid = class_auid(0x33);
    pub const ESSENCE_DESCRIPTOR: Auid = class_auid(0x34);
    pub const CDCI_DESCRIPTOR: Auid = class_auid(0x35);
    pub const RGBA_DESCRIPTOR: Auid = class_auid(0x36);
    pub const SOUND_DESCRIPTOR: Auid = class_auid(0x37);
    pub const PCM_DESCRIPTOR: Auid = class_auid(0x38);
    pub const MULTIPLE_DESCRIPTOR: Auid = class_auid(0x39);
    pub const TAPE_DESCRIPTOR: Auid = class_auid(0x3a);
    pub const IMPORT_DESCRIPTOR: Auid = class_auid(0x3b);
}

pub mod datadef_id {
    use super::{datadef_auid, Auid};

    pub const PICTURE: Auid = datadef_auid(1);
    pub const SOUND: Auid = datadef_auid(2);
    pub const TIMECODE: Auid = datadef_auid(3);
    pub const EDGECODE: Auid = datadef_auid(4);
    pub const MATTE: Auid = datadef_auid(5);
    pub const DESCRIPTIVE_METADATA: Auid = datadef_auid(6);
}

pub mod containerdef_id {
    use super::{containerdef_auid, Auid};

    pub const AAF_KLV_DATA: Auid = containerdef_auid(1);
    pub const EXTERNAL: Auid = containerdef_auid(2);
}

/// One property of a class schema (spec §4.4: "pid, name, type_id,
/// storage_kind, optional?").
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub pid: u16,
    pub name: &'static str,
    pub type_id: Auid,
    pub storage_kind: StorageKind,
    pub optional: bool,
}

impl PropertyDescriptor {
    pub const fn new(
        pid: u16,
        name: &'static str,
        type_id: Auid,
        storage_kind: StorageKind,
        optional: bool,
    ) -> Self {
        PropertyDescriptor { pid, name, type_id, storage_kind, optional }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassSchema {
    pub class_id: Auid,
    pub name: &'static str,
    pub parent: Option<Auid>,
    pub properties: Vec<PropertyDescriptor>,
}

impl ClassSchema {
    /// Looks up a property descriptor by pid, including inherited ones —
    /// callers pass `dict` so parent lookups can chain.
    pub fn property(&self, pid: u16) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.pid == pid)
    }

    pub fn property_by_name(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// The class and type registry (spec §4.4, C4).
#[derive(Debug, Default)]
pub struct Dictionary {
    classes: HashMap<Auid, ClassSchema>,
    datadefs: HashMap<Auid, (&'static str, &'static str)>,
    containerdefs: HashMap<Auid, (&'static str, &'static str)>,
}

impl Dictionary {
    /// An empty dictionary with no registered classes.
    pub fn empty() -> Self {
        Dictionary::default()
    }

    /// A dictionary seeded with the baseline class hierarchy and the
    /// standard DataDef/ContainerDef instance table (spec §4.4
    /// "Dictionary content").
    pub fn with_baseline() -> Self {
        let mut dict = Dictionary::default();
        for schema in baseline_classes().iter().cloned() {
            dict.register_class(schema).expect("baseline classes never conflict");
        }
        for (auid, name, desc) in BASELINE_DATADEFS.iter().copied() {
            dict.datadefs.insert(auid, (name, desc));
        }
        for (auid, name, desc) in BASELINE_CONTAINERDEFS.iter().copied() {
            dict.containerdefs.insert(auid, (name, desc));
        }
        dict
    }

    /// Registers a class schema. Idempotent when an identical schema is
    /// already registered under the same AUID; errors on conflict (spec
    /// §4.4 "Registry contract").
    pub fn register_class(&mut self, schema: ClassSchema) -> Result<()> {
        match self.classes.get(&schema.class_id) {
            Some(existing) if *existing == schema => Ok(()),
            Some(existing) => Err(AafError::bad_format(format!(
                "conflicting schema registered for class {}: existing '{}', new '{}'",
                schema.class_id, existing.name, schema.name
            ))),
            None => {
                self.classes.insert(schema.class_id, schema);
                Ok(())
            }
        }
    }

    pub fn class(&self, class_id: &Auid) -> Option<&ClassSchema> {
        self.classes.get(class_id)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassSchema> {
        self.classes.values()
    }

    pub fn datadef_name(&self, auid: &Auid) -> Option<&'static str> {
        self.datadefs.get(auid).map(|(name, _)| *name)
    }

    pub fn containerdef_name(&self, auid: &Auid) -> Option<&'static str> {
        self.containerdefs.get(auid).map(|(name, _)| *name)
    }

    pub fn datadefs(&self) -> impl Iterator<Item = (&Auid, &'static str, &'static str)> {
        self.datadefs.iter().map(|(auid, (name, desc))| (auid, *name, *desc))
    }

    pub fn containerdefs(&self) -> impl Iterator<Item = (&Auid, &'static str, &'static str)> {
        self.containerdefs.iter().map(|(auid, (name, desc))| (auid, *name, *desc))
    }
}

static BASELINE_DATADEFS: &[(Auid, &str, &str)] = &[
    (datadef_id::PICTURE, "Picture", "Picture essence"),
    (datadef_id::SOUND, "Sound", "Sound essence"),
    (datadef_id::TIMECODE, "Timecode", "Timecode essence"),
    (datadef_id::EDGECODE, "Edgecode", "Edgecode essence"),
    (datadef_id::MATTE, "Matte", "Matte essence"),
    (
        datadef_id::DESCRIPTIVE_METADATA,
        "DescriptiveMetadata",
        "Descriptive metadata essence",
    ),
];

static BASELINE_CONTAINERDEFS: &[(Auid, &str, &str)] = &[
    (containerdef_id::AAF_KLV_DATA, "AAFKLVData", "AAF KLV-encoded essence data"),
    (containerdef_id::EXTERNAL, "External", "Externally referenced essence"),
];

/// The baseline class schemas, built once and shared by every
/// `Dictionary::with_baseline()` call.
static BASELINE_CLASSES: Lazy<Vec<ClassSchema>> = Lazy::new(|| {
    use crate::value::StorageKind::*;
    let string_type = Auid::from_be_bytes([0; 16]);

    let definition_object = ClassSchema {
        class_id: class_id::DEFINITION_OBJECT,
        name: "DefinitionObject",
        parent: None,
        properties: vec![
            PropertyDescriptor::new(0x0001, "Identification", string_type, Auid, false),
            PropertyDescriptor::new(0x0002, "Name", string_type, String, false),
            PropertyDescriptor::new(0x0003, "Description", string_type, String, true),
        ],
    };

    let subclass = |code_auid: Auid, name: &'static str| ClassSchema {
        class_id: code_auid,
        name,
        parent: Some(class_id::DEFINITION_OBJECT),
        properties: vec![],
    };

    vec![
        definition_object,
        subclass(class_id::DATA_DEF, "DataDef"),
        subclass(class_id::OPERATION_DEF, "OperationDef"),
        subclass(class_id::PARAMETER_DEF, "ParameterDef"),
        subclass(class_id::PLUGIN_DEF, "PluginDef"),
        subclass(class_id::CODEC_DEF, "CodecDef"),
        subclass(class_id::CONTAINER_DEF, "ContainerDef"),
        subclass(class_id::INTERPOLATION_DEF, "InterpolationDef"),
        ClassSchema {
            class_id: class_id::DICTIONARY,
            name: "Dictionary",
            parent: None,
            properties: vec![
                PropertyDescriptor::new(0x0001, "DataDefinitions", string_type, StrongRefSet, false),
                PropertyDescriptor::new(0x0002, "ContainerDefinitions", string_type, StrongRefSet, false),
            ],
        },
        ClassSchema {
            class_id: class_id::HEADER,
            name: "Header",
            parent: None,
            properties: vec![
                PropertyDescriptor::new(0x0001, "ByteOrder", string_type, UInt16, false),
                PropertyDescriptor::new(0x0002, "LastModified", string_type, Int64, false),
                PropertyDescriptor::new(0x0003, "Dictionary", string_type, StrongRef, false),
                PropertyDescriptor::new(0x0004, "Content", string_type, StrongRef, false),
                PropertyDescriptor::new(0x0005, "Version", string_type, UInt32, false),
            ],
        },
        ClassSchema {
            class_id: class_id::CONTENT_STORAGE,
            name: "ContentStorage",
            parent: None,
            properties: vec![
                PropertyDescriptor::new(0x0001, "Mobs", string_type, StrongRefSet, false),
                PropertyDescriptor::new(0x0002, "EssenceData", string_type, StrongRefSet, true),
            ],
        },
        ClassSchema {
            class_id: class_id::MOB,
            name: "Mob",
            parent: None,
            properties: vec![
                PropertyDescriptor::new(0x0001, "MobID", string_type, MobId, false),
                PropertyDescriptor::new(0x0002, "Name", string_type, String, true),
                PropertyDescriptor::new(0x0003, "Slots", string_type, StrongRefArray, false),
                PropertyDescriptor::new(0x0004, "LastModified", string_type, Int64, false),
                PropertyDescriptor::new(0x0005, "CreationTime", string_type, Int64, false),
            ],
        },
        ClassSchema {
            class_id: class_id::MASTER_MOB,
            name: "MasterMob",
            parent: Some(class_id::MOB),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::SOURCE_MOB,
            name: "SourceMob",
            parent: Some(class_id::MOB),
            properties: vec![PropertyDescriptor::new(
                0x0101,
                "EssenceDescription",
                string_type,
                StrongRef,
                true,
            )],
        },
        ClassSchema {
            class_id: class_id::COMPOSITION_MOB,
            name: "CompositionMob",
            parent: Some(class_id::MOB),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::MOB_SLOT,
            name: "MobSlot",
            parent: None,
            properties: vec![
                PropertyDescriptor::new(0x0001, "SlotID", string_type, UInt32, false),
                PropertyDescriptor::new(0x0002, "Name", string_type, String, true),
                PropertyDescriptor::new(0x0003, "Segment", string_type, StrongRef, false),
                PropertyDescriptor::new(0x0004, "DataDef", string_type, Auid, false),
            ],
        },
        ClassSchema {
            class_id: class_id::TIMELINE_MOB_SLOT,
            name: "TimelineMobSlot",
            parent: Some(class_id::MOB_SLOT),
            properties: vec![PropertyDescriptor::new(
                0x0101,
                "EditRate",
                string_type,
                Rational,
                false,
            )],
        },
        ClassSchema {
            class_id: class_id::STATIC_MOB_SLOT,
            name: "StaticMobSlot",
            parent: Some(class_id::MOB_SLOT),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::EVENT_MOB_SLOT,
            name: "EventMobSlot",
            parent: Some(class_id::MOB_SLOT),
            properties: vec![PropertyDescriptor::new(
                0x0101,
                "EditRate",
                string_type,
                Rational,
                false,
            )],
        },
        ClassSchema {
            class_id: class_id::COMPONENT,
            name: "Component",
            parent: None,
            properties: vec![PropertyDescriptor::new(0x0001, "DataDef", string_type, Auid, false)],
        },
        ClassSchema {
            class_id: class_id::SEGMENT,
            name: "Segment",
            parent: Some(class_id::COMPONENT),
            properties: vec![PropertyDescriptor::new(0x0002, "Length", string_type, Int64, true)],
        },
        ClassSchema {
            class_id: class_id::SEQUENCE,
            name: "Sequence",
            parent: Some(class_id::SEGMENT),
            properties: vec![PropertyDescriptor::new(
                0x0101,
                "Components",
                string_type,
                StrongRefArray,
                false,
            )],
        },
        ClassSchema {
            class_id: class_id::SOURCE_CLIP,
            name: "SourceClip",
            parent: Some(class_id::SEGMENT),
            properties: vec![
                PropertyDescriptor::new(0x0101, "SourceID", string_type, MobId, false),
                PropertyDescriptor::new(0x0102, "SourceMobSlotID", string_type, UInt32, false),
                PropertyDescriptor::new(0x0103, "StartTime", string_type, Int64, false),
            ],
        },
        ClassSchema {
            class_id: class_id::FILLER,
            name: "Filler",
            parent: Some(class_id::SEGMENT),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::ESSENCE_GROUP,
            name: "EssenceGroup",
            parent: Some(class_id::SEGMENT),
            properties: vec![PropertyDescriptor::new(
                0x0101,
                "Choices",
                string_type,
                StrongRefArray,
                false,
            )],
        },
        ClassSchema {
            class_id: class_id::TIMECODE,
            name: "Timecode",
            parent: Some(class_id::SEGMENT),
            properties: vec![
                PropertyDescriptor::new(0x0101, "Start", string_type, UInt64, false),
                PropertyDescriptor::new(0x0102, "FPS", string_type, UInt16, false),
                PropertyDescriptor::new(0x0103, "Drop", string_type, Boolean, false),
            ],
        },
        ClassSchema {
            class_id: class_id::ESSENCE_DESCRIPTOR,
            name: "EssenceDescriptor",
            parent: None,
            properties: vec![PropertyDescriptor::new(
                0x0001,
                "Locator",
                string_type,
                StrongRefArray,
                true,
            )],
        },
        ClassSchema {
            class_id: class_id::CDCI_DESCRIPTOR,
            name: "CDCIDescriptor",
            parent: Some(class_id::ESSENCE_DESCRIPTOR),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::RGBA_DESCRIPTOR,
            name: "RGBADescriptor",
            parent: Some(class_id::ESSENCE_DESCRIPTOR),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::SOUND_DESCRIPTOR,
            name: "SoundDescriptor",
            parent: Some(class_id::ESSENCE_DESCRIPTOR),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::PCM_DESCRIPTOR,
            name: "PCMDescriptor",
            parent: Some(class_id::SOUND_DESCRIPTOR),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::MULTIPLE_DESCRIPTOR,
            name: "MultipleDescriptor",
            parent: Some(class_id::ESSENCE_DESCRIPTOR),
            properties: vec![PropertyDescriptor::new(
                0x0101,
                "FileDescriptors",
                string_type,
                StrongRefArray,
                false,
            )],
        },
        ClassSchema {
            class_id: class_id::TAPE_DESCRIPTOR,
            name: "TapeDescriptor",
            parent: Some(class_id::ESSENCE_DESCRIPTOR),
            properties: vec![],
        },
        ClassSchema {
            class_id: class_id::IMPORT_DESCRIPTOR,
            name: "ImportDescriptor",
            parent: Some(class_id::ESSENCE_DESCRIPTOR),
            properties: vec![],
        },
    ]
});

fn baseline_classes() -> &'static [ClassSchema] {
    &BASELINE_CLASSES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_dictionary_resolves_known_classes() {
        let dict = Dictionary::with_baseline();
        assert_eq!(dict.class(&class_id::MASTER_MOB).unwrap().name, "MasterMob");
        assert_eq!(dict.class(&class_id::SEQUENCE).unwrap().name, "Sequence");
        assert!(dict.class(&Auid::from_be_bytes([0xff; 16])).is_none());
    }

    #[test]
    fn baseline_datadefs_are_indexed_by_auid() {
        let dict = Dictionary::with_baseline();
        assert_eq!(dict.datadef_name(&datadef_id::PICTURE), Some("Picture"));
        assert_eq!(dict.containerdef_name(&containerdef_id::AAF_KLV_DATA), Some("AAFKLVData"));
    }

    #[test]
    fn register_class_is_idempotent_on_equal_schema() {
        let mut dict = Dictionary::empty();
        let schema = ClassSchema {
            class_id: class_id::FILLER,
            name: "Filler",
            parent: Some(class_id::SEGMENT),
            properties: vec![],
        };
        dict.register_class(schema.clone()).unwrap();
        dict.register_class(schema).unwrap();
        assert_eq!(dict.classes().count(), 1);
    }

    #[test]
    fn register_class_rejects_conflicting_schema() {
        let mut dict = Dictionary::empty();
        dict.register_class(ClassSchema {
            class_id: class_id::FILLER,
            name: "Filler",
            parent: None,
            properties: vec![],
        })
        .unwrap();
        let err = dict
            .register_class(ClassSchema {
                class_id: class_id::FILLER,
                name: "NotFiller",
                parent: None,
                properties: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, AafError::BadFormat { .. }));
    }
}
