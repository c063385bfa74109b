//! Mob graph builders (spec §4.3, §8 scenarios 2-3): small helpers over
//! `Arena` that assemble a `MasterMob`/`TimelineMobSlot`/`Sequence` tree
//! using the baseline class pids, the way a caller building up a document
//! in memory would.
//!
//! Grounded in `original_source/tests/test_attach.py` and
//! `original_source/tests/test_mobid.py`: the attach/detach and MobID
//! semantics they exercise are already implemented on `Arena`/`MobID`
//! directly; these builders just wire the baseline `Mob`/`MobSlot`/
//! `Sequence`/`Filler` classes together the way those fixtures construct
//! their test graphs.

use aaf_core::clock::Clock;
use aaf_core::dictionary::class_id;
use aaf_core::errors::Result;
use aaf_core::ids::{Auid, MobID};
use aaf_core::object::Arena;
use aaf_core::random::RandomSource;
use aaf_core::value::{InstanceId, PropertyValue};

const PID_CONTENT_STORAGE_MOBS: u16 = 0x0001;
const PID_MOB_ID: u16 = 0x0001;
const PID_MOB_NAME: u16 = 0x0002;
const PID_MOB_SLOTS: u16 = 0x0003;
const PID_MOB_LAST_MODIFIED: u16 = 0x0004;
const PID_MOB_CREATION_TIME: u16 = 0x0005;
const PID_SLOT_ID: u16 = 0x0001;
const PID_SLOT_SEGMENT: u16 = 0x0003;
const PID_SLOT_DATADEF: u16 = 0x0004;
const PID_TIMELINE_SLOT_EDIT_RATE: u16 = 0x0101;
const PID_COMPONENT_DATADEF: u16 = 0x0001;
const PID_SEGMENT_LENGTH: u16 = 0x0002;
const PID_SEQUENCE_COMPONENTS: u16 = 0x0101;

/// The key a `Mob` is indexed under in `ContentStorage`'s `Mobs` set: its
/// MobID's big-endian byte form (spec §4.3 "set keys are the member's
/// natural identity, not an arbitrary label").
pub fn mob_key(mob_id: &MobID) -> Vec<u8> {
    mob_id.as_bytes_be().to_vec()
}

/// Creates a detached `MasterMob` with a fresh `MobID`, a name, and
/// creation/modification timestamps from `clock` (spec §8 scenario 2).
pub fn create_master_mob(
    arena: &mut Arena,
    rng: &mut dyn RandomSource,
    clock: &dyn Clock,
    name: &str,
) -> (InstanceId, MobID) {
    let mob_id = MobID::new(rng);
    let id = arena.create(class_id::MASTER_MOB);
    let now = clock.now_micros();
    let obj = arena.object_mut(id).expect("just created");
    obj.set(PID_MOB_ID, PropertyValue::MobId(mob_id));
    obj.set(PID_MOB_NAME, PropertyValue::String(name.to_string()));
    obj.set(PID_MOB_LAST_MODIFIED, PropertyValue::Int64(now));
    obj.set(PID_MOB_CREATION_TIME, PropertyValue::Int64(now));
    (id, mob_id)
}

/// Adds `mob` to `content_storage`'s `Mobs` set, keyed by its `MobID`. Fails
/// with an attach error if `mob` is already attached anywhere, including a
/// prior call to this function (spec §8 scenario 2: "attaching an
/// already-attached mob is an AttachError, not a silent replace").
pub fn add_mob(
    arena: &mut Arena,
    content_storage: InstanceId,
    mob: InstanceId,
    mob_id: &MobID,
) -> Result<()> {
    arena.set_insert(content_storage, PID_CONTENT_STORAGE_MOBS, mob_key(mob_id), mob)?;
    Ok(())
}

/// Detaches and returns the mob stored under `mob_id` in `content_storage`.
pub fn remove_mob(
    arena: &mut Arena,
    content_storage: InstanceId,
    mob_id: &MobID,
) -> Result<InstanceId> {
    arena.set_pop(content_storage, PID_CONTENT_STORAGE_MOBS, &mob_key(mob_id))
}

/// Creates a `TimelineMobSlot` and appends it to `mob`'s `Slots` array.
pub fn create_timeline_slot(
    arena: &mut Arena,
    mob: InstanceId,
    slot_id: u32,
    edit_rate: (i32, i32),
    data_def: Auid,
) -> Result<InstanceId> {
    let slot = arena.create(class_id::TIMELINE_MOB_SLOT);
    {
        let obj = arena.object_mut(slot).expect("just created");
        obj.set(PID_SLOT_ID, PropertyValue::UInt32(slot_id));
        obj.set(PID_SLOT_DATADEF, PropertyValue::Auid(data_def));
        obj.set(
            PID_TIMELINE_SLOT_EDIT_RATE,
            PropertyValue::Rational { numerator: edit_rate.0, denominator: edit_rate.1 },
        );
    }
    arena.append(mob, PID_MOB_SLOTS, slot)?;
    Ok(slot)
}

/// Creates a `Sequence` and attaches it as `slot`'s `Segment`.
pub fn create_sequence(arena: &mut Arena, slot: InstanceId, data_def: Auid) -> Result<InstanceId> {
    let sequence = arena.create(class_id::SEQUENCE);
    arena
        .object_mut(sequence)
        .expect("just created")
        .set(PID_COMPONENT_DATADEF, PropertyValue::Auid(data_def));
    arena.attach_scalar(slot, PID_SLOT_SEGMENT, sequence)?;
    Ok(sequence)
}

/// Creates a `Filler` of the given `length` and appends it to `sequence`'s
/// `Components` array (spec §8 scenario 3: ten fillers, lengths `0..10`).
pub fn append_filler(
    arena: &mut Arena,
    sequence: InstanceId,
    length: i64,
    data_def: Auid,
) -> Result<InstanceId> {
    let filler = arena.create(class_id::FILLER);
    {
        let obj = arena.object_mut(filler).expect("just created");
        obj.set(PID_COMPONENT_DATADEF, PropertyValue::Auid(data_def));
        obj.set(PID_SEGMENT_LENGTH, PropertyValue::Int64(length));
    }
    arena.append(sequence, PID_SEQUENCE_COMPONENTS, filler)?;
    Ok(filler)
}

/// Reads a component's `Length` property, if present.
pub fn component_length(arena: &Arena, component: InstanceId) -> Option<i64> {
    match arena.object(component)?.get(PID_SEGMENT_LENGTH)? {
        PropertyValue::Int64(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aaf_core::clock::SystemClock;
    use aaf_core::dictionary::datadef_id;
    use aaf_core::random::OsRandomSource;

    #[test]
    fn double_attach_of_same_mob_is_an_attach_error() {
        let mut arena = Arena::new();
        let mut rng = OsRandomSource;
        let clock = SystemClock;

        let storage_a = arena.create(class_id::CONTENT_STORAGE);
        let storage_b = arena.create(class_id::CONTENT_STORAGE);
        let (mob, mob_id) = create_master_mob(&mut arena, &mut rng, &clock, "Reel 1");

        add_mob(&mut arena, storage_a, mob, &mob_id).unwrap();
        let err = add_mob(&mut arena, storage_b, mob, &mob_id).unwrap_err();
        assert!(matches!(err, aaf_core::errors::AafError::AttachError { .. }));
    }

    #[test]
    fn remove_then_readd_mob_succeeds() {
        let mut arena = Arena::new();
        let mut rng = OsRandomSource;
        let clock = SystemClock;

        let storage = arena.create(class_id::CONTENT_STORAGE);
        let (mob, mob_id) = create_master_mob(&mut arena, &mut rng, &clock, "Reel 1");
        add_mob(&mut arena, storage, mob, &mob_id).unwrap();

        let removed = remove_mob(&mut arena, storage, &mob_id).unwrap();
        assert_eq!(removed, mob);
        assert_eq!(arena.set_len(storage, PID_CONTENT_STORAGE_MOBS), 0);

        add_mob(&mut arena, storage, mob, &mob_id).unwrap();
        assert_eq!(arena.set_len(storage, PID_CONTENT_STORAGE_MOBS), 1);
    }

    #[test]
    fn ten_fillers_pop_last_then_first_leaves_expected_lengths() {
        let mut arena = Arena::new();
        let mut rng = OsRandomSource;
        let clock = SystemClock;

        let (mob, _mob_id) = create_master_mob(&mut arena, &mut rng, &clock, "Reel 1");
        let slot =
            create_timeline_slot(&mut arena, mob, 1, (25, 1), datadef_id::PICTURE).unwrap();
        let sequence = create_sequence(&mut arena, slot, datadef_id::PICTURE).unwrap();

        let mut fillers = Vec::new();
        for i in 0..10i64 {
            fillers.push(append_filler(&mut arena, sequence, i, datadef_id::PICTURE).unwrap());
        }
        assert_eq!(arena.array_len(sequence, PID_SEQUENCE_COMPONENTS), 10);

        let last = arena.pop_at(sequence, PID_SEQUENCE_COMPONENTS, -1).unwrap();
        assert_eq!(component_length(&arena, last), Some(9));

        let first = arena.pop_at(sequence, PID_SEQUENCE_COMPONENTS, 0).unwrap();
        assert_eq!(component_length(&arena, first), Some(0));

        assert_eq!(arena.array_len(sequence, PID_SEQUENCE_COMPONENTS), 8);
        let remaining_lengths: Vec<i64> = (0..8)
            .map(|i| {
                let id = {
                    let obj = arena.object(sequence).unwrap();
                    match obj.get(PID_SEQUENCE_COMPONENTS) {
                        Some(PropertyValue::StrongRefArray(ids)) => ids[i],
                        _ => panic!("expected StrongRefArray"),
                    }
                };
                component_length(&arena, id).unwrap()
            })
            .collect();
        assert_eq!(remaining_lengths, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        arena.detach(first).unwrap();
        let _ = arena.is_attached(first);
        assert!(!arena.is_attached(first));
    }
}
