//! The metadata object model (spec §4.3, C3): typed objects with an
//! insertion-ordered property bag, plus the arena that gives every
//! strong/weak reference an id to point at instead of a pointer (spec §9
//! "Cyclic or back-edge references").
//!
//! Ownership lives entirely in `Arena`, not in `Object` itself: an object
//! doesn't know its parent, it only knows its own properties. The arena
//! records, per instance, *how* it is attached (a scalar property, a slot in
//! a variable array, a keyed slot in a set) so detach can undo exactly that
//! one edge without the object needing to carry a back-pointer.

use std::collections::HashMap;

use crate::errors::{AafError, Result};
use crate::ids::Auid;
use crate::value::{InstanceId, PropertyValue};

/// An insertion-ordered map from property tag to value (spec §9 "Dynamic
/// properties": "a small insertion-ordered map keyed by pid").
#[derive(Clone, Debug, Default)]
pub struct PropertyBag(Vec<(u16, PropertyValue)>);

impl PropertyBag {
    pub fn get(&self, pid: u16) -> Option<&PropertyValue> {
        self.0.iter().find(|(p, _)| *p == pid).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, pid: u16) -> Option<&mut PropertyValue> {
        self.0.iter_mut().find(|(p, _)| *p == pid).map(|(_, v)| v)
    }

    pub fn set(&mut self, pid: u16, value: PropertyValue) {
        if let Some(slot) = self.0.iter_mut().find(|(p, _)| *p == pid) {
            slot.1 = value;
        } else {
            self.0.push((pid, value));
        }
    }

    pub fn has(&self, pid: u16) -> bool {
        self.0.iter().any(|(p, _)| *p == pid)
    }

    pub fn remove(&mut self, pid: u16) -> Option<PropertyValue> {
        let pos = self.0.iter().position(|(p, _)| *p == pid)?;
        Some(self.0.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &PropertyValue)> {
        self.0.iter().map(|(p, v)| (*p, v))
    }
}

/// A typed metadata object: an instance id, its class, and its properties
/// (spec §3 "Object: (instance_id, class_id, parent, property_map)" — the
/// `parent` lives in `Arena`, not here).
#[derive(Clone, Debug)]
pub struct Object {
    instance_id: InstanceId,
    class_id: Auid,
    properties: PropertyBag,
}

impl Object {
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn class_id(&self) -> Auid {
        self.class_id
    }

    pub fn get(&self, pid: u16) -> Option<&PropertyValue> {
        self.properties.get(pid)
    }

    pub fn set(&mut self, pid: u16, value: PropertyValue) {
        self.properties.set(pid, value)
    }

    pub fn has(&self, pid: u16) -> bool {
        self.properties.has(pid)
    }

    pub fn remove(&mut self, pid: u16) -> Option<PropertyValue> {
        self.properties.remove(pid)
    }

    pub fn iter_props(&self) -> impl Iterator<Item = (u16, &PropertyValue)> {
        self.properties.iter()
    }
}

/// How an instance is currently attached to its parent — enough to undo the
/// edge on detach without scanning every property of the parent.
#[derive(Clone, Debug)]
enum Attachment {
    Scalar(u16),
    Array(u16),
    Set(u16, Vec<u8>),
}

struct ObjectNode {
    object: Object,
    attachment: Option<(InstanceId, Attachment)>,
}

/// Arena of live objects, keyed by instance id. All strong and weak
/// references are ids into this arena; ownership is tracked out-of-band in
/// `ObjectNode::attachment`, never as a pointer on `Object` itself.
#[derive(Default)]
pub struct Arena {
    next_id: InstanceId,
    nodes: HashMap<InstanceId, ObjectNode>,
    root: Option<InstanceId>,
    /// Side index from (owner, pid) to a set property's key → member, so
    /// `set_insert` can detect and replace a duplicate key in O(1) (spec
    /// §4.5 "ReferencedProperties side table").
    key_index: HashMap<(InstanceId, u16), HashMap<Vec<u8>, InstanceId>>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    /// Creates a new, unattached object of the given class.
    pub fn create(&mut self, class_id: Auid) -> InstanceId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            ObjectNode {
                object: Object { instance_id: id, class_id, properties: PropertyBag::default() },
                attachment: None,
            },
        );
        id
    }

    /// Marks `id` as the file's root object. The root has no parent and is
    /// always considered attached.
    pub fn set_root(&mut self, id: InstanceId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<InstanceId> {
        self.root
    }

    pub fn object(&self, id: InstanceId) -> Option<&Object> {
        self.nodes.get(&id).map(|n| &n.object)
    }

    pub fn object_mut(&mut self, id: InstanceId) -> Option<&mut Object> {
        self.nodes.get_mut(&id).map(|n| &mut n.object)
    }

    fn node(&self, id: InstanceId) -> Result<&ObjectNode> {
        self.nodes.get(&id).ok_or_else(|| AafError::not_found(format!("no object #{id}")))
    }

    fn node_mut(&mut self, id: InstanceId) -> Result<&mut ObjectNode> {
        self.nodes.get_mut(&id).ok_or_else(|| AafError::not_found(format!("no object #{id}")))
    }

    /// Whether `id` is reachable from the root by following attachment edges
    /// (spec §8 "CFB path invariant" is built on top of this). A detached
    /// ancestor breaks reachability for every descendant still pointing at
    /// it — this is what gives detach its recursive effect without actually
    /// walking the subtree (spec §8 "Detach recursion").
    pub fn is_attached(&self, id: InstanceId) -> bool {
        let Some(root) = self.root else { return false };
        if id == root {
            return true;
        }
        let mut current = id;
        let mut guard = 0usize;
        loop {
            let Some(node) = self.nodes.get(&current) else { return false };
            match &node.attachment {
                Some((parent, _)) => {
                    if *parent == root {
                        return true;
                    }
                    current = *parent;
                }
                None => return false,
            }
            guard += 1;
            if guard > self.nodes.len() + 1 {
                return false;
            }
        }
    }

    fn ensure_unattached(&self, child: InstanceId) -> Result<()> {
        if self.node(child)?.attachment.is_some() {
            return Err(AafError::AttachError {
                reason: format!("object #{child} is already attached"),
            });
        }
        Ok(())
    }

    /// Attaches `child` under `parent`'s scalar strong-ref property `pid`.
    pub fn attach_scalar(&mut self, parent: InstanceId, pid: u16, child: InstanceId) -> Result<()> {
        self.ensure_unattached(child)?;
        self.node_mut(parent)?.object.set(pid, PropertyValue::StrongRef(child));
        self.node_mut(child)?.attachment = Some((parent, Attachment::Scalar(pid)));
        Ok(())
    }

    /// Appends `child` to `parent`'s variable-array property `pid`.
    pub fn append(&mut self, parent: InstanceId, pid: u16, child: InstanceId) -> Result<()> {
        self.ensure_unattached(child)?;
        let parent_node = self.node_mut(parent)?;
        let ids = array_ids_mut(&mut parent_node.object, pid);
        ids.push(child);
        self.node_mut(child)?.attachment = Some((parent, Attachment::Array(pid)));
        Ok(())
    }

    /// Inserts `child` at `index` in `parent`'s variable-array property `pid`.
    pub fn insert_at(
        &mut self,
        parent: InstanceId,
        pid: u16,
        index: usize,
        child: InstanceId,
    ) -> Result<()> {
        self.ensure_unattached(child)?;
        let parent_node = self.node_mut(parent)?;
        let ids = array_ids_mut(&mut parent_node.object, pid);
        if index > ids.len() {
            return Err(AafError::not_found(format!("array index {index} out of bounds")));
        }
        ids.insert(index, child);
        self.node_mut(child)?.attachment = Some((parent, Attachment::Array(pid)));
        Ok(())
    }

    /// Removes and detaches the element at `index` (Python-style negative
    /// indexing, matching `slot.segment['Components'].pop(-1)` in the
    /// fixture this is ported from).
    pub fn pop_at(&mut self, parent: InstanceId, pid: u16, index: i64) -> Result<InstanceId> {
        let parent_node = self.node_mut(parent)?;
        let ids = array_ids_mut(&mut parent_node.object, pid);
        let len = ids.len() as i64;
        let real_index = if index < 0 { len + index } else { index };
        if real_index < 0 || real_index >= len {
            return Err(AafError::not_found(format!("array index {index} out of bounds")));
        }
        let child = ids.remove(real_index as usize);
        self.node_mut(child)?.attachment = None;
        Ok(child)
    }

    pub fn array_len(&self, parent: InstanceId, pid: u16) -> usize {
        self.object(parent).and_then(|o| array_ids(o, pid)).map(|ids| ids.len()).unwrap_or(0)
    }

    /// Inserts `child` under key `key` in `parent`'s set property `pid`.
    /// A pre-existing member under the same key is detached and returned
    /// (spec §4.3 "insertion with a duplicate key replaces").
    pub fn set_insert(
        &mut self,
        parent: InstanceId,
        pid: u16,
        key: Vec<u8>,
        child: InstanceId,
    ) -> Result<Option<InstanceId>> {
        self.ensure_unattached(child)?;

        let replaced = self
            .key_index
            .get(&(parent, pid))
            .and_then(|index| index.get(&key))
            .copied();
        if let Some(old) = replaced {
            self.detach(old)?;
        }

        let parent_node = self.node_mut(parent)?;
        let ids = array_ids_mut(&mut parent_node.object, pid);
        ids.push(child);

        self.key_index.entry((parent, pid)).or_default().insert(key.clone(), child);
        self.node_mut(child)?.attachment = Some((parent, Attachment::Set(pid, key)));
        Ok(replaced)
    }

    /// Removes and detaches the member under `key` from `parent`'s set
    /// property `pid`.
    pub fn set_pop(&mut self, parent: InstanceId, pid: u16, key: &[u8]) -> Result<InstanceId> {
        let child = self
            .key_index
            .get(&(parent, pid))
            .and_then(|index| index.get(key))
            .copied()
            .ok_or_else(|| AafError::not_found("no set member under that key"))?;
        self.detach(child)?;
        Ok(child)
    }

    pub fn set_len(&self, parent: InstanceId, pid: u16) -> usize {
        self.key_index.get(&(parent, pid)).map(|index| index.len()).unwrap_or(0)
    }

    /// Detaches `id` from whatever single strong-ref edge currently holds
    /// it. A no-op if `id` is not attached (spec §4.3).
    pub fn detach(&mut self, id: InstanceId) -> Result<()> {
        let attachment = match self.node_mut(id)?.attachment.take() {
            Some(a) => a,
            None => return Ok(()),
        };
        let (parent, how) = attachment;
        match how {
            Attachment::Scalar(pid) => {
                self.node_mut(parent)?.object.remove(pid);
            }
            Attachment::Array(pid) => {
                let parent_node = self.node_mut(parent)?;
                let ids = array_ids_mut(&mut parent_node.object, pid);
                ids.retain(|&x| x != id);
            }
            Attachment::Set(pid, key) => {
                let parent_node = self.node_mut(parent)?;
                let ids = array_ids_mut(&mut parent_node.object, pid);
                ids.retain(|&x| x != id);
                if let Some(index) = self.key_index.get_mut(&(parent, pid)) {
                    index.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Resolves a weak reference. Returns `None` rather than erroring — spec
    /// §7 has the caller decide what an `UnresolvedReference` means.
    pub fn resolve_weak(&self, id: InstanceId) -> Option<&Object> {
        self.object(id)
    }
}

fn array_ids(object: &Object, pid: u16) -> Option<&Vec<InstanceId>> {
    match object.get(pid)? {
        PropertyValue::StrongRefArray(ids)
        | PropertyValue::StrongRefSet(ids)
        | PropertyValue::WeakRefArray(ids)
        | PropertyValue::WeakRefSet(ids) => Some(ids),
        _ => None,
    }
}

fn array_ids_mut(object: &mut Object, pid: u16) -> &mut Vec<InstanceId> {
    if !matches!(object.get(pid), Some(PropertyValue::StrongRefArray(_))) {
        object.set(pid, PropertyValue::StrongRefArray(Vec::new()));
    }
    match object.get_mut_for_array(pid) {
        PropertyValue::StrongRefArray(ids) => ids,
        _ => unreachable!("just ensured StrongRefArray above"),
    }
}

impl Object {
    fn get_mut_for_array(&mut self, pid: u16) -> &mut PropertyValue {
        self.properties.get_mut(pid).expect("array property just inserted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::class_id;

    #[test]
    fn scalar_attach_enforces_single_owner() {
        let mut arena = Arena::new();
        let root = arena.create(class_id::HEADER);
        arena.set_root(root);
        let dict = arena.create(class_id::DICTIONARY);

        arena.attach_scalar(root, 3, dict).unwrap();
        assert!(arena.is_attached(dict));

        let err = arena.attach_scalar(root, 4, dict).unwrap_err();
        assert!(matches!(err, AafError::AttachError { .. }));
    }

    #[test]
    fn append_and_pop_match_fixture_semantics() {
        let mut arena = Arena::new();
        let root = arena.create(class_id::SEQUENCE);
        arena.set_root(root);

        let mut ids = Vec::new();
        for _ in 0..10 {
            let filler = arena.create(class_id::FILLER);
            arena.append(root, 1, filler).unwrap();
            ids.push(filler);
        }
        assert_eq!(arena.array_len(root, 1), 10);

        let last = arena.pop_at(root, 1, -1).unwrap();
        assert_eq!(last, ids[9]);
        assert_eq!(arena.array_len(root, 1), 9);

        let first = arena.pop_at(root, 1, 0).unwrap();
        assert_eq!(first, ids[0]);
        assert_eq!(arena.array_len(root, 1), 8);

        assert!(!arena.is_attached(first));
        assert!(!arena.is_attached(last));
    }

    #[test]
    fn detach_recursively_breaks_descendant_reachability() {
        let mut arena = Arena::new();
        let root = arena.create(class_id::CONTENT_STORAGE);
        arena.set_root(root);

        let mob = arena.create(class_id::MASTER_MOB);
        arena.set_insert(root, 1, b"mob-key".to_vec(), mob).unwrap();

        let slot = arena.create(class_id::TIMELINE_MOB_SLOT);
        arena.attach_scalar(mob, 3, slot).unwrap();

        let seq = arena.create(class_id::SEQUENCE);
        arena.attach_scalar(slot, 3, seq).unwrap();

        let filler = arena.create(class_id::FILLER);
        arena.append(seq, 1, filler).unwrap();

        assert!(arena.is_attached(filler));

        arena.set_pop(root, 1, b"mob-key").unwrap();

        assert!(!arena.is_attached(mob));
        assert!(!arena.is_attached(slot));
        assert!(!arena.is_attached(seq));
        assert!(!arena.is_attached(filler));
    }

    #[test]
    fn set_insert_with_duplicate_key_replaces() {
        let mut arena = Arena::new();
        let root = arena.create(class_id::DICTIONARY);
        arena.set_root(root);

        let first = arena.create(class_id::DATA_DEF);
        let second = arena.create(class_id::DATA_DEF);

        arena.set_insert(root, 1, b"picture".to_vec(), first).unwrap();
        let replaced = arena.set_insert(root, 1, b"picture".to_vec(), second).unwrap();

        assert_eq!(replaced, Some(first));
        assert!(!arena.is_attached(first));
        assert!(arena.is_attached(second));
        assert_eq!(arena.set_len(root, 1), 1);
    }

    #[test]
    fn re_attaching_an_already_attached_object_is_an_attach_error() {
        let mut arena = Arena::new();
        let root = arena.create(class_id::CONTENT_STORAGE);
        arena.set_root(root);
        let mob = arena.create(class_id::MASTER_MOB);

        arena.set_insert(root, 1, b"m".to_vec(), mob).unwrap();
        let err = arena.set_insert(root, 1, b"m2".to_vec(), mob).unwrap_err();
        assert!(matches!(err, AafError::AttachError { .. }));
    }

    #[test]
    fn detaching_a_non_attached_object_is_a_no_op() {
        let mut arena = Arena::new();
        let obj = arena.create(class_id::FILLER);
        arena.detach(obj).unwrap();
        assert!(!arena.is_attached(obj));
    }
}
