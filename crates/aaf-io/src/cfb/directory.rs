use super::constants::*;
use aaf_core::errors::{AafError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::io::{Read, Write};

/// Object type for directory entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Unknown = 0,
    Storage = 1,
    Stream = 2,
    RootStorage = 5,
}

impl From<u8> for ObjectType {
    fn from(value: u8) -> Self {
        match value {
            1 => ObjectType::Storage,
            2 => ObjectType::Stream,
            5 => ObjectType::RootStorage,
            _ => ObjectType::Unknown,
        }
    }
}

impl From<ObjectType> for u8 {
    fn from(value: ObjectType) -> Self {
        value as u8
    }
}

/// Color flag for directory tree nodes — CFB's on-disk red-black tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFlag {
    Red = 0,
    Black = 1,
}

impl From<u8> for ColorFlag {
    fn from(value: u8) -> Self {
        match value {
            0 => ColorFlag::Red,
            _ => ColorFlag::Black,
        }
    }
}

impl From<ColorFlag> for u8 {
    fn from(value: ColorFlag) -> Self {
        value as u8
    }
}

/// Directory entry structure (128 bytes). In the CFB on-disk format these
/// entries ARE the red-black tree nodes — `left_sibling_did`/
/// `right_sibling_did` are the tree's child pointers (spec §4.1 "Directory").
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub object_type: ObjectType,
    pub color_flag: ColorFlag,
    pub left_sibling_did: u32,
    pub right_sibling_did: u32,
    pub child_did: u32,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    pub creation_time: u64,
    pub modified_time: u64,
    pub starting_sector: u32,
    pub stream_size: u64,
}

pub const NOSTREAM: u32 = FREESECT;

impl DirectoryEntry {
    pub fn empty() -> Self {
        DirectoryEntry {
            name: String::new(),
            object_type: ObjectType::Unknown,
            color_flag: ColorFlag::Black,
            left_sibling_did: NOSTREAM,
            right_sibling_did: NOSTREAM,
            child_did: NOSTREAM,
            clsid: [0; 16],
            state_bits: 0,
            creation_time: 0,
            modified_time: 0,
            starting_sector: ENDOFCHAIN,
            stream_size: 0,
        }
    }

    pub fn new_storage(name: &str) -> Self {
        DirectoryEntry { name: name.to_string(), object_type: ObjectType::Storage, ..Self::empty() }
    }

    pub fn new_stream(name: &str) -> Self {
        DirectoryEntry { name: name.to_string(), object_type: ObjectType::Stream, ..Self::empty() }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < DIR_ENTRY_SIZE {
            return Err(AafError::corruption("directory entry too small"));
        }

        let mut cursor = std::io::Cursor::new(data);

        let mut name_bytes = [0u8; 64];
        cursor.read_exact(&mut name_bytes)?;
        let name_len = cursor.read_u16::<LittleEndian>()?;
        let name = decode_entry_name(&name_bytes, name_len);

        let object_type = ObjectType::from(cursor.read_u8()?);
        let color_flag = ColorFlag::from(cursor.read_u8()?);
        let left_sibling_did = cursor.read_u32::<LittleEndian>()?;
        let right_sibling_did = cursor.read_u32::<LittleEndian>()?;
        let child_did = cursor.read_u32::<LittleEndian>()?;

        let mut clsid = [0u8; 16];
        cursor.read_exact(&mut clsid)?;

        let state_bits = cursor.read_u32::<LittleEndian>()?;
        let creation_time = cursor.read_u64::<LittleEndian>()?;
        let modified_time = cursor.read_u64::<LittleEndian>()?;
        let starting_sector = cursor.read_u32::<LittleEndian>()?;
        let stream_size_low = cursor.read_u32::<LittleEndian>()?;
        let stream_size_high = cursor.read_u32::<LittleEndian>()?;

        Ok(DirectoryEntry {
            name,
            object_type,
            color_flag,
            left_sibling_did,
            right_sibling_did,
            child_did,
            clsid,
            state_bits,
            creation_time,
            modified_time,
            starting_sector,
            stream_size: ((stream_size_high as u64) << 32) | (stream_size_low as u64),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DIR_ENTRY_SIZE);
        let (name_bytes, name_len) = encode_entry_name(&self.name);
        buf.extend_from_slice(&name_bytes);
        buf.write_u16::<LittleEndian>(name_len).unwrap();
        buf.push(self.object_type.into());
        buf.push(self.color_flag.into());
        buf.write_u32::<LittleEndian>(self.left_sibling_did).unwrap();
        buf.write_u32::<LittleEndian>(self.right_sibling_did).unwrap();
        buf.write_u32::<LittleEndian>(self.child_did).unwrap();
        buf.extend_from_slice(&self.clsid);
        buf.write_u32::<LittleEndian>(self.state_bits).unwrap();
        buf.write_u64::<LittleEndian>(self.creation_time).unwrap();
        buf.write_u64::<LittleEndian>(self.modified_time).unwrap();
        buf.write_u32::<LittleEndian>(self.starting_sector).unwrap();
        buf.write_u32::<LittleEndian>((self.stream_size & 0xFFFF_FFFF) as u32).unwrap();
        buf.write_u32::<LittleEndian>((self.stream_size >> 32) as u32).unwrap();
        debug_assert_eq!(buf.len(), DIR_ENTRY_SIZE);
        buf
    }

    pub fn is_valid(&self) -> bool {
        self.object_type != ObjectType::Unknown
    }

    pub fn is_root(&self) -> bool {
        self.object_type == ObjectType::RootStorage
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.object_type, ObjectType::Storage | ObjectType::RootStorage)
    }

    pub fn is_stream(&self) -> bool {
        self.object_type == ObjectType::Stream
    }
}

fn decode_entry_name(name_bytes: &[u8; 64], name_len: u16) -> String {
    if name_len <= 2 {
        return String::new();
    }
    let utf16_len = ((name_len - 2) / 2) as usize;
    let mut units = Vec::with_capacity(utf16_len);
    for i in 0..utf16_len {
        let ch = u16::from_le_bytes([name_bytes[i * 2], name_bytes[i * 2 + 1]]);
        if ch == 0 {
            break;
        }
        units.push(ch);
    }
    String::from_utf16_lossy(&units)
}

fn encode_entry_name(name: &str) -> ([u8; 64], u16) {
    let mut buf = [0u8; 64];
    let units: Vec<u16> = name.encode_utf16().take(31).collect();
    for (i, unit) in units.iter().enumerate() {
        let bytes = unit.to_le_bytes();
        buf[i * 2] = bytes[0];
        buf[i * 2 + 1] = bytes[1];
    }
    let name_len = if units.is_empty() { 0 } else { (units.len() as u16 + 1) * 2 };
    (buf, name_len)
}

/// CFB directory-entry ordering: length of the name first, then a
/// case-insensitive comparison of the UTF-16 code units (MS-CFB §2.6.4).
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let a_len = a.encode_utf16().count();
    let b_len = b.encode_utf16().count();
    match a_len.cmp(&b_len) {
        Ordering::Equal => {
            let au: Vec<u16> = a.to_uppercase().encode_utf16().collect();
            let bu: Vec<u16> = b.to_uppercase().encode_utf16().collect();
            au.cmp(&bu)
        }
        other => other,
    }
}

/// Full set of directory entries plus red-black sibling trees rooted at
/// each storage's `child_did`. Insert uses Okasaki's functional balancing
/// (no parent pointers needed — rebalancing happens on the way back up the
/// recursion, matching the shape CFB already stores on disk). Delete uses
/// a plain BST removal; see DESIGN.md for why strict RB rebalancing on
/// delete is not attempted here.
pub struct DirectoryTree {
    pub entries: Vec<DirectoryEntry>,
}

impl DirectoryTree {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        DirectoryTree { entries }
    }

    pub fn empty_with_root() -> Self {
        let mut root = DirectoryEntry::empty();
        root.name = "Root Entry".to_string();
        root.object_type = ObjectType::RootStorage;
        DirectoryTree { entries: vec![root] }
    }

    pub fn get(&self, did: u32) -> Option<&DirectoryEntry> {
        if did == NOSTREAM {
            return None;
        }
        self.entries.get(did as usize)
    }

    pub fn root_did(&self) -> u32 {
        0
    }

    pub fn root(&self) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.is_root())
    }

    pub fn streams(&self) -> Vec<&DirectoryEntry> {
        self.entries.iter().filter(|e| e.is_stream()).collect()
    }

    pub fn storages(&self) -> Vec<&DirectoryEntry> {
        self.entries.iter().filter(|e| e.is_storage()).collect()
    }

    /// In-order walk of a storage's sibling tree, yielding child DIDs.
    pub fn children_of(&self, parent_did: u32) -> Vec<u32> {
        let mut out = Vec::new();
        if let Some(parent) = self.get(parent_did) {
            self.collect_inorder(parent.child_did, &mut out);
        }
        out
    }

    fn collect_inorder(&self, did: u32, out: &mut Vec<u32>) {
        if did == NOSTREAM {
            return;
        }
        let entry = match self.get(did) {
            Some(e) => e,
            None => return,
        };
        self.collect_inorder(entry.left_sibling_did, out);
        out.push(did);
        self.collect_inorder(entry.right_sibling_did, out);
    }

    /// Collects every DID reachable from a detached sibling-tree root,
    /// descending into each storage's own `child_did` in turn. Used to find
    /// the full set of entries under a storage that's being garbage
    /// collected, since removing just the top entry leaves its descendants
    /// dangling but still present in `entries`.
    pub fn collect_subtree(&self, sibling_root: u32, out: &mut Vec<u32>) {
        let mut level = Vec::new();
        self.collect_inorder(sibling_root, &mut level);
        for did in level {
            out.push(did);
            if let Some(entry) = self.get(did) {
                if entry.is_storage() {
                    self.collect_subtree(entry.child_did, out);
                }
            }
        }
    }

    /// Finds a named child of `parent_did` by walking its sibling tree.
    pub fn find_child(&self, parent_did: u32, name: &str) -> Option<u32> {
        let parent = self.get(parent_did)?;
        let mut current = parent.child_did;
        while current != NOSTREAM {
            let entry = self.get(current)?;
            match compare_names(name, &entry.name) {
                Ordering::Equal => return Some(current),
                Ordering::Less => current = entry.left_sibling_did,
                Ordering::Greater => current = entry.right_sibling_did,
            }
        }
        None
    }

    /// Resolves a `/`-separated path from the root storage to a DID.
    pub fn resolve_path(&self, path: &str) -> Option<u32> {
        let mut current = self.root_did();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments {
            current = self.find_child(current, segment)?;
        }
        Some(current)
    }

    /// Inserts a new entry as a child of `parent_did`, returning its DID.
    /// Rejects a duplicate name under the same parent (spec §4.1 "creating
    /// a stream/storage name that already exists under the same parent").
    pub fn insert_child(&mut self, parent_did: u32, mut entry: DirectoryEntry) -> Result<u32> {
        if self.find_child(parent_did, &entry.name).is_some() {
            return Err(AafError::bad_format(format!(
                "duplicate entry name '{}' under parent",
                entry.name
            )));
        }
        entry.left_sibling_did = NOSTREAM;
        entry.right_sibling_did = NOSTREAM;
        entry.color_flag = ColorFlag::Red;
        let new_did = self.entries.len() as u32;
        self.entries.push(entry);

        let parent = self.entries[parent_did as usize].child_did;
        let new_root = self.rb_insert(parent, new_did);
        self.set_color(new_root, ColorFlag::Black);
        self.entries[parent_did as usize].child_did = new_root;
        Ok(new_did)
    }

    fn rb_insert(&mut self, node: u32, new_did: u32) -> u32 {
        if node == NOSTREAM {
            return new_did;
        }
        match compare_names(&self.entries[new_did as usize].name.clone(), &self.entries[node as usize].name.clone())
        {
            Ordering::Less | Ordering::Equal => {
                let new_left = self.rb_insert(self.left(node), new_did);
                self.set_left(node, new_left);
            }
            Ordering::Greater => {
                let new_right = self.rb_insert(self.right(node), new_did);
                self.set_right(node, new_right);
            }
        }
        self.balance(node)
    }

    /// Removes a named child from `parent_did`'s sibling tree. Plain BST
    /// delete (successor splice); see module docs for the rebalancing
    /// trade-off.
    pub fn remove_child(&mut self, parent_did: u32, name: &str) -> Result<DirectoryEntry> {
        let target = self
            .find_child(parent_did, name)
            .ok_or_else(|| AafError::not_found(format!("no entry named '{name}'")))?;
        let root = self.entries[parent_did as usize].child_did;
        let new_root = self.bst_delete(root, target);
        if new_root != NOSTREAM {
            self.set_color(new_root, ColorFlag::Black);
        }
        self.entries[parent_did as usize].child_did = new_root;
        let removed = std::mem::replace(&mut self.entries[target as usize], DirectoryEntry::empty());
        Ok(removed)
    }

    fn bst_delete(&mut self, node: u32, target: u32) -> u32 {
        if node == NOSTREAM {
            return NOSTREAM;
        }
        if node == target {
            let l = self.left(node);
            let r = self.right(node);
            if l == NOSTREAM {
                return r;
            }
            if r == NOSTREAM {
                return l;
            }
            let successor = self.min_did(r);
            let new_right = self.bst_delete(r, successor);
            self.set_left(successor, l);
            self.set_right(successor, new_right);
            return successor;
        }
        match compare_names(&self.entries[target as usize].name.clone(), &self.entries[node as usize].name.clone()) {
            Ordering::Less | Ordering::Equal => {
                let new_left = self.bst_delete(self.left(node), target);
                self.set_left(node, new_left);
            }
            Ordering::Greater => {
                let new_right = self.bst_delete(self.right(node), target);
                self.set_right(node, new_right);
            }
        }
        node
    }

    fn min_did(&self, mut node: u32) -> u32 {
        loop {
            let l = self.left(node);
            if l == NOSTREAM {
                return node;
            }
            node = l;
        }
    }

    fn left(&self, did: u32) -> u32 {
        self.entries[did as usize].left_sibling_did
    }
    fn right(&self, did: u32) -> u32 {
        self.entries[did as usize].right_sibling_did
    }
    fn set_left(&mut self, did: u32, value: u32) {
        self.entries[did as usize].left_sibling_did = value;
    }
    fn set_right(&mut self, did: u32, value: u32) {
        self.entries[did as usize].right_sibling_did = value;
    }
    fn set_color(&mut self, did: u32, color: ColorFlag) {
        self.entries[did as usize].color_flag = color;
    }
    fn is_red(&self, did: u32) -> bool {
        did != NOSTREAM && matches!(self.entries[did as usize].color_flag, ColorFlag::Red)
    }
    fn is_black(&self, did: u32) -> bool {
        !self.is_red(did)
    }

    /// Okasaki's red-black balance: collapses any of the 4 red-red
    /// violation shapes under a black `node` into the same balanced form.
    fn balance(&mut self, node: u32) -> u32 {
        if !self.is_black(node) {
            return node;
        }
        let l = self.left(node);
        let r = self.right(node);

        if self.is_red(l) && self.is_red(self.left(l)) {
            let z = node;
            let y = l;
            let x = self.left(l);
            let t3 = self.right(y);
            self.set_right(y, z);
            self.set_left(z, t3);
            self.set_color(x, ColorFlag::Black);
            self.set_color(z, ColorFlag::Black);
            self.set_color(y, ColorFlag::Red);
            return y;
        }
        if self.is_red(l) && self.is_red(self.right(l)) {
            let z = node;
            let y = l;
            let x = self.right(l);
            let t2 = self.left(x);
            let t3 = self.right(x);
            self.set_right(y, t2);
            self.set_left(x, y);
            self.set_left(z, t3);
            self.set_right(x, z);
            self.set_color(y, ColorFlag::Black);
            self.set_color(z, ColorFlag::Black);
            self.set_color(x, ColorFlag::Red);
            return x;
        }
        if self.is_red(r) && self.is_red(self.left(r)) {
            let z = node;
            let y = r;
            let x = self.left(r);
            let t2 = self.left(x);
            let t3 = self.right(x);
            self.set_right(z, t2);
            self.set_left(x, z);
            self.set_left(y, t3);
            self.set_right(x, y);
            self.set_color(z, ColorFlag::Black);
            self.set_color(y, ColorFlag::Black);
            self.set_color(x, ColorFlag::Red);
            return x;
        }
        if self.is_red(r) && self.is_red(self.right(r)) {
            let z = node;
            let y = r;
            let x = self.right(r);
            let t2 = self.left(y);
            self.set_right(z, t2);
            self.set_left(y, z);
            self.set_right(y, x);
            self.set_color(z, ColorFlag::Black);
            self.set_color(x, ColorFlag::Black);
            self.set_color(y, ColorFlag::Red);
            return y;
        }
        node
    }
}

pub fn write_directory_stream<W: Write>(w: &mut W, tree: &DirectoryTree, sector_size: usize) -> Result<()> {
    for entry in &tree.entries {
        w.write_all(&entry.to_bytes())?;
    }
    let dir_entry_size = DIR_ENTRY_SIZE;
    let entries_per_sector = sector_size / dir_entry_size;
    let pad = entries_per_sector - (tree.entries.len() % entries_per_sector.max(1));
    if pad != entries_per_sector {
        for _ in 0..pad {
            w.write_all(&DirectoryEntry::empty().to_bytes())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_entry_round_trips_through_bytes() {
        let entry = DirectoryEntry::new_stream("header");
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), DIR_ENTRY_SIZE);
        let parsed = DirectoryEntry::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.name, "header");
        assert!(parsed.is_stream());
    }

    #[test]
    fn name_ordering_is_length_first_then_case_insensitive() {
        assert_eq!(compare_names("a", "bb"), Ordering::Less);
        assert_eq!(compare_names("ABC", "abc"), Ordering::Equal);
        assert_eq!(compare_names("abd", "abc"), Ordering::Greater);
    }

    #[test]
    fn insert_and_find_children_by_name() {
        let mut tree = DirectoryTree::empty_with_root();
        let root = tree.root_did();
        tree.insert_child(root, DirectoryEntry::new_stream("header")).unwrap();
        tree.insert_child(root, DirectoryEntry::new_storage("properties")).unwrap();
        tree.insert_child(root, DirectoryEntry::new_stream("summary")).unwrap();

        assert!(tree.find_child(root, "header").is_some());
        assert!(tree.find_child(root, "properties").is_some());
        assert!(tree.find_child(root, "nonexistent").is_none());
    }

    #[test]
    fn duplicate_sibling_name_is_rejected() {
        let mut tree = DirectoryTree::empty_with_root();
        let root = tree.root_did();
        tree.insert_child(root, DirectoryEntry::new_stream("header")).unwrap();
        assert!(tree.insert_child(root, DirectoryEntry::new_stream("header")).is_err());
    }

    #[test]
    fn in_order_walk_is_sorted_by_cfb_ordering() {
        let mut tree = DirectoryTree::empty_with_root();
        let root = tree.root_did();
        for name in ["zeta", "alpha", "mid", "aa", "z"] {
            tree.insert_child(root, DirectoryEntry::new_stream(name)).unwrap();
        }
        let children = tree.children_of(root);
        let names: Vec<&str> = children.iter().map(|&did| tree.get(did).unwrap().name.as_str()).collect();
        let mut expected = names.clone();
        expected.sort_by(|a, b| compare_names(a, b));
        assert_eq!(names, expected);
    }

    #[test]
    fn resolve_nested_path() {
        let mut tree = DirectoryTree::empty_with_root();
        let root = tree.root_did();
        let storage_did = tree.insert_child(root, DirectoryEntry::new_storage("mobs")).unwrap();
        tree.insert_child(storage_did, DirectoryEntry::new_stream("mob1")).unwrap();

        assert_eq!(tree.resolve_path("mobs/mob1"), tree.find_child(storage_did, "mob1"));
        assert!(tree.resolve_path("mobs/missing").is_none());
    }

    #[test]
    fn remove_child_drops_it_from_lookup() {
        let mut tree = DirectoryTree::empty_with_root();
        let root = tree.root_did();
        tree.insert_child(root, DirectoryEntry::new_stream("a")).unwrap();
        tree.insert_child(root, DirectoryEntry::new_stream("b")).unwrap();
        tree.insert_child(root, DirectoryEntry::new_stream("c")).unwrap();

        tree.remove_child(root, "b").unwrap();
        assert!(tree.find_child(root, "b").is_none());
        assert!(tree.find_child(root, "a").is_some());
        assert!(tree.find_child(root, "c").is_some());
    }
}
