use super::constants::*;
use super::directory::{write_directory_stream, DirectoryEntry, DirectoryTree};
use super::fat::{FatTable, MiniFatTable};
use super::header::CfbHeader;
use super::stream::Stream;
use aaf_core::errors::{AafError, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

/// Whether a container was opened for reading an existing file or for
/// building a fresh one (spec §4.1 "External interface: `open(path, mode)`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// CFB (Compound File Binary) container: header, FAT/miniFAT, and the
/// directory red-black forest, plus whatever stream payloads have been
/// staged in memory since the container was opened.
///
/// Streams are read lazily and cached in `streams`; writes accumulate in
/// the same cache until `save` commits them to a fresh on-disk layout. A
/// full rewrite on every `save` (rather than incremental in-place patching)
/// keeps the allocator simple and matches "a failed write leaves the file
/// in its last-consistent on-disk state" (spec §5) — the old file is only
/// replaced once the new one is fully serialized.
pub struct CfbContainer {
    pub header: CfbHeader,
    pub fat: FatTable,
    pub mini_fat: Option<MiniFatTable>,
    pub directory: DirectoryTree,
    streams: HashMap<u32, Stream>,
    mode: OpenMode,
}

impl CfbContainer {
    pub fn create() -> Self {
        Self::create_with_sector_shift(9)
    }

    /// As `create`, but with a caller-chosen sector shift (spec §9 open
    /// question: "mini-stream cutoff is format-configurable; fix at 4096 B
    /// for writes" — the sector size itself stays a `WriteOptions` knob).
    pub fn create_with_sector_shift(sector_shift: u16) -> Self {
        let header = CfbHeader::new_for_write_with_sector_shift(sector_shift);
        CfbContainer {
            fat: FatTable::new(header.sector_size()),
            mini_fat: Some(MiniFatTable::new(header.mini_sector_size())),
            directory: DirectoryTree::empty_with_root(),
            header,
            streams: HashMap::new(),
            mode: OpenMode::ReadWrite,
        }
    }

    pub fn from_reader<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header = CfbHeader::from_reader(reader)?;
        let fat = FatTable::from_reader(reader, &header)?;
        let directory_entries = Self::read_directory_entries(reader, &header, &fat)?;
        let directory = DirectoryTree::new(directory_entries);

        let mini_fat = if let Some(root) = directory.root() {
            if header.mini_fat_sectors > 0 && root.starting_sector != ENDOFCHAIN {
                Some(MiniFatTable::from_reader(reader, &header, &fat, root.starting_sector)?)
            } else {
                Some(MiniFatTable::new(header.mini_sector_size()))
            }
        } else {
            None
        };

        Ok(CfbContainer { header, fat, mini_fat, directory, streams: HashMap::new(), mode: OpenMode::ReadOnly })
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(data);
        Self::from_reader(&mut cursor)
    }

    fn read_directory_entries<R: Read + Seek>(
        reader: &mut R,
        header: &CfbHeader,
        fat: &FatTable,
    ) -> Result<Vec<DirectoryEntry>> {
        let mut entries = Vec::new();
        if header.first_dir_sector == ENDOFCHAIN {
            return Ok(entries);
        }

        let dir_chain = fat.get_chain_checked(header.first_dir_sector)?;
        let entries_per_sector = header.sector_size() as usize / DIR_ENTRY_SIZE;

        for sector in dir_chain {
            let offset = (sector + 1) * header.sector_size();
            reader.seek(SeekFrom::Start(offset as u64)).map_err(AafError::Io)?;
            let mut sector_data = vec![0u8; header.sector_size() as usize];
            reader.read_exact(&mut sector_data).map_err(AafError::Io)?;

            for i in 0..entries_per_sector {
                let start = i * DIR_ENTRY_SIZE;
                let entry = DirectoryEntry::from_bytes(&sector_data[start..start + DIR_ENTRY_SIZE])?;
                if !entry.is_valid() && entries.is_empty() {
                    continue;
                }
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    // -- path-based API (spec §4.1) -----------------------------------

    pub fn exists(&self, path: &str) -> bool {
        self.directory.resolve_path(path).is_some()
    }

    pub fn open(&self, path: &str) -> Result<u32> {
        self.directory.resolve_path(path).ok_or_else(|| AafError::not_found(format!("no entry at '{path}'")))
    }

    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let did = self.open(path)?;
        Ok(self
            .directory
            .children_of(did)
            .into_iter()
            .filter_map(|c| self.directory.get(c))
            .map(|e| e.name.clone())
            .collect())
    }

    /// Finds the `/`-joined path from the root storage to `target_did`, by
    /// depth-first search (entries don't store a parent pointer).
    pub fn path_of(&self, target_did: u32) -> Option<String> {
        let root = self.directory.root_did();
        if target_did == root {
            return Some(String::new());
        }
        self.search_path(root, target_did, &mut Vec::new())
    }

    fn search_path(&self, node: u32, target: u32, trail: &mut Vec<String>) -> Option<String> {
        for child in self.directory.children_of(node) {
            let entry = self.directory.get(child)?;
            trail.push(entry.name.clone());
            if child == target {
                return Some(trail.join("/"));
            }
            if entry.is_storage() {
                if let Some(found) = self.search_path(child, target, trail) {
                    return Some(found);
                }
            }
            trail.pop();
        }
        None
    }

    /// Creates a storage at `path`, auto-creating any missing ancestors.
    pub fn create_storage(&mut self, path: &str) -> Result<u32> {
        self.require_writable()?;
        let mut current = self.directory.root_did();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match self.directory.find_child(current, segment) {
                Some(did) => did,
                None => self.directory.insert_child(current, DirectoryEntry::new_storage(segment))?,
            };
        }
        Ok(current)
    }

    /// Creates a stream at `path`, auto-creating any missing ancestor
    /// storages. Re-running this against a path that already holds a
    /// stream reuses the existing entry and resets its cached content,
    /// rather than rejecting the duplicate name — `AafFile::save` calls
    /// this on every save, including re-saves of an unchanged object
    /// graph, and must stay idempotent (spec §4.5, §5).
    pub fn create_stream(&mut self, path: &str) -> Result<u32> {
        self.require_writable()?;
        let (parent_path, name) =
            path.rsplit_once('/').unwrap_or(("", path));
        let parent_did =
            if parent_path.is_empty() { self.directory.root_did() } else { self.create_storage(parent_path)? };
        let did = match self.directory.find_child(parent_did, name) {
            Some(existing) => {
                let entry = self
                    .directory
                    .get(existing)
                    .ok_or_else(|| AafError::not_found(format!("no entry at '{path}'")))?;
                if !entry.is_stream() {
                    return Err(AafError::bad_format(format!("'{path}' already exists as a storage")));
                }
                existing
            }
            None => self.directory.insert_child(parent_did, DirectoryEntry::new_stream(name))?,
        };
        self.streams.insert(did, Stream::new(name.to_string(), Vec::new()));
        Ok(did)
    }

    pub fn open_stream<R: Read + Seek>(&mut self, reader: Option<&mut R>, path: &str) -> Result<&Stream> {
        let did = self.open(path)?;
        if !self.streams.contains_key(&did) {
            let entry = self
                .directory
                .get(did)
                .ok_or_else(|| AafError::not_found(format!("no entry at '{path}'")))?
                .clone();
            if !entry.is_stream() {
                return Err(AafError::bad_format(format!("'{path}' is not a stream")));
            }
            let stream = match reader {
                Some(r) => Stream::from_entry(r, &entry, &self.header, &self.fat, self.mini_fat.as_ref())?,
                None => Stream::new(entry.name.clone(), Vec::new()),
            };
            self.streams.insert(did, stream);
        }
        Ok(&self.streams[&did])
    }

    pub fn write_stream(&mut self, path: &str, data: Vec<u8>) -> Result<()> {
        self.require_writable()?;
        let did = self.open(path)?;
        let entry = self.directory.get(did).ok_or_else(|| AafError::not_found(path.to_string()))?;
        if !entry.is_stream() {
            return Err(AafError::bad_format(format!("'{path}' is not a stream")));
        }
        self.streams.insert(did, Stream::new(entry.name.clone(), data));
        Ok(())
    }

    /// Removes `path` from its parent's directory tree. If `path` names a
    /// storage, every entry nested beneath it is zeroed as well (and its
    /// cached stream payloads dropped), not just unlinked: `remove_child`
    /// only detaches the top entry, leaving its subtree reachable only
    /// through the now-discarded `removed.child_did`, which would otherwise
    /// leave those descendants in `entries` forever.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        self.require_writable()?;
        let (parent_path, name) = path.rsplit_once('/').unwrap_or(("", path));
        let parent_did =
            if parent_path.is_empty() { self.directory.root_did() } else { self.open(parent_path)? };
        let target_did = self
            .directory
            .find_child(parent_did, name)
            .ok_or_else(|| AafError::not_found(format!("no entry named '{name}'")))?;
        let removed = self.directory.remove_child(parent_did, name)?;
        self.streams.remove(&target_did);
        let mut descendants = Vec::new();
        self.directory.collect_subtree(removed.child_did, &mut descendants);
        for did in descendants {
            self.directory.entries[did as usize] = DirectoryEntry::empty();
            self.streams.remove(&did);
        }
        Ok(())
    }

    pub fn set_class_id(&mut self, did: u32, clsid: [u8; 16]) -> Result<()> {
        let entry = self.directory.entries.get_mut(did as usize).ok_or_else(|| AafError::not_found("no such entry"))?;
        entry.clsid = clsid;
        Ok(())
    }

    pub fn class_id_of(&self, did: u32) -> Option<[u8; 16]> {
        self.directory.get(did).map(|e| e.clsid)
    }

    /// Paths of every storage reachable from the root, excluding the root
    /// itself. `path_of` walks live sibling-tree links only, so an entry
    /// already detached by a prior `remove` is naturally absent here.
    pub fn storage_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for did in 0..self.directory.entries.len() as u32 {
            let entry = match self.directory.get(did) {
                Some(e) => e,
                None => continue,
            };
            if !entry.is_storage() || entry.is_root() {
                continue;
            }
            if let Some(path) = self.path_of(did) {
                out.push(path);
            }
        }
        out
    }

    fn require_writable(&self) -> Result<()> {
        if self.mode == OpenMode::ReadOnly {
            return Err(AafError::ReadOnly { reason: "container opened read-only".to_string() });
        }
        Ok(())
    }

    // -- whole-file serialization --------------------------------------

    /// Commits the directory tree and every staged stream to a fresh,
    /// self-consistent on-disk layout (spec §4.1 "Allocation", §5 save
    /// algorithm). This is a full rewrite, not an in-place patch: streams
    /// smaller than the mini-stream cutoff go through the miniFAT and the
    /// root-owned mini-stream, everything else through the regular FAT.
    ///
    /// Limitation: DIFAT chaining beyond the header's 109 inline entries is
    /// not implemented — containers needing more than roughly 109 *
    /// (sector_size/4) FAT sectors will fail to save. Real AAF files in the
    /// object-count range this crate targets stay well under that bound;
    /// see DESIGN.md.
    pub fn save<W: Write + Seek>(&mut self, w: &mut W) -> Result<()> {
        let sector_size = self.header.sector_size() as usize;
        let mut fat = FatTable::new(self.header.sector_size());
        let mut mini_fat = MiniFatTable::new(self.header.mini_sector_size());
        let mut arena: Vec<u8> = Vec::new();

        let cutoff = self.header.mini_stream_cutoff_size as u64;
        let dids: Vec<u32> = (0..self.directory.entries.len() as u32).collect();

        for did in dids {
            if !self.directory.entries[did as usize].is_stream() {
                continue;
            }
            let data = self.streams.get(&did).map(|s| s.as_bytes().to_vec()).unwrap_or_default();
            let len = data.len() as u64;
            if len == 0 {
                self.directory.entries[did as usize].starting_sector = ENDOFCHAIN;
                self.directory.entries[did as usize].stream_size = 0;
            } else if len < cutoff {
                let start = mini_fat.allocate_for(&data);
                self.directory.entries[did as usize].starting_sector = start;
                self.directory.entries[did as usize].stream_size = len;
            } else {
                let start_sector = Self::append_chain(&mut arena, &mut fat, &data, sector_size);
                self.directory.entries[did as usize].starting_sector = start_sector;
                self.directory.entries[did as usize].stream_size = len;
            }
        }

        let root_did = self.directory.root_did();
        let mini_stream = mini_fat.mini_stream.clone();
        if mini_stream.is_empty() {
            self.directory.entries[root_did as usize].starting_sector = ENDOFCHAIN;
            self.directory.entries[root_did as usize].stream_size = 0;
        } else {
            let start = Self::append_chain(&mut arena, &mut fat, &mini_stream, sector_size);
            self.directory.entries[root_did as usize].starting_sector = start;
            self.directory.entries[root_did as usize].stream_size = mini_stream.len() as u64;
        }

        let mut dir_bytes = Vec::new();
        write_directory_stream(&mut dir_bytes, &self.directory, sector_size)?;
        let dir_start = Self::append_chain(&mut arena, &mut fat, &dir_bytes, sector_size);

        let mut mini_fat_bytes = Vec::new();
        for &entry in &mini_fat.entries {
            mini_fat_bytes.write_u32::<LittleEndian>(entry)?;
        }
        let mini_fat_start = if mini_fat_bytes.is_empty() {
            ENDOFCHAIN
        } else {
            Self::append_chain(&mut arena, &mut fat, &mini_fat_bytes, sector_size)
        };

        let fat_entries_per_sector = sector_size / 4;
        let fat_start = self.finalize_fat(&mut arena, &mut fat, fat_entries_per_sector)?;
        let fat_sector_count = (fat.entries.len() - (fat_start as usize)).div_ceil(fat_entries_per_sector).max(1);

        if fat_sector_count > 109 {
            return Err(AafError::bad_format(
                "container too large: DIFAT extension beyond the 109 inline entries is not supported",
            ));
        }

        let mut header = self.header.clone();
        header.first_dir_sector = dir_start;
        header.first_mini_fat_sector = mini_fat_start;
        header.mini_fat_sectors = (mini_fat_bytes.len().div_ceil(sector_size)) as u32;
        header.fat_sectors = fat_sector_count as u32;
        header.first_difat_sector = ENDOFCHAIN;
        header.difat_sectors = 0;
        header.total_sectors = (arena.len() / sector_size) as u32;
        header.difat = [FREESECT; 109];
        for i in 0..fat_sector_count {
            header.difat[i] = fat_start + i as u32;
        }

        w.seek(SeekFrom::Start(0)).map_err(AafError::Io)?;
        header.write_to(w)?;
        w.write_all(&arena)?;

        self.header = header;
        self.fat = fat;
        self.mini_fat = Some(mini_fat);
        Ok(())
    }

    /// Appends `data` to `arena` as whole sectors and registers a
    /// contiguous FAT chain over those sector ids, returning the chain's
    /// first sector id.
    fn append_chain(arena: &mut Vec<u8>, fat: &mut FatTable, data: &[u8], sector_size: usize) -> u32 {
        let count = data.len().div_ceil(sector_size).max(1);
        let start_sector = (arena.len() / sector_size) as u32;
        arena.extend_from_slice(data);
        let pad = count * sector_size - data.len();
        arena.extend(std::iter::repeat(0u8).take(pad));

        if fat.entries.len() < (start_sector as usize + count) {
            fat.entries.resize(start_sector as usize + count, FREESECT);
        }
        for i in 0..count {
            let id = start_sector + i as u32;
            fat.entries[id as usize] = if i + 1 < count { id + 1 } else { ENDOFCHAIN };
        }
        start_sector
    }

    /// Reserves sectors at the end of the arena for the FAT itself, marking
    /// them `FATSECT`, and pads the FAT entry table to whole sectors. Runs a
    /// single fixed-point pass: reserving the FAT's own sectors can grow the
    /// entry table past a sector boundary, so the count is rechecked once.
    fn finalize_fat(&self, arena: &mut Vec<u8>, fat: &mut FatTable, entries_per_sector: usize) -> Result<u32> {
        let mut fat_sector_count = fat.entries.len().div_ceil(entries_per_sector).max(1);
        let start_sector = (arena.len() / fat.sector_size as usize) as u32;

        let needed = fat_sector_count * entries_per_sector;
        if fat.entries.len() < start_sector as usize + needed {
            fat.entries.resize((start_sector as usize + needed).max(fat.entries.len()), FREESECT);
        }
        let recount = fat.entries.len().div_ceil(entries_per_sector).max(fat_sector_count);
        if recount != fat_sector_count {
            fat_sector_count = recount;
            fat.entries.resize(start_sector as usize + fat_sector_count * entries_per_sector, FREESECT);
        }

        for i in 0..fat_sector_count {
            fat.entries[start_sector as usize + i] = FATSECT;
        }

        let mut fat_bytes = Vec::new();
        fat.write_sectors(&mut fat_bytes)?;
        arena.extend_from_slice(&fat_bytes[..fat_sector_count * fat.sector_size as usize]);
        Ok(start_sector)
    }

    pub fn root_entry(&self) -> Option<&DirectoryEntry> {
        self.directory.root()
    }

    pub fn list_streams(&self) -> Vec<String> {
        self.directory.streams().into_iter().map(|e| e.name.clone()).collect()
    }

    pub fn list_storages(&self) -> Vec<String> {
        self.directory.storages().into_iter().map(|e| e.name.clone()).collect()
    }
}

/// A decompressed (always — no compression in scope) stream lifted out of
/// a container for handing to a higher layer.
#[derive(Debug, Clone)]
pub struct CfbStream {
    pub name: String,
    pub data: Vec<u8>,
}

impl CfbStream {
    pub fn new(name: String, data: Vec<u8>) -> Self {
        CfbStream { name, data }
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn create_and_round_trip_streams_and_storages() {
        let mut container = CfbContainer::create();
        container.create_storage("properties").unwrap();
        container.create_stream("properties/header").unwrap();
        container.write_stream("properties/header", vec![1, 2, 3, 4, 5]).unwrap();

        let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        container.save(&mut buf).unwrap();

        let bytes = buf.into_inner();
        let mut reader = Cursor::new(bytes);
        let mut reopened = CfbContainer::from_reader(&mut reader).unwrap();
        assert!(reopened.exists("properties/header"));
        let stream = reopened.open_stream(Some(&mut reader), "properties/header").unwrap();
        assert_eq!(stream.as_bytes(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn large_stream_goes_through_regular_fat_not_minifat() {
        let mut container = CfbContainer::create();
        container.create_stream("essence").unwrap();
        let data = vec![9u8; 8192];
        container.write_stream("essence", data.clone()).unwrap();

        let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        container.save(&mut buf).unwrap();

        let bytes = buf.into_inner();
        let mut reader = Cursor::new(bytes);
        let mut reopened = CfbContainer::from_reader(&mut reader).unwrap();
        let stream = reopened.open_stream(Some(&mut reader), "essence").unwrap();
        assert_eq!(stream.as_bytes().len(), 8192);
        assert_eq!(stream.as_bytes(), &data[..]);
    }

    #[test]
    fn remove_then_save_drops_entry() {
        let mut container = CfbContainer::create();
        container.create_stream("scratch").unwrap();
        container.remove("scratch").unwrap();
        assert!(!container.exists("scratch"));
    }

    #[test]
    fn create_stream_is_idempotent() {
        let mut container = CfbContainer::create();
        let first = container.create_stream("properties").unwrap();
        container.write_stream("properties", vec![1, 2, 3]).unwrap();
        let second = container.create_stream("properties").unwrap();
        assert_eq!(first, second);

        let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        container.save(&mut buf).unwrap();
        container.save(&mut buf).unwrap();
    }

    #[test]
    fn remove_drops_nested_descendants_too() {
        let mut container = CfbContainer::create();
        container.create_storage("obj/child").unwrap();
        container.create_stream("obj/properties").unwrap();
        container.create_stream("obj/child/properties").unwrap();

        container.remove("obj").unwrap();

        assert!(!container.exists("obj"));
        assert!(!container.exists("obj/properties"));
        assert!(!container.exists("obj/child"));
        assert!(!container.exists("obj/child/properties"));

        let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        container.save(&mut buf).unwrap();
        let bytes = buf.into_inner();
        let mut reader = Cursor::new(bytes);
        let reopened = CfbContainer::from_reader(&mut reader).unwrap();
        assert!(!reopened.exists("obj"));
    }

    #[test]
    fn path_of_reports_the_segment_path_back_to_root() {
        let mut container = CfbContainer::create();
        container.create_storage("a/b").unwrap();
        let did = container.create_stream("a/b/c").unwrap();
        assert_eq!(container.path_of(did), Some("a/b/c".to_string()));
    }

    #[test]
    fn read_only_container_rejects_writes() {
        let mut container = CfbContainer::create();
        container.create_stream("x").unwrap();
        let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        container.save(&mut buf).unwrap();

        let bytes = buf.into_inner();
        let mut reader = Cursor::new(bytes);
        let mut reopened = CfbContainer::from_reader(&mut reader).unwrap();
        assert!(reopened.create_stream("y").is_err());
    }

    #[test]
    fn sector_shift_12_round_trips_as_cfb_v4() {
        let mut container = CfbContainer::create_with_sector_shift(12);
        container.create_stream("essence").unwrap();
        let data = vec![7u8; 9000];
        container.write_stream("essence", data.clone()).unwrap();

        let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        container.save(&mut buf).unwrap();

        let bytes = buf.into_inner();
        let mut reader = Cursor::new(bytes);
        let mut reopened = CfbContainer::from_reader(&mut reader).unwrap();
        assert_eq!(reopened.header.sector_size(), 4096);
        assert_eq!(reopened.header.major_version, 4);
        let stream = reopened.open_stream(Some(&mut reader), "essence").unwrap();
        assert_eq!(stream.as_bytes(), &data[..]);
    }
}
