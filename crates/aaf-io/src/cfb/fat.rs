use super::constants::*;
use super::header::CfbHeader;
use aaf_core::errors::{AafError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

/// The FAT: an array of sector ids linking chains, used both as the
/// allocation table and as the free list (spec §4.1 "Allocation").
pub struct FatTable {
    pub entries: Vec<u32>,
    pub sector_size: u32,
}

impl FatTable {
    pub fn new(sector_size: u32) -> Self {
        FatTable { entries: Vec::new(), sector_size }
    }

    pub fn from_reader<R: Read + Seek>(reader: &mut R, header: &CfbHeader) -> Result<Self> {
        let sector_size = header.sector_size();
        let entries_per_sector = sector_size / 4;

        let mut fat_sectors = Vec::new();
        for &sector in header.difat.iter() {
            if sector == FREESECT {
                break;
            }
            fat_sectors.push(sector);
        }

        if header.difat_sectors > 0 {
            let mut current_difat = header.first_difat_sector;
            for _ in 0..header.difat_sectors {
                if current_difat == ENDOFCHAIN || current_difat == FREESECT {
                    break;
                }
                let offset = (current_difat + 1) * sector_size;
                reader.seek(SeekFrom::Start(offset as u64)).map_err(AafError::Io)?;
                for _ in 0..(entries_per_sector - 1) {
                    let sector = reader.read_u32::<LittleEndian>()?;
                    if sector != FREESECT {
                        fat_sectors.push(sector);
                    }
                }
                current_difat = reader.read_u32::<LittleEndian>()?;
            }
        }

        let mut entries = Vec::new();
        for &fat_sector in &fat_sectors {
            if fat_sector == FREESECT || fat_sector == ENDOFCHAIN {
                continue;
            }
            let offset = (fat_sector + 1) * sector_size;
            reader.seek(SeekFrom::Start(offset as u64)).map_err(AafError::Io)?;
            for _ in 0..entries_per_sector {
                entries.push(reader.read_u32::<LittleEndian>()?);
            }
        }

        Ok(FatTable { entries, sector_size })
    }

    pub fn get_next(&self, sector: u32) -> Option<u32> {
        let next = *self.entries.get(sector as usize)?;
        if next == ENDOFCHAIN || next == FREESECT || next == FATSECT {
            None
        } else {
            Some(next)
        }
    }

    /// Returns the sectors in a chain, bounded by the table length so a
    /// cyclic FAT can't spin the caller forever (spec §4.1 "Cycle detected
    /// in FAT → Corruption" is enforced by `get_chain_checked`; this raw
    /// variant is used where a bound is already known to hold, e.g. tests).
    pub fn get_chain(&self, start_sector: u32) -> Vec<u32> {
        self.get_chain_checked(start_sector).unwrap_or_default()
    }

    pub fn get_chain_checked(&self, start_sector: u32) -> Result<Vec<u32>> {
        let mut chain = Vec::new();
        let mut current = start_sector;
        let max_chain_length = self.entries.len() + 1;

        while current != ENDOFCHAIN && current != FREESECT {
            if chain.len() > max_chain_length {
                return Err(AafError::corruption("FAT chain cycle detected"));
            }
            chain.push(current);
            match self.get_next(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(chain)
    }

    pub fn read_chain<R: Read + Seek>(&self, reader: &mut R, start_sector: u32) -> Result<Vec<u8>> {
        let chain = self.get_chain_checked(start_sector)?;
        let mut data = Vec::with_capacity(chain.len() * self.sector_size as usize);
        for sector in chain {
            let offset = (sector + 1) * self.sector_size;
            reader.seek(SeekFrom::Start(offset as u64)).map_err(AafError::Io)?;
            let mut sector_data = vec![0u8; self.sector_size as usize];
            reader.read_exact(&mut sector_data).map_err(AafError::Io)?;
            data.extend_from_slice(&sector_data);
        }
        Ok(data)
    }

    /// Allocates `count` sectors, linking them into a fresh chain and
    /// returning its first sector id. Scans for `FREE` entries before
    /// growing the table (spec §4.1 "Allocation").
    pub fn allocate_chain(&mut self, count: usize) -> u32 {
        if count == 0 {
            return ENDOFCHAIN;
        }
        let mut sectors = Vec::with_capacity(count);
        for _ in 0..count {
            sectors.push(self.allocate_one());
        }
        for i in 0..sectors.len() - 1 {
            self.entries[sectors[i] as usize] = sectors[i + 1];
        }
        let last = *sectors.last().unwrap();
        self.entries[last as usize] = ENDOFCHAIN;
        sectors[0]
    }

    fn allocate_one(&mut self) -> u32 {
        if let Some(pos) = self.entries.iter().position(|&e| e == FREESECT) {
            return pos as u32;
        }
        let id = self.entries.len() as u32;
        self.entries.push(FREESECT);
        id
    }

    /// Frees every sector in the chain starting at `start_sector`.
    pub fn free_chain(&mut self, start_sector: u32) {
        let chain = self.get_chain(start_sector);
        for sector in chain {
            if let Some(slot) = self.entries.get_mut(sector as usize) {
                *slot = FREESECT;
            }
        }
    }

    pub fn write_sectors<W: Write>(&self, w: &mut W) -> Result<()> {
        for &entry in &self.entries {
            w.write_u32::<LittleEndian>(entry)?;
        }
        let entries_per_sector = (self.sector_size / 4) as usize;
        let pad = entries_per_sector - (self.entries.len() % entries_per_sector.max(1)).max(0);
        if pad != entries_per_sector {
            for _ in 0..pad {
                w.write_u32::<LittleEndian>(FREESECT)?;
            }
        }
        Ok(())
    }

    pub fn free_sector_count(&self) -> usize {
        self.entries.iter().filter(|&&e| e == FREESECT).count()
    }

    pub fn allocated_sector_count(&self) -> usize {
        self.entries.len() - self.free_sector_count()
    }
}

/// MiniFAT: the same chain-linking structure, scaled down for streams
/// smaller than the mini-stream cutoff (spec §3 "CFB entities").
pub struct MiniFatTable {
    pub entries: Vec<u32>,
    pub mini_stream: Vec<u8>,
    mini_sector_size: u32,
}

impl MiniFatTable {
    pub fn new(mini_sector_size: u32) -> Self {
        MiniFatTable { entries: Vec::new(), mini_stream: Vec::new(), mini_sector_size }
    }

    pub fn from_reader<R: Read + Seek>(
        reader: &mut R,
        header: &CfbHeader,
        fat: &FatTable,
        mini_stream_start: u32,
    ) -> Result<Self> {
        let mini_sector_size = header.mini_sector_size();
        let entries_per_sector = header.sector_size() / 4;

        let mut entries = Vec::new();
        if header.mini_fat_sectors > 0 && header.first_mini_fat_sector != ENDOFCHAIN {
            let mini_fat_chain = fat.get_chain_checked(header.first_mini_fat_sector)?;
            for sector in mini_fat_chain {
                let offset = (sector + 1) * header.sector_size();
                reader.seek(SeekFrom::Start(offset as u64)).map_err(AafError::Io)?;
                for _ in 0..entries_per_sector {
                    entries.push(reader.read_u32::<LittleEndian>()?);
                }
            }
        }

        let mini_stream = if mini_stream_start != ENDOFCHAIN {
            fat.read_chain(reader, mini_stream_start)?
        } else {
            Vec::new()
        };

        Ok(MiniFatTable { entries, mini_stream, mini_sector_size })
    }

    pub fn get_next(&self, mini_sector: u32) -> Option<u32> {
        let next = *self.entries.get(mini_sector as usize)?;
        if next == ENDOFCHAIN || next == FREESECT {
            None
        } else {
            Some(next)
        }
    }

    pub fn get_chain(&self, start_mini_sector: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut current = start_mini_sector;
        let max_chain_length = self.entries.len() + 1;

        while current != ENDOFCHAIN && current != FREESECT && chain.len() <= max_chain_length {
            chain.push(current);
            match self.get_next(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        chain
    }

    pub fn read_chain(&self, start_mini_sector: u32) -> Result<Vec<u8>> {
        let chain = self.get_chain(start_mini_sector);
        let mut data = Vec::with_capacity(chain.len() * self.mini_sector_size as usize);
        for mini_sector in chain {
            let offset = (mini_sector * self.mini_sector_size) as usize;
            let end = offset + self.mini_sector_size as usize;
            if end > self.mini_stream.len() {
                return Err(AafError::corruption("mini sector offset out of bounds"));
            }
            data.extend_from_slice(&self.mini_stream[offset..end]);
        }
        Ok(data)
    }

    /// Allocates a mini-sector chain long enough for `data` and appends it
    /// to the mini-stream, returning the chain's first mini-sector id.
    pub fn allocate_for(&mut self, data: &[u8]) -> u32 {
        let mini_size = self.mini_sector_size as usize;
        let count = data.len().div_ceil(mini_size).max(1);

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.allocate_one());
        }
        for i in 0..ids.len() - 1 {
            self.entries[ids[i] as usize] = ids[i + 1];
        }
        let last = *ids.last().unwrap();
        self.entries[last as usize] = ENDOFCHAIN;

        for (i, &id) in ids.iter().enumerate() {
            let offset = id as usize * mini_size;
            if self.mini_stream.len() < offset + mini_size {
                self.mini_stream.resize(offset + mini_size, 0);
            }
            let start = i * mini_size;
            let end = (start + mini_size).min(data.len());
            if start < data.len() {
                self.mini_stream[offset..offset + (end - start)].copy_from_slice(&data[start..end]);
            }
        }
        ids[0]
    }

    fn allocate_one(&mut self) -> u32 {
        if let Some(pos) = self.entries.iter().position(|&e| e == FREESECT) {
            return pos as u32;
        }
        let id = self.entries.len() as u32;
        self.entries.push(FREESECT);
        id
    }

    pub fn free_chain(&mut self, start_mini_sector: u32) {
        let chain = self.get_chain(start_mini_sector);
        for s in chain {
            if let Some(slot) = self.entries.get_mut(s as usize) {
                *slot = FREESECT;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fat_chain_walk() {
        let fat = FatTable { entries: vec![1, 2, 3, ENDOFCHAIN, 5, ENDOFCHAIN], sector_size: 512 };
        assert_eq!(fat.get_chain(0), vec![0, 1, 2, 3]);
        assert_eq!(fat.get_chain(4), vec![4, 5]);
    }

    #[test]
    fn allocate_chain_links_and_conserves_sectors() {
        let mut fat = FatTable::new(512);
        let start = fat.allocate_chain(3);
        assert_eq!(fat.get_chain(start).len(), 3);
        assert_eq!(fat.allocated_sector_count() + fat.free_sector_count(), fat.entries.len());
    }

    #[test]
    fn free_chain_returns_sectors_to_the_free_list() {
        let mut fat = FatTable::new(512);
        let start = fat.allocate_chain(4);
        fat.free_chain(start);
        assert_eq!(fat.free_sector_count(), fat.entries.len());
    }

    #[test]
    fn cyclic_fat_is_corruption_not_infinite_loop() {
        let fat = FatTable { entries: vec![1, 0], sector_size: 512 };
        assert!(fat.get_chain_checked(0).is_err());
    }

    #[test]
    fn mini_fat_allocate_and_read_round_trips() {
        let mut mf = MiniFatTable::new(64);
        let data = vec![7u8; 100];
        let start = mf.allocate_for(&data);
        let read_back = mf.read_chain(start).unwrap();
        assert_eq!(&read_back[..100], &data[..]);
    }
}
