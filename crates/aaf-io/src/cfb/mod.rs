pub mod container;
pub mod directory;
pub mod fat;
pub mod header;
pub mod stream;

pub use container::{CfbContainer, CfbStream, OpenMode};
pub use directory::{ColorFlag, DirectoryEntry, DirectoryTree, ObjectType};
pub use header::CfbHeader;
pub use stream::{Stream, StreamReader};

use aaf_core::errors::Result;
use std::io::{Read, Seek};

/// CFB (Compound File Binary) format constants — spec §4.1 "Layout".
pub mod constants {
    pub const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    pub const SECTOR_SIZE_512: u32 = 512;
    pub const SECTOR_SIZE_4096: u32 = 4096;
    pub const MINI_SECTOR_SIZE: u32 = 64;
    pub const ENDOFCHAIN: u32 = 0xFFFFFFFE;
    pub const FATSECT: u32 = 0xFFFFFFFD;
    pub const FREESECT: u32 = 0xFFFFFFFF;
    pub const DIR_ENTRY_SIZE: usize = 128;
    pub const MAXREGSECT: u32 = 0xFFFFFFFA;
}

/// Opens an existing CFB container for reading.
pub fn parse_cfb<R: Read + Seek>(reader: &mut R) -> Result<CfbContainer> {
    CfbContainer::from_reader(reader)
}

/// Opens an existing CFB container from an in-memory byte buffer.
pub fn parse_cfb_bytes(data: &[u8]) -> Result<CfbContainer> {
    CfbContainer::from_bytes(data)
}

/// Starts a fresh, empty CFB container for writing.
pub fn create_cfb() -> CfbContainer {
    CfbContainer::create()
}
