//! CFB storage (C1), AAF persistence (C5), and the MXF KLV parser (C6).
//!
//! `aaf-core` defines the types; this crate owns every byte that touches a
//! file or a `Read + Seek` stream.

pub mod cfb;
pub mod mxf;
pub mod persist;
pub mod reader;

pub use cfb::{CfbContainer, OpenMode};
pub use mxf::MxfFile;
pub use persist::{AafFile, WriteOptions};
pub use reader::ByteReader;

use aaf_core::errors::Result;

/// Opens an AAF file from disk for reading.
pub fn open_aaf(path: &str) -> Result<AafFile> {
    AafFile::open(path)
}

/// Parses an MXF file from raw bytes.
pub fn parse_mxf(data: &[u8]) -> Result<MxfFile> {
    MxfFile::parse(data)
}
