use super::constants::*;
use aaf_core::errors::{AafError, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

/// CFB header (512 bytes) — spec §4.1 "Layout".
#[derive(Debug, Clone)]
pub struct CfbHeader {
    pub signature: [u8; 8],
    pub clsid: [u8; 16],
    pub minor_version: u16,
    pub major_version: u16,
    pub byte_order: u16,
    pub sector_shift: u16,
    pub mini_sector_shift: u16,
    pub reserved: [u8; 6],
    pub total_sectors: u32,
    pub fat_sectors: u32,
    pub first_dir_sector: u32,
    pub transaction_signature: u32,
    pub mini_stream_cutoff_size: u32,
    pub first_mini_fat_sector: u32,
    pub mini_fat_sectors: u32,
    pub first_difat_sector: u32,
    pub difat_sectors: u32,
    pub difat: [u32; 109],
}

impl CfbHeader {
    /// A fresh header for a newly created file: version 3 (512-byte
    /// sectors), mini-stream cutoff fixed at 4096 B per spec §9 Open
    /// Questions ("Mini-stream cutoff is format-configurable; fix at 4096 B
    /// for writes"), everything else empty/end-of-chain.
    pub fn new_for_write() -> Self {
        Self::new_for_write_with_sector_shift(9)
    }

    /// As `new_for_write`, but with a caller-chosen sector shift (9 ⇒ 512,
    /// 12 ⇒ 4096 bytes per sector, spec §4.1 "Layout"). Major version tracks
    /// the sector size per the CFB spec: v3 files use 512-byte sectors, v4
    /// files use 4096-byte sectors.
    pub fn new_for_write_with_sector_shift(sector_shift: u16) -> Self {
        let major_version = if sector_shift >= 12 { 4 } else { 3 };
        CfbHeader {
            signature: CFB_SIGNATURE,
            clsid: [0; 16],
            minor_version: 0x003e,
            major_version,
            byte_order: 0xFFFE,
            sector_shift,
            mini_sector_shift: 6,
            reserved: [0; 6],
            total_sectors: 0,
            fat_sectors: 0,
            first_dir_sector: ENDOFCHAIN,
            transaction_signature: 0,
            mini_stream_cutoff_size: 4096,
            first_mini_fat_sector: ENDOFCHAIN,
            mini_fat_sectors: 0,
            first_difat_sector: ENDOFCHAIN,
            difat_sectors: 0,
            difat: [FREESECT; 109],
        }
    }

    pub fn from_reader<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0)).map_err(AafError::Io)?;

        let mut signature = [0u8; 8];
        reader.read_exact(&mut signature).map_err(AafError::Io)?;
        if signature != CFB_SIGNATURE {
            return Err(AafError::bad_format("invalid CFB signature"));
        }

        let mut clsid = [0u8; 16];
        reader.read_exact(&mut clsid).map_err(AafError::Io)?;

        let mut rest = [0u8; 512 - 8 - 16];
        reader.read_exact(&mut rest).map_err(AafError::Io)?;
        let mut c = std::io::Cursor::new(&rest[..]);
        use byteorder::ReadBytesExt;

        let minor_version = c.read_u16::<LittleEndian>()?;
        let major_version = c.read_u16::<LittleEndian>()?;
        let byte_order = c.read_u16::<LittleEndian>()?;
        if byte_order != 0xFFFE {
            return Err(AafError::bad_format("invalid CFB byte order marker"));
        }
        let sector_shift = c.read_u16::<LittleEndian>()?;
        let mini_sector_shift = c.read_u16::<LittleEndian>()?;
        let mut reserved = [0u8; 6];
        c.read_exact(&mut reserved)?;
        let total_sectors = c.read_u32::<LittleEndian>()?;
        let fat_sectors = c.read_u32::<LittleEndian>()?;
        let first_dir_sector = c.read_u32::<LittleEndian>()?;
        let transaction_signature = c.read_u32::<LittleEndian>()?;
        let mini_stream_cutoff_size = c.read_u32::<LittleEndian>()?;
        let first_mini_fat_sector = c.read_u32::<LittleEndian>()?;
        let mini_fat_sectors = c.read_u32::<LittleEndian>()?;
        let first_difat_sector = c.read_u32::<LittleEndian>()?;
        let difat_sectors = c.read_u32::<LittleEndian>()?;
        let mut difat = [0u32; 109];
        for slot in difat.iter_mut() {
            *slot = c.read_u32::<LittleEndian>()?;
        }

        let header = CfbHeader {
            signature,
            clsid,
            minor_version,
            major_version,
            byte_order,
            sector_shift,
            mini_sector_shift,
            reserved,
            total_sectors,
            fat_sectors,
            first_dir_sector,
            transaction_signature,
            mini_stream_cutoff_size,
            first_mini_fat_sector,
            mini_fat_sectors,
            first_difat_sector,
            difat_sectors,
            difat,
        };

        if !header.is_valid_version() {
            return Err(AafError::bad_format(format!(
                "unsupported CFB version: {}",
                header.major_version
            )));
        }

        Ok(header)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.signature)?;
        w.write_all(&self.clsid)?;
        w.write_u16::<LittleEndian>(self.minor_version)?;
        w.write_u16::<LittleEndian>(self.major_version)?;
        w.write_u16::<LittleEndian>(self.byte_order)?;
        w.write_u16::<LittleEndian>(self.sector_shift)?;
        w.write_u16::<LittleEndian>(self.mini_sector_shift)?;
        w.write_all(&self.reserved)?;
        w.write_u32::<LittleEndian>(self.total_sectors)?;
        w.write_u32::<LittleEndian>(self.fat_sectors)?;
        w.write_u32::<LittleEndian>(self.first_dir_sector)?;
        w.write_u32::<LittleEndian>(self.transaction_signature)?;
        w.write_u32::<LittleEndian>(self.mini_stream_cutoff_size)?;
        w.write_u32::<LittleEndian>(self.first_mini_fat_sector)?;
        w.write_u32::<LittleEndian>(self.mini_fat_sectors)?;
        w.write_u32::<LittleEndian>(self.first_difat_sector)?;
        w.write_u32::<LittleEndian>(self.difat_sectors)?;
        for slot in self.difat.iter() {
            w.write_u32::<LittleEndian>(*slot)?;
        }
        Ok(())
    }

    pub fn sector_size(&self) -> u32 {
        1 << self.sector_shift
    }

    pub fn mini_sector_size(&self) -> u32 {
        1 << self.mini_sector_shift
    }

    pub fn is_valid_version(&self) -> bool {
        matches!(self.major_version, 3 | 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_size_is_512_bytes() {
        assert_eq!(
            8 + 16 + 2 + 2 + 2 + 2 + 2 + 6 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + (109 * 4),
            512
        );
    }

    #[test]
    fn fresh_header_round_trips_through_bytes() {
        let header = CfbHeader::new_for_write();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 512);

        let mut cursor = Cursor::new(buf);
        let parsed = CfbHeader::from_reader(&mut cursor).unwrap();
        assert_eq!(parsed.sector_size(), 512);
        assert_eq!(parsed.mini_sector_size(), 64);
        assert_eq!(parsed.mini_stream_cutoff_size, 4096);
        assert!(parsed.is_valid_version());
    }

    #[test]
    fn rejects_bad_signature() {
        let mut buf = vec![0u8; 512];
        buf[0] = 0x00;
        let mut cursor = Cursor::new(buf);
        assert!(CfbHeader::from_reader(&mut cursor).is_err());
    }
}
