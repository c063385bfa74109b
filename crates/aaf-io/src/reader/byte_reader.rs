//! A bounds-checked byte cursor shared by the CFB reader (little-endian
//! sector/directory fields) and the MXF KLV parser (big-endian wire
//! values). Every read reports `Corruption` on underflow instead of
//! panicking — "Read past EOF of a stream → Corruption" (spec §4.1).

use aaf_core::errors::{AafError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

pub struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
    size: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { size: data.len(), cursor: Cursor::new(data) }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.size.saturating_sub(self.position())
    }

    pub fn is_eof(&self) -> bool {
        self.remaining() == 0
    }

    fn underflow(&self, requested: usize) -> AafError {
        AafError::corruption(format!(
            "buffer underflow: requested {requested} bytes, {} available",
            self.remaining()
        ))
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(self.underflow(n));
        }
        self.cursor.seek(SeekFrom::Current(n as i64)).map_err(AafError::Io)?;
        Ok(())
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.size {
            return Err(self.underflow(pos));
        }
        self.cursor.seek(SeekFrom::Start(pos as u64)).map_err(AafError::Io)?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(self.underflow(1));
        }
        Ok(self.cursor.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        if self.remaining() < 1 {
            return Err(self.underflow(1));
        }
        Ok(self.cursor.read_i8()?)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(self.underflow(2));
        }
        Ok(self.cursor.read_u16::<LittleEndian>()?)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(self.underflow(2));
        }
        Ok(self.cursor.read_u16::<BigEndian>()?)
    }

    pub fn read_i16_be(&mut self) -> Result<i16> {
        if self.remaining() < 2 {
            return Err(self.underflow(2));
        }
        Ok(self.cursor.read_i16::<BigEndian>()?)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(self.underflow(4));
        }
        Ok(self.cursor.read_u32::<LittleEndian>()?)
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(self.underflow(4));
        }
        Ok(self.cursor.read_u32::<BigEndian>()?)
    }

    pub fn read_i32_be(&mut self) -> Result<i32> {
        if self.remaining() < 4 {
            return Err(self.underflow(4));
        }
        Ok(self.cursor.read_i32::<BigEndian>()?)
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        if self.remaining() < 8 {
            return Err(self.underflow(8));
        }
        Ok(self.cursor.read_u64::<LittleEndian>()?)
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        if self.remaining() < 8 {
            return Err(self.underflow(8));
        }
        Ok(self.cursor.read_u64::<BigEndian>()?)
    }

    pub fn read_i64_be(&mut self) -> Result<i64> {
        if self.remaining() < 8 {
            return Err(self.underflow(8));
        }
        Ok(self.cursor.read_i64::<BigEndian>()?)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.remaining() < n {
            return Err(self.underflow(n));
        }
        let mut buf = vec![0u8; n];
        self.cursor.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = buf.len();
        if self.remaining() < n {
            return Err(self.underflow(n));
        }
        self.cursor.read_exact(buf)?;
        Ok(())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a zero-terminated UTF-16LE string (spec §4.2 "zero-terminated
    /// where length-prefixed is absent").
    pub fn read_utf16le_z(&mut self) -> Result<String> {
        let mut units = Vec::new();
        loop {
            let unit = self.read_u16_le()?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        String::from_utf16(&units)
            .map_err(|e| AafError::bad_format(format!("invalid UTF-16LE string: {e}")))
    }

    /// Reads a big-endian UTF-16 string, stopping at a zero code unit or the
    /// byte budget — the MXF wire form (spec §4.6's `decode_utf16be`).
    pub fn read_utf16be_bounded(&mut self, byte_len: usize) -> Result<String> {
        let bytes = self.read_bytes(byte_len)?;
        let mut units = Vec::with_capacity(byte_len / 2);
        for chunk in bytes.chunks_exact(2) {
            let unit = BigEndian::read_u16(chunk);
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        String::from_utf16(&units)
            .map_err(|e| AafError::bad_format(format!("invalid UTF-16BE string: {e}")))
    }

    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let remaining = self.remaining();
        self.read_bytes(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_and_big_endian() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16_le().unwrap(), 0x0201);
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16_be().unwrap(), 0x0102);
    }

    #[test]
    fn underflow_is_corruption() {
        let data = [0x01];
        let mut r = ByteReader::new(&data);
        let err = r.read_u32_be().unwrap_err();
        assert!(matches!(err, AafError::Corruption { .. }));
    }

    #[test]
    fn utf16le_z_round_trip() {
        let mut data = Vec::new();
        for ch in "Picture".encode_utf16() {
            data.extend_from_slice(&ch.to_le_bytes());
        }
        data.extend_from_slice(&[0, 0]);
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_utf16le_z().unwrap(), "Picture");
    }

    #[test]
    fn utf16be_bounded_stops_at_nul() {
        let mut data = Vec::new();
        for ch in "Seq".encode_utf16() {
            data.extend_from_slice(&ch.to_be_bytes());
        }
        data.extend_from_slice(&[0, 0, 0, 0]);
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_utf16be_bounded(data.len()).unwrap(), "Seq");
    }
}
