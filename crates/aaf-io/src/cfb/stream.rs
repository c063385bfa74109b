use super::constants::*;
use super::directory::DirectoryEntry;
use super::fat::{FatTable, MiniFatTable};
use super::header::CfbHeader;
use aaf_core::errors::{AafError, Result};
use std::io::{Read, Seek};

/// A stream's bytes, already reassembled from its FAT or miniFAT chain.
/// AAF/MXF carry no essence compression in scope, so this is a plain byte
/// buffer — no zlib framing (spec §3 "Non-goals").
#[derive(Debug, Clone)]
pub struct Stream {
    pub name: String,
    pub data: Vec<u8>,
}

impl Stream {
    pub fn new(name: String, data: Vec<u8>) -> Self {
        Stream { name, data }
    }

    pub fn from_entry<R: Read + Seek>(
        reader: &mut R,
        entry: &DirectoryEntry,
        header: &CfbHeader,
        fat: &FatTable,
        mini_fat: Option<&MiniFatTable>,
    ) -> Result<Self> {
        if !entry.is_stream() {
            return Err(AafError::bad_format(format!("entry '{}' is not a stream", entry.name)));
        }

        let size = entry.stream_size;
        let mut data = if size == 0 {
            Vec::new()
        } else if size < header.mini_stream_cutoff_size as u64 {
            let mini_fat = mini_fat
                .ok_or_else(|| AafError::corruption("mini FAT not available for mini stream"))?;
            if entry.starting_sector != ENDOFCHAIN {
                mini_fat.read_chain(entry.starting_sector)?
            } else {
                Vec::new()
            }
        } else if entry.starting_sector != ENDOFCHAIN {
            fat.read_chain(reader, entry.starting_sector)?
        } else {
            Vec::new()
        };

        data.truncate(size as usize);
        Ok(Stream::new(entry.name.clone(), data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

/// A bounds-checked cursor over an in-memory stream buffer, used by the
/// property codec to read back what it just wrote without round-tripping
/// through a file (spec §4.2).
pub struct StreamReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> StreamReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        StreamReader { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.data.len()
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        if self.position + count > self.data.len() {
            return Err(AafError::corruption("attempted to skip past end of stream"));
        }
        self.position += count;
        Ok(())
    }

    pub fn peek(&self, count: usize) -> Option<&[u8]> {
        if self.position + count <= self.data.len() {
            Some(&self.data[self.position..self.position + count])
        } else {
            None
        }
    }
}

impl<'a> Read for StreamReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let available = self.remaining();
        let to_read = buf.len().min(available);
        if to_read > 0 {
            buf[..to_read].copy_from_slice(&self.data[self.position..self.position + to_read]);
            self.position += to_read;
        }
        Ok(to_read)
    }
}

impl<'a> Seek for StreamReader<'a> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            std::io::SeekFrom::Start(offset) => offset as i64,
            std::io::SeekFrom::Current(offset) => self.position as i64 + offset,
            std::io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
        };

        if new_pos < 0 || new_pos > self.data.len() as i64 {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek out of bounds"));
        }

        self.position = new_pos as usize;
        Ok(self.position as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_reader_tracks_position() {
        let data = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut reader = StreamReader::new(&data);

        assert_eq!(reader.remaining(), 10);
        assert!(!reader.is_eof());

        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [0, 1, 2]);

        reader.skip(2).unwrap();
        assert_eq!(reader.position(), 5);
        assert_eq!(reader.peek(2), Some(&[5, 6][..]));
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn append_grows_stream_data() {
        let mut stream = Stream::new("header".to_string(), vec![1, 2, 3]);
        stream.append(&[4, 5]);
        assert_eq!(stream.as_bytes(), &[1, 2, 3, 4, 5]);
    }
}
