//! Structured binary I/O for codec files.
//!
//! Every codec file is written through a [`StructWriter`], which keeps a running
//! CRC32 of everything written and appends it as a 4-byte little-endian footer
//! on [`StructWriter::close`]. Readers load the whole file with
//! [`read_checked`], which verifies the footer and hands back a
//! [`SliceReader`] over the body.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Result, TesseraError};
use crate::storage::{Storage, StorageOutput};
use crate::util::varint::{decode_u32, decode_u64, encode_u64_into};

/// Size of the checksum footer in bytes.
pub const FOOTER_LEN: usize = 4;

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: crc32fast::Hasher,
    position: u64,
    scratch: Vec<u8>,
}

impl<W: StorageOutput> std::fmt::Debug for StructWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructWriter")
            .field("writer", &self.writer)
            .field("position", &self.position)
            .finish()
    }
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: crc32fast::Hasher::new(),
            position: 0,
            scratch: Vec::with_capacity(16),
        }
    }

    /// Write a file header: magic number then format version.
    pub fn write_header(&mut self, magic: u32, version: u32) -> Result<()> {
        self.write_u32(magic)?;
        self.write_u32(version)
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let mut encoded = std::mem::take(&mut self.scratch);
        encoded.clear();
        encode_u64_into(&mut encoded, value);
        let result = self.write_raw(&encoded);
        self.scratch = encoded;
        result
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append the checksum footer and close the underlying output.
    pub fn close(self) -> Result<()> {
        let StructWriter {
            mut writer, hasher, ..
        } = self;
        writer.write_u32::<LittleEndian>(hasher.finalize())?;
        writer.flush()?;
        writer.close()
    }
}

/// Load `name` and verify its checksum footer.
///
/// The returned reader covers the file body, excluding the footer.
pub fn read_checked(storage: &dyn Storage, name: &str) -> Result<SliceReader> {
    let data = storage.read_all(name)?;
    if data.len() < FOOTER_LEN {
        return Err(TesseraError::codec(format!(
            "File {name} is too short for a checksum footer ({} bytes)",
            data.len()
        )));
    }

    let body_len = data.len() - FOOTER_LEN;
    let stored = LittleEndian::read_u32(&data[body_len..]);
    let actual = crc32fast::hash(&data[..body_len]);
    if stored != actual {
        return Err(TesseraError::codec(format!(
            "Checksum mismatch in {name}: stored {stored:#010x}, computed {actual:#010x}"
        )));
    }

    Ok(SliceReader::with_range(data, 0, body_len))
}

/// A clonable cursor over a shared byte buffer.
///
/// Clones share the buffer and move independently, which is how several
/// enumerators read the same loaded file at once.
#[derive(Clone)]
pub struct SliceReader {
    data: Arc<[u8]>,
    start: usize,
    end: usize,
    pos: usize,
}

impl std::fmt::Debug for SliceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceReader")
            .field("len", &self.len())
            .field("position", &self.position())
            .finish()
    }
}

impl SliceReader {
    /// Create a reader over the whole buffer.
    pub fn new(data: Arc<[u8]>) -> Self {
        let end = data.len();
        SliceReader::with_range(data, 0, end)
    }

    fn with_range(data: Arc<[u8]>, start: usize, end: usize) -> Self {
        SliceReader {
            data,
            start,
            end,
            pos: start,
        }
    }

    /// Check the magic number and version written by [`StructWriter::write_header`].
    pub fn check_header(&mut self, magic: u32, version: u32) -> Result<()> {
        let found = self.read_u32()?;
        if found != magic {
            return Err(TesseraError::codec(format!(
                "Bad magic number: expected {magic:#010x}, found {found:#010x}"
            )));
        }
        let found = self.read_u32()?;
        if found != version {
            return Err(TesseraError::codec(format!(
                "Unsupported format version {found} (expected {version})"
            )));
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        if self.end - self.pos < len {
            return Err(TesseraError::codec(format!(
                "Unexpected end of data: need {len} bytes at offset {}, {} available",
                self.pos,
                self.end - self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, read) = decode_u64(&self.data[self.pos..self.end])?;
        self.pos += read;
        Ok(value)
    }

    /// Read a variable-length integer that must fit in a u32.
    pub fn read_varint_u32(&mut self) -> Result<u32> {
        let (value, read) = decode_u32(&self.data[self.pos..self.end])?;
        self.pos += read;
        Ok(value)
    }

    /// Read exactly `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> Result<&[u8]> {
        self.take(len)
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| TesseraError::codec(format!("Invalid UTF-8: {e}")))
    }

    /// Borrow `len` bytes at an absolute body offset without moving.
    pub fn bytes_at(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let begin = self.start + offset as usize;
        match begin.checked_add(len) {
            Some(finish) if finish <= self.end => Ok(&self.data[begin..finish]),
            _ => Err(TesseraError::codec(format!(
                "Range {offset}+{len} past end of data ({})",
                self.end - self.start
            ))),
        }
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Move to an absolute offset within the file body.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        let target = self.start + offset as usize;
        if target > self.end {
            return Err(TesseraError::codec(format!(
                "Seek to {offset} past end of data ({})",
                self.end - self.start
            )));
        }
        self.pos = target;
        Ok(())
    }

    /// Current offset within the file body.
    pub fn position(&self) -> u64 {
        (self.pos - self.start) as u64
    }

    /// Length of the file body.
    pub fn len(&self) -> u64 {
        (self.end - self.start) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether every byte has been consumed.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn write_sample(storage: &MemoryStorage) {
        let output = storage.create_output("sample.bin").unwrap();
        let mut writer = StructWriter::new(output);
        writer.write_header(0x5445_5353, 1).unwrap();
        writer.write_u8(7).unwrap();
        writer.write_varint(300).unwrap();
        writer.write_string("postings").unwrap();
        writer.write_u64(u64::MAX).unwrap();
        assert_eq!(writer.position(), 8 + 1 + 2 + 9 + 8);
        writer.close().unwrap();
    }

    #[test]
    fn test_write_and_read_checked() {
        let storage = MemoryStorage::default();
        write_sample(&storage);

        assert_eq!(
            storage.read_all("sample.bin").unwrap().len(),
            8 + 1 + 2 + 9 + 8 + FOOTER_LEN
        );

        let mut reader = read_checked(&storage, "sample.bin").unwrap();
        reader.check_header(0x5445_5353, 1).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert_eq!(reader.read_string().unwrap(), "postings");
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert!(reader.is_eof());
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let storage = MemoryStorage::default();
        write_sample(&storage);
        storage.corrupt_byte("sample.bin", 9).unwrap();

        let err = read_checked(&storage, "sample.bin").unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_bad_header_detected() {
        let storage = MemoryStorage::default();
        write_sample(&storage);

        let mut reader = read_checked(&storage, "sample.bin").unwrap();
        assert!(reader.check_header(0xDEAD_BEEF, 1).is_err());

        let mut reader = read_checked(&storage, "sample.bin").unwrap();
        let err = reader.check_header(0x5445_5353, 2).unwrap_err();
        assert!(err.to_string().contains("Unsupported format version"));
    }

    #[test]
    fn test_short_file_rejected() {
        let storage = MemoryStorage::default();
        let mut output = storage.create_output("short.bin").unwrap();
        output.write_all(&[1, 2]).unwrap();
        output.close().unwrap();

        assert!(read_checked(&storage, "short.bin").is_err());
    }

    #[test]
    fn test_slice_reader_clones_move_independently() {
        let mut reader = SliceReader::new(Arc::from(vec![1u8, 2, 3, 4]));
        reader.seek(2).unwrap();

        let mut clone = reader.clone();
        clone.seek(0).unwrap();

        assert_eq!(reader.read_u8().unwrap(), 3);
        assert_eq!(clone.read_raw(2).unwrap(), &[1, 2]);
        assert_eq!(reader.position(), 3);
        assert_eq!(reader.len(), 4);
        assert!(reader.seek(5).is_err());

        assert_eq!(reader.bytes_at(1, 2).unwrap(), &[2, 3]);
        assert_eq!(reader.position(), 3);
        assert!(reader.bytes_at(3, 2).is_err());
    }
}
