//! Flat store: append-only, offset-addressed encoded objects.
//!
//! Records are a u32 length prefix followed by the payload. `append`
//! returns the record's byte offset, which is the stable address
//! callers keep; `read` decodes one record back.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::trace;
use umbra_types::{Result, UmbraError};

use crate::reader::PagedReader;
use crate::{decode_header, encode_header, STORE_HEADER_LEN};

const FLAT_MAGIC: [u8; 4] = *b"UMBF";

pub struct FlatStore {
    appender: Mutex<Appender>,
    reader: PagedReader,
}

struct Appender {
    writer: BufWriter<File>,
    len: u64,
}

impl FlatStore {
    pub fn open(path: &Path, region_size: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let mut len = file.metadata()?.len();
        if len == 0 {
            file.write_all(&encode_header(FLAT_MAGIC, 0))?;
            file.sync_data()?;
            len = STORE_HEADER_LEN as u64;
        } else {
            let mut header = [0u8; STORE_HEADER_LEN];
            let mut probe = File::open(path)?;
            probe.read_exact(&mut header)?;
            decode_header(&header, FLAT_MAGIC)?;
        }
        let reader = PagedReader::open(path, region_size, len)?;
        Ok(Self {
            appender: Mutex::new(Appender {
                writer: BufWriter::new(file),
                len,
            }),
            reader,
        })
    }

    /// Appends one record, returning its byte offset. The record is
    /// not readable until [`FlatStore::force`].
    pub fn append(&self, payload: &[u8]) -> Result<u64> {
        if payload.len() > u32::MAX as usize {
            return Err(UmbraError::Invalid("flat record larger than 4GB"));
        }
        let mut appender = self.appender.lock();
        let offset = appender.len;
        appender
            .writer
            .write_all(&(payload.len() as u32).to_be_bytes())?;
        appender.writer.write_all(payload)?;
        appender.len += 4 + payload.len() as u64;
        trace!(offset, len = payload.len(), "flat.append");
        Ok(offset)
    }

    /// Reads the record at `offset`.
    pub fn read(&self, offset: u64) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.reader.read_into(offset, &mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        self.reader.read(offset + 4, len)
    }

    /// Flushes appended records and publishes them to readers.
    pub fn force(&self) -> Result<()> {
        let mut appender = self.appender.lock();
        appender.writer.flush()?;
        appender.writer.get_ref().sync_data()?;
        self.reader.set_visible_len(appender.len);
        trace!(len = appender.len, "flat.force");
        Ok(())
    }

    /// Bytes durably visible to readers.
    pub fn visible_len(&self) -> u64 {
        self.reader.visible_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_REGION_SIZE;

    #[test]
    fn append_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatStore::open(&dir.path().join("values.flat"), DEFAULT_REGION_SIZE).unwrap();
        let a = store.append(b"first value").unwrap();
        let b = store.append(b"").unwrap();
        let c = store.append(&[0xAB; 1000]).unwrap();
        store.force().unwrap();
        assert_eq!(store.read(a).unwrap(), b"first value");
        assert_eq!(store.read(b).unwrap(), b"");
        assert_eq!(store.read(c).unwrap(), vec![0xAB; 1000]);
    }

    #[test]
    fn unforced_appends_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatStore::open(&dir.path().join("values.flat"), DEFAULT_REGION_SIZE).unwrap();
        let offset = store.append(b"pending").unwrap();
        assert!(matches!(
            store.read(offset),
            Err(UmbraError::BeyondEndOfFile { .. })
        ));
        store.force().unwrap();
        assert_eq!(store.read(offset).unwrap(), b"pending");
    }

    #[test]
    fn reopen_preserves_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.flat");
        let offset = {
            let store = FlatStore::open(&path, DEFAULT_REGION_SIZE).unwrap();
            let offset = store.append(b"durable").unwrap();
            store.force().unwrap();
            offset
        };
        let store = FlatStore::open(&path, DEFAULT_REGION_SIZE).unwrap();
        assert_eq!(store.read(offset).unwrap(), b"durable");
    }

    #[test]
    fn foreign_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.flat");
        std::fs::write(&path, b"not a flat store header").unwrap();
        assert!(matches!(
            FlatStore::open(&path, DEFAULT_REGION_SIZE),
            Err(UmbraError::Corruption(_))
        ));
    }
}
