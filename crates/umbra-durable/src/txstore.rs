//! Transaction store: timestamped records addressed by record number.
//!
//! Each record is a 64-bit millisecond timestamp followed by a fixed
//! number of payload words. A trailing partial record means the file
//! was torn mid-write and fails the open.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::trace;
use umbra_types::{Result, UmbraError};

use crate::reader::PagedReader;
use crate::{decode_header, encode_header, STORE_HEADER_LEN};

const TX_MAGIC: [u8; 4] = *b"UMBT";

pub struct TxStore {
    payload_words: usize,
    appender: Mutex<Appender>,
    reader: PagedReader,
}

struct Appender {
    writer: BufWriter<File>,
    len: u64,
    records: u64,
}

impl TxStore {
    pub fn open(path: &Path, payload_words: usize, region_size: u64) -> Result<Self> {
        if payload_words == 0 || payload_words > u16::MAX as usize {
            return Err(UmbraError::Invalid("payload width out of range"));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let mut len = file.metadata()?.len();
        if len == 0 {
            file.write_all(&encode_header(TX_MAGIC, payload_words as u16))?;
            file.sync_data()?;
            len = STORE_HEADER_LEN as u64;
        } else {
            if len < STORE_HEADER_LEN as u64 {
                return Err(UmbraError::CorruptedTransactionFile);
            }
            let mut header = [0u8; STORE_HEADER_LEN];
            let mut probe = File::open(path)?;
            probe.read_exact(&mut header)?;
            let stored = decode_header(&header, TX_MAGIC)?;
            if stored as usize != payload_words {
                return Err(UmbraError::CorruptedTransactionFile);
            }
        }
        let record_bytes = Self::record_bytes(payload_words);
        let body = len - STORE_HEADER_LEN as u64;
        if body % record_bytes != 0 {
            return Err(UmbraError::CorruptedTransactionFile);
        }
        let reader = PagedReader::open(path, region_size, len)?;
        Ok(Self {
            payload_words,
            appender: Mutex::new(Appender {
                writer: BufWriter::new(file),
                len,
                records: body / record_bytes,
            }),
            reader,
        })
    }

    fn record_bytes(payload_words: usize) -> u64 {
        8 + payload_words as u64 * 8
    }

    /// Appends one transaction record, returning its record number.
    pub fn append(&self, timestamp_millis: u64, payload: &[u64]) -> Result<u64> {
        if payload.len() != self.payload_words {
            return Err(UmbraError::Invalid("payload width mismatch"));
        }
        let mut appender = self.appender.lock();
        let index = appender.records;
        appender.writer.write_all(&timestamp_millis.to_be_bytes())?;
        for word in payload {
            appender.writer.write_all(&word.to_be_bytes())?;
        }
        appender.len += Self::record_bytes(self.payload_words);
        appender.records += 1;
        trace!(index, timestamp_millis, "txstore.append");
        Ok(index)
    }

    pub fn read(&self, index: u64) -> Result<(u64, Vec<u64>)> {
        let record_bytes = Self::record_bytes(self.payload_words);
        let offset = STORE_HEADER_LEN as u64 + index * record_bytes;
        let raw = self.reader.read(offset, record_bytes as usize)?;
        let timestamp = u64::from_be_bytes(raw[..8].try_into().expect("fixed prefix"));
        let payload = raw[8..]
            .chunks_exact(8)
            .map(|w| u64::from_be_bytes(w.try_into().expect("chunked to eight bytes")))
            .collect();
        Ok((timestamp, payload))
    }

    /// Records appended so far, including unflushed ones.
    pub fn record_count(&self) -> u64 {
        self.appender.lock().records
    }

    pub fn force(&self) -> Result<()> {
        let mut appender = self.appender.lock();
        appender.writer.flush()?;
        appender.writer.get_ref().sync_data()?;
        self.reader.set_visible_len(appender.len);
        trace!(records = appender.records, "txstore.force");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_REGION_SIZE;
    use std::fs::OpenOptions;

    #[test]
    fn records_round_trip_in_commit_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = TxStore::open(&dir.path().join("log.tx"), 2, DEFAULT_REGION_SIZE).unwrap();
        store.append(1_000, &[10, 1]).unwrap();
        store.append(2_000, &[11, 4]).unwrap();
        store.force().unwrap();
        assert_eq!(store.read(0).unwrap(), (1_000, vec![10, 1]));
        assert_eq!(store.read(1).unwrap(), (2_000, vec![11, 4]));
        assert_eq!(store.record_count(), 2);
    }

    #[test]
    fn torn_trailing_record_fails_the_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.tx");
        {
            let store = TxStore::open(&path, 2, DEFAULT_REGION_SIZE).unwrap();
            store.append(1_000, &[1, 2]).unwrap();
            store.force().unwrap();
        }
        // Tear the last record in half.
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 8).unwrap();
        drop(file);
        assert!(matches!(
            TxStore::open(&path, 2, DEFAULT_REGION_SIZE),
            Err(UmbraError::CorruptedTransactionFile)
        ));
    }

    #[test]
    fn payload_width_mismatch_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.tx");
        {
            TxStore::open(&path, 2, DEFAULT_REGION_SIZE).unwrap();
        }
        assert!(matches!(
            TxStore::open(&path, 3, DEFAULT_REGION_SIZE),
            Err(UmbraError::CorruptedTransactionFile)
        ));
    }
}
