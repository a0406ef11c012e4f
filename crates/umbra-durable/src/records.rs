//! Records store: fixed-width rows of 64-bit words, addressed by row
//! number.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::trace;
use umbra_types::{Result, UmbraError};

use crate::reader::PagedReader;
use crate::{decode_header, encode_header, STORE_HEADER_LEN};

const RECORDS_MAGIC: [u8; 4] = *b"UMBR";

pub struct RecordStore {
    row_words: usize,
    appender: Mutex<Appender>,
    reader: PagedReader,
}

struct Appender {
    writer: BufWriter<File>,
    len: u64,
    rows: u64,
}

impl RecordStore {
    pub fn open(path: &Path, row_words: usize, region_size: u64) -> Result<Self> {
        if row_words == 0 || row_words > u16::MAX as usize {
            return Err(UmbraError::Invalid("row width out of range"));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let mut len = file.metadata()?.len();
        if len == 0 {
            file.write_all(&encode_header(RECORDS_MAGIC, row_words as u16))?;
            file.sync_data()?;
            len = STORE_HEADER_LEN as u64;
        } else {
            let mut header = [0u8; STORE_HEADER_LEN];
            let mut probe = File::open(path)?;
            probe.read_exact(&mut header)?;
            let stored = decode_header(&header, RECORDS_MAGIC)?;
            if stored as usize != row_words {
                return Err(UmbraError::Corruption("records store row width mismatch"));
            }
        }
        let row_bytes = row_words as u64 * 8;
        let body = len - STORE_HEADER_LEN as u64;
        if body % row_bytes != 0 {
            return Err(UmbraError::Corruption("records store has a torn row"));
        }
        let reader = PagedReader::open(path, region_size, len)?;
        Ok(Self {
            row_words,
            appender: Mutex::new(Appender {
                writer: BufWriter::new(file),
                len,
                rows: body / row_bytes,
            }),
            reader,
        })
    }

    /// Appends one row, returning its row number.
    pub fn append_row(&self, row: &[u64]) -> Result<u64> {
        if row.len() != self.row_words {
            return Err(UmbraError::Invalid("row width mismatch"));
        }
        let mut appender = self.appender.lock();
        let index = appender.rows;
        for word in row {
            appender.writer.write_all(&word.to_be_bytes())?;
        }
        appender.len += self.row_words as u64 * 8;
        appender.rows += 1;
        trace!(index, "records.append");
        Ok(index)
    }

    pub fn read_row(&self, index: u64) -> Result<Vec<u64>> {
        let row_bytes = self.row_words * 8;
        let offset = STORE_HEADER_LEN as u64 + index * row_bytes as u64;
        let raw = self.reader.read(offset, row_bytes)?;
        Ok(raw
            .chunks_exact(8)
            .map(|w| u64::from_be_bytes(w.try_into().expect("chunked to eight bytes")))
            .collect())
    }

    /// Rows appended so far, including unflushed ones.
    pub fn row_count(&self) -> u64 {
        self.appender.lock().rows
    }

    pub fn force(&self) -> Result<()> {
        let mut appender = self.appender.lock();
        appender.writer.flush()?;
        appender.writer.get_ref().sync_data()?;
        self.reader.set_visible_len(appender.len);
        trace!(rows = appender.rows, "records.force");
        Ok(())
    }
}
