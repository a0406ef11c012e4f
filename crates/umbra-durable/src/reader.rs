//! Memory-mapped paged reads over an append-only file.
//!
//! One region of a fixed size is mapped at a time and re-mapped on
//! demand when a read straddles a region boundary or lands past the
//! mapped tail. The visible length only advances on `force`, so
//! readers never observe in-flight writes.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;
use tracing::trace;
use umbra_types::{Result, UmbraError};

pub const DEFAULT_REGION_SIZE: u64 = 1 << 30;

/// Mapping alignment, generous enough for every supported page size.
const REGION_ALIGN: u64 = 1 << 16;

pub struct PagedReader {
    file: File,
    region_size: u64,
    state: Mutex<ReaderState>,
}

struct ReaderState {
    visible_len: u64,
    region_start: u64,
    map: Option<Mmap>,
}

impl PagedReader {
    pub fn open(path: &Path, region_size: u64, visible_len: u64) -> Result<Self> {
        if region_size == 0 {
            return Err(UmbraError::Invalid("region size must be positive"));
        }
        let file = File::open(path)?;
        Ok(Self {
            file,
            region_size,
            state: Mutex::new(ReaderState {
                visible_len,
                region_start: 0,
                map: None,
            }),
        })
    }

    /// Advances the flushed high-water mark; called by the owning
    /// store's `force`.
    pub fn set_visible_len(&self, len: u64) {
        let mut state = self.state.lock();
        state.visible_len = len;
    }

    pub fn visible_len(&self) -> u64 {
        self.state.lock().visible_len
    }

    /// Fills `dst` from `offset`, re-mapping regions as the read
    /// crosses them.
    pub fn read_into(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        let end = offset + dst.len() as u64;
        if end > state.visible_len {
            return Err(UmbraError::BeyondEndOfFile {
                region: offset / self.region_size,
                offset,
            });
        }
        let mut cursor = offset;
        let mut filled = 0usize;
        while filled < dst.len() {
            self.ensure_mapped(&mut state, cursor)?;
            let map = state.map.as_ref().expect("region mapped by ensure_mapped");
            let within = (cursor - state.region_start) as usize;
            let available = map.len() - within;
            let take = available.min(dst.len() - filled);
            dst[filled..filled + take].copy_from_slice(&map[within..within + take]);
            filled += take;
            cursor += take as u64;
        }
        Ok(())
    }

    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Maps the region containing `offset` unless the current map
    /// already covers it.
    fn ensure_mapped(&self, state: &mut ReaderState, offset: u64) -> Result<()> {
        if let Some(map) = &state.map {
            let covered = offset >= state.region_start
                && offset < state.region_start + map.len() as u64;
            if covered {
                return Ok(());
            }
        }
        let region_start = (offset / self.region_size) * self.region_size;
        // Mappings must start page-aligned; round the region start
        // down and absorb the slack into the mapped length.
        let map_start = region_start & !(REGION_ALIGN - 1);
        let region_end = (region_start + self.region_size).min(state.visible_len);
        if region_end <= offset {
            return Err(UmbraError::BeyondEndOfFile {
                region: offset / self.region_size,
                offset,
            });
        }
        let len = region_end - map_start;
        // SAFETY: the mapping is read-only and the store never
        // truncates its file; appended bytes past `visible_len` are
        // unreachable through this map.
        let map = unsafe {
            MmapOptions::new()
                .offset(map_start)
                .len(len as usize)
                .map(&self.file)?
        };
        trace!(map_start, len, "reader.remap");
        state.region_start = map_start;
        state.map = Some(map);
        Ok(())
    }
}
