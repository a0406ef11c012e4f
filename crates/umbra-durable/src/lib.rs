//! Append-only persistence collaborators.
//!
//! Three files back a durable graph: the flat store holds
//! arbitrary-size encoded values addressed by byte offset, the
//! records store holds fixed-width rows of 64-bit words, and the
//! transaction store holds timestamped transaction records addressed
//! by record number. All reads go through a memory-mapped paged
//! reader; writes are append-only and invisible to readers until
//! `force`.

pub mod flat;
pub mod reader;
pub mod records;
pub mod txstore;

use umbra_types::{Result, UmbraError};

pub use flat::FlatStore;
pub use reader::{PagedReader, DEFAULT_REGION_SIZE};
pub use records::RecordStore;
pub use txstore::TxStore;

pub(crate) const STORE_HEADER_LEN: usize = 16;
pub(crate) const STORE_FORMAT_VERSION: u16 = 1;

/// 16-byte store header: magic, format version, one store-specific
/// word, crc32 over the first twelve bytes, reserved zeros.
pub(crate) fn encode_header(magic: [u8; 4], extra: u16) -> [u8; STORE_HEADER_LEN] {
    let mut buf = [0u8; STORE_HEADER_LEN];
    buf[0..4].copy_from_slice(&magic);
    buf[4..6].copy_from_slice(&STORE_FORMAT_VERSION.to_be_bytes());
    buf[6..8].copy_from_slice(&extra.to_be_bytes());
    let crc = crc32fast::hash(&buf[..8]);
    buf[8..12].copy_from_slice(&crc.to_be_bytes());
    buf
}

pub(crate) fn decode_header(src: &[u8], magic: [u8; 4]) -> Result<u16> {
    if src.len() < STORE_HEADER_LEN {
        return Err(UmbraError::Corruption("store header truncated"));
    }
    if src[0..4] != magic {
        return Err(UmbraError::Corruption("store magic mismatch"));
    }
    let version = u16::from_be_bytes([src[4], src[5]]);
    if version != STORE_FORMAT_VERSION {
        return Err(UmbraError::Corruption("unsupported store format version"));
    }
    let extra = u16::from_be_bytes([src[6], src[7]]);
    let stored_crc = u32::from_be_bytes([src[8], src[9], src[10], src[11]]);
    if crc32fast::hash(&src[..8]) != stored_crc {
        return Err(UmbraError::Corruption("store header crc mismatch"));
    }
    if src[12..16] != [0; 4] {
        return Err(UmbraError::Corruption("store header reserved bytes not zero"));
    }
    Ok(extra)
}
