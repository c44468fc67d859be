//! Compression layer
//!
//! zstd compression for leaf page payloads and large records, plus the
//! crc32 checksum stored next to every payload. A failed decompression is
//! reported against the page it came from and never retried.

use crate::config::Compression;
use crate::error::{PackError, Result};

use super::PageId;

/// Checksum of an uncompressed payload
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Compress `bytes` with zstd at `level`
pub fn compress(bytes: &[u8], level: i32) -> Result<Vec<u8>> {
    zstd::bulk::compress(bytes, level).map_err(PackError::Io)
}

/// Decompress a zstd frame that must expand to exactly `expected_size` bytes
pub fn decompress(page: PageId, bytes: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let out = zstd::bulk::decompress(bytes, expected_size).map_err(|e| {
        PackError::PageDecompressionFailed {
            page,
            reason: format!("zstd: {e}"),
        }
    })?;
    if out.len() != expected_size {
        return Err(PackError::PageDecompressionFailed {
            page,
            reason: format!("expanded to {} bytes, expected {}", out.len(), expected_size),
        });
    }
    Ok(out)
}

/// Compressed form of `bytes` when compression is on and it saves space
pub fn compress_if_smaller(bytes: &[u8], compression: Compression) -> Result<Option<Vec<u8>>> {
    match compression {
        Compression::None => Ok(None),
        Compression::Zstd { level } => {
            if bytes.is_empty() {
                return Ok(None);
            }
            let compressed = compress(bytes, level)?;
            Ok((compressed.len() < bytes.len()).then_some(compressed))
        }
    }
}
