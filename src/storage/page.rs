//! Page framing
//!
//! Every page after the file header starts with a 32-byte header:
//!
//! ```text
//! ┌────────┬────────┬───────────┬────────────┬─────────┬──────────┬──────────┬──────────┐
//! │Type (1)│Flags(1)│Entries (2)│ Stored (4) │ Raw (4) │ CRC (4)  │ Link A(8)│ Link B(8)│
//! └────────┴────────┴───────────┴────────────┴─────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! Link A is the next free page, next leaf sibling, leftmost index child or
//! overflow continuation depending on the page type. Link B is the previous
//! leaf sibling. The CRC covers the uncompressed payload.

use std::borrow::Cow;

use crate::config::Compression;
use crate::error::{PackError, Result};

use super::compress;
use super::{PageId, NO_PAGE};

/// Size of the per-page header
pub const PAGE_HEADER_SIZE: usize = 32;

/// Payload is zstd compressed
pub const FLAG_COMPRESSED: u8 = 0x01;

/// Page type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PageType {
    Free = 0,
    Leaf = 1,
    Index = 2,
    Metadata = 3,
    Overflow = 4,
}

impl PageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PageType::Free),
            1 => Some(PageType::Leaf),
            2 => Some(PageType::Index),
            3 => Some(PageType::Metadata),
            4 => Some(PageType::Overflow),
            _ => None,
        }
    }
}

/// Decoded page header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub flags: u8,
    pub entry_count: u16,
    pub stored_len: u32,
    pub raw_len: u32,
    pub checksum: u32,
    pub link_a: PageId,
    pub link_b: PageId,
}

impl PageHeader {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            flags: 0,
            entry_count: 0,
            stored_len: 0,
            raw_len: 0,
            checksum: 0,
            link_a: NO_PAGE,
            link_b: NO_PAGE,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0] = self.page_type as u8;
        buf[1] = self.flags;
        buf[2..4].copy_from_slice(&self.entry_count.to_be_bytes());
        buf[4..8].copy_from_slice(&self.stored_len.to_be_bytes());
        buf[8..12].copy_from_slice(&self.raw_len.to_be_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_be_bytes());
        buf[16..24].copy_from_slice(&self.link_a.to_be_bytes());
        buf[24..32].copy_from_slice(&self.link_b.to_be_bytes());
    }

    pub fn read_from(page: PageId, buf: &[u8]) -> Result<Self> {
        if buf.len() < PAGE_HEADER_SIZE {
            return Err(PackError::corrupt_node(page, "page shorter than its header"));
        }
        let page_type = PageType::from_byte(buf[0])
            .ok_or_else(|| PackError::corrupt_node(page, format!("unknown page type {}", buf[0])))?;
        let u32_at = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[at..at + 8]);
            u64::from_be_bytes(raw)
        };

        Ok(Self {
            page_type,
            flags: buf[1],
            entry_count: u16::from_be_bytes([buf[2], buf[3]]),
            stored_len: u32_at(4),
            raw_len: u32_at(8),
            checksum: u32_at(12),
            link_a: u64_at(16),
            link_b: u64_at(24),
        })
    }
}

/// A page header plus its uncompressed, checksum-verified payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header: PageHeader,
    pub payload: Vec<u8>,
}

impl Page {
    pub fn new(page_type: PageType, payload: Vec<u8>) -> Self {
        Self {
            header: PageHeader::new(page_type),
            payload,
        }
    }

    /// Serialize into a full page buffer
    ///
    /// Leaf payloads are compressed when `compression` is on and it helps;
    /// other page types are always stored raw.
    pub fn encode(&self, page: PageId, page_size: usize, compression: Compression) -> Result<Vec<u8>> {
        let capacity = page_size - PAGE_HEADER_SIZE;
        if self.payload.len() > capacity {
            return Err(PackError::corrupt_node(
                page,
                format!("payload of {} bytes exceeds capacity {}", self.payload.len(), capacity),
            ));
        }

        let mut header = self.header.clone();
        header.flags &= !FLAG_COMPRESSED;
        header.raw_len = self.payload.len() as u32;
        header.checksum = compress::checksum(&self.payload);

        let stored: Cow<'_, [u8]> = match header.page_type {
            PageType::Leaf => match compress::compress_if_smaller(&self.payload, compression)? {
                Some(compressed) => {
                    header.flags |= FLAG_COMPRESSED;
                    Cow::Owned(compressed)
                }
                None => Cow::Borrowed(&self.payload),
            },
            _ => Cow::Borrowed(&self.payload),
        };
        header.stored_len = stored.len() as u32;

        let mut buf = vec![0u8; page_size];
        header.write_to(&mut buf[..PAGE_HEADER_SIZE]);
        buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + stored.len()].copy_from_slice(&stored);
        Ok(buf)
    }

    /// Parse a full page buffer, decompressing and verifying the payload
    pub fn decode(page: PageId, buf: &[u8]) -> Result<Self> {
        let header = PageHeader::read_from(page, buf)?;
        let capacity = buf.len() - PAGE_HEADER_SIZE;
        let stored_len = header.stored_len as usize;
        let raw_len = header.raw_len as usize;
        if stored_len > capacity || raw_len > capacity {
            return Err(PackError::corrupt_node(
                page,
                format!("payload lengths {stored_len}/{raw_len} exceed capacity {capacity}"),
            ));
        }

        let stored = &buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + stored_len];
        let payload = if header.is_compressed() {
            compress::decompress(page, stored, raw_len)?
        } else {
            if stored_len != raw_len {
                return Err(PackError::corrupt_node(
                    page,
                    format!("uncompressed page stores {stored_len} bytes but claims {raw_len}"),
                ));
            }
            stored.to_vec()
        };

        if compress::checksum(&payload) != header.checksum {
            return Err(if header.is_compressed() {
                PackError::PageDecompressionFailed {
                    page,
                    reason: "checksum mismatch".to_string(),
                }
            } else {
                PackError::corrupt_node(page, "checksum mismatch")
            });
        }

        Ok(Self { header, payload })
    }
}
