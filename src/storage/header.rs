//! File header (page 0)
//!
//! ```text
//! ┌──────────────┬────────────┬───────────────┬────────────────┬───────────────┬──────────────┐
//! │ Magic (8)    │ Version (4)│ Page Size (4) │ Page Count (8) │ Free Head (8) │ Sections (4) │
//! ├──────────────┴────────────┴───────────────┴────────────────┴───────────────┴──────────────┤
//! │ per section: [NameLen: varint][Name][Root: u64][Records: u64]                             │
//! ├───────────────────────────────────────────────────────────────────────────────────────────┤
//! │ CRC32 of everything above (4) | zero padding to page size                                 │
//! └───────────────────────────────────────────────────────────────────────────────────────────┘
//! ```

use bytes::BufMut;
use indexmap::IndexMap;

use crate::codec::varint;
use crate::config::validate_page_size;
use crate::error::{PackError, Result};

use super::{PageId, NO_PAGE};

/// Magic bytes identifying a paged save database
pub const MAGIC: &[u8; 8] = b"SBPAGEDB";

/// Current header format version
pub const FORMAT_VERSION: u32 = 1;

/// Magic (8) + Version (4) + PageSize (4) + PageCount (8) + FreeHead (8) + SectionCount (4)
pub const FIXED_HEADER_SIZE: usize = 36;

/// Root pointer and size of one named section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRoot {
    pub root: PageId,
    pub record_count: u64,
}

/// Decoded file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub page_size: u32,
    pub page_count: u64,
    pub free_head: PageId,
    pub sections: IndexMap<String, SectionRoot>,
}

impl FileHeader {
    /// Header of an empty file: just page 0
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            page_count: 1,
            free_head: NO_PAGE,
            sections: IndexMap::new(),
        }
    }

    /// Serialize into a full page
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.page_size as usize);
        buf.put_slice(MAGIC);
        buf.put_u32(FORMAT_VERSION);
        buf.put_u32(self.page_size);
        buf.put_u64(self.page_count);
        buf.put_u64(self.free_head);
        buf.put_u32(self.sections.len() as u32);
        for (name, section) in &self.sections {
            varint::write_u64(&mut buf, name.len() as u64);
            buf.put_slice(name.as_bytes());
            buf.put_u64(section.root);
            buf.put_u64(section.record_count);
        }
        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);

        if buf.len() > self.page_size as usize {
            return Err(PackError::HeaderOverflow {
                needed: buf.len(),
                page_size: self.page_size,
            });
        }
        buf.resize(self.page_size as usize, 0);
        Ok(buf)
    }

    /// Page size recorded in the fixed prefix, after magic/version checks
    pub fn peek_page_size(prefix: &[u8]) -> Result<u32> {
        if prefix.len() < FIXED_HEADER_SIZE {
            return Err(PackError::InvalidHeader(format!(
                "file too short for a header ({} bytes)",
                prefix.len()
            )));
        }
        if &prefix[0..8] != MAGIC {
            return Err(PackError::InvalidHeader(format!(
                "bad magic {:?}",
                String::from_utf8_lossy(&prefix[0..8])
            )));
        }
        let version = u32::from_be_bytes([prefix[8], prefix[9], prefix[10], prefix[11]]);
        if version != FORMAT_VERSION {
            return Err(PackError::UnsupportedVersion(format!("database format {version}")));
        }
        let page_size = u32::from_be_bytes([prefix[12], prefix[13], prefix[14], prefix[15]]);
        validate_page_size(page_size)?;
        Ok(page_size)
    }

    /// Parse and validate page 0
    pub fn decode(page: &[u8]) -> Result<Self> {
        let page_size = Self::peek_page_size(page)?;
        if page.len() < page_size as usize {
            return Err(PackError::TruncatedFile {
                expected: u64::from(page_size),
                actual: page.len() as u64,
            });
        }

        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&page[at..at + 8]);
            u64::from_be_bytes(raw)
        };
        let page_count = u64_at(16);
        let free_head = u64_at(24);
        let section_count = u32::from_be_bytes([page[32], page[33], page[34], page[35]]);

        let body = &page[..page_size as usize];
        let mut pos = FIXED_HEADER_SIZE;
        let mut sections = IndexMap::new();
        for _ in 0..section_count {
            let (name_len, consumed) = varint::decode_u64(body, pos)?;
            pos += consumed;
            let name_end = usize::try_from(name_len)
                .ok()
                .and_then(|len| pos.checked_add(len))
                .filter(|end| end.checked_add(16).is_some_and(|tail| tail <= body.len()))
                .ok_or_else(|| PackError::InconsistentHeader("section table overruns page 0".to_string()))?;
            let name = std::str::from_utf8(&body[pos..name_end])
                .map_err(|e| PackError::InconsistentHeader(format!("section name: {e}")))?
                .to_string();
            pos = name_end;
            let root = u64_at(pos);
            let record_count = u64_at(pos + 8);
            pos += 16;
            if sections.insert(name.clone(), SectionRoot { root, record_count }).is_some() {
                return Err(PackError::InconsistentHeader(format!("duplicate section {name:?}")));
            }
        }

        if pos + 4 > body.len() {
            return Err(PackError::InconsistentHeader("missing header checksum".to_string()));
        }
        let stored_crc = u32::from_be_bytes([body[pos], body[pos + 1], body[pos + 2], body[pos + 3]]);
        if crc32fast::hash(&body[..pos]) != stored_crc {
            return Err(PackError::InconsistentHeader("header checksum mismatch".to_string()));
        }

        let header = Self {
            page_size,
            page_count,
            free_head,
            sections,
        };
        header.check_pointers()?;
        Ok(header)
    }

    /// Every pointer must land on a real page other than page 0
    fn check_pointers(&self) -> Result<()> {
        if self.page_count == 0 {
            return Err(PackError::InconsistentHeader("page count is zero".to_string()));
        }
        let in_range = |page: PageId| page >= 1 && page < self.page_count;
        if self.free_head != NO_PAGE && !in_range(self.free_head) {
            return Err(PackError::InconsistentHeader(format!(
                "free list head {} outside 1..{}",
                self.free_head, self.page_count
            )));
        }
        for (name, section) in &self.sections {
            if !in_range(section.root) {
                return Err(PackError::InconsistentHeader(format!(
                    "section {name:?} root {} outside 1..{}",
                    section.root, self.page_count
                )));
            }
        }
        Ok(())
    }
}
