//! Paged Store
//!
//! Owns the file handle, the header and the free-page list.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{validate_page_size, Compression, Config};
use crate::error::{PackError, Result};

use super::header::{FileHeader, SectionRoot, FIXED_HEADER_SIZE};
use super::page::{Page, PageHeader, PageType, PAGE_HEADER_SIZE};
use super::{PageId, HEADER_PAGE, NO_PAGE};

/// A file viewed as fixed-size pages
///
/// ## Concurrency:
/// - Reads take `&self`; the file cursor sits behind a mutex
/// - Allocation, writes and frees take `&mut self` (single writer)
pub struct PageStore {
    /// Path of the backing file
    path: PathBuf,
    /// File handle, seek + read/write serialized by the mutex
    file: Mutex<File>,
    /// In-memory copy of page 0
    header: FileHeader,
    /// Compression for pages written through `store_page`
    compression: Compression,
    /// Header changed since the last flush
    dirty: bool,
}

impl PageStore {
    /// Create a new, empty store, truncating any existing file
    pub fn create(path: &Path, config: &Config) -> Result<Self> {
        config.validate()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut store = Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            header: FileHeader::new(config.page_size),
            compression: config.compression,
            dirty: true,
        };
        store.flush_header()?;
        debug!(path = %path.display(), page_size = config.page_size, "created page store");
        Ok(store)
    }

    /// Open an existing store for reading and writing
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        Self::open_with(path, config, true)
    }

    /// Open an existing store without write access
    pub fn open_read_only(path: &Path, config: &Config) -> Result<Self> {
        Self::open_with(path, config, false)
    }

    fn open_with(path: &Path, config: &Config, writable: bool) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(writable).open(path)?;
        let file_len = file.metadata()?.len();

        // Fixed prefix first: it tells us how big page 0 is
        let mut prefix = vec![0u8; FIXED_HEADER_SIZE.min(file_len as usize)];
        file.read_exact(&mut prefix)?;
        let page_size = FileHeader::peek_page_size(&prefix)?;
        validate_page_size(page_size)?;

        if file_len < u64::from(page_size) {
            return Err(PackError::TruncatedFile {
                expected: u64::from(page_size),
                actual: file_len,
            });
        }
        let mut page0 = vec![0u8; page_size as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut page0)?;
        let header = FileHeader::decode(&page0)?;

        let expected = header.page_count.saturating_mul(u64::from(page_size));
        if file_len < expected {
            return Err(PackError::TruncatedFile {
                expected,
                actual: file_len,
            });
        }

        debug!(
            path = %path.display(),
            page_size,
            page_count = header.page_count,
            sections = header.sections.len(),
            "opened page store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            header,
            compression: config.compression,
            dirty: false,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.header.page_size as usize
    }

    /// Bytes available to a page payload after the page header
    pub fn payload_capacity(&self) -> usize {
        self.page_size() - PAGE_HEADER_SIZE
    }

    pub fn page_count(&self) -> u64 {
        self.header.page_count
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn section(&self, name: &str) -> Option<SectionRoot> {
        self.header.sections.get(name).copied()
    }

    /// Record a section's root/count; persisted at the next flush
    pub fn set_section(&mut self, name: &str, section: SectionRoot) {
        self.header.sections.insert(name.to_string(), section);
        self.dirty = true;
    }

    pub fn remove_section(&mut self, name: &str) -> Option<SectionRoot> {
        let removed = self.header.sections.shift_remove(name);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // =========================================================================
    // Raw pages
    // =========================================================================

    fn check_range(&self, page: PageId) -> Result<()> {
        if page == HEADER_PAGE || page >= self.header.page_count {
            return Err(PackError::PageOutOfRange {
                page,
                page_count: self.header.page_count,
            });
        }
        Ok(())
    }

    /// Read the raw bytes of a page
    pub fn read_page(&self, page: PageId) -> Result<Vec<u8>> {
        self.check_range(page)?;
        let page_size = self.page_size();
        let mut buf = vec![0u8; page_size];

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page * page_size as u64))?;
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => PackError::TruncatedFile {
                expected: (page + 1) * page_size as u64,
                actual: file.metadata().map(|m| m.len()).unwrap_or(0),
            },
            _ => PackError::Io(e),
        })?;
        Ok(buf)
    }

    /// Overwrite a page with exactly one page of bytes
    pub fn write_page(&mut self, page: PageId, bytes: &[u8]) -> Result<()> {
        self.check_range(page)?;
        if bytes.len() != self.page_size() {
            return Err(PackError::corrupt_node(
                page,
                format!("write of {} bytes to a {}-byte page", bytes.len(), self.page_size()),
            ));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page * self.header.page_size as u64))?;
        file.write_all(bytes)?;
        Ok(())
    }

    // =========================================================================
    // Framed pages
    // =========================================================================

    /// Read and verify a framed page
    pub fn load_page(&self, page: PageId) -> Result<Page> {
        let raw = self.read_page(page)?;
        Page::decode(page, &raw)
    }

    /// Frame and write a page, compressing leaf payloads when enabled
    pub fn store_page(&mut self, page: PageId, content: &Page) -> Result<()> {
        let raw = content.encode(page, self.page_size(), self.compression)?;
        self.write_page(page, &raw)
    }

    /// Type of any page, page 0 included
    pub fn page_type(&self, page: PageId) -> Result<PageType> {
        if page == HEADER_PAGE {
            return Ok(PageType::Metadata);
        }
        let raw = self.read_page(page)?;
        Ok(PageHeader::read_from(page, &raw)?.page_type)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Hand out a page, reusing the free list before growing the file
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let head = self.header.free_head;
        if head != NO_PAGE {
            let raw = self.read_page(head)?;
            let header = PageHeader::read_from(head, &raw)?;
            if header.page_type != PageType::Free {
                return Err(PackError::CorruptFreeList {
                    page: head,
                    reason: format!("listed as free but typed {:?}", header.page_type),
                });
            }
            let next = header.link_a;
            if next != NO_PAGE && (next == HEADER_PAGE || next >= self.header.page_count) {
                return Err(PackError::CorruptFreeList {
                    page: head,
                    reason: format!("next free pointer {next} out of range"),
                });
            }
            self.header.free_head = next;
            self.dirty = true;
            debug!(page = head, "reused free page");
            return Ok(head);
        }

        let page = self.header.page_count;
        self.header.page_count += 1;
        // Extend the file now so the page count never outruns its length
        let blank = Page::new(PageType::Free, Vec::new()).encode(page, self.page_size(), Compression::None);
        if let Err(e) = blank.and_then(|blank| self.write_page(page, &blank)) {
            self.header.page_count = page;
            return Err(e);
        }
        self.dirty = true;
        Ok(page)
    }

    /// Pass `result` through, returning `pages` to the free list if it failed
    ///
    /// For pages handed out by `allocate_page` that never became reachable.
    /// The original error wins over any failure while reclaiming.
    pub fn reclaim_on_error<T>(&mut self, pages: &[PageId], result: Result<T>) -> Result<T> {
        if result.is_err() {
            for &page in pages.iter().rev() {
                if let Err(e) = self.check_range(page).and_then(|_| self.push_free(page)) {
                    warn!(page, error = %e, "could not reclaim page");
                }
            }
        }
        result
    }

    /// Return a page to the free list
    pub fn free_page(&mut self, page: PageId) -> Result<()> {
        if self.page_type(page)? == PageType::Free {
            return Err(PackError::CorruptFreeList {
                page,
                reason: "page freed twice".to_string(),
            });
        }
        self.push_free(page)?;
        debug!(page, "released page");
        Ok(())
    }

    fn push_free(&mut self, page: PageId) -> Result<()> {
        let mut free = Page::new(PageType::Free, Vec::new());
        free.header.link_a = self.header.free_head;
        let raw = free.encode(page, self.page_size(), Compression::None)?;
        self.write_page(page, &raw)?;
        self.header.free_head = page;
        self.dirty = true;
        Ok(())
    }

    /// Walk the free list, failing on cycles or non-free entries
    pub fn free_pages(&self) -> Result<Vec<PageId>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut page = self.header.free_head;
        while page != NO_PAGE {
            if !seen.insert(page) {
                return Err(PackError::CycleDetected { page });
            }
            let raw = self.read_page(page)?;
            let header = PageHeader::read_from(page, &raw)?;
            if header.page_type != PageType::Free {
                return Err(PackError::CorruptFreeList {
                    page,
                    reason: format!("listed as free but typed {:?}", header.page_type),
                });
            }
            out.push(page);
            page = header.link_a;
        }
        Ok(out)
    }

    /// Count pages by type, page 0 included
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats {
            page_size: self.header.page_size,
            page_count: self.header.page_count,
            ..StoreStats::default()
        };
        for page in 0..self.header.page_count {
            match self.page_type(page)? {
                PageType::Free => stats.free += 1,
                PageType::Leaf => stats.leaf += 1,
                PageType::Index => stats.index += 1,
                PageType::Metadata => stats.metadata += 1,
                PageType::Overflow => stats.overflow += 1,
            }
        }
        Ok(stats)
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Rewrite page 0 from the in-memory header and sync
    pub fn flush_header(&mut self) -> Result<()> {
        let bytes = self.header.encode()?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        file.sync_data()?;
        drop(file);
        self.dirty = false;
        Ok(())
    }

    /// Flush the header if it changed, then sync everything
    pub fn sync(&mut self) -> Result<()> {
        if self.dirty {
            self.flush_header()?;
        }
        self.file.lock().sync_all()?;
        Ok(())
    }
}

/// Page counts by type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub page_size: u32,
    pub page_count: u64,
    pub metadata: u64,
    pub free: u64,
    pub leaf: u64,
    pub index: u64,
    pub overflow: u64,
}
