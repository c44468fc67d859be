//! Overflow chains and record placement
//!
//! Records too large to sit inside a leaf are split across overflow pages,
//! each pointing at its continuation (link A) until `NO_PAGE`.

use std::collections::HashSet;

use crate::codec::varint;
use crate::error::{PackError, Result};
use crate::storage::compress;
use crate::storage::{Page, PageId, PageStore, PageType, NO_PAGE};

use super::node::{key_len, RecordRef};

/// Size limits derived from a store's page size
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Payload bytes per page
    pub capacity: usize,
    /// Longest accepted key
    pub max_key: usize,
    /// Largest leaf entry kept inline
    pub max_inline_entry: usize,
    /// Non-root nodes below this payload size are rebalanced
    pub min_fill: usize,
}

impl Limits {
    pub fn for_store(store: &PageStore) -> Self {
        let capacity = store.payload_capacity();
        Self {
            capacity,
            max_key: capacity / 8,
            max_inline_entry: capacity / 4,
            min_fill: capacity / 4,
        }
    }

    pub fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() > self.max_key {
            return Err(PackError::KeyTooLarge {
                len: key.len(),
                max: self.max_key,
            });
        }
        Ok(())
    }
}

/// Decide where `record` lives for a leaf entry keyed by `key`
pub fn place_record(store: &mut PageStore, limits: &Limits, key: &[u8], record: &[u8]) -> Result<RecordRef> {
    let inline_len = |len: usize| key_len(key) + 1 + varint::encoded_len(len as u64) + len;

    if inline_len(record.len()) <= limits.max_inline_entry {
        return Ok(RecordRef::Inline {
            compressed: false,
            bytes: record.to_vec(),
        });
    }

    let (compressed, stored) = match compress::compress_if_smaller(record, store.compression())? {
        Some(frame) => {
            let mut stored = varint::encode_u64(record.len() as u64);
            stored.extend_from_slice(&frame);
            (stored.len() < record.len(), stored)
        }
        None => (false, Vec::new()),
    };
    let stored = if compressed { stored } else { record.to_vec() };

    if inline_len(stored.len()) <= limits.max_inline_entry {
        return Ok(RecordRef::Inline {
            compressed,
            bytes: stored,
        });
    }

    let first_page = write_chain(store, &stored)?;
    Ok(RecordRef::Overflow {
        compressed,
        stored_len: stored.len() as u64,
        first_page,
    })
}

/// Materialize a record's bytes; `leaf` is only used for error reporting
pub fn read_record(store: &PageStore, leaf: PageId, record: &RecordRef) -> Result<Vec<u8>> {
    let (compressed, stored) = match record {
        RecordRef::Inline { compressed, bytes } => (*compressed, bytes.clone()),
        RecordRef::Overflow {
            compressed,
            stored_len,
            first_page,
        } => (*compressed, read_chain(store, *first_page, *stored_len)?),
    };
    if !compressed {
        return Ok(stored);
    }

    let (raw_len, consumed) = varint::decode_u64(&stored, 0).map_err(|e| PackError::PageDecompressionFailed {
        page: leaf,
        reason: format!("record length prefix: {e}"),
    })?;
    let raw_len = usize::try_from(raw_len).map_err(|_| PackError::PageDecompressionFailed {
        page: leaf,
        reason: format!("record length {raw_len} too large"),
    })?;
    compress::decompress(leaf, &stored[consumed..], raw_len)
}

/// Free any overflow pages owned by a record
pub fn release_record(store: &mut PageStore, record: &RecordRef) -> Result<()> {
    match record {
        RecordRef::Inline { .. } => Ok(()),
        RecordRef::Overflow { first_page, .. } => free_chain(store, *first_page),
    }
}

// =============================================================================
// Chains
// =============================================================================

/// Write `bytes` across freshly allocated overflow pages
pub fn write_chain(store: &mut PageStore, bytes: &[u8]) -> Result<PageId> {
    let capacity = store.payload_capacity();
    let chunks: Vec<&[u8]> = bytes.chunks(capacity).collect();
    let mut pages = Vec::with_capacity(chunks.len().max(1));
    let written = fill_chain(store, &chunks, &mut pages);
    store.reclaim_on_error(&pages, written)?;
    Ok(pages[0])
}

fn fill_chain(store: &mut PageStore, chunks: &[&[u8]], pages: &mut Vec<PageId>) -> Result<()> {
    for _ in 0..chunks.len().max(1) {
        pages.push(store.allocate_page()?);
    }
    for (i, page) in pages.iter().enumerate() {
        let chunk = chunks.get(i).copied().unwrap_or(&[]);
        let mut content = Page::new(PageType::Overflow, chunk.to_vec());
        content.header.link_a = pages.get(i + 1).copied().unwrap_or(NO_PAGE);
        store.store_page(*page, &content)?;
    }
    Ok(())
}

/// Collect a chain's bytes; the total must equal `expected_len`
pub fn read_chain(store: &PageStore, first: PageId, expected_len: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len.min(1 << 24) as usize);
    let mut walk = ChainWalk::new(first);
    while let Some(step) = walk.next_page(store) {
        let (_, content) = step?;
        out.extend_from_slice(&content.payload);
        if out.len() as u64 > expected_len {
            break;
        }
    }
    if out.len() as u64 != expected_len {
        return Err(PackError::corrupt_node(
            first,
            format!("overflow chain holds {} bytes, record claims {}", out.len(), expected_len),
        ));
    }
    Ok(out)
}

/// Return every page of a chain to the free list
pub fn free_chain(store: &mut PageStore, first: PageId) -> Result<()> {
    let mut pages = Vec::new();
    let mut walk = ChainWalk::new(first);
    while let Some(step) = walk.next_page(store) {
        pages.push(step?.0);
    }
    for page in pages {
        store.free_page(page)?;
    }
    Ok(())
}

/// Follows continuation pointers, checking page types and cycles
struct ChainWalk {
    next: PageId,
    seen: HashSet<PageId>,
}

impl ChainWalk {
    fn new(first: PageId) -> Self {
        Self {
            next: first,
            seen: HashSet::new(),
        }
    }

    fn next_page(&mut self, store: &PageStore) -> Option<Result<(PageId, Page)>> {
        if self.next == NO_PAGE {
            return None;
        }
        let page = self.next;
        self.next = NO_PAGE;
        if !self.seen.insert(page) {
            return Some(Err(PackError::CycleDetected { page }));
        }
        let content = match store.load_page(page) {
            Ok(content) => content,
            Err(e) => return Some(Err(e)),
        };
        if content.header.page_type != PageType::Overflow {
            return Some(Err(PackError::corrupt_node(
                page,
                format!("{:?} page inside an overflow chain", content.header.page_type),
            )));
        }
        self.next = content.header.link_a;
        Some(Ok((page, content)))
    }
}
