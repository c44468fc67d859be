//! B-tree node payloads
//!
//! ### Leaf entry
//! ```text
//! ┌─────────────┬─────┬───────────┬────────────────┬───────────────────────────┐
//! │KeyLen varint│ Key │ Flags (1) │ Len varint     │ Bytes, or first overflow  │
//! │             │     │           │                │ page (8) when bit1 is set │
//! └─────────────┴─────┴───────────┴────────────────┴───────────────────────────┘
//! ```
//!
//! ### Index entry
//! ```text
//! ┌─────────────┬─────┬────────────┐
//! │KeyLen varint│ Key │ Child (8)  │
//! └─────────────┴─────┴────────────┘
//! ```
//!
//! The leftmost index child lives in the page header (link A); leaf sibling
//! pointers live in links A (next) and B (previous).

use std::cmp::Ordering;

use bytes::BufMut;

use crate::codec::varint;
use crate::error::{PackError, Result};
use crate::storage::{Page, PageId, PageStore, PageType, NO_PAGE};

/// Record bytes are compressed (varint raw length + zstd frame)
pub const RECORD_COMPRESSED: u8 = 0x01;

/// Record bytes live in an overflow chain
pub const RECORD_OVERFLOW: u8 = 0x02;

/// Where a leaf entry's record bytes are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRef {
    Inline {
        compressed: bool,
        bytes: Vec<u8>,
    },
    Overflow {
        compressed: bool,
        stored_len: u64,
        first_page: PageId,
    },
}

impl RecordRef {
    fn flags(&self) -> u8 {
        match self {
            RecordRef::Inline { compressed, .. } => {
                if *compressed {
                    RECORD_COMPRESSED
                } else {
                    0
                }
            }
            RecordRef::Overflow { compressed, .. } => {
                RECORD_OVERFLOW | if *compressed { RECORD_COMPRESSED } else { 0 }
            }
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            RecordRef::Inline { bytes, .. } => 1 + varint::encoded_len(bytes.len() as u64) + bytes.len(),
            RecordRef::Overflow { stored_len, .. } => 1 + varint::encoded_len(*stored_len) + 8,
        }
    }
}

/// One key/record pair in a leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: Vec<u8>,
    pub record: RecordRef,
}

impl LeafEntry {
    pub fn encoded_len(&self) -> usize {
        key_len(&self.key) + self.record.encoded_len()
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        write_key(buf, &self.key);
        buf.put_u8(self.record.flags());
        match &self.record {
            RecordRef::Inline { bytes, .. } => {
                varint::write_u64(buf, bytes.len() as u64);
                buf.put_slice(bytes);
            }
            RecordRef::Overflow {
                stored_len,
                first_page,
                ..
            } => {
                varint::write_u64(buf, *stored_len);
                buf.put_u64(*first_page);
            }
        }
    }
}

/// Encoded size of a length-prefixed key
pub fn key_len(key: &[u8]) -> usize {
    varint::encoded_len(key.len() as u64) + key.len()
}

/// Encoded size of an index entry
pub fn index_entry_len(key: &[u8]) -> usize {
    key_len(key) + 8
}

fn write_key(buf: &mut Vec<u8>, key: &[u8]) {
    varint::write_u64(buf, key.len() as u64);
    buf.put_slice(key);
}

// =============================================================================
// Nodes
// =============================================================================

/// Records in ascending key order plus sibling links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub entries: Vec<LeafEntry>,
    pub next: PageId,
    pub prev: PageId,
}

impl LeafNode {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            next: NO_PAGE,
            prev: NO_PAGE,
        }
    }

    /// Binary search by key: `Ok(index)` on a hit, `Err(insert_at)` otherwise
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.as_slice().cmp(key))
    }

    pub fn payload_len(&self) -> usize {
        self.entries.iter().map(LeafEntry::encoded_len).sum()
    }
}

/// Separator keys routing to child pages
///
/// Child slot 0 is `first_child`; slot `i > 0` is `entries[i - 1].1`, which
/// holds every key `>= entries[i - 1].0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNode {
    pub first_child: PageId,
    pub entries: Vec<(Vec<u8>, PageId)>,
}

impl IndexNode {
    /// Slot and page of the child whose range covers `key`
    pub fn child_for(&self, key: &[u8]) -> (usize, PageId) {
        let slot = self.entries.partition_point(|(sep, _)| sep.as_slice() <= key);
        (slot, self.child(slot))
    }

    pub fn child(&self, slot: usize) -> PageId {
        if slot == 0 {
            self.first_child
        } else {
            self.entries[slot - 1].1
        }
    }

    pub fn child_count(&self) -> usize {
        self.entries.len() + 1
    }

    pub fn payload_len(&self) -> usize {
        self.entries.iter().map(|(key, _)| index_entry_len(key)).sum()
    }
}

/// A decoded B-tree page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Index(IndexNode),
}

impl Node {
    pub fn payload_len(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.payload_len(),
            Node::Index(index) => index.payload_len(),
        }
    }

    /// Read and decode the node stored at `page`
    pub fn load(store: &PageStore, page: PageId) -> Result<Self> {
        let content = store.load_page(page)?;
        Self::from_page(page, &content)
    }

    /// Read a node that must be a leaf
    pub fn load_leaf(store: &PageStore, page: PageId) -> Result<LeafNode> {
        match Self::load(store, page)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Index(_) => Err(PackError::corrupt_node(page, "expected a leaf, found an index node")),
        }
    }

    /// Encode and write the node to `page`
    pub fn save(&self, store: &mut PageStore, page: PageId) -> Result<()> {
        let content = self.to_page(page)?;
        store.store_page(page, &content)
    }

    pub fn to_page(&self, page: PageId) -> Result<Page> {
        let mut payload = Vec::with_capacity(self.payload_len());
        let (mut out, count) = match self {
            Node::Leaf(leaf) => {
                for entry in &leaf.entries {
                    entry.write_to(&mut payload);
                }
                let mut out = Page::new(PageType::Leaf, Vec::new());
                out.header.link_a = leaf.next;
                out.header.link_b = leaf.prev;
                (out, leaf.entries.len())
            }
            Node::Index(index) => {
                for (key, child) in &index.entries {
                    write_key(&mut payload, key);
                    payload.put_u64(*child);
                }
                let mut out = Page::new(PageType::Index, Vec::new());
                out.header.link_a = index.first_child;
                (out, index.entries.len())
            }
        };
        out.header.entry_count = u16::try_from(count)
            .map_err(|_| PackError::corrupt_node(page, format!("{count} entries do not fit a page header")))?;
        out.payload = payload;
        Ok(out)
    }

    pub fn from_page(page: PageId, content: &Page) -> Result<Self> {
        let count = content.header.entry_count as usize;
        let mut reader = PayloadReader {
            page,
            bytes: &content.payload,
            pos: 0,
        };

        let node = match content.header.page_type {
            PageType::Leaf => {
                let mut entries = Vec::with_capacity(count.min(content.payload.len()));
                for _ in 0..count {
                    let key = reader.key()?;
                    let flags = reader.u8()?;
                    if flags & !(RECORD_COMPRESSED | RECORD_OVERFLOW) != 0 {
                        return Err(PackError::corrupt_node(page, format!("unknown record flags 0x{flags:02x}")));
                    }
                    let compressed = flags & RECORD_COMPRESSED != 0;
                    let len = reader.varint()?;
                    let record = if flags & RECORD_OVERFLOW != 0 {
                        let first_page = reader.u64()?;
                        if first_page == NO_PAGE {
                            return Err(PackError::corrupt_node(page, "overflow record without a chain"));
                        }
                        RecordRef::Overflow {
                            compressed,
                            stored_len: len,
                            first_page,
                        }
                    } else {
                        RecordRef::Inline {
                            compressed,
                            bytes: reader.bytes(len)?.to_vec(),
                        }
                    };
                    entries.push(LeafEntry { key, record });
                }
                check_ascending(page, entries.iter().map(|e| e.key.as_slice()))?;
                Node::Leaf(LeafNode {
                    entries,
                    next: content.header.link_a,
                    prev: content.header.link_b,
                })
            }
            PageType::Index => {
                if content.header.link_a == NO_PAGE {
                    return Err(PackError::corrupt_node(page, "index node without a first child"));
                }
                let mut entries = Vec::with_capacity(count.min(content.payload.len()));
                for _ in 0..count {
                    let key = reader.key()?;
                    let child = reader.u64()?;
                    if child == NO_PAGE {
                        return Err(PackError::corrupt_node(page, "null child pointer"));
                    }
                    entries.push((key, child));
                }
                check_ascending(page, entries.iter().map(|(k, _)| k.as_slice()))?;
                Node::Index(IndexNode {
                    first_child: content.header.link_a,
                    entries,
                })
            }
            other => {
                return Err(PackError::corrupt_node(page, format!("{other:?} page where a B-tree node was expected")));
            }
        };

        if reader.pos != content.payload.len() {
            return Err(PackError::corrupt_node(
                page,
                format!(
                    "{} entries end at byte {} of a {}-byte payload",
                    count,
                    reader.pos,
                    content.payload.len()
                ),
            ));
        }
        Ok(node)
    }
}

fn check_ascending<'a>(page: PageId, keys: impl Iterator<Item = &'a [u8]>) -> Result<()> {
    let mut prev: Option<&[u8]> = None;
    for key in keys {
        if let Some(prev) = prev {
            if prev.cmp(key) != Ordering::Less {
                return Err(PackError::corrupt_node(page, "keys not strictly increasing"));
            }
        }
        prev = Some(key);
    }
    Ok(())
}

struct PayloadReader<'a> {
    page: PageId,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn truncated(&self) -> PackError {
        PackError::corrupt_node(self.page, format!("entry runs past payload end at byte {}", self.pos))
    }

    fn bytes(&mut self, len: u64) -> Result<&'a [u8]> {
        let len = usize::try_from(len).map_err(|_| self.truncated())?;
        if len > self.bytes.len() - self.pos {
            return Err(self.truncated());
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u64(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn varint(&mut self) -> Result<u64> {
        let (value, consumed) = varint::decode_u64(self.bytes, self.pos)
            .map_err(|e| PackError::corrupt_node(self.page, e.to_string()))?;
        self.pos += consumed;
        Ok(value)
    }

    fn key(&mut self) -> Result<Vec<u8>> {
        let len = self.varint()?;
        Ok(self.bytes(len)?.to_vec())
    }
}
