//! Tree Builder
//!
//! Bulk-loads a B-tree from entries supplied in ascending key order.
//! Leaves are packed left to right, then index levels are stacked on top
//! until a single root remains.

use tracing::debug;

use crate::config::Config;
use crate::error::{PackError, Result};
use crate::storage::{PageId, PageStore, NO_PAGE};

use super::node::{index_entry_len, IndexNode, LeafEntry, LeafNode, Node};
use super::overflow::{self, Limits};
use super::tree::BTree;

/// Builder for a new tree from sorted entries
pub struct TreeBuilder<'s> {
    store: &'s mut PageStore,
    config: Config,
    limits: Limits,
    /// Page reserved for the leaf being filled
    current_page: PageId,
    /// Page of the last leaf written
    prev_page: PageId,
    /// Entries of the leaf being filled
    pending: Vec<LeafEntry>,
    pending_len: usize,
    /// (first key, page) of every finished leaf
    leaves: Vec<(Vec<u8>, PageId)>,
    last_key: Option<Vec<u8>>,
    entry_count: u64,
}

impl<'s> TreeBuilder<'s> {
    pub fn new(store: &'s mut PageStore, config: &Config) -> Result<Self> {
        let limits = Limits::for_store(store);
        let current_page = store.allocate_page()?;
        Ok(Self {
            store,
            config: config.clone(),
            limits,
            current_page,
            prev_page: NO_PAGE,
            pending: Vec::new(),
            pending_len: 0,
            leaves: Vec::new(),
            last_key: None,
            entry_count: 0,
        })
    }

    /// Append a record; keys must be strictly ascending
    pub fn add(&mut self, key: &[u8], record: &[u8]) -> Result<()> {
        self.limits.check_key(key)?;
        if let Some(last) = &self.last_key {
            if last.as_slice() >= key {
                return Err(PackError::UnsortedInput(format!(
                    "key {:?} does not follow {:?}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(last)
                )));
            }
        }

        let entry = LeafEntry {
            key: key.to_vec(),
            record: overflow::place_record(self.store, &self.limits, key, record)?,
        };
        let len = entry.encoded_len();
        if !self.pending.is_empty() && self.pending_len + len > self.limits.capacity {
            self.finish_leaf(true)?;
        }

        self.pending_len += len;
        self.pending.push(entry);
        self.last_key = Some(key.to_vec());
        self.entry_count += 1;
        Ok(())
    }

    /// Write the pending leaf; `more` reserves a page for its successor
    fn finish_leaf(&mut self, more: bool) -> Result<()> {
        let next = if more { self.store.allocate_page()? } else { NO_PAGE };
        let entries = std::mem::take(&mut self.pending);
        let first_key = entries.first().map(|e| e.key.clone()).unwrap_or_default();

        Node::Leaf(LeafNode {
            entries,
            next,
            prev: self.prev_page,
        })
        .save(self.store, self.current_page)?;

        self.leaves.push((first_key, self.current_page));
        self.prev_page = self.current_page;
        self.current_page = next;
        self.pending_len = 0;
        Ok(())
    }

    /// Write remaining leaves and every index level
    ///
    /// Returns the finished tree and the number of records loaded.
    pub fn finish(mut self) -> Result<(BTree, u64)> {
        self.finish_leaf(false)?;
        let leaf_count = self.leaves.len();

        let mut level = std::mem::take(&mut self.leaves);
        let mut height = 1;
        while level.len() > 1 {
            level = self.build_level(level)?;
            height += 1;
        }

        let root = level[0].1;
        debug!(
            root,
            records = self.entry_count,
            leaves = leaf_count,
            height,
            "bulk-loaded tree"
        );
        Ok((BTree::open(root, &self.config), self.entry_count))
    }

    fn build_level(&mut self, children: Vec<(Vec<u8>, PageId)>) -> Result<Vec<(Vec<u8>, PageId)>> {
        let mut groups: Vec<Vec<(Vec<u8>, PageId)>> = Vec::new();
        let mut group: Vec<(Vec<u8>, PageId)> = Vec::new();
        let mut group_len = 0;

        for child in children {
            // The first child's key is not stored in its node
            let len = if group.is_empty() { 0 } else { index_entry_len(&child.0) };
            if !group.is_empty() && group_len + len > self.limits.capacity {
                groups.push(std::mem::take(&mut group));
                group_len = 0;
                group.push(child);
                continue;
            }
            group_len += len;
            group.push(child);
        }
        groups.push(group);

        // A trailing node needs at least one separator
        let count = groups.len();
        if count >= 2 && groups[count - 1].len() == 1 {
            if let Some(moved) = groups[count - 2].pop() {
                groups[count - 1].insert(0, moved);
            }
        }

        let mut parents = Vec::with_capacity(groups.len());
        for mut group in groups {
            // Separators are the first keys of the right-hand children
            let entries = group.split_off(1);
            let (first_key, first_child) = group.remove(0);
            let page = self.store.allocate_page()?;
            Node::Index(IndexNode { first_child, entries }).save(self.store, page)?;
            parents.push((first_key, page));
        }
        Ok(parents)
    }
}
