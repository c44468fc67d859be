//! B-tree over a paged store
//!
//! The tree holds nothing but its root page id; every operation borrows the
//! store that resolves page ids.

use tracing::debug;

use crate::config::Config;
use crate::error::{PackError, Result};
use crate::storage::{PageId, PageStore, NO_PAGE};

use super::iterator::TreeIter;
use super::node::{index_entry_len, IndexNode, LeafEntry, LeafNode, Node};
use super::overflow::{self, Limits};

/// Handle to one B-tree inside a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTree {
    root: PageId,
    max_depth: usize,
}

impl BTree {
    /// Allocate an empty leaf as the root of a new tree
    pub fn create(store: &mut PageStore, config: &Config) -> Result<Self> {
        let root = store.allocate_page()?;
        let saved = Node::Leaf(LeafNode::empty()).save(store, root);
        store.reclaim_on_error(&[root], saved)?;
        Ok(Self::open(root, config))
    }

    /// Attach to an existing tree rooted at `root`
    pub fn open(root: PageId, config: &Config) -> Self {
        Self {
            root,
            max_depth: config.max_tree_depth,
        }
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Record stored under `key`, or `KeyNotFound`
    pub fn lookup(&self, store: &PageStore, key: &[u8]) -> Result<Vec<u8>> {
        let mut path = Path::new(self.max_depth);
        let mut page = self.root;
        loop {
            path.enter(page)?;
            match Node::load(store, page)? {
                Node::Leaf(leaf) => {
                    let index = leaf.search(key).map_err(|_| PackError::KeyNotFound)?;
                    return overflow::read_record(store, page, &leaf.entries[index].record);
                }
                Node::Index(index) => page = index.child_for(key).1,
            }
        }
    }

    /// Ascending iterator over every (key, record) pair
    ///
    /// Nothing is read until the first call to `next`; calling `iter` again
    /// starts over from the smallest key.
    pub fn iter<'a>(&self, store: &'a PageStore) -> TreeIter<'a> {
        TreeIter::new(store, self.root, self.max_depth)
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Insert or overwrite `key`; returns true when the key is new
    pub fn insert(&mut self, store: &mut PageStore, key: &[u8], record: &[u8]) -> Result<bool> {
        let limits = Limits::for_store(store);
        limits.check_key(key)?;

        let mut path = Path::new(self.max_depth);
        let (added, split) = self.insert_into(store, self.root, key, record, &limits, &mut path)?;

        if let Some((separator, right)) = split {
            self.grow_root(store, separator, right)?;
        }
        Ok(added)
    }

    fn insert_into(
        &self,
        store: &mut PageStore,
        page: PageId,
        key: &[u8],
        record: &[u8],
        limits: &Limits,
        path: &mut Path,
    ) -> Result<(bool, Option<(Vec<u8>, PageId)>)> {
        path.enter(page)?;

        let outcome = match Node::load(store, page)? {
            Node::Leaf(mut leaf) => {
                let placed = overflow::place_record(store, limits, key, record)?;
                let added = match leaf.search(key) {
                    Ok(i) => {
                        let old = std::mem::replace(&mut leaf.entries[i].record, placed);
                        overflow::release_record(store, &old)?;
                        false
                    }
                    Err(i) => {
                        leaf.entries.insert(
                            i,
                            LeafEntry {
                                key: key.to_vec(),
                                record: placed,
                            },
                        );
                        true
                    }
                };

                if leaf.payload_len() <= limits.capacity {
                    Node::Leaf(leaf).save(store, page)?;
                    (added, None)
                } else {
                    (added, Some(split_leaf(store, page, leaf)?))
                }
            }
            Node::Index(mut index) => {
                let (slot, child) = index.child_for(key);
                let (added, split) = self.insert_into(store, child, key, record, limits, path)?;
                match split {
                    None => (added, None),
                    Some(promoted) => {
                        index.entries.insert(slot, promoted);
                        if index.payload_len() <= limits.capacity {
                            Node::Index(index).save(store, page)?;
                            (added, None)
                        } else {
                            (added, Some(split_index(store, page, index)?))
                        }
                    }
                }
            }
        };

        path.leave();
        Ok(outcome)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Remove `key`, returning its record, or `KeyNotFound`
    pub fn delete(&mut self, store: &mut PageStore, key: &[u8]) -> Result<Vec<u8>> {
        let limits = Limits::for_store(store);
        let mut path = Path::new(self.max_depth);
        let (record, state) = self.delete_from(store, self.root, key, &limits, &mut path)?;

        if let NodeState::Split(separator, right) = state {
            self.grow_root(store, separator, right)?;
        }

        // An index root routing to a single child is replaced by that child
        loop {
            match Node::load(store, self.root)? {
                Node::Index(index) if index.entries.is_empty() => {
                    let old_root = self.root;
                    self.root = index.first_child;
                    store.free_page(old_root)?;
                    debug!(old_root, new_root = self.root, "tree shrank a level");
                }
                _ => break,
            }
        }
        Ok(record)
    }

    fn delete_from(
        &self,
        store: &mut PageStore,
        page: PageId,
        key: &[u8],
        limits: &Limits,
        path: &mut Path,
    ) -> Result<(Vec<u8>, NodeState)> {
        path.enter(page)?;

        let outcome = match Node::load(store, page)? {
            Node::Leaf(mut leaf) => {
                let index = leaf.search(key).map_err(|_| PackError::KeyNotFound)?;
                let entry = leaf.entries.remove(index);
                let record = overflow::read_record(store, page, &entry.record)?;
                overflow::release_record(store, &entry.record)?;
                let state = if leaf.payload_len() < limits.min_fill {
                    NodeState::Underflow
                } else {
                    NodeState::Fine
                };
                Node::Leaf(leaf).save(store, page)?;
                (record, state)
            }
            Node::Index(mut index) => {
                let (slot, child) = index.child_for(key);
                let (record, child_state) = self.delete_from(store, child, key, limits, path)?;
                let state = match child_state {
                    NodeState::Fine => NodeState::Fine,
                    NodeState::Underflow => {
                        if !index.entries.is_empty() {
                            rebalance(store, &mut index, slot, limits)?;
                        }
                        settle_index(store, page, index, limits)?
                    }
                    NodeState::Split(separator, right) => {
                        index.entries.insert(slot, (separator, right));
                        settle_index(store, page, index, limits)?
                    }
                };
                (record, state)
            }
        };

        path.leave();
        Ok(outcome)
    }

    /// Put a new index root above the current root and its new sibling
    fn grow_root(&mut self, store: &mut PageStore, separator: Vec<u8>, right: PageId) -> Result<()> {
        let new_root = store.allocate_page()?;
        let saved = Node::Index(IndexNode {
            first_child: self.root,
            entries: vec![(separator, right)],
        })
        .save(store, new_root);
        store.reclaim_on_error(&[new_root], saved)?;
        debug!(old_root = self.root, new_root, "tree grew a level");
        self.root = new_root;
        Ok(())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Free every page of the tree, overflow chains included
    pub fn release(self, store: &mut PageStore) -> Result<()> {
        let mut pages = Vec::new();
        let mut stack = vec![(self.root, 1usize)];
        let mut seen = std::collections::HashSet::new();

        while let Some((page, depth)) = stack.pop() {
            if depth > self.max_depth {
                return Err(PackError::DepthLimitExceeded { limit: self.max_depth });
            }
            if !seen.insert(page) {
                return Err(PackError::CycleDetected { page });
            }
            match Node::load(store, page)? {
                Node::Leaf(leaf) => {
                    for entry in &leaf.entries {
                        overflow::release_record(store, &entry.record)?;
                    }
                }
                Node::Index(index) => {
                    for slot in 0..index.child_count() {
                        stack.push((index.child(slot), depth + 1));
                    }
                }
            }
            pages.push(page);
        }

        for page in pages {
            store.free_page(page)?;
        }
        Ok(())
    }
}

// =============================================================================
// Splits and rebalancing
// =============================================================================

/// Size state of a node after a delete below it
enum NodeState {
    Fine,
    Underflow,
    /// A replaced separator grew the node past one page
    Split(Vec<u8>, PageId),
}

/// Save an index node after its children changed, splitting it if a longer
/// separator pushed it over capacity
fn settle_index(store: &mut PageStore, page: PageId, index: IndexNode, limits: &Limits) -> Result<NodeState> {
    if index.payload_len() > limits.capacity {
        let (separator, right) = split_index(store, page, index)?;
        return Ok(NodeState::Split(separator, right));
    }
    let state = if index.payload_len() < limits.min_fill {
        NodeState::Underflow
    } else {
        NodeState::Fine
    };
    Node::Index(index).save(store, page)?;
    Ok(state)
}

/// Index at which the cumulative size first reaches half the total,
/// kept within `1..len` so both halves are non-empty
fn split_point(sizes: &[usize]) -> usize {
    let total: usize = sizes.iter().sum();
    let mut acc = 0;
    for (i, size) in sizes.iter().enumerate() {
        acc += size;
        if acc * 2 >= total {
            return (i + 1).clamp(1, sizes.len().saturating_sub(1).max(1));
        }
    }
    sizes.len() / 2
}

/// Split point for index entries: the entry at the split moves up, so each
/// side keeps at least one separator
fn index_split_point(sizes: &[usize]) -> usize {
    split_point(sizes).min(sizes.len().saturating_sub(2)).max(1)
}

fn split_leaf(store: &mut PageStore, page: PageId, mut leaf: LeafNode) -> Result<(Vec<u8>, PageId)> {
    let sizes: Vec<usize> = leaf.entries.iter().map(LeafEntry::encoded_len).collect();
    let mid = split_point(&sizes);
    let right_page = store.allocate_page()?;

    let right = LeafNode {
        entries: leaf.entries.split_off(mid),
        next: leaf.next,
        prev: page,
    };
    if right.next != NO_PAGE {
        let mut after = Node::load_leaf(store, right.next)?;
        after.prev = right_page;
        Node::Leaf(after).save(store, right.next)?;
    }
    leaf.next = right_page;

    let separator = right.entries[0].key.clone();
    Node::Leaf(leaf).save(store, page)?;
    Node::Leaf(right).save(store, right_page)?;
    debug!(left = page, right = right_page, "split leaf");
    Ok((separator, right_page))
}

fn split_index(store: &mut PageStore, page: PageId, mut index: IndexNode) -> Result<(Vec<u8>, PageId)> {
    let sizes: Vec<usize> = index.entries.iter().map(|(k, _)| index_entry_len(k)).collect();
    let mid = index_split_point(&sizes);
    let right_page = store.allocate_page()?;

    let mut upper = index.entries.split_off(mid);
    let (separator, first_child) = upper.remove(0);
    let right = IndexNode {
        first_child,
        entries: upper,
    };

    Node::Index(index).save(store, page)?;
    Node::Index(right).save(store, right_page)?;
    debug!(left = page, right = right_page, "split index node");
    Ok((separator, right_page))
}

/// Merge the underfull child at `slot` with a neighbour, or even out the
/// pair when a merge would not fit in one page
fn rebalance(store: &mut PageStore, parent: &mut IndexNode, slot: usize, limits: &Limits) -> Result<()> {
    let (left_slot, right_slot) = if slot > 0 { (slot - 1, slot) } else { (0, 1) };
    let left_page = parent.child(left_slot);
    let right_page = parent.child(right_slot);
    let separator_at = right_slot - 1;

    match (Node::load(store, left_page)?, Node::load(store, right_page)?) {
        (Node::Leaf(mut left), Node::Leaf(mut right)) => {
            if left.payload_len() + right.payload_len() <= limits.capacity {
                left.entries.append(&mut right.entries);
                left.next = right.next;
                if right.next != NO_PAGE {
                    let mut after = Node::load_leaf(store, right.next)?;
                    after.prev = left_page;
                    Node::Leaf(after).save(store, right.next)?;
                }
                Node::Leaf(left).save(store, left_page)?;
                store.free_page(right_page)?;
                parent.entries.remove(separator_at);
                debug!(left = left_page, right = right_page, "merged leaves");
            } else {
                let mut all = std::mem::take(&mut left.entries);
                all.append(&mut right.entries);
                let sizes: Vec<usize> = all.iter().map(LeafEntry::encoded_len).collect();
                right.entries = all.split_off(split_point(&sizes));
                left.entries = all;
                parent.entries[separator_at].0 = right.entries[0].key.clone();
                Node::Leaf(left).save(store, left_page)?;
                Node::Leaf(right).save(store, right_page)?;
                debug!(left = left_page, right = right_page, "rebalanced leaves");
            }
        }
        (Node::Index(mut left), Node::Index(mut right)) => {
            let separator = parent.entries[separator_at].0.clone();
            let combined = left.payload_len() + index_entry_len(&separator) + right.payload_len();
            if combined <= limits.capacity {
                left.entries.push((separator, right.first_child));
                left.entries.append(&mut right.entries);
                Node::Index(left).save(store, left_page)?;
                store.free_page(right_page)?;
                parent.entries.remove(separator_at);
                debug!(left = left_page, right = right_page, "merged index nodes");
            } else {
                let mut all = std::mem::take(&mut left.entries);
                all.push((separator, right.first_child));
                all.append(&mut right.entries);
                let sizes: Vec<usize> = all.iter().map(|(k, _)| index_entry_len(k)).collect();
                let mut upper = all.split_off(index_split_point(&sizes));
                let (promoted, first_child) = upper.remove(0);
                left.entries = all;
                right.first_child = first_child;
                right.entries = upper;
                parent.entries[separator_at].0 = promoted;
                Node::Index(left).save(store, left_page)?;
                Node::Index(right).save(store, right_page)?;
                debug!(left = left_page, right = right_page, "rebalanced index nodes");
            }
        }
        _ => {
            return Err(PackError::corrupt_node(
                right_page,
                "siblings at the same depth have different node types",
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Descent tracking
// =============================================================================

/// Pages on the current root-to-node path
pub(crate) struct Path {
    pages: Vec<PageId>,
    max_depth: usize,
}

impl Path {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            pages: Vec::with_capacity(8),
            max_depth,
        }
    }

    pub(crate) fn enter(&mut self, page: PageId) -> Result<()> {
        if self.pages.contains(&page) {
            return Err(PackError::CycleDetected { page });
        }
        if self.pages.len() >= self.max_depth {
            return Err(PackError::DepthLimitExceeded { limit: self.max_depth });
        }
        self.pages.push(page);
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.pages.pop();
    }
}
