//! Tree Iterator
//!
//! Walks the leaf chain in ascending key order.

use std::collections::HashSet;

use crate::error::{PackError, Result};
use crate::storage::{PageId, PageStore, NO_PAGE};

use super::node::{LeafNode, Node};
use super::overflow;
use super::tree::Path;

/// Iterator over (key, record) pairs in ascending key order
///
/// Yields at most one error, after which it is exhausted.
pub struct TreeIter<'a> {
    store: &'a PageStore,
    root: PageId,
    max_depth: usize,
    /// Leaf being drained, with its page id
    current: Option<(PageId, LeafNode)>,
    /// Next entry within `current`
    position: usize,
    /// Leaves visited so far
    visited: HashSet<PageId>,
    /// Last key yielded
    last_key: Option<Vec<u8>>,
    started: bool,
    done: bool,
}

impl<'a> TreeIter<'a> {
    pub(super) fn new(store: &'a PageStore, root: PageId, max_depth: usize) -> Self {
        Self {
            store,
            root,
            max_depth,
            current: None,
            position: 0,
            visited: HashSet::new(),
            last_key: None,
            started: false,
            done: false,
        }
    }

    /// Descend the leftmost path to the first leaf
    fn first_leaf(&self) -> Result<PageId> {
        let mut path = Path::new(self.max_depth);
        let mut page = self.root;
        loop {
            path.enter(page)?;
            match Node::load(self.store, page)? {
                Node::Leaf(_) => return Ok(page),
                Node::Index(index) => page = index.first_child,
            }
        }
    }

    fn enter_leaf(&mut self, page: PageId, expected_prev: PageId) -> Result<()> {
        if !self.visited.insert(page) {
            return Err(PackError::CycleDetected { page });
        }
        let leaf = Node::load_leaf(self.store, page)?;
        if leaf.prev != expected_prev {
            return Err(PackError::corrupt_node(
                page,
                format!("previous-leaf link {} does not match {}", leaf.prev, expected_prev),
            ));
        }
        self.current = Some((page, leaf));
        self.position = 0;
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if !self.started {
            self.started = true;
            let first = self.first_leaf()?;
            self.enter_leaf(first, NO_PAGE)?;
        }

        loop {
            let (page, next) = match &self.current {
                Some((page, leaf)) => {
                    if let Some(entry) = leaf.entries.get(self.position) {
                        if let Some(last) = &self.last_key {
                            if last.as_slice() >= entry.key.as_slice() {
                                return Err(PackError::corrupt_node(*page, "keys out of order across leaves"));
                            }
                        }
                        let record = overflow::read_record(self.store, *page, &entry.record)?;
                        let key = entry.key.clone();
                        self.position += 1;
                        self.last_key = Some(key.clone());
                        return Ok(Some((key, record)));
                    }
                    (*page, leaf.next)
                }
                None => return Ok(None),
            };

            if next == NO_PAGE {
                self.current = None;
                return Ok(None);
            }
            self.enter_leaf(next, page)?;
        }
    }
}

impl<'a> Iterator for TreeIter<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
