//! Save Database
//!
//! Named sections, each a B-tree of string keys to encoded values, on top of
//! a single `PageStore`.

use std::path::Path;

use tracing::{debug, info};

use crate::btree::{BTree, TreeBuilder, TreeIter};
use crate::codec::{decode_record, encode_record};
use crate::config::Config;
use crate::error::{PackError, Result};
use crate::storage::{PageStore, SectionRoot, StoreStats};
use crate::value::{Map, Value};

/// An open paged save file
///
/// ## Ownership:
/// - The store owns the file handle and the free list
/// - Section trees are rebuilt from root pointers on every call, so no
///   handle outlives a mutation
pub struct SaveDb {
    store: PageStore,
    config: Config,
}

impl SaveDb {
    /// Create an empty save file, truncating `path`
    pub fn create(path: &Path, config: &Config) -> Result<Self> {
        let store = PageStore::create(path, config)?;
        Ok(Self {
            store,
            config: config.clone(),
        })
    }

    /// Open an existing save file for reading and writing
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let store = PageStore::open(path, config)?;
        Ok(Self {
            store,
            config: config.clone(),
        })
    }

    /// Open an existing save file without write access
    pub fn open_read_only(path: &Path, config: &Config) -> Result<Self> {
        let store = PageStore::open_read_only(path, config)?;
        Ok(Self {
            store,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    /// Page counts by type
    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    // =========================================================================
    // Sections
    // =========================================================================

    /// Section names in header order
    pub fn section_names(&self) -> Vec<String> {
        self.store.header().sections.keys().cloned().collect()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.store.section(name).is_some()
    }

    /// Number of records in a section
    pub fn record_count(&self, name: &str) -> Result<u64> {
        Ok(self.section(name)?.record_count)
    }

    fn section(&self, name: &str) -> Result<SectionRoot> {
        self.store
            .section(name)
            .ok_or_else(|| PackError::SectionNotFound(name.to_string()))
    }

    fn tree(&self, name: &str) -> Result<BTree> {
        Ok(BTree::open(self.section(name)?.root, &self.config))
    }

    /// Add an empty section
    pub fn create_section(&mut self, name: &str) -> Result<()> {
        if self.has_section(name) {
            return Err(PackError::InvalidSection(format!("section {name:?} already exists")));
        }
        let tree = BTree::create(&mut self.store, &self.config)?;
        self.set_root(name, tree.root(), 0)?;
        debug!(section = name, root = tree.root(), "created section");
        Ok(())
    }

    /// Remove a section and free all of its pages
    pub fn drop_section(&mut self, name: &str) -> Result<()> {
        let tree = self.tree(name)?;
        tree.release(&mut self.store)?;
        self.store.remove_section(name);
        self.store.flush_header()?;
        debug!(section = name, "dropped section");
        Ok(())
    }

    /// Record a section root; the header goes to disk when the root moved
    fn set_root(&mut self, name: &str, root: u64, record_count: u64) -> Result<()> {
        let moved = self.store.section(name).map(|s| s.root) != Some(root);
        self.store.set_section(name, SectionRoot { root, record_count });
        if moved {
            self.store.flush_header()?;
        }
        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Decoded value stored under `key`
    pub fn get(&self, section: &str, key: &str) -> Result<Value> {
        let tree = self.tree(section)?;
        let record = tree.lookup(&self.store, key.as_bytes())?;
        decode_record(&record, &self.config)
    }

    /// Store `value` under `key`; returns true when the key is new
    pub fn put(&mut self, section: &str, key: &str, value: &Value) -> Result<bool> {
        let SectionRoot { record_count, .. } = self.section(section)?;
        let mut tree = self.tree(section)?;
        let record = encode_record(value, &self.config)?;
        let added = tree.insert(&mut self.store, key.as_bytes(), &record)?;
        let count = if added { record_count + 1 } else { record_count };
        self.set_root(section, tree.root(), count)?;
        Ok(added)
    }

    /// Delete `key`, returning the value it held
    pub fn remove(&mut self, section: &str, key: &str) -> Result<Value> {
        let SectionRoot { record_count, .. } = self.section(section)?;
        let mut tree = self.tree(section)?;
        let record = tree.delete(&mut self.store, key.as_bytes())?;
        self.set_root(section, tree.root(), record_count.saturating_sub(1))?;
        decode_record(&record, &self.config)
    }

    /// Records of a section in ascending key order
    pub fn records(&self, section: &str) -> Result<Records<'_>> {
        let tree = self.tree(section)?;
        Ok(Records {
            inner: tree.iter(&self.store),
            config: &self.config,
        })
    }

    /// Decode a whole section into a map
    ///
    /// Fails if the walk finds a different number of records than the
    /// header claims.
    pub fn load_section(&self, section: &str) -> Result<Map> {
        let expected = self.record_count(section)?;
        let mut map = Map::new();
        for record in self.records(section)? {
            let (key, value) = record?;
            map.insert(key, value);
        }
        if map.len() as u64 != expected {
            return Err(PackError::InconsistentHeader(format!(
                "section {section:?} holds {} records, header claims {expected}",
                map.len()
            )));
        }
        Ok(map)
    }

    /// Replace a section's contents with sorted, pre-encoded records
    pub(crate) fn bulk_load<'r>(
        &mut self,
        section: &str,
        records: impl IntoIterator<Item = (&'r str, Vec<u8>)>,
    ) -> Result<u64> {
        if let Ok(old) = self.tree(section) {
            old.release(&mut self.store)?;
        }
        let mut builder = TreeBuilder::new(&mut self.store, &self.config)?;
        for (key, record) in records {
            builder.add(key.as_bytes(), &record)?;
        }
        let (tree, count) = builder.finish()?;
        self.set_root(section, tree.root(), count)?;
        Ok(count)
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Write the header and sync the file
    pub fn flush(&mut self) -> Result<()> {
        self.store.sync()
    }

    /// Flush and release the file
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        info!(
            path = %self.store.path().display(),
            pages = self.store.page_count(),
            sections = self.store.header().sections.len(),
            "closed save file"
        );
        Ok(())
    }
}

/// Iterator over a section's decoded records
pub struct Records<'a> {
    inner: TreeIter<'a>,
    config: &'a Config,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<(String, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, record) = match self.inner.next()? {
            Ok(pair) => pair,
            Err(e) => return Some(Err(e)),
        };
        let key = match String::from_utf8(key) {
            Ok(key) => key,
            Err(e) => return Some(Err(PackError::CorruptRecord(format!("record key is not UTF-8: {e}")))),
        };
        Some(decode_record(&record, self.config).map(|value| (key, value)))
    }
}
