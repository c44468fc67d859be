//! Whole-file unpack and repack

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexMap;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::codec::{encode_record, VersionedValue, SBVJ_FAMILY};
use crate::config::Config;
use crate::error::{PackError, Result};
use crate::storage::MAGIC;
use crate::value::Value;

use super::database::SaveDb;

/// Section name → section value (a map of record key → value)
pub type Sections = IndexMap<String, Value>;

/// The two container formats a save file can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Paged B-tree database with named sections
    Paged,
    /// Single `SBVJ01` versioned value
    Versioned,
}

/// Tell the container format from the leading magic bytes
pub fn detect_kind(path: &Path) -> Result<FileKind> {
    let mut prefix = Vec::with_capacity(MAGIC.len());
    File::open(path)?.take(MAGIC.len() as u64).read_to_end(&mut prefix)?;

    if prefix.as_slice() == MAGIC {
        Ok(FileKind::Paged)
    } else if prefix.starts_with(SBVJ_FAMILY) {
        Ok(FileKind::Versioned)
    } else {
        Err(PackError::InvalidHeader(format!(
            "unrecognised magic {:?}",
            String::from_utf8_lossy(&prefix)
        )))
    }
}

// =============================================================================
// Paged files
// =============================================================================

/// Decode every section of a paged save file
pub fn unpack(path: &Path, config: &Config) -> Result<Sections> {
    let db = SaveDb::open_read_only(path, config)?;
    let mut sections = Sections::new();
    let mut records = 0usize;
    for name in db.section_names() {
        let map = db.load_section(&name)?;
        records += map.len();
        sections.insert(name, Value::Map(map));
    }
    info!(
        path = %path.display(),
        sections = sections.len(),
        records,
        "unpacked save file"
    );
    Ok(sections)
}

/// Write `sections` as a fresh paged save file at `path`
///
/// Every section value must be a map. The file is assembled next to `path`
/// and only replaces it once complete; on failure `path` is untouched.
pub fn repack(path: &Path, sections: &Sections, config: &Config) -> Result<()> {
    // Encode everything before touching the filesystem
    let mut encoded = Vec::with_capacity(sections.len());
    for (name, value) in sections {
        let map = value.as_map().ok_or_else(|| {
            PackError::InvalidSection(format!("section {name:?} is a {}, expected a map", value.type_name()))
        })?;
        let mut records = Vec::with_capacity(map.len());
        for (key, value) in map {
            records.push((key.as_str(), encode_record(value, config)?));
        }
        records.sort_unstable_by(|a, b| a.0.cmp(b.0));
        encoded.push((name.as_str(), records));
    }

    let mut total = 0u64;
    write_atomically(path, |temp| {
        let mut db = SaveDb::create(temp, config)?;
        for (name, records) in encoded {
            let count = db.bulk_load(name, records)?;
            debug!(section = name, records = count, "loaded section");
            total += count;
        }
        db.close()
    })?;

    info!(
        path = %path.display(),
        sections = sections.len(),
        records = total,
        "repacked save file"
    );
    Ok(())
}

// =============================================================================
// Versioned files
// =============================================================================

/// Decode a standalone `SBVJ01` file
pub fn unpack_versioned(path: &Path, config: &Config) -> Result<VersionedValue> {
    let bytes = fs::read(path)?;
    let value = VersionedValue::decode(&bytes, config)?;
    info!(
        path = %path.display(),
        identifier = %value.identifier,
        version = ?value.version,
        "unpacked versioned file"
    );
    Ok(value)
}

/// Write a standalone `SBVJ01` file, replacing `path` atomically
pub fn repack_versioned(path: &Path, value: &VersionedValue, config: &Config) -> Result<()> {
    let bytes = value.encode(config)?;
    write_atomically(path, |temp| {
        let mut file = File::create(temp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    })?;
    info!(path = %path.display(), bytes = bytes.len(), "repacked versioned file");
    Ok(())
}

/// Build a file at a temporary path beside `path`, then rename it over `path`
pub(crate) fn write_atomically<F>(path: &Path, build: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)?;
    build(temp.path())?;
    temp.persist(path).map_err(|e| PackError::Io(e.error))?;
    Ok(())
}
