//! # starpack
//!
//! Lossless unpack/repack of game save files:
//! - Self-describing value encoding (null, bool, double, integer, string,
//!   list, map) behind a version tag
//! - Paged file store with a free-page list and optional zstd compression
//! - B-tree index per named section, with overflow chains for large records
//! - Atomic whole-file repack
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Save Assembler (save)                      │
//! │          unpack / repack / SaveDb / versioned files         │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │                               │
//!                ▼                               ▼
//!   ┌────────────────────────┐      ┌────────────────────────┐
//!   │     B-tree (btree)     │      │  Value Codec (codec)   │
//!   │ lookup/insert/delete   │      │  tagged values, SBVJ01 │
//!   └───────────┬────────────┘      └───────────┬────────────┘
//!               │                               │
//!               ▼                               ▼
//!   ┌────────────────────────┐      ┌────────────────────────┐
//!   │  Paged Store (storage) │      │   VLQ (codec::varint)  │
//!   │ pages, free list, zstd │      │                        │
//!   └────────────────────────┘      └────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod value;

pub mod codec;
pub mod storage;
pub mod btree;
pub mod save;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Compression, Config};
pub use error::{ErrorKind, PackError, Result};
pub use save::{
    detect_kind, diff, diff_sections, repack, repack_versioned, unpack, unpack_versioned, FileKind, SaveDb,
    Sections,
};
pub use codec::VersionedValue;
pub use value::{Map, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of starpack
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
