//! Save Module
//!
//! Assembles the store, the B-tree and the value codec into save files.
//!
//! ## Responsibilities
//! - `SaveDb`: incremental access to named sections of a paged file
//! - `unpack` / `repack`: whole-file load and atomic whole-file rewrite
//! - `unpack_versioned` / `repack_versioned`: standalone `SBVJ01` files
//! - `diff`: path-by-path comparison of decoded value trees
//!
//! ## Record Layout
//! ```text
//! section "player"  ──▶  B-tree
//!                         key:    UTF-8 record key ("player")
//!                         record: ┌─────────────┬──────────────────┐
//!                                 │ Version (1) │ Tagged value     │
//!                                 └─────────────┴──────────────────┘
//! ```

mod database;
mod diff;
mod pack;

pub use database::{Records, SaveDb};
pub use diff::{diff, diff_sections};
pub use pack::{detect_kind, repack, repack_versioned, unpack, unpack_versioned, FileKind, Sections};
