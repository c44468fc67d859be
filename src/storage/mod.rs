//! Storage Module
//!
//! Paged file layer underneath the B-tree.
//!
//! ## Responsibilities
//! - Split a file into fixed-size pages (size recorded in the header)
//! - Keep a free-page list threaded through the free pages themselves
//! - Frame every page with a typed header and a payload checksum
//! - Compress leaf payloads when configured
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Page 0: file header (metadata)         │
//! ├────────────────────────────────────────┤
//! │ Page 1..N                              │
//! │ ┌──────────────────┬─────────────────┐ │
//! │ │ Page header (32) │ Payload         │ │
//! │ └──────────────────┴─────────────────┘ │
//! └────────────────────────────────────────┘
//! ```

pub mod compress;
mod header;
mod page;
mod store;

pub use header::{FileHeader, SectionRoot, FIXED_HEADER_SIZE, FORMAT_VERSION, MAGIC};
pub use page::{Page, PageHeader, PageType, FLAG_COMPRESSED, PAGE_HEADER_SIZE};
pub use store::{PageStore, StoreStats};

/// Zero-based page index within a file
pub type PageId = u64;

/// Null page pointer
pub const NO_PAGE: PageId = u64::MAX;

/// Page 0 holds the file header
pub const HEADER_PAGE: PageId = 0;
