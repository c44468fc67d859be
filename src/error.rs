//! Error types for starpack
//!
//! Provides a unified error type for all operations, plus a coarse
//! [`ErrorKind`] taxonomy the CLI reports to the user.

use thiserror::Error;

use crate::storage::PageId;

/// Result type alias using PackError
pub type Result<T> = std::result::Result<T, PackError>;

/// Coarse failure classes
///
/// Every class except `NotFound` aborts the whole operation; nothing is
/// retried or patched internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad magic, unsupported version, malformed VLQ, unknown type tag
    Format,
    /// Corrupt node, cycle in page chain, inconsistent header pointers
    Structural,
    /// Underlying read/write failure, surfaced unchanged
    Io,
    /// Decompression failure on a specific page
    Compression,
    /// Missing key or section
    NotFound,
    /// Caller handed in something the format cannot represent
    Usage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Format => "format error",
            ErrorKind::Structural => "structural error",
            ErrorKind::Io => "I/O error",
            ErrorKind::Compression => "compression error",
            ErrorKind::NotFound => "not found",
            ErrorKind::Usage => "usage error",
        };
        f.write_str(name)
    }
}

/// Unified error type for starpack operations
#[derive(Debug, Error)]
pub enum PackError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Malformed varint at offset {offset} (truncated: {truncated})")]
    MalformedVarint { offset: usize, truncated: bool },

    #[error("Truncated input at offset {offset}: need {needed} more bytes")]
    TruncatedInput { offset: usize, needed: usize },

    #[error("Unknown type tag 0x{tag:02x} at offset {offset}")]
    UnknownTypeTag { tag: u8, offset: usize },

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported page size: {0}")]
    UnsupportedPageSize(u32),

    #[error("Invalid string at offset {offset}: {reason}")]
    InvalidString { offset: usize, reason: String },

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    // -------------------------------------------------------------------------
    // Structural Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt node at page {page}: {reason}")]
    CorruptNode { page: PageId, reason: String },

    #[error("Cycle detected: page {page} revisited")]
    CycleDetected { page: PageId },

    #[error("Depth limit of {limit} exceeded")]
    DepthLimitExceeded { limit: usize },

    #[error("Inconsistent header: {0}")]
    InconsistentHeader(String),

    #[error("Truncated file: expected at least {expected} bytes, found {actual}")]
    TruncatedFile { expected: u64, actual: u64 },

    #[error("Page {page} out of range (page count {page_count})")]
    PageOutOfRange { page: PageId, page_count: u64 },

    #[error("Corrupt free list at page {page}: {reason}")]
    CorruptFreeList { page: PageId, reason: String },

    // -------------------------------------------------------------------------
    // Compression Errors
    // -------------------------------------------------------------------------
    #[error("Decompression failed for page {page}: {reason}")]
    PageDecompressionFailed { page: PageId, reason: String },

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Section not found: {0}")]
    SectionNotFound(String),

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Key of {len} bytes exceeds the maximum of {max}")]
    KeyTooLarge { len: usize, max: usize },

    #[error("Invalid section: {0}")]
    InvalidSection(String),

    #[error("Unsorted input: {0}")]
    UnsortedInput(String),

    #[error("Header does not fit in one page ({needed} bytes, page size {page_size})")]
    HeaderOverflow { needed: usize, page_size: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PackError {
    /// Map this error onto the user-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::Io(_) => ErrorKind::Io,

            PackError::MalformedVarint { .. }
            | PackError::TruncatedInput { .. }
            | PackError::UnknownTypeTag { .. }
            | PackError::UnsupportedVersion(_)
            | PackError::InvalidHeader(_)
            | PackError::UnsupportedPageSize(_)
            | PackError::InvalidString { .. }
            | PackError::CorruptRecord(_) => ErrorKind::Format,

            PackError::CorruptNode { .. }
            | PackError::CycleDetected { .. }
            | PackError::DepthLimitExceeded { .. }
            | PackError::InconsistentHeader(_)
            | PackError::TruncatedFile { .. }
            | PackError::PageOutOfRange { .. }
            | PackError::CorruptFreeList { .. } => ErrorKind::Structural,

            PackError::PageDecompressionFailed { .. } => ErrorKind::Compression,

            PackError::KeyNotFound | PackError::SectionNotFound(_) => ErrorKind::NotFound,

            PackError::KeyTooLarge { .. }
            | PackError::InvalidSection(_)
            | PackError::UnsortedInput(_)
            | PackError::HeaderOverflow { .. }
            | PackError::Serialization(_)
            | PackError::Config(_) => ErrorKind::Usage,
        }
    }

    pub(crate) fn corrupt_node(page: PageId, reason: impl Into<String>) -> Self {
        PackError::CorruptNode {
            page,
            reason: reason.into(),
        }
    }
}
