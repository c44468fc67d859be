//! Configuration for starpack
//!
//! Centralized configuration with sensible defaults. A `Config` is always
//! passed explicitly to the store and codec; nothing is read from globals, so
//! several files can be processed side by side in one process.

use crate::error::{PackError, Result};

/// Smallest accepted page size
pub const MIN_PAGE_SIZE: u32 = 512;

/// Largest accepted page size
pub const MAX_PAGE_SIZE: u32 = 64 * 1024;

/// Main configuration for packing and unpacking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Page size for newly created files (existing files keep their own)
    pub page_size: u32,

    /// Compression applied to leaf pages and overflow records on write
    pub compression: Compression,

    // -------------------------------------------------------------------------
    // Codec Configuration
    // -------------------------------------------------------------------------
    /// Maximum nesting of lists/maps accepted by the value codec
    pub max_value_depth: usize,

    /// Maximum B-tree height accepted while descending
    pub max_tree_depth: usize,

    /// Reject non-ASCII strings on encode and decode (off by default;
    /// strings are always checked as UTF-8)
    pub ascii_only: bool,
}

/// Page compression strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Pages are always stored raw
    None,

    /// Pages are zstd-compressed when that makes them smaller
    Zstd { level: i32 },
}

impl Compression {
    /// Parse `none`, `zstd` or `zstd:<level>`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            None if s == "none" => Ok(Compression::None),
            None if s == "zstd" => Ok(Compression::Zstd { level: 3 }),
            Some(("zstd", level)) => level
                .parse::<i32>()
                .map(|level| Compression::Zstd { level })
                .map_err(|e| PackError::Config(format!("invalid zstd level {level:?}: {e}"))),
            _ => Err(PackError::Config(format!("unknown compression {s:?}"))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 4096,
            compression: Compression::Zstd { level: 3 },
            max_value_depth: 512,
            max_tree_depth: 32,
            ascii_only: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Defaults overlaid with `STARPACK_PAGE_SIZE`, `STARPACK_COMPRESSION`
    /// and `STARPACK_ASCII` from the environment
    pub fn from_env() -> Result<Self> {
        let mut builder = Config::builder();

        if let Ok(size) = std::env::var("STARPACK_PAGE_SIZE") {
            let size = size
                .trim()
                .parse::<u32>()
                .map_err(|e| PackError::Config(format!("STARPACK_PAGE_SIZE={size:?}: {e}")))?;
            builder = builder.page_size(size);
        }
        if let Ok(compression) = std::env::var("STARPACK_COMPRESSION") {
            builder = builder.compression(Compression::parse(&compression)?);
        }
        if let Ok(flag) = std::env::var("STARPACK_ASCII") {
            builder = builder.ascii_only(parse_flag(&flag));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Check the page size is one the store accepts
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)?;
        if self.max_value_depth == 0 || self.max_tree_depth == 0 {
            return Err(PackError::Config("depth limits must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Page sizes are powers of two between 512 bytes and 64 KiB
pub fn validate_page_size(page_size: u32) -> Result<()> {
    if page_size.is_power_of_two() && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        Ok(())
    } else {
        Err(PackError::UnsupportedPageSize(page_size))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_uppercase().as_str(), "1" | "T" | "TRUE")
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the page size used for new files
    pub fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the compression strategy
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set the maximum value nesting depth
    pub fn max_value_depth(mut self, depth: usize) -> Self {
        self.config.max_value_depth = depth;
        self
    }

    /// Set the maximum B-tree height
    pub fn max_tree_depth(mut self, depth: usize) -> Self {
        self.config.max_tree_depth = depth;
        self
    }

    /// Restrict strings to ASCII
    pub fn ascii_only(mut self, ascii_only: bool) -> Self {
        self.config.ascii_only = ascii_only;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
