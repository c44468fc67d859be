//! Version-tagged value containers
//!
//! Two wrappers put a format version in front of an encoded value:
//!
//! - **Record payloads** stored in the B-tree: `[codec version (1)][value]`
//! - **SBVJ01 files** (stand-alone saves such as `.player`):
//!
//! ```text
//! ┌──────────┬─────────┬──────────────┬──────────┬──────────────┬─────────┐
//! │ "SBVJ"(4)│ "01"(2) │ identifier   │ flag (1) │ version (4)  │ value   │
//! │          │         │ varint + str │          │ only if flag │         │
//! └──────────┴─────────┴──────────────┴──────────┴──────────────┴─────────┘
//! ```

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{PackError, Result};
use crate::value::Value;

use super::value::{encode_value, write_string, Decoder};

/// Codec version written in front of every record payload
pub const RECORD_CODEC_VERSION: u8 = 1;

/// Family part of the SBVJ magic
pub const SBVJ_FAMILY: &[u8; 4] = b"SBVJ";

/// Version part of the SBVJ magic this codec understands
pub const SBVJ_VERSION: &[u8; 2] = b"01";

/// Total SBVJ magic length
pub const SBVJ_MAGIC_LEN: usize = 6;

// =============================================================================
// Record payloads
// =============================================================================

/// Encode a value as a B-tree record payload
pub fn encode_record(value: &Value, config: &Config) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    out.put_u8(RECORD_CODEC_VERSION);
    encode_value(value, &mut out, config)?;
    Ok(out)
}

/// Decode a B-tree record payload
pub fn decode_record(bytes: &[u8], config: &Config) -> Result<Value> {
    let mut decoder = Decoder::new(bytes, config);
    let version = decoder.read_u8()?;
    if version != RECORD_CODEC_VERSION {
        return Err(PackError::UnsupportedVersion(format!(
            "record codec version {version}"
        )));
    }
    let value = decoder.read_value()?;
    decoder.finish()?;
    Ok(value)
}

// =============================================================================
// SBVJ01 envelope
// =============================================================================

/// A stand-alone versioned value: identifier, optional version, content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    /// Entity identifier, e.g. `"PlayerEntity"`
    pub identifier: String,

    /// Entity schema version, absent when the flag byte is zero
    pub version: Option<i32>,

    /// The value tree itself
    pub content: Value,
}

impl VersionedValue {
    pub fn new(identifier: impl Into<String>, version: Option<i32>, content: Value) -> Self {
        Self {
            identifier: identifier.into(),
            version,
            content,
        }
    }

    /// Encode with the SBVJ01 magic
    pub fn encode(&self, config: &Config) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        out.put_slice(SBVJ_FAMILY);
        out.put_slice(SBVJ_VERSION);
        write_string(&mut out, &self.identifier, config)?;
        match self.version {
            Some(version) => {
                out.put_u8(1);
                out.put_i32(version);
            }
            None => out.put_u8(0),
        }
        encode_value(&self.content, &mut out, config)?;
        Ok(out)
    }

    /// Decode a whole SBVJ01 buffer; the value must end exactly at the end
    pub fn decode(bytes: &[u8], config: &Config) -> Result<Self> {
        check_sbvj_magic(bytes)?;

        let mut decoder = Decoder::new(bytes, config);
        decoder.read_bytes(SBVJ_MAGIC_LEN)?;
        let identifier = decoder.read_string()?;
        let version = match decoder.read_u8()? {
            0 => None,
            _ => Some(decoder.read_i32_be()?),
        };
        let content = decoder.read_value()?;
        decoder.finish()?;

        Ok(Self {
            identifier,
            version,
            content,
        })
    }
}

/// Validate the 6-byte SBVJ magic
pub fn check_sbvj_magic(bytes: &[u8]) -> Result<()> {
    if bytes.len() < SBVJ_MAGIC_LEN || &bytes[0..4] != SBVJ_FAMILY {
        return Err(PackError::InvalidHeader(format!(
            "expected SBVJ magic, got {:?}",
            &bytes[..bytes.len().min(SBVJ_MAGIC_LEN)]
        )));
    }
    if &bytes[4..6] != SBVJ_VERSION {
        return Err(PackError::UnsupportedVersion(format!(
            "SBVJ{}",
            String::from_utf8_lossy(&bytes[4..6])
        )));
    }
    Ok(())
}
