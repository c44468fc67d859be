//! Type-tagged value codec
//!
//! ```text
//! ┌─────────┬──────────────────────────────────────────────┐
//! │ Tag (1) │ Body                                         │
//! ├─────────┼──────────────────────────────────────────────┤
//! │ 0x01    │ Null: empty                                  │
//! │ 0x02    │ Double: f64 big-endian (8)                   │
//! │ 0x03    │ Bool: u8                                     │
//! │ 0x04    │ Integer: zig-zag varint                      │
//! │ 0x05    │ String: varint len + UTF-8 bytes             │
//! │ 0x06    │ List: varint count + values                  │
//! │ 0x07    │ Map: varint count + (string key, value)*     │
//! └─────────┴──────────────────────────────────────────────┘
//! ```

use bytes::BufMut;

use crate::config::Config;
use crate::error::{PackError, Result};
use crate::value::{Map, Value};

use super::varint;

/// Value type tags as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Null = 0x01,
    Double = 0x02,
    Bool = 0x03,
    Integer = 0x04,
    String = 0x05,
    List = 0x06,
    Map = 0x07,
}

impl TypeTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(TypeTag::Null),
            0x02 => Some(TypeTag::Double),
            0x03 => Some(TypeTag::Bool),
            0x04 => Some(TypeTag::Integer),
            0x05 => Some(TypeTag::String),
            0x06 => Some(TypeTag::List),
            0x07 => Some(TypeTag::Map),
            _ => None,
        }
    }

    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => TypeTag::Null,
            Value::Double(_) => TypeTag::Double,
            Value::Bool(_) => TypeTag::Bool,
            Value::Integer(_) => TypeTag::Integer,
            Value::String(_) => TypeTag::String,
            Value::List(_) => TypeTag::List,
            Value::Map(_) => TypeTag::Map,
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Cursor over an encoded byte stream
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    max_depth: usize,
    ascii_only: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8], config: &Config) -> Self {
        Self {
            bytes,
            pos: 0,
            max_depth: config.max_value_depth,
            ascii_only: config.ascii_only,
        }
    }

    /// Current offset into the input
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(PackError::TruncatedInput {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i32_be(&mut self) -> Result<i32> {
        let raw = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn read_f64_be(&mut self) -> Result<f64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read_bytes(8)?);
        Ok(f64::from_be_bytes(raw))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, consumed) = varint::decode_u64(self.bytes, self.pos)?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn read_signed_varint(&mut self) -> Result<i64> {
        let (value, consumed) = varint::decode_i64(self.bytes, self.pos)?;
        self.pos += consumed;
        Ok(value)
    }

    /// Varint length that must fit in what is left of the input
    fn read_len(&mut self) -> Result<usize> {
        let offset = self.pos;
        let len = self.read_varint()?;
        match usize::try_from(len) {
            Ok(len) if len <= self.remaining() => Ok(len),
            _ => Err(PackError::TruncatedInput {
                offset,
                needed: len.saturating_sub(self.remaining() as u64) as usize,
            }),
        }
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let offset = self.pos;
        let raw = self.read_bytes(len)?;
        let s = std::str::from_utf8(raw).map_err(|e| PackError::InvalidString {
            offset,
            reason: e.to_string(),
        })?;
        if self.ascii_only && !s.is_ascii() {
            return Err(PackError::InvalidString {
                offset,
                reason: "non-ASCII string in ASCII-only mode".to_string(),
            });
        }
        Ok(s.to_string())
    }

    /// Read one tagged value
    pub fn read_value(&mut self) -> Result<Value> {
        self.read_value_at(0)
    }

    fn read_value_at(&mut self, depth: usize) -> Result<Value> {
        let offset = self.pos;
        let byte = self.read_u8()?;
        let tag = TypeTag::from_byte(byte).ok_or(PackError::UnknownTypeTag { tag: byte, offset })?;

        let value = match tag {
            TypeTag::Null => Value::Null,
            TypeTag::Double => Value::Double(self.read_f64_be()?),
            TypeTag::Bool => Value::Bool(self.read_u8()? != 0),
            TypeTag::Integer => Value::Integer(self.read_signed_varint()?),
            TypeTag::String => Value::String(self.read_string()?),
            TypeTag::List => {
                self.check_depth(depth + 1)?;
                // Every element takes at least one byte
                let count = self.read_len()?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value_at(depth + 1)?);
                }
                Value::List(items)
            }
            TypeTag::Map => {
                self.check_depth(depth + 1)?;
                let count = self.read_len()?;
                let mut map = Map::with_capacity(count);
                for _ in 0..count {
                    let key_offset = self.pos;
                    let key = self.read_string()?;
                    let item = self.read_value_at(depth + 1)?;
                    if map.insert(key, item).is_some() {
                        return Err(PackError::CorruptRecord(format!(
                            "duplicate map key at offset {key_offset}"
                        )));
                    }
                }
                Value::Map(map)
            }
        };
        Ok(value)
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(PackError::DepthLimitExceeded {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    /// Fail if any input is left over
    pub fn finish(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PackError::CorruptRecord(format!(
                "{} trailing bytes after value at offset {}",
                self.remaining(),
                self.pos
            )))
        }
    }
}

/// Decode a buffer holding exactly one tagged value
pub fn decode_value(bytes: &[u8], config: &Config) -> Result<Value> {
    let mut decoder = Decoder::new(bytes, config);
    let value = decoder.read_value()?;
    decoder.finish()?;
    Ok(value)
}

// =============================================================================
// Encoding
// =============================================================================

/// Append one tagged value to `buf`, returning the bytes written
pub fn encode_value<B: BufMut>(value: &Value, buf: &mut B, config: &Config) -> Result<usize> {
    Encoder {
        max_depth: config.max_value_depth,
        ascii_only: config.ascii_only,
    }
    .write_value(value, buf, 0)
}

/// Encode one tagged value into a fresh buffer
pub fn encode_to_vec(value: &Value, config: &Config) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_value(value, &mut out, config)?;
    Ok(out)
}

/// Append a varint-length-prefixed string
pub fn write_string<B: BufMut>(buf: &mut B, s: &str, config: &Config) -> Result<usize> {
    Encoder {
        max_depth: config.max_value_depth,
        ascii_only: config.ascii_only,
    }
    .write_string(s, buf)
}

struct Encoder {
    max_depth: usize,
    ascii_only: bool,
}

impl Encoder {
    fn write_string<B: BufMut>(&self, s: &str, buf: &mut B) -> Result<usize> {
        if self.ascii_only && !s.is_ascii() {
            return Err(PackError::InvalidString {
                offset: 0,
                reason: format!("non-ASCII string {s:?} in ASCII-only mode"),
            });
        }
        let written = varint::write_u64(buf, s.len() as u64);
        buf.put_slice(s.as_bytes());
        Ok(written + s.len())
    }

    fn write_value<B: BufMut>(&self, value: &Value, buf: &mut B, depth: usize) -> Result<usize> {
        buf.put_u8(TypeTag::of(value) as u8);
        let body = match value {
            Value::Null => 0,
            Value::Double(d) => {
                buf.put_f64(*d);
                8
            }
            Value::Bool(b) => {
                buf.put_u8(u8::from(*b));
                1
            }
            Value::Integer(i) => varint::write_i64(buf, *i),
            Value::String(s) => self.write_string(s, buf)?,
            Value::List(items) => {
                self.check_depth(depth + 1)?;
                let mut written = varint::write_u64(buf, items.len() as u64);
                for item in items {
                    written += self.write_value(item, buf, depth + 1)?;
                }
                written
            }
            Value::Map(map) => {
                self.check_depth(depth + 1)?;
                let mut written = varint::write_u64(buf, map.len() as u64);
                for (key, item) in map {
                    written += self.write_string(key, buf)?;
                    written += self.write_value(item, buf, depth + 1)?;
                }
                written
            }
        };
        Ok(1 + body)
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(PackError::DepthLimitExceeded {
                limit: self.max_depth,
            });
        }
        Ok(())
    }
}
