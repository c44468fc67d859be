//! Variable-length integer codec
//!
//! Each byte carries 7 payload bits; bit 7 is set on every byte except the
//! last. Groups are written most-significant first, so `1024` encodes as
//! `[0x88, 0x00]`. Signed values are zig-zag mapped before encoding.

use bytes::BufMut;

use crate::error::{PackError, Result};

/// Maximum number of 7-bit groups needed for a u64
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7f;

/// Number of bytes `n` occupies when encoded
pub fn encoded_len(n: u64) -> usize {
    let bits = 64 - n.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Encode an unsigned integer using the minimal number of groups
pub fn encode_u64(n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(n));
    write_u64(&mut out, n);
    out
}

/// Append an unsigned integer to `buf`, returning the bytes written
pub fn write_u64<B: BufMut>(buf: &mut B, n: u64) -> usize {
    let len = encoded_len(n);
    for group in (1..len).rev() {
        buf.put_u8(((n >> (7 * group)) as u8 & PAYLOAD_MASK) | CONTINUATION);
    }
    buf.put_u8(n as u8 & PAYLOAD_MASK);
    len
}

/// Decode an unsigned integer starting at `offset`
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8], offset: usize) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for consumed in 0..MAX_VARINT_LEN {
        let byte = *bytes.get(offset + consumed).ok_or(PackError::MalformedVarint {
            offset,
            truncated: true,
        })?;
        if value > (u64::MAX >> 7) {
            return Err(PackError::MalformedVarint {
                offset,
                truncated: false,
            });
        }
        value = (value << 7) | u64::from(byte & PAYLOAD_MASK);
        if byte & CONTINUATION == 0 {
            return Ok((value, consumed + 1));
        }
    }
    Err(PackError::MalformedVarint {
        offset,
        truncated: false,
    })
}

/// Map a signed integer onto the unsigned range: 0, -1, 1, -2, 2 ...
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

pub fn encode_i64(n: i64) -> Vec<u8> {
    encode_u64(zigzag_encode(n))
}

pub fn write_i64<B: BufMut>(buf: &mut B, n: i64) -> usize {
    write_u64(buf, zigzag_encode(n))
}

pub fn decode_i64(bytes: &[u8], offset: usize) -> Result<(i64, usize)> {
    decode_u64(bytes, offset).map(|(n, consumed)| (zigzag_decode(n), consumed))
}
