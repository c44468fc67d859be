//! Codec Module
//!
//! Byte-level encodings shared by every layer of the save format.
//!
//! ## Layers
//! - `varint`: 7-bit group integers (lengths, counts, signed integers)
//! - `value`: type-tagged dynamic values (null, bool, double, integer,
//!   string, list, map)
//! - `versioned`: a version tag in front of an encoded value, either the
//!   one-byte record codec version or the `SBVJ01` file envelope
//!
//! Unknown tags and versions are rejected outright; the decoder never
//! guesses at a shape it does not recognise.

pub mod varint;
mod value;
mod versioned;

pub use value::{decode_value, encode_to_vec, encode_value, write_string, Decoder, TypeTag};
pub use versioned::{
    check_sbvj_magic, decode_record, encode_record, VersionedValue, RECORD_CODEC_VERSION,
    SBVJ_FAMILY, SBVJ_VERSION,
};
