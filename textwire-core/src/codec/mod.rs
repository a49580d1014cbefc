//! Wire codecs — printable-safe representations of raw bytes.
//!
//! Two schemes are supported:
//! - [`escape`]: byte-escaping; 5 reserved byte values become a
//!   backslash plus two hex digits, everything else passes through.
//! - [`linepack`]: uu-style line packing; 45-byte lines, each 3-byte
//!   group mapped to 4 printable characters.
//!
//! Both decoders are chunk-safe: when the last codec unit in a chunk is
//! incomplete they report how many trailing input bytes were left
//! unconsumed, so the caller can retry them once more input arrives.

pub mod escape;
pub mod linepack;

use serde::{Deserialize, Serialize};

/// Which wire encoding a relay instance speaks. Selected once per
/// session, immutable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMethod {
    /// uu-style 3-byte → 4-character line packing.
    #[serde(alias = "uuencode")]
    LinePacking,
    /// Backslash-hex escaping of reserved bytes.
    #[default]
    Escape,
}

impl EncodingMethod {
    /// Encode raw bytes into the printable wire form. Total and
    /// deterministic; consumes all input (short final units are
    /// zero-padded), so there is never an unconsumed tail.
    pub fn encode(&self, input: &[u8]) -> Vec<u8> {
        match self {
            EncodingMethod::LinePacking => linepack::encode(input),
            EncodingMethod::Escape => escape::encode(input),
        }
    }

    /// Decode wire bytes back to the raw form.
    ///
    /// Returns the decoded bytes and the number of trailing input bytes
    /// that formed an incomplete unit and must be re-presented with the
    /// next chunk.
    pub fn decode(&self, input: &[u8]) -> (Vec<u8>, usize) {
        match self {
            EncodingMethod::LinePacking => linepack::decode(input),
            EncodingMethod::Escape => escape::decode(input),
        }
    }
}

impl std::fmt::Display for EncodingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingMethod::LinePacking => write!(f, "uuencode"),
            EncodingMethod::Escape => write!(f, "escape"),
        }
    }
}
