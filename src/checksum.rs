//! Checksum primitives: an MD5 accumulator fed by incoming delta
//! windows, plus hex/base64 decoding for checksums quoted by a
//! producer in either encoding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest, Md5};

use crate::error::{EditError, ErrorCode, Result};

/// Accumulates the MD5 digest of a file's resulting fulltext as delta
/// windows are applied to it.
#[derive(Default)]
pub struct ChecksumAccumulator {
    hasher: Md5,
}

impl ChecksumAccumulator {
    pub fn new() -> Self {
        ChecksumAccumulator {
            hasher: Md5::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> [u8; 16] {
        self.hasher.finalize().into()
    }
}

/// A checksum quoted by a producer, in either modern hex or legacy
/// base-64 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum(pub [u8; 16]);

impl Checksum {
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut acc = ChecksumAccumulator::new();
        acc.update(data);
        Checksum(acc.finalize())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses either a hex-encoded or (for backward compatibility) a
    /// base64-encoded 16-byte MD5 digest.
    pub fn parse(s: &str) -> Result<Self> {
        if let Ok(bytes) = hex::decode(s) {
            if let Ok(arr) = <[u8; 16]>::try_from(bytes.as_slice()) {
                return Ok(Checksum(arr));
            }
        }
        if let Ok(bytes) = BASE64.decode(s) {
            if let Ok(arr) = <[u8; 16]>::try_from(bytes.as_slice()) {
                return Ok(Checksum(arr));
            }
        }
        Err(EditError::new(
            ErrorCode::CorruptTextBase,
            format!("'{s}' is not a recognizable MD5 checksum"),
        ))
    }
}

impl fmt_impl::Display for Checksum {
    fn fmt(&self, f: &mut fmt_impl::Formatter<'_>) -> fmt_impl::Result {
        f.write_str(&self.to_hex())
    }
}

use std::fmt as fmt_impl;
