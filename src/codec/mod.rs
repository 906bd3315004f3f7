//! Compression primitive boundary.
//!
//! The archive format only knows two method codes.  Method 2 is zlib
//! (deflate with the two-byte zlib header and adler32 trailer); method 1 is
//! a legacy LZ77 variant that this crate recognises but never decodes.
//!
//! The chunk layer consumes compression through the [`Codec`] trait so any
//! conforming deflate implementation can be substituted.

use std::io::{self, Read, Write};
use thiserror::Error;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// zlib's own default level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

// ── Method codes ─────────────────────────────────────────────────────────────

/// On-disk compression method byte of a chunk record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionMethod {
    Lz77 = 1,
    Zlib = 2,
}

impl CompressionMethod {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(CompressionMethod::Lz77),
            2 => Some(CompressionMethod::Zlib),
            _ => None,
        }
    }

    /// Human-readable name (diagnostics only).
    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::Lz77 => "lz77",
            CompressionMethod::Zlib => "zlib",
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn method(&self) -> CompressionMethod;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    /// Inflate at most `limit + 1` bytes.  A stream longer than `limit`
    /// comes back one byte over instead of being inflated in full.
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError>;
}

pub struct ZlibCodec {
    level: u32,
}

impl ZlibCodec {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Codec for ZlibCodec {
    fn method(&self) -> CompressionMethod { CompressionMethod::Zlib }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(data)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(limit.min(data.len().saturating_mul(4)));
        ZlibDecoder::new(data)
            .take(limit as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}
