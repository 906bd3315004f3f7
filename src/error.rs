//! Error taxonomy for loading, building and extracting HAPI archives.
//!
//! Every variant is terminal for the operation that raised it.  Nothing is
//! retried internally and no partial result is ever returned alongside an
//! error.

use std::io;
use thiserror::Error;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum HapiError {
    #[error("Invalid HAPI marker. Expected: {expected:#x} Got: {actual:#x}")]
    InvalidMarker { expected: u32, actual: u32 },

    #[error("Unsupported HAPI version. Expected: {expected:#x} Got: {actual:#x}")]
    UnsupportedVersion { expected: u32, actual: u32 },

    /// The buffer ends before a record or a declared region does.
    #[error("Truncated {what} at offset {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        what:      &'static str,
        offset:    usize,
        needed:    usize,
        available: usize,
    },

    #[error("Checksum mismatch! Expected: {expected:#010x} Got: {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Compression method {0} (LZ77) is not supported")]
    UnsupportedCompression(u8),

    #[error("Unknown compression method: {0}")]
    UnknownCompression(u8),

    #[error("Size mismatch in {what}. Expected: {expected} bytes; Got: {actual} bytes")]
    SizeMismatch {
        what:     &'static str,
        expected: usize,
        actual:   usize,
    },

    /// A name pointer has no null terminator inside the names region.
    #[error("Unterminated name at offset {offset} (names region is {region_len} bytes)")]
    NameResolution { offset: usize, region_len: usize },

    #[error("Short read on '{name}': declared {expected} bytes, source produced {actual}")]
    ShortRead {
        name:     String,
        expected: usize,
        actual:   usize,
    },

    /// A directory record is reachable from itself.
    #[error("Directory record at offset {offset} is part of a cycle")]
    CyclicDirectory { offset: usize },

    #[error("Archive would be {size} bytes, beyond the 32-bit offset range")]
    ArchiveTooLarge { size: usize },

    #[error("'{path}' is not a file entry")]
    NotAnEntry { path: String },

    #[error("Compressor returned no output for '{name}'")]
    CompressorFault { name: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, HapiError>;
