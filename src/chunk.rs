//! Chunk codec: one [`ChunkRecord`] followed by `compressed_size` bytes.
//!
//! Decoding verifies the byte-sum checksum over the bytes as stored, undoes
//! the optional obfuscation, inflates, and checks the inflated length against
//! the record's `flat_size`.  Encoding is the exact inverse.

use std::borrow::Cow;

use tracing::trace;

use crate::checksum::chunk_sum;
use crate::codec::{Codec, CompressionMethod, ZlibCodec};
use crate::error::{HapiError, Result};
use crate::records::{ChunkRecord, Record, CHUNK_RESERVED_BYTE, SQSH_MARKER};

// ── Obfuscation ──────────────────────────────────────────────────────────────

/// `b' = (b - i) ^ i`, applied to stored bytes before inflating.
pub fn decrypt_in_place(data: &mut [u8]) {
    for (i, b) in data.iter_mut().enumerate() {
        let k = i as u8;
        *b = b.wrapping_sub(k) ^ k;
    }
}

/// `b' = (b ^ i) + i`, the inverse of [`decrypt_in_place`].
pub fn encrypt_in_place(data: &mut [u8]) {
    for (i, b) in data.iter_mut().enumerate() {
        let k = i as u8;
        *b = (*b ^ k).wrapping_add(k);
    }
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Decode a block that may or may not be chunk-wrapped, using zlib.
///
/// A block that does not start with the `SQSH` marker is returned unchanged.
pub fn decode_chunk(block: &[u8]) -> Result<Cow<'_, [u8]>> {
    decode_chunk_with(&ZlibCodec::default(), block)
}

pub fn decode_chunk_with<'a>(codec: &dyn Codec, block: &'a [u8]) -> Result<Cow<'a, [u8]>> {
    if !starts_with_marker(block) {
        trace!(len = block.len(), "block is stored raw");
        return Ok(Cow::Borrowed(block));
    }
    let (record, payload, _) = split_chunk(block, 0)?;
    Ok(Cow::Owned(decompress_with(codec, &record, payload)?))
}

fn starts_with_marker(block: &[u8]) -> bool {
    block.len() >= 4 && block[..4] == SQSH_MARKER.to_le_bytes()
}

/// Read the chunk at `offset` of `buf`.
///
/// Returns the record, the `compressed_size` stored bytes that follow it,
/// and the offset just past them.
pub fn split_chunk(buf: &[u8], offset: usize) -> Result<(ChunkRecord, &[u8], usize)> {
    let record = ChunkRecord::decode(buf, offset)?;
    let start = offset + ChunkRecord::SIZE;
    let len = record.compressed_size as usize;
    let available = buf.len().saturating_sub(start);
    if available < len {
        return Err(HapiError::Truncated {
            what: "chunk payload",
            offset: start,
            needed: len,
            available,
        });
    }
    Ok((record, &buf[start..start + len], start + len))
}

/// Verify, de-obfuscate and inflate one chunk's stored bytes with zlib.
pub fn decompress(record: &ChunkRecord, stored: &[u8]) -> Result<Vec<u8>> {
    decompress_with(&ZlibCodec::default(), record, stored)
}

pub fn decompress_with(codec: &dyn Codec, record: &ChunkRecord, stored: &[u8]) -> Result<Vec<u8>> {
    let len = record.compressed_size as usize;
    if stored.len() < len {
        return Err(HapiError::Truncated {
            what: "chunk payload",
            offset: 0,
            needed: len,
            available: stored.len(),
        });
    }
    let stored = &stored[..len];

    let actual = chunk_sum(stored);
    if actual != record.checksum {
        return Err(HapiError::ChecksumMismatch { expected: record.checksum, actual });
    }

    let mut compressed = Cow::Borrowed(stored);
    if record.is_encrypted() {
        decrypt_in_place(compressed.to_mut());
    }

    let flat = match CompressionMethod::from_u8(record.method) {
        Some(CompressionMethod::Zlib) => codec.decompress(&compressed, record.flat_size as usize)?,
        Some(CompressionMethod::Lz77) => return Err(HapiError::UnsupportedCompression(record.method)),
        None => return Err(HapiError::UnknownCompression(record.method)),
    };

    if flat.len() != record.flat_size as usize {
        return Err(HapiError::SizeMismatch {
            what: "chunk",
            expected: record.flat_size as usize,
            actual: flat.len(),
        });
    }
    Ok(flat)
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Compress `data` into a single chunk.
///
/// The checksum covers the bytes exactly as they will be stored, i.e. after
/// obfuscation when `encrypt` is set.
pub fn encode_chunk(codec: &dyn Codec, data: &[u8], encrypt: bool) -> Result<(ChunkRecord, Vec<u8>)> {
    let mut compressed = codec.compress(data)?;
    if encrypt {
        encrypt_in_place(&mut compressed);
    }
    let record = ChunkRecord {
        marker:          SQSH_MARKER,
        reserved:        CHUNK_RESERVED_BYTE,
        method:          codec.method() as u8,
        encrypted:       encrypt as u8,
        compressed_size: compressed.len() as u32,
        flat_size:       data.len() as u32,
        checksum:        chunk_sum(&compressed),
    };
    Ok((record, compressed))
}

/// Encode a region (directory tree or names) as `[ChunkRecord][bytes]`.
///
/// Region chunks carry 0 in the reserved byte; only file chunks use
/// [`CHUNK_RESERVED_BYTE`].
pub fn encode_region(codec: &dyn Codec, data: &[u8]) -> Result<Vec<u8>> {
    let (mut record, compressed) = encode_chunk(codec, data, false)?;
    record.reserved = 0;
    let mut out = Vec::with_capacity(ChunkRecord::SIZE + compressed.len());
    record.write(&mut out)?;
    out.extend_from_slice(&compressed);
    Ok(out)
}

// ── Whole-file storage policy ────────────────────────────────────────────────

/// How a file's bytes end up in the payload region.
#[derive(Debug, Clone)]
pub enum StoredPayload {
    /// Bytes stored verbatim; the entry's `compressed_size` is 0.
    Raw,
    /// One chunk holding the whole file.
    Chunked { record: ChunkRecord, compressed: Vec<u8> },
}

impl StoredPayload {
    /// Bytes this payload occupies in the archive, chunk record included.
    pub fn stored_len(&self, flat_len: usize) -> usize {
        match self {
            StoredPayload::Raw => flat_len,
            StoredPayload::Chunked { compressed, .. } => ChunkRecord::SIZE + compressed.len(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, StoredPayload::Chunked { .. })
    }
}

/// Decide raw vs. compressed storage for one whole file.
///
/// Files no larger than a chunk record are always raw, and so is any file
/// whose compressed form is not strictly smaller than the original.  The
/// writer never obfuscates.
pub fn compress_payload(codec: &dyn Codec, name: &str, data: &[u8]) -> Result<StoredPayload> {
    if data.len() <= ChunkRecord::SIZE {
        return Ok(StoredPayload::Raw);
    }
    let (record, compressed) = encode_chunk(codec, data, false)?;
    if compressed.is_empty() {
        return Err(HapiError::CompressorFault { name: name.to_owned() });
    }
    if compressed.len() >= data.len() {
        trace!(name, raw = data.len(), compressed = compressed.len(), "compression not worth it");
        return Ok(StoredPayload::Raw);
    }
    Ok(StoredPayload::Chunked { record, compressed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;

    fn text(len: usize) -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog. ".iter().cycle().take(len).copied().collect()
    }

    fn wrap(record: &ChunkRecord, stored: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        record.write(&mut out).unwrap();
        out.extend_from_slice(stored);
        out
    }

    #[test]
    fn obfuscation_inverts() {
        let original = text(1000);
        let mut data = original.clone();
        encrypt_in_place(&mut data);
        assert_ne!(data, original);
        decrypt_in_place(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn obfuscation_known_answer() {
        // index 2: (0x80 - 2) ^ 2 = 0x7E ^ 0x02 = 0x7C
        let mut data = [0x10, 0x05, 0x80];
        decrypt_in_place(&mut data);
        assert_eq!(data, [0x10, 0x05, 0x7C]);
        encrypt_in_place(&mut data);
        assert_eq!(data, [0x10, 0x05, 0x80]);
    }

    #[test]
    fn hand_encrypted_chunk_decodes() {
        let data = text(2000);
        let plain = ZlibCodec::default().compress(&data).unwrap();
        let stored: Vec<u8> = plain
            .iter()
            .enumerate()
            .map(|(i, &b)| (b ^ i as u8).wrapping_add(i as u8))
            .collect();
        let record = ChunkRecord {
            marker:          SQSH_MARKER,
            reserved:        CHUNK_RESERVED_BYTE,
            method:          CompressionMethod::Zlib as u8,
            encrypted:       1,
            compressed_size: stored.len() as u32,
            flat_size:       data.len() as u32,
            checksum:        stored.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32)),
        };
        assert_eq!(decode_chunk(&wrap(&record, &stored)).unwrap().as_ref(), data.as_slice());
    }

    #[test]
    fn chunk_roundtrip_plain_and_encrypted() {
        let codec = ZlibCodec::default();
        let data = text(5000);
        for encrypt in [false, true] {
            let (record, stored) = encode_chunk(&codec, &data, encrypt).unwrap();
            assert_eq!(record.is_encrypted(), encrypt);
            assert_eq!(record.flat_size as usize, data.len());
            assert_eq!(record.checksum, chunk_sum(&stored));
            let block = wrap(&record, &stored);
            assert_eq!(decode_chunk(&block).unwrap().as_ref(), data.as_slice());
        }
    }

    #[test]
    fn raw_block_passes_through() {
        let block = b"no marker here, just bytes".to_vec();
        let out = decode_chunk(&block).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ref(), block.as_slice());
        assert_eq!(decode_chunk(&[1, 2]).unwrap().as_ref(), &[1, 2]);
    }

    #[test]
    fn any_flipped_byte_fails_checksum() {
        let codec = ZlibCodec::default();
        let (record, stored) = encode_chunk(&codec, &text(800), false).unwrap();
        for i in 0..stored.len() {
            let mut corrupt = stored.clone();
            corrupt[i] ^= 0x01;
            let block = wrap(&record, &corrupt);
            assert!(matches!(
                decode_chunk(&block),
                Err(HapiError::ChecksumMismatch { .. })
            ));
        }
    }

    #[test]
    fn lz77_and_unknown_methods_fail() {
        let codec = ZlibCodec::default();
        let data = text(300);
        let (mut record, stored) = encode_chunk(&codec, &data, false).unwrap();

        record.method = 1;
        assert!(matches!(decode_chunk(&wrap(&record, &stored)), Err(HapiError::UnsupportedCompression(1))));

        record.method = 255;
        assert!(matches!(decode_chunk(&wrap(&record, &stored)), Err(HapiError::UnknownCompression(255))));
    }

    #[test]
    fn wrong_flat_size_is_size_mismatch() {
        let codec = ZlibCodec::default();
        let data = text(300);
        let (mut record, stored) = encode_chunk(&codec, &data, false).unwrap();
        record.flat_size += 1;
        match decode_chunk(&wrap(&record, &stored)) {
            Err(HapiError::SizeMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 301);
                assert_eq!(actual, 300);
            }
            other => panic!("expected size mismatch, got {other:?}"),
        }
    }

    #[test]
    fn oversized_stream_stops_past_declared_size() {
        let codec = ZlibCodec::default();
        let (mut record, stored) = encode_chunk(&codec, &vec![0u8; 1 << 20], false).unwrap();
        record.flat_size = 16;
        match decode_chunk(&wrap(&record, &stored)) {
            Err(HapiError::SizeMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 17);
            }
            other => panic!("expected size mismatch, got {other:?}"),
        }
    }

    #[test]
    fn region_chunks_zero_the_reserved_byte() {
        let codec = ZlibCodec::default();
        let data = text(500);
        let region = encode_region(&codec, &data).unwrap();
        assert_eq!(region[4], 0);
        assert_eq!(decode_chunk(&region).unwrap().as_ref(), data.as_slice());
        match compress_payload(&codec, "t", &data).unwrap() {
            StoredPayload::Chunked { record, .. } => assert_eq!(record.reserved, CHUNK_RESERVED_BYTE),
            StoredPayload::Raw => panic!("text should compress"),
        }
    }

    #[test]
    fn truncated_payload() {
        let codec = ZlibCodec::default();
        let (record, stored) = encode_chunk(&codec, &text(300), false).unwrap();
        let block = wrap(&record, &stored[..stored.len() - 1]);
        assert!(matches!(decode_chunk(&block), Err(HapiError::Truncated { .. })));
        assert!(matches!(decode_chunk(&block[..10]), Err(HapiError::Truncated { .. })));
    }

    #[test]
    fn tiny_files_stay_raw() {
        let codec = ZlibCodec::default();
        let data = vec![0u8; ChunkRecord::SIZE];
        assert!(matches!(compress_payload(&codec, "t", &data).unwrap(), StoredPayload::Raw));
        assert!(matches!(compress_payload(&codec, "t", &[]).unwrap(), StoredPayload::Raw));
    }

    #[test]
    fn incompressible_files_stay_raw() {
        let codec = ZlibCodec::default();
        // xorshift noise does not deflate
        let mut x = 0x2545_F491u32;
        let noise: Vec<u8> = (0..4096)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x as u8
            })
            .collect();
        assert!(matches!(compress_payload(&codec, "noise", &noise).unwrap(), StoredPayload::Raw));
    }

    #[test]
    fn compressible_files_are_chunked() {
        let codec = ZlibCodec::default();
        let data = text(10_000);
        let stored = compress_payload(&codec, "t", &data).unwrap();
        assert!(stored.is_compressed());
        assert!(stored.stored_len(data.len()) < data.len());
    }

    struct EmptyCodec;
    impl Codec for EmptyCodec {
        fn method(&self) -> CompressionMethod { CompressionMethod::Zlib }
        fn compress(&self, _: &[u8]) -> std::result::Result<Vec<u8>, CodecError> { Ok(Vec::new()) }
        fn decompress(&self, _: &[u8], _: usize) -> std::result::Result<Vec<u8>, CodecError> { Ok(Vec::new()) }
    }

    #[test]
    fn empty_compressor_output_is_a_fault() {
        let err = compress_payload(&EmptyCodec, "broken.bin", &text(100)).unwrap_err();
        assert!(matches!(err, HapiError::CompressorFault { ref name } if name == "broken.bin"));
    }
}
