//! Fixed-layout records of the HAPI format.
//!
//! All integers are little-endian.  Record sizes are fixed constants; layout
//! code relies on [`Record::SIZE`] and never derives a size from field counts.
//!
//! ```text
//! Version    8 B   marker u32 | version u32
//! Header    24 B   dir_ptr u32 | dir_len u32 | names_ptr u32 | names_len u32 | data u32 | reserved u32
//! Chunk     19 B   marker u32 | reserved u8 | method u8 | encrypted u8 | comp_size u32 | flat_size u32 | checksum u32
//! Directory 20 B   name_ptr u32 | first_subdir u32 | subdir_count u32 | first_file u32 | file_count u32
//! Entry     24 B   name_ptr u32 | data_start u32 | flat_size u32 | comp_size u32 | date u32 | checksum u32
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{HapiError, Result};

/// `"HAPI"` read as a little-endian u32.
pub const HAPI_MARKER:  u32 = 0x4950_4148;
pub const HAPI_VERSION: u32 = 0x0002_0000;
/// `"SQSH"` read as a little-endian u32.
pub const SQSH_MARKER:  u32 = 0x4853_5153;

/// Value the writer stores in the chunk record's reserved byte.
pub const CHUNK_RESERVED_BYTE: u8 = 0x02;

// ── Record trait ─────────────────────────────────────────────────────────────

/// A fixed-size little-endian record.
///
/// `Default` yields an all-zero draft to be filled in before encoding.
pub trait Record: Sized + Default {
    const SIZE: usize;
    /// Diagnostic name used in truncation errors.
    const KIND: &'static str;

    fn read<R: Read>(reader: R) -> io::Result<Self>;
    fn write<W: Write>(&self, writer: W) -> io::Result<()>;

    /// Decode exactly `SIZE` bytes at `offset`.
    fn decode(buf: &[u8], offset: usize) -> Result<Self> {
        let slice = record_slice(buf, offset, Self::SIZE, Self::KIND)?;
        Ok(Self::read(slice)?)
    }

    /// Encode into `buf` at `offset`; returns the number of bytes written.
    fn encode(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let available = buf.len().saturating_sub(offset);
        if available < Self::SIZE {
            return Err(HapiError::Truncated {
                what: Self::KIND,
                offset,
                needed: Self::SIZE,
                available,
            });
        }
        self.write(&mut buf[offset..offset + Self::SIZE])?;
        Ok(Self::SIZE)
    }
}

fn record_slice<'a>(buf: &'a [u8], offset: usize, size: usize, what: &'static str) -> Result<&'a [u8]> {
    let available = buf.len().saturating_sub(offset);
    if available < size {
        return Err(HapiError::Truncated { what, offset, needed: size, available });
    }
    Ok(&buf[offset..offset + size])
}

// ── Version ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionRecord {
    pub marker:  u32,
    pub version: u32,
}

impl VersionRecord {
    pub fn new() -> Self {
        Self { marker: HAPI_MARKER, version: HAPI_VERSION }
    }

    pub fn validate(&self) -> Result<()> {
        if self.marker != HAPI_MARKER {
            return Err(HapiError::InvalidMarker { expected: HAPI_MARKER, actual: self.marker });
        }
        if self.version != HAPI_VERSION {
            return Err(HapiError::UnsupportedVersion { expected: HAPI_VERSION, actual: self.version });
        }
        Ok(())
    }
}

impl Record for VersionRecord {
    const SIZE: usize = 8;
    const KIND: &'static str = "version record";

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            marker:  reader.read_u32::<LittleEndian>()?,
            version: reader.read_u32::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.marker)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        Ok(())
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Locates the two chunk-wrapped regions and the start of payload data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderRecord {
    pub dir_block_ptr:   u32,
    pub dir_block_len:   u32,
    pub names_block_ptr: u32,
    pub names_block_len: u32,
    pub data_ptr:        u32,
    pub reserved:        u32,
}

impl Record for HeaderRecord {
    const SIZE: usize = 24;
    const KIND: &'static str = "header record";

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            dir_block_ptr:   reader.read_u32::<LittleEndian>()?,
            dir_block_len:   reader.read_u32::<LittleEndian>()?,
            names_block_ptr: reader.read_u32::<LittleEndian>()?,
            names_block_len: reader.read_u32::<LittleEndian>()?,
            data_ptr:        reader.read_u32::<LittleEndian>()?,
            reserved:        reader.read_u32::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.dir_block_ptr)?;
        writer.write_u32::<LittleEndian>(self.dir_block_len)?;
        writer.write_u32::<LittleEndian>(self.names_block_ptr)?;
        writer.write_u32::<LittleEndian>(self.names_block_len)?;
        writer.write_u32::<LittleEndian>(self.data_ptr)?;
        writer.write_u32::<LittleEndian>(self.reserved)?;
        Ok(())
    }
}

// ── Chunk ────────────────────────────────────────────────────────────────────

/// Precedes every compressed block.  A block whose first four bytes are not
/// [`SQSH_MARKER`] is stored raw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkRecord {
    pub marker:          u32,
    pub reserved:        u8,
    pub method:          u8,
    pub encrypted:       u8,
    pub compressed_size: u32,
    pub flat_size:       u32,
    pub checksum:        u32,
}

impl ChunkRecord {
    #[inline]
    pub fn is_chunk(&self) -> bool { self.marker == SQSH_MARKER }

    #[inline]
    pub fn is_encrypted(&self) -> bool { self.encrypted != 0 }
}

impl Record for ChunkRecord {
    const SIZE: usize = 19;
    const KIND: &'static str = "chunk record";

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            marker:          reader.read_u32::<LittleEndian>()?,
            reserved:        reader.read_u8()?,
            method:          reader.read_u8()?,
            encrypted:       reader.read_u8()?,
            compressed_size: reader.read_u32::<LittleEndian>()?,
            flat_size:       reader.read_u32::<LittleEndian>()?,
            checksum:        reader.read_u32::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.marker)?;
        writer.write_u8(self.reserved)?;
        writer.write_u8(self.method)?;
        writer.write_u8(self.encrypted)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.flat_size)?;
        writer.write_u32::<LittleEndian>(self.checksum)?;
        Ok(())
    }
}

// ── Directory ────────────────────────────────────────────────────────────────

/// Pointers are offsets into the decompressed directory region.  They are
/// meaningful only when the matching count is nonzero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub name_ptr:         u32,
    pub first_subdir_ptr: u32,
    pub subdir_count:     u32,
    pub first_file_ptr:   u32,
    pub file_count:       u32,
}

impl Record for DirectoryRecord {
    const SIZE: usize = 20;
    const KIND: &'static str = "directory record";

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            name_ptr:         reader.read_u32::<LittleEndian>()?,
            first_subdir_ptr: reader.read_u32::<LittleEndian>()?,
            subdir_count:     reader.read_u32::<LittleEndian>()?,
            first_file_ptr:   reader.read_u32::<LittleEndian>()?,
            file_count:       reader.read_u32::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.name_ptr)?;
        writer.write_u32::<LittleEndian>(self.first_subdir_ptr)?;
        writer.write_u32::<LittleEndian>(self.subdir_count)?;
        writer.write_u32::<LittleEndian>(self.first_file_ptr)?;
        writer.write_u32::<LittleEndian>(self.file_count)?;
        Ok(())
    }
}

// ── Entry ────────────────────────────────────────────────────────────────────

/// `data_start_ptr` is an absolute archive offset.  `compressed_size == 0`
/// means the payload is stored raw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryRecord {
    pub name_ptr:        u32,
    pub data_start_ptr:  u32,
    pub flat_size:       u32,
    pub compressed_size: u32,
    pub date:            u32,
    pub checksum:        u32,
}

impl EntryRecord {
    #[inline]
    pub fn is_compressed(&self) -> bool { self.compressed_size != 0 }
}

impl Record for EntryRecord {
    const SIZE: usize = 24;
    const KIND: &'static str = "entry record";

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            name_ptr:        reader.read_u32::<LittleEndian>()?,
            data_start_ptr:  reader.read_u32::<LittleEndian>()?,
            flat_size:       reader.read_u32::<LittleEndian>()?,
            compressed_size: reader.read_u32::<LittleEndian>()?,
            date:            reader.read_u32::<LittleEndian>()?,
            checksum:        reader.read_u32::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.name_ptr)?;
        writer.write_u32::<LittleEndian>(self.data_start_ptr)?;
        writer.write_u32::<LittleEndian>(self.flat_size)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.date)?;
        writer.write_u32::<LittleEndian>(self.checksum)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_bytes_spell_hapi() {
        let mut buf = [0u8; VersionRecord::SIZE];
        VersionRecord::new().encode(&mut buf, 0).unwrap();
        assert_eq!(&buf[..4], b"HAPI");
        assert_eq!(&buf[4..], &[0x00, 0x00, 0x02, 0x00]);
    }

    #[test]
    fn chunk_layout_is_nineteen_bytes() {
        let rec = ChunkRecord {
            marker:          SQSH_MARKER,
            reserved:        CHUNK_RESERVED_BYTE,
            method:          2,
            encrypted:       1,
            compressed_size: 0x0102_0304,
            flat_size:       0x0A0B_0C0D,
            checksum:        0xDEAD_BEEF,
        };
        let mut buf = vec![0u8; ChunkRecord::SIZE];
        assert_eq!(rec.encode(&mut buf, 0).unwrap(), 19);
        assert_eq!(&buf[..4], b"SQSH");
        assert_eq!(buf[4], 0x02);
        assert_eq!(buf[5], 2);
        assert_eq!(buf[6], 1);
        assert_eq!(&buf[7..11], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(ChunkRecord::decode(&buf, 0).unwrap(), rec);
    }

    #[test]
    fn decode_at_offset() {
        let mut buf = vec![0xEEu8; 3 + EntryRecord::SIZE];
        let rec = EntryRecord { name_ptr: 7, data_start_ptr: 32, flat_size: 100, ..Default::default() };
        rec.encode(&mut buf, 3).unwrap();
        assert_eq!(buf[0], 0xEE);
        assert_eq!(EntryRecord::decode(&buf, 3).unwrap(), rec);
    }

    #[test]
    fn short_buffer_is_truncation() {
        let buf = [0u8; DirectoryRecord::SIZE - 1];
        match DirectoryRecord::decode(&buf, 0) {
            Err(HapiError::Truncated { needed, available, .. }) => {
                assert_eq!(needed, 20);
                assert_eq!(available, 19);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        let mut small = [0u8; 10];
        assert!(HeaderRecord::default().encode(&mut small, 0).is_err());
        assert!(HeaderRecord::decode(&[0u8; 24], 1).is_err());
    }

    #[test]
    fn draft_is_zeroed() {
        assert_eq!(DirectoryRecord::default(), DirectoryRecord {
            name_ptr: 0, first_subdir_ptr: 0, subdir_count: 0, first_file_ptr: 0, file_count: 0,
        });
    }

    #[test]
    fn bad_marker_and_version() {
        let bad = VersionRecord { marker: 0x1234, version: HAPI_VERSION };
        assert!(matches!(bad.validate(), Err(HapiError::InvalidMarker { actual: 0x1234, .. })));
        let bad = VersionRecord { marker: HAPI_MARKER, version: 0x10000 };
        assert!(matches!(bad.validate(), Err(HapiError::UnsupportedVersion { actual: 0x10000, .. })));
        assert!(VersionRecord::new().validate().is_ok());
    }
}
