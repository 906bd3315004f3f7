//! The two checksums used by the format.
//!
//! * [`chunk_sum`] is the per-chunk checksum: the byte sum of the stored
//!   (possibly obfuscated) compressed bytes, modulo 2^32.
//! * [`FoldChecksum`] is the per-file checksum stored in entry records.  It
//!   folds every raw byte into four independent lanes:
//!
//! ```text
//! lane0 += c
//! lane1 ^= c
//! lane2 += c ^ (pos & 0xFF)
//! lane3 ^= c ^ (pos & 0xFF)
//! ```
//!
//! and reads the lanes back as a little-endian u32.  `pos` counts from the
//! first byte of the file, so feeding a file in several pieces yields the
//! same value as feeding it at once.

#[inline]
pub fn chunk_sum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

#[derive(Debug, Clone, Default)]
pub struct FoldChecksum {
    lanes:    [u8; 4],
    position: usize,
}

impl FoldChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        for &c in data {
            let k = c ^ (self.position & 0xFF) as u8;
            self.lanes[0] = self.lanes[0].wrapping_add(c);
            self.lanes[1] ^= c;
            self.lanes[2] = self.lanes[2].wrapping_add(k);
            self.lanes[3] ^= k;
            self.position += 1;
        }
    }

    pub fn finalize(&self) -> u32 {
        u32::from_le_bytes(self.lanes)
    }
}

/// One-shot [`FoldChecksum`] over `data`.
pub fn fold_checksum(data: &[u8]) -> u32 {
    let mut fold = FoldChecksum::new();
    fold.update(data);
    fold.finalize()
}
