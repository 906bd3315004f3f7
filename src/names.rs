//! The names region: every item name, null-terminated, back to back.

use crate::error::{HapiError, Result};

/// A name placed in a [`NamesSection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedName {
    pub offset: u32,
    /// The name as stored, after ASCII filtering.
    pub name:   String,
}

/// Write-side accumulator for the names region.
#[derive(Debug, Default)]
pub struct NamesSection {
    names:  Vec<MappedName>,
    length: usize,
}

impl NamesSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name` and return where it landed.
    ///
    /// Non-ASCII characters are dropped; the format has no encoding field.
    pub fn push_name(&mut self, name: &str) -> MappedName {
        let stored: String = name.chars().filter(char::is_ascii).collect();
        let mapped = MappedName { offset: self.length as u32, name: stored };
        self.length += mapped.name.len() + 1;
        self.names.push(mapped.clone());
        mapped
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn names(&self) -> &[MappedName] {
        &self.names
    }

    /// Materialise the region in push order.
    pub fn compile(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length);
        for mapped in &self.names {
            out.extend_from_slice(mapped.name.as_bytes());
            out.push(0);
        }
        out
    }
}

/// Read the null-terminated name at `offset` of a decompressed names region.
///
/// The scan never leaves the region; a missing terminator is an error.
pub fn resolve_name(region: &[u8], offset: usize) -> Result<String> {
    let tail = region.get(offset..).ok_or(HapiError::NameResolution {
        offset,
        region_len: region.len(),
    })?;
    let end = tail.iter().position(|&b| b == 0).ok_or(HapiError::NameResolution {
        offset,
        region_len: region.len(),
    })?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_index_compiled_region() {
        let mut section = NamesSection::new();
        let root = section.push_name("");
        let units = section.push_name("unitscb");
        let file = section.push_name("verpar.fbi");
        assert_eq!(root.offset, 0);
        assert_eq!(units.offset, 1);
        assert_eq!(file.offset, 9);

        let region = section.compile();
        assert_eq!(region.len(), section.len());
        assert_eq!(region, b"\0unitscb\0verpar.fbi\0");
        assert_eq!(resolve_name(&region, units.offset as usize).unwrap(), "unitscb");
        assert_eq!(resolve_name(&region, file.offset as usize).unwrap(), "verpar.fbi");
        assert_eq!(resolve_name(&region, 0).unwrap(), "");
    }

    #[test]
    fn non_ascii_is_stripped() {
        let mut section = NamesSection::new();
        let mapped = section.push_name("señor_ü.txt");
        assert_eq!(mapped.name, "seor_.txt");
        assert_eq!(section.compile(), b"seor_.txt\0");
    }

    #[test]
    fn unterminated_name_is_rejected() {
        assert!(matches!(
            resolve_name(b"abc", 0),
            Err(HapiError::NameResolution { offset: 0, region_len: 3 })
        ));
        assert!(matches!(
            resolve_name(b"abc\0", 10),
            Err(HapiError::NameResolution { offset: 10, .. })
        ));
        assert!(resolve_name(b"abc\0", 4).is_err());
    }
}
