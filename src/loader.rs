//! Archive loader: bytes in, navigable [`HapiContext`] out.
//!
//! Loading decodes the version and header records, inflates the directory
//! and names regions, and materialises the whole item tree.  No payload byte
//! is touched until an entry is extracted.

use std::collections::HashSet;

use tracing::debug;

use crate::chunk::decode_chunk;
use crate::context::HapiContext;
use crate::error::{HapiError, Result};
use crate::names::resolve_name;
use crate::records::{DirectoryRecord, EntryRecord, HeaderRecord, Record, VersionRecord};
use crate::tree::ItemTree;

impl HapiContext {
    /// Parse an archive held in memory.
    pub fn load(file: Vec<u8>) -> Result<Self> {
        let version = VersionRecord::decode(&file, 0)?;
        version.validate()?;
        let header = HeaderRecord::decode(&file, VersionRecord::SIZE)?;
        debug!(?header, len = file.len(), "header decoded");

        let directory_buffer = load_region(&file, header.dir_block_ptr, header.dir_block_len, "directory region")?;
        let names_buffer = load_region(&file, header.names_block_ptr, header.names_block_len, "names region")?;

        let root = DirectoryRecord::decode(&directory_buffer, 0)?;
        let tree = TreeLoader { directory: &directory_buffer, names: &names_buffer }.load(root)?;
        debug!(
            items = tree.len(),
            directory_len = directory_buffer.len(),
            names_len = names_buffer.len(),
            "archive loaded"
        );

        Ok(Self::from_parts(file, version, header, directory_buffer, names_buffer, tree))
    }
}

/// Slice a chunk-wrapped region out of the archive and inflate it.
fn load_region(file: &[u8], ptr: u32, len: u32, what: &'static str) -> Result<Vec<u8>> {
    let (start, len) = (ptr as usize, len as usize);
    let available = file.len().saturating_sub(start);
    if available < len {
        return Err(HapiError::Truncated { what, offset: start, needed: len, available });
    }
    Ok(decode_chunk(&file[start..start + len])?.into_owned())
}

struct TreeLoader<'a> {
    directory: &'a [u8],
    names:     &'a [u8],
}

impl TreeLoader<'_> {
    fn load(&self, root: DirectoryRecord) -> Result<ItemTree> {
        let mut tree = ItemTree::new(root);
        let mut visited = HashSet::from([0usize]);
        let mut pending = vec![(tree.root(), root)];

        while let Some((parent, record)) = pending.pop() {
            for index in 0..record.subdir_count as usize {
                let origin = record.first_subdir_ptr as usize + index * DirectoryRecord::SIZE;
                if !visited.insert(origin) {
                    return Err(HapiError::CyclicDirectory { offset: origin });
                }
                let sub = DirectoryRecord::decode(self.directory, origin)?;
                let name = resolve_name(self.names, sub.name_ptr as usize)?;
                let id = tree.add_directory(parent, &name, sub, origin as u32);
                pending.push((id, sub));
            }
            for index in 0..record.file_count as usize {
                let origin = record.first_file_ptr as usize + index * EntryRecord::SIZE;
                let entry = EntryRecord::decode(self.directory, origin)?;
                let name = resolve_name(self.names, entry.name_ptr as usize)?;
                tree.add_entry(parent, &name, entry, origin as u32, None);
            }
        }
        Ok(tree)
    }
}
