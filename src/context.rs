//! A loaded (or freshly built) archive.
//!
//! [`HapiContext`] owns the archive bytes, the decoded version and header
//! records, both decompressed regions and the item tree.  Navigation goes
//! through [`ItemTree`]; payloads are produced on demand, either whole with
//! [`HapiContext::extract_as_buffer`] or chunk by chunk with
//! [`HapiContext::item_reader`].

use std::borrow::Cow;
use std::path::Path;

use tracing::warn;

use crate::checksum::FoldChecksum;
use crate::error::{HapiError, Result};
use crate::reader::ItemReader;
use crate::records::{HeaderRecord, VersionRecord};
use crate::tree::{Item, ItemFilter, ItemId, ItemTree};

#[derive(Debug, Clone)]
pub struct HapiContext {
    file:             Vec<u8>,
    version:          VersionRecord,
    header:           HeaderRecord,
    directory_buffer: Vec<u8>,
    names_buffer:     Vec<u8>,
    tree:             ItemTree,
}

impl HapiContext {
    pub(crate) fn from_parts(
        file:             Vec<u8>,
        version:          VersionRecord,
        header:           HeaderRecord,
        directory_buffer: Vec<u8>,
        names_buffer:     Vec<u8>,
        tree:             ItemTree,
    ) -> Self {
        Self { file, version, header, directory_buffer, names_buffer, tree }
    }

    /// Read an archive from disk and load it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(std::fs::read(path)?)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// The raw archive bytes.
    pub fn file(&self) -> &[u8] { &self.file }

    pub fn into_bytes(self) -> Vec<u8> { self.file }

    pub fn version(&self) -> &VersionRecord { &self.version }

    pub fn header(&self) -> &HeaderRecord { &self.header }

    /// Decompressed directory region.
    pub fn directory_buffer(&self) -> &[u8] { &self.directory_buffer }

    /// Decompressed names region.
    pub fn names_buffer(&self) -> &[u8] { &self.names_buffer }

    pub fn tree(&self) -> &ItemTree { &self.tree }

    pub fn root(&self) -> ItemId { self.tree.root() }

    pub fn item(&self, id: ItemId) -> &Item { &self.tree[id] }

    // ── Lookup from the root ─────────────────────────────────────────────────

    pub fn find_children(&self, pattern: &str, limit: Option<usize>, filter: ItemFilter, recurse_down: bool) -> Vec<ItemId> {
        self.tree.find_children(self.root(), pattern, limit, filter, recurse_down)
    }

    pub fn find_child(&self, pattern: &str, filter: ItemFilter, recurse_down: bool) -> Option<ItemId> {
        self.tree.find_child(self.root(), pattern, filter, recurse_down)
    }

    pub fn find_children_at(&self, full_path: &str, limit: Option<usize>, filter: ItemFilter) -> Vec<ItemId> {
        self.tree.find_children_at(self.root(), full_path, limit, filter)
    }

    pub fn find_child_at(&self, full_path: &str) -> Option<ItemId> {
        self.tree.find_child_at(self.root(), full_path)
    }

    // ── Extraction ───────────────────────────────────────────────────────────

    /// Pull-based producer of an entry's bytes, one chunk per pull.
    pub fn item_reader(&self, id: ItemId) -> Result<ItemReader<'_>> {
        let item = self.entry(id)?;
        ItemReader::new(&self.file, item)
    }

    /// The whole decompressed payload of an entry.
    ///
    /// The stored fold checksum is compared against the extracted bytes but
    /// a mismatch is only logged.
    pub fn extract_as_buffer(&self, id: ItemId) -> Result<Cow<'_, [u8]>> {
        let item = self.entry(id)?;
        let mut reader = ItemReader::new(&self.file, item)?;
        let mut fold = FoldChecksum::new();

        let first = match reader.next_chunk()? {
            Some(chunk) => chunk,
            None => return Ok(Cow::Borrowed(&[][..])),
        };
        fold.update(&first);
        let capacity = reader.flat_size();

        // single-chunk payloads (the common case) are returned without copying
        let mut out: Option<Vec<u8>> = None;
        while let Some(chunk) = reader.next_chunk()? {
            let buf = out.get_or_insert_with(|| {
                let mut v = Vec::with_capacity(capacity);
                v.extend_from_slice(&first);
                v
            });
            fold.update(&chunk);
            buf.extend_from_slice(&chunk);
        }

        check_fold(item, fold.finalize());
        Ok(match out {
            Some(buf) => Cow::Owned(buf),
            None => first,
        })
    }

    /// `(stored, computed)` fold checksums of an entry.
    pub fn verify_entry(&self, id: ItemId) -> Result<(u32, u32)> {
        let item = self.entry(id)?;
        let stored = item.entry_record().map_or(0, |r| r.checksum);
        let mut fold = FoldChecksum::new();
        for chunk in ItemReader::new(&self.file, item)? {
            fold.update(&chunk?);
        }
        Ok((stored, fold.finalize()))
    }

    fn entry(&self, id: ItemId) -> Result<&Item> {
        match self.tree.get(id) {
            Some(item) if !item.is_directory() => Ok(item),
            Some(item) => Err(HapiError::NotAnEntry { path: item.path().to_owned() }),
            None => Err(HapiError::NotAnEntry { path: format!("#{}", id.index()) }),
        }
    }
}

fn check_fold(item: &Item, computed: u32) {
    let stored = item.entry_record().map_or(0, |r| r.checksum);
    if stored != computed {
        warn!(
            path = item.path(),
            stored = format_args!("{stored:#010x}"),
            computed = format_args!("{computed:#010x}"),
            "entry checksum mismatch"
        );
    }
}
