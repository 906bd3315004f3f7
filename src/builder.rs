//! Archive builder: caller-supplied forest in, archive bytes out.
//!
//! Building runs in two phases.  First every file is drained, checksummed
//! and compressed on its own (in parallel with the `parallel` feature), and
//! the payloads are laid out right after the header.  Then three sequential
//! passes over the directory plan assign every record its position in the
//! directory region:
//!
//! 1. INIT reserves a directory's own record and names it.
//! 2. SUBDIR stamps `first_subdir_ptr`, reserves all immediate subdirectory
//!    records contiguously, then recurses.
//! 3. FILES stamps `first_file_ptr`, writes one entry record per file, then
//!    recurses.
//!
//! ```no_run
//! use hapi::builder::{build_buffer, BuildOptions, Node};
//!
//! let forest = vec![
//!     Node::directory("units", vec![Node::file("armcom.fbi", b"[UNITINFO]".to_vec())]),
//!     Node::file("readme.txt", b"hello".to_vec()),
//! ];
//! let bytes = build_buffer(forest, &BuildOptions::default())?;
//! # Ok::<(), hapi::error::HapiError>(())
//! ```

use std::fmt;
use std::io::Read;

use tracing::{debug, trace};

use crate::checksum::fold_checksum;
use crate::chunk::{compress_payload, encode_region, StoredPayload};
use crate::codec::{Codec, ZlibCodec, DEFAULT_COMPRESSION_LEVEL};
use crate::context::HapiContext;
use crate::error::{HapiError, Result};
use crate::names::NamesSection;
use crate::records::{DirectoryRecord, EntryRecord, HeaderRecord, Record, VersionRecord};
use crate::tree::{ItemId, ItemKind, ItemTree};

// ── Input forest ─────────────────────────────────────────────────────────────

/// Where a file's bytes come from.
pub enum ContentSource {
    Buffer(Vec<u8>),
    /// Drained once; must yield exactly the declared size.
    Reader(Box<dyn Read + Send>),
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Buffer(data) => write!(f, "Buffer({} bytes)", data.len()),
            ContentSource::Reader(_) => f.write_str("Reader"),
        }
    }
}

#[derive(Debug)]
pub struct FileNode {
    pub name:    String,
    pub size:    usize,
    pub content: ContentSource,
}

#[derive(Debug)]
pub struct DirectoryNode {
    pub name:     String,
    pub children: Vec<Node>,
}

#[derive(Debug)]
pub enum Node {
    File(FileNode),
    Directory(DirectoryNode),
}

impl Node {
    /// A file whose bytes are already in memory.
    pub fn file(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Node::File(FileNode { name: name.into(), size: data.len(), content: ContentSource::Buffer(data) })
    }

    /// A file drained from `reader`, which must yield exactly `size` bytes.
    pub fn reader<R: Read + Send + 'static>(name: impl Into<String>, size: usize, reader: R) -> Self {
        Node::File(FileNode { name: name.into(), size, content: ContentSource::Reader(Box::new(reader)) })
    }

    pub fn directory(name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Directory(DirectoryNode { name: name.into(), children })
    }

    pub fn name(&self) -> &str {
        match self {
            Node::File(file) => &file.name,
            Node::Directory(dir) => &dir.name,
        }
    }
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// zlib level, 0–9.
    pub compression_level: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { compression_level: DEFAULT_COMPRESSION_LEVEL }
    }
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Build an archive and return its bytes.
pub fn build_buffer(forest: Vec<Node>, opts: &BuildOptions) -> Result<Vec<u8>> {
    Ok(build_context(forest, opts)?.into_bytes())
}

/// Build an archive and return it as a context.
///
/// Entries of the returned context carry their raw payload, so extracting
/// from it never decompresses.
pub fn build_context(forest: Vec<Node>, opts: &BuildOptions) -> Result<HapiContext> {
    let codec = ZlibCodec::new(opts.compression_level);

    let mut pending = Vec::new();
    let plan = DirPlan::from_children(String::new(), forest, &mut pending);
    let processed = process_files(&codec, pending)?;
    debug!(files = processed.len(), "payloads processed");

    // version | header | payloads
    let version = VersionRecord::new();
    let mut out = vec![0u8; VersionRecord::SIZE + HeaderRecord::SIZE];
    version.encode(&mut out, 0)?;
    let data_ptr = to_u32(out.len())?;

    let mut placed = Vec::with_capacity(processed.len());
    for file in processed {
        let data_start = to_u32(out.len())?;
        let stored_len = file.stored.stored_len(file.data.len());
        let compressed_size = match file.stored {
            StoredPayload::Raw => {
                out.extend_from_slice(&file.data);
                0
            }
            StoredPayload::Chunked { record, compressed } => {
                record.write(&mut out)?;
                out.extend_from_slice(&compressed);
                to_u32(stored_len)?
            }
        };
        placed.push(PlacedFile {
            name: file.name,
            flat_size: to_u32(file.data.len())?,
            data: file.data,
            checksum: file.checksum,
            data_start,
            compressed_size,
        });
    }
    to_u32(out.len())?;

    // INIT, SUBDIR, FILES
    let mut layout = Layout::new(&plan, placed)?;
    layout.subdirs(ItemId::ROOT, &plan)?;
    layout.files(ItemId::ROOT, &plan)?;
    let directory_buffer = layout.directory_region()?;
    let names_buffer = layout.names.compile();

    let names_block_ptr = to_u32(out.len())?;
    out.extend_from_slice(&encode_region(&codec, &names_buffer)?);
    let dir_block_ptr = to_u32(out.len())?;
    out.extend_from_slice(&encode_region(&codec, &directory_buffer)?);
    to_u32(out.len())?;

    let header = HeaderRecord {
        dir_block_ptr,
        dir_block_len: to_u32(out.len())? - dir_block_ptr,
        names_block_ptr,
        names_block_len: dir_block_ptr - names_block_ptr,
        data_ptr,
        reserved: 0,
    };
    header.encode(&mut out, VersionRecord::SIZE)?;

    debug!(
        size = out.len(),
        items = layout.tree.len(),
        directory_len = directory_buffer.len(),
        names_len = names_buffer.len(),
        "archive built"
    );
    Ok(HapiContext::from_parts(out, version, header, directory_buffer, names_buffer, layout.tree))
}

fn to_u32(size: usize) -> Result<u32> {
    u32::try_from(size).map_err(|_| HapiError::ArchiveTooLarge { size })
}

// ── Payload phase ────────────────────────────────────────────────────────────

/// The forest reshaped for layout: subdirectories and files split apart,
/// files referring to the payload list by index.
#[derive(Debug)]
struct DirPlan {
    name:    String,
    subdirs: Vec<DirPlan>,
    files:   Vec<usize>,
}

impl DirPlan {
    /// Files are appended to `pending` in pre-order over the caller's
    /// children, which is also payload order.
    fn from_children(name: String, children: Vec<Node>, pending: &mut Vec<FileNode>) -> Self {
        let mut plan = DirPlan { name, subdirs: Vec::new(), files: Vec::new() };
        for child in children {
            match child {
                Node::File(file) => {
                    plan.files.push(pending.len());
                    pending.push(file);
                }
                Node::Directory(dir) => {
                    plan.subdirs.push(DirPlan::from_children(dir.name, dir.children, pending));
                }
            }
        }
        plan
    }
}

#[derive(Debug)]
struct ProcessedFile {
    name:     String,
    data:     Vec<u8>,
    checksum: u32,
    stored:   StoredPayload,
}

fn process_files(codec: &ZlibCodec, pending: Vec<FileNode>) -> Result<Vec<ProcessedFile>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        pending.into_par_iter().map(|file| process_file(codec, file)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        pending.into_iter().map(|file| process_file(codec, file)).collect()
    }
}

fn process_file(codec: &dyn Codec, file: FileNode) -> Result<ProcessedFile> {
    let data = drain(&file.name, file.size, file.content)?;
    let checksum = fold_checksum(&data);
    let stored = compress_payload(codec, &file.name, &data)?;
    trace!(
        name = %file.name,
        flat = data.len(),
        stored = stored.stored_len(data.len()),
        compressed = stored.is_compressed(),
        "file processed"
    );
    Ok(ProcessedFile { name: file.name, data, checksum, stored })
}

/// Pull the whole file into memory, insisting on the declared size.
fn drain(name: &str, size: usize, content: ContentSource) -> Result<Vec<u8>> {
    let data = match content {
        ContentSource::Buffer(data) => data,
        ContentSource::Reader(reader) => {
            let mut data = Vec::with_capacity(size);
            // one byte past the declared size exposes an over-long source
            reader.take(size as u64 + 1).read_to_end(&mut data)?;
            data
        }
    };
    if data.len() != size {
        return Err(HapiError::ShortRead { name: name.to_owned(), expected: size, actual: data.len() });
    }
    Ok(data)
}

// ── Layout passes ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct PlacedFile {
    name:            String,
    data:            Vec<u8>,
    flat_size:       u32,
    checksum:        u32,
    data_start:      u32,
    compressed_size: u32,
}

struct Layout {
    tree:   ItemTree,
    names:  NamesSection,
    cursor: usize,
    files:  Vec<PlacedFile>,
}

impl Layout {
    /// Runs INIT for the root.
    fn new(root: &DirPlan, files: Vec<PlacedFile>) -> Result<Self> {
        let mut layout = Self {
            tree: ItemTree::new(DirectoryRecord::default()),
            names: NamesSection::new(),
            cursor: 0,
            files,
        };
        let (_, record, _) = layout.init(root)?;
        if let Some(root) = layout.tree.directory_record_mut(ItemId::ROOT) {
            *root = record;
        }
        Ok(layout)
    }

    /// Name a directory and reserve its record.  Pointers stay zero until
    /// the SUBDIR and FILES passes stamp them.
    fn init(&mut self, dir: &DirPlan) -> Result<(String, DirectoryRecord, u32)> {
        let mapped = self.names.push_name(&dir.name);
        let record = DirectoryRecord {
            name_ptr: mapped.offset,
            subdir_count: to_u32(dir.subdirs.len())?,
            file_count: to_u32(dir.files.len())?,
            ..Default::default()
        };
        let origin = to_u32(self.cursor)?;
        self.cursor += DirectoryRecord::SIZE;
        Ok((mapped.name, record, origin))
    }

    fn subdirs(&mut self, id: ItemId, dir: &DirPlan) -> Result<()> {
        if dir.subdirs.is_empty() {
            return Ok(());
        }
        let first = to_u32(self.cursor)?;
        if let Some(record) = self.tree.directory_record_mut(id) {
            record.first_subdir_ptr = first;
        }

        let mut children = Vec::with_capacity(dir.subdirs.len());
        for sub in &dir.subdirs {
            let (name, record, origin) = self.init(sub)?;
            children.push(self.tree.add_directory(id, &name, record, origin));
        }
        for (child, sub) in children.into_iter().zip(&dir.subdirs) {
            self.subdirs(child, sub)?;
        }
        Ok(())
    }

    fn files(&mut self, id: ItemId, dir: &DirPlan) -> Result<()> {
        if !dir.files.is_empty() {
            let first = to_u32(self.cursor)?;
            if let Some(record) = self.tree.directory_record_mut(id) {
                record.first_file_ptr = first;
            }
        }

        for &index in &dir.files {
            let file = &mut self.files[index];
            let mapped = self.names.push_name(&file.name);
            let record = EntryRecord {
                name_ptr:        mapped.offset,
                data_start_ptr:  file.data_start,
                flat_size:       file.flat_size,
                compressed_size: file.compressed_size,
                date:            0,
                checksum:        file.checksum,
            };
            let cache = std::mem::take(&mut file.data);
            let origin = to_u32(self.cursor)?;
            self.cursor += EntryRecord::SIZE;
            self.tree.add_entry(id, &mapped.name, record, origin, Some(cache));
        }

        // subdirectories were added first, so they lead the child list
        let children = self.tree[id].children()[..dir.subdirs.len()].to_vec();
        for (child, sub) in children.into_iter().zip(&dir.subdirs) {
            self.files(child, sub)?;
        }
        Ok(())
    }

    /// Every record written at its reserved position.
    fn directory_region(&self) -> Result<Vec<u8>> {
        let mut region = vec![0u8; self.cursor];
        for id in self.tree.walk() {
            let item = &self.tree[id];
            let origin = item.struct_origin() as usize;
            match item.kind() {
                ItemKind::Directory { record, .. } => record.encode(&mut region, origin)?,
                ItemKind::Entry { record, .. } => record.encode(&mut region, origin)?,
            };
        }
        Ok(region)
    }
}
