//! In-memory item tree.
//!
//! All items live in one arena ([`ItemTree`]) and refer to each other by
//! [`ItemId`].  A directory's children are ordered subdirectories first, then
//! files, mirroring the two contiguous record runs in the directory region.
//! The root is always `ItemId(0)`, with an empty name and path `/`.

mod pattern;

pub use pattern::NamePattern;

use std::fmt;
use std::ops::Index;

use tracing::warn;

use crate::records::{DirectoryRecord, EntryRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(usize);

impl ItemId {
    pub const ROOT: ItemId = ItemId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Restricts lookups by item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFilter {
    #[default]
    Any,
    EntryOnly,
    DirectoryOnly,
}

impl ItemFilter {
    fn accepts(self, item: &Item) -> bool {
        match self {
            ItemFilter::Any => true,
            ItemFilter::EntryOnly => !item.is_directory(),
            ItemFilter::DirectoryOnly => item.is_directory(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemKind {
    Directory {
        record:   DirectoryRecord,
        children: Vec<ItemId>,
    },
    Entry {
        record: EntryRecord,
        /// Payload kept by the builder so a freshly built archive can be
        /// read back without touching the archive bytes.
        cache:  Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone)]
pub struct Item {
    name:          String,
    path:          String,
    parent:        Option<ItemId>,
    struct_origin: u32,
    kind:          ItemKind,
}

impl Item {
    pub fn name(&self) -> &str { &self.name }

    /// Full slash-separated path; directories end with `/`.
    pub fn path(&self) -> &str { &self.path }

    pub fn parent(&self) -> Option<ItemId> { self.parent }

    /// Offset of this item's record in the decompressed directory region.
    pub fn struct_origin(&self) -> u32 { self.struct_origin }

    pub fn kind(&self) -> &ItemKind { &self.kind }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, ItemKind::Directory { .. })
    }

    pub fn children(&self) -> &[ItemId] {
        match &self.kind {
            ItemKind::Directory { children, .. } => children,
            ItemKind::Entry { .. } => &[],
        }
    }

    pub fn directory_record(&self) -> Option<&DirectoryRecord> {
        match &self.kind {
            ItemKind::Directory { record, .. } => Some(record),
            ItemKind::Entry { .. } => None,
        }
    }

    pub fn entry_record(&self) -> Option<&EntryRecord> {
        match &self.kind {
            ItemKind::Entry { record, .. } => Some(record),
            ItemKind::Directory { .. } => None,
        }
    }

    /// Decompressed size of an entry.
    pub fn size(&self) -> Option<u32> {
        self.entry_record().map(|r| r.flat_size)
    }

    pub fn cache(&self) -> Option<&[u8]> {
        match &self.kind {
            ItemKind::Entry { cache, .. } => cache.as_deref(),
            ItemKind::Directory { .. } => None,
        }
    }
}

// ── Arena ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ItemTree {
    items: Vec<Item>,
}

impl ItemTree {
    pub fn new(root: DirectoryRecord) -> Self {
        let root = Item {
            name:          String::new(),
            path:          "/".to_owned(),
            parent:        None,
            struct_origin: 0,
            kind:          ItemKind::Directory { record: root, children: Vec::new() },
        };
        Self { items: vec![root] }
    }

    pub fn root(&self) -> ItemId {
        ItemId::ROOT
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add_directory(&mut self, parent: ItemId, name: &str, record: DirectoryRecord, origin: u32) -> ItemId {
        let path = format!("{}{}/", self.items[parent.0].path, name);
        self.push_child(parent, name, path, origin, ItemKind::Directory { record, children: Vec::new() })
    }

    pub fn add_entry(
        &mut self,
        parent: ItemId,
        name:   &str,
        record: EntryRecord,
        origin: u32,
        cache:  Option<Vec<u8>>,
    ) -> ItemId {
        let path = format!("{}{}", self.items[parent.0].path, name);
        self.push_child(parent, name, path, origin, ItemKind::Entry { record, cache })
    }

    fn push_child(&mut self, parent: ItemId, name: &str, path: String, origin: u32, kind: ItemKind) -> ItemId {
        let id = ItemId(self.items.len());
        self.items.push(Item {
            name: name.to_owned(),
            path,
            parent: Some(parent),
            struct_origin: origin,
            kind,
        });
        if let ItemKind::Directory { children, .. } = &mut self.items[parent.0].kind {
            children.push(id);
        }
        id
    }

    pub(crate) fn directory_record_mut(&mut self, id: ItemId) -> Option<&mut DirectoryRecord> {
        match &mut self.items.get_mut(id.0)?.kind {
            ItemKind::Directory { record, .. } => Some(record),
            ItemKind::Entry { .. } => None,
        }
    }

    /// Depth-first, pre-order walk from the root.
    pub fn walk(&self) -> Walk<'_> {
        self.walk_from(ItemId::ROOT)
    }

    /// Pre-order walk of the subtree rooted at `id`, `id` included.
    pub fn walk_from(&self, id: ItemId) -> Walk<'_> {
        Walk { tree: self, stack: vec![id] }
    }

    /// Every entry, in walk order.
    pub fn entries(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.walk().filter(move |id| !self[*id].is_directory())
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Children of `dir` whose names match the single-segment `pattern`.
    ///
    /// `limit` of `None` scans exhaustively.  With `recurse_down`, direct
    /// matches come first, then each child directory's subtree in child
    /// order, each exhausted before the next.
    pub fn find_children(
        &self,
        dir:          ItemId,
        pattern:      &str,
        limit:        Option<usize>,
        filter:       ItemFilter,
        recurse_down: bool,
    ) -> Vec<ItemId> {
        let Some(pattern) = compile(pattern) else { return Vec::new() };
        let mut out = Vec::new();
        self.collect_matches(dir, &pattern, limit, filter, recurse_down, &mut out);
        out
    }

    pub fn find_child(&self, dir: ItemId, pattern: &str, filter: ItemFilter, recurse_down: bool) -> Option<ItemId> {
        self.find_children(dir, pattern, Some(1), filter, recurse_down).into_iter().next()
    }

    fn collect_matches(
        &self,
        dir:          ItemId,
        pattern:      &NamePattern,
        limit:        Option<usize>,
        filter:       ItemFilter,
        recurse_down: bool,
        out:          &mut Vec<ItemId>,
    ) {
        let full = |len: usize| limit.map_or(false, |l| len >= l);
        if full(out.len()) {
            return;
        }
        let children = self[dir].children();
        for &child in children {
            let item = &self[child];
            if filter.accepts(item) && pattern.matches(&item.name) {
                out.push(child);
                if full(out.len()) {
                    return;
                }
            }
        }
        if !recurse_down {
            return;
        }
        for &child in children {
            if self[child].is_directory() {
                self.collect_matches(child, pattern, limit, filter, true, out);
                if full(out.len()) {
                    return;
                }
            }
        }
    }

    /// Resolve a slash-separated path relative to `dir`.
    ///
    /// A leading `/` is ignored.  A trailing `/` requires the final match to
    /// be a directory.  Every segment may be a glob; intermediate segments
    /// match directories one level at a time and every matching directory
    /// is explored, up to `limit` results.
    pub fn find_children_at(&self, dir: ItemId, full_path: &str, limit: Option<usize>, filter: ItemFilter) -> Vec<ItemId> {
        let (path, expect_directory) = match full_path.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (full_path, false),
        };
        let filter = match (expect_directory, filter) {
            (false, f) => f,
            (true, ItemFilter::EntryOnly) => return Vec::new(),
            (true, _) => ItemFilter::DirectoryOnly,
        };

        let mut segments: Vec<&str> = path.split('/').collect();
        if segments.first() == Some(&"") {
            segments.remove(0);
        }
        if segments.is_empty() {
            return Vec::new();
        }

        let mut patterns = Vec::with_capacity(segments.len());
        for segment in segments {
            match compile(segment) {
                Some(p) => patterns.push(p),
                None => return Vec::new(),
            }
        }

        let mut out = Vec::new();
        self.collect_at(dir, &patterns, limit, filter, &mut out);
        out
    }

    pub fn find_child_at(&self, dir: ItemId, full_path: &str) -> Option<ItemId> {
        self.find_children_at(dir, full_path, Some(1), ItemFilter::Any).into_iter().next()
    }

    fn collect_at(
        &self,
        dir:      ItemId,
        patterns: &[NamePattern],
        limit:    Option<usize>,
        filter:   ItemFilter,
        out:      &mut Vec<ItemId>,
    ) {
        let (current, rest) = match patterns.split_first() {
            Some(split) => split,
            None => return,
        };
        if rest.is_empty() {
            // `limit` bounds the shared output, so it carries over unchanged
            self.collect_matches(dir, current, limit, filter, false, out);
            return;
        }

        let mut directories = Vec::new();
        self.collect_matches(dir, current, None, ItemFilter::DirectoryOnly, false, &mut directories);
        for next in directories {
            self.collect_at(next, rest, limit, filter, out);
            if limit.map_or(false, |l| out.len() >= l) {
                break;
            }
        }
    }
}

fn compile(pattern: &str) -> Option<NamePattern> {
    match NamePattern::parse(pattern) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(pattern, error = %e, "unusable name pattern");
            None
        }
    }
}

impl Index<ItemId> for ItemTree {
    type Output = Item;

    fn index(&self, id: ItemId) -> &Item {
        &self.items[id.0]
    }
}

/// Iterator returned by [`ItemTree::walk`].
pub struct Walk<'a> {
    tree:  &'a ItemTree,
    stack: Vec<ItemId>,
}

impl Iterator for Walk<'_> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.tree[id].children().iter().rev());
        Some(id)
    }
}

impl fmt::Display for ItemTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.walk() {
            let item = &self[id];
            match item.size() {
                Some(size) => writeln!(f, "{} ({})", item.path, size)?,
                None => writeln!(f, "{}", item.path)?,
            }
        }
        Ok(())
    }
}
