pub mod error;
pub mod records;
pub mod codec;
pub mod checksum;
pub mod chunk;
pub mod names;
pub mod tree;
pub mod context;
pub mod loader;
pub mod builder;
pub mod reader;

pub use error::{HapiError, Result};
pub use records::{ChunkRecord, DirectoryRecord, EntryRecord, HeaderRecord, Record, VersionRecord};
pub use codec::{Codec, CompressionMethod, ZlibCodec};
pub use tree::{Item, ItemFilter, ItemId, ItemKind, ItemTree};
pub use context::HapiContext;
pub use builder::{build_buffer, build_context, BuildOptions, Node};
pub use reader::ItemReader;
