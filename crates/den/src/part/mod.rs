//! The part format: immutable sorted runs of byte-string items.
//!
//! A part is a directory of five files:
//!
//! ```text
//! part-dir/
//!   metadata.json    part summary (counts, first/last item)
//!   metaindex.bin    compressed metaindex rows
//!   index.bin        compressed runs of block headers
//!   items.bin        encoded item streams, one per block
//!   lens.bin         encoded length streams, one per block
//! ```
//!
//! Lookups descend `metaindex -> block headers -> data block`; each
//! level names the exact byte range of the next, so no scan ever reads
//! more than one block per level.

pub mod block;
pub mod block_header;
pub mod header;
pub mod inmemory;
pub mod metaindex;
pub mod reader;

pub use block::{InMemoryBlock, Item, MarshalType, StorageBlock};
pub use block_header::{unmarshal_block_headers, BlockHeader, BlockHeaderRef};
pub use header::PartHeader;
pub use inmemory::{InMemoryPart, DEFAULT_COMPRESS_LEVEL};
pub use metaindex::{unmarshal_metaindex_rows, MetaIndexRow};
pub use reader::Part;

/// Maximum raw size of one in-memory block.
pub const MAX_INMEMORY_BLOCK_SIZE: usize = 64 * 1024;

/// Maximum uncompressed size of one index block.
pub const MAX_INDEX_BLOCK_SIZE: usize = 64 * 1024;

/// File holding the compressed metaindex rows.
pub const METAINDEX_FILENAME: &str = "metaindex.bin";

/// File holding the compressed index blocks.
pub const INDEX_FILENAME: &str = "index.bin";

/// File holding the encoded items streams.
pub const ITEMS_FILENAME: &str = "items.bin";

/// File holding the encoded lens streams.
pub const LENS_FILENAME: &str = "lens.bin";

/// File holding the part summary metadata.
pub const METADATA_FILENAME: &str = "metadata.json";
