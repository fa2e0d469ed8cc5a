//! In-memory part: one block's worth of items marshaled into the
//! four-file part layout, ready to serve reads or be persisted.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::encoding::compress_level;
use crate::error::{PartError, Result};
use crate::fsutil;
use crate::part::block::{InMemoryBlock, StorageBlock};
use crate::part::block_header::BlockHeader;
use crate::part::header::PartHeader;
use crate::part::metaindex::MetaIndexRow;
use crate::part::{
    INDEX_FILENAME, ITEMS_FILENAME, LENS_FILENAME, MAX_INDEX_BLOCK_SIZE, METAINDEX_FILENAME,
};

/// Default zstd level for freshly created parts. Fast levels favor
/// ingestion throughput; background merges can recompress harder.
pub const DEFAULT_COMPRESS_LEVEL: i32 = -5;

/// Marshaled block headers must stay well under the index block
/// ceiling; a single header cannot legitimately come close.
const MAX_MARSHALED_HEADER_SIZE: usize = 3 * MAX_INDEX_BLOCK_SIZE;

/// A part built in memory from a single sorted block.
///
/// `init` fills the four file images (`metaindex.bin`, `index.bin`,
/// `items.bin`, `lens.bin`) plus the part header; `store_to_disk`
/// persists them into a part directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPart {
    ph: PartHeader,
    bh: BlockHeader,
    mr: MetaIndexRow,
    metaindex_data: Vec<u8>,
    index_data: Vec<u8>,
    items_data: Vec<u8>,
    lens_data: Vec<u8>,
}

impl InMemoryPart {
    /// Creates an empty in-memory part.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the part for reuse, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.ph.reset();
        self.bh.reset();
        self.mr.reset();
        self.metaindex_data.clear();
        self.index_data.clear();
        self.items_data.clear();
        self.lens_data.clear();
    }

    /// Returns the part header.
    pub fn header(&self) -> &PartHeader {
        &self.ph
    }

    /// Returns the total size of the part's file images in bytes.
    pub fn size(&self) -> usize {
        self.metaindex_data.len()
            + self.index_data.len()
            + self.items_data.len()
            + self.lens_data.len()
    }

    /// Builds the part from `ib` with [`DEFAULT_COMPRESS_LEVEL`].
    ///
    /// The block is sorted in place; it must be non-empty.
    pub fn init(&mut self, ib: &mut InMemoryBlock) -> Result<()> {
        self.init_with_level(ib, DEFAULT_COMPRESS_LEVEL)
    }

    /// Builds the part from `ib` at the given zstd level.
    pub fn init_with_level(&mut self, ib: &mut InMemoryBlock, compress_lvl: i32) -> Result<()> {
        self.reset();

        let mut sb = StorageBlock::default();
        let (items_count, marshal_type) = ib.marshal_unsorted_data(
            &mut sb,
            &mut self.bh.first_item,
            &mut self.bh.common_prefix,
            compress_lvl,
        )?;
        self.bh.marshal_type = marshal_type;
        self.bh.items_count = items_count;
        self.bh.items_block_offset = 0;
        self.bh.lens_block_offset = 0;
        self.bh.items_block_size = sb.items_data.len() as u32;
        self.bh.lens_block_size = sb.lens_data.len() as u32;
        self.items_data = sb.items_data;
        self.lens_data = sb.lens_data;

        self.ph.items_count = items_count as u64;
        self.ph.blocks_count = 1;
        self.ph.first_item.extend_from_slice(&self.bh.first_item);
        let last = ib.items()[ib.items().len() - 1];
        self.ph.last_item.extend_from_slice(last.bytes(ib.data()));

        let mut index_buf = Vec::new();
        self.bh.marshal(&mut index_buf);
        if index_buf.len() > MAX_MARSHALED_HEADER_SIZE {
            return Err(PartError::Internal(format!(
                "marshaled block header is too big: {} bytes; limit {}",
                index_buf.len(),
                MAX_MARSHALED_HEADER_SIZE
            )));
        }
        compress_level(&mut self.index_data, &index_buf, compress_lvl)?;

        self.mr.first_item.extend_from_slice(&self.bh.first_item);
        self.mr.block_headers_count = 1;
        self.mr.index_block_offset = 0;
        self.mr.index_block_size = self.index_data.len() as u32;
        let mut metaindex_buf = Vec::new();
        self.mr.marshal(&mut metaindex_buf);
        compress_level(&mut self.metaindex_data, &metaindex_buf, compress_lvl)?;

        debug!(
            items = items_count,
            size = self.size(),
            "built in-memory part"
        );
        Ok(())
    }

    /// Persists the part into `part_dir`, creating the directory.
    ///
    /// All four binary files are written with fsync before
    /// `metadata.json` appears, so a part directory with metadata is
    /// always complete.
    pub fn store_to_disk(&self, part_dir: &Path) -> Result<()> {
        fs::create_dir_all(part_dir).map_err(|source| PartError::Storage {
            path: part_dir.to_path_buf(),
            source,
        })?;
        fsutil::write_sync(&part_dir.join(METAINDEX_FILENAME), &self.metaindex_data)?;
        fsutil::write_sync(&part_dir.join(INDEX_FILENAME), &self.index_data)?;
        fsutil::write_sync(&part_dir.join(ITEMS_FILENAME), &self.items_data)?;
        fsutil::write_sync(&part_dir.join(LENS_FILENAME), &self.lens_data)?;
        self.ph.write_metadata(part_dir)?;
        debug!(part = %part_dir.display(), size = self.size(), "stored part");
        Ok(())
    }
}
