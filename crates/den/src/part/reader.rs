//! Read path: opening a stored part and decoding its blocks.
//!
//! A [`Part`] keeps the part header and all metaindex rows resident
//! and holds open handles to the three binary files. Reading a block
//! is two bounded range reads plus decompression; reading an index
//! block is one.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::encoding::decompress;
use crate::error::{PartError, Result};
use crate::part::block::{InMemoryBlock, StorageBlock};
use crate::part::block_header::{unmarshal_block_headers, BlockHeader};
use crate::part::header::PartHeader;
use crate::part::metaindex::{unmarshal_metaindex_rows, MetaIndexRow};
use crate::part::{INDEX_FILENAME, ITEMS_FILENAME, LENS_FILENAME, METAINDEX_FILENAME};

/// An open, immutable part on disk.
#[derive(Debug)]
pub struct Part {
    path: PathBuf,
    ph: PartHeader,
    metaindex: Vec<MetaIndexRow>,
    index_file: File,
    items_file: File,
    lens_file: File,
}

fn open_file(path: PathBuf) -> Result<File> {
    File::open(&path).map_err(|source| PartError::Storage { path, source })
}

fn read_range(f: &mut File, path: &Path, offset: u64, size: u32) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; size as usize];
    f.seek(SeekFrom::Start(offset))
        .and_then(|_| f.read_exact(&mut buf))
        .map_err(|source| PartError::Storage {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(buf)
}

impl Part {
    /// Opens the part stored in `part_dir`, reading and validating its
    /// metadata and metaindex.
    pub fn open(part_dir: &Path) -> Result<Self> {
        let mut ph = PartHeader::default();
        ph.read_metadata(part_dir)?;

        let mut metaindex = Vec::new();
        let mut metaindex_file = open_file(part_dir.join(METAINDEX_FILENAME))?;
        unmarshal_metaindex_rows(&mut metaindex, &mut metaindex_file)?;

        let part = Self {
            ph,
            metaindex,
            index_file: open_file(part_dir.join(INDEX_FILENAME))?,
            items_file: open_file(part_dir.join(ITEMS_FILENAME))?,
            lens_file: open_file(part_dir.join(LENS_FILENAME))?,
            path: part_dir.to_path_buf(),
        };
        debug!(
            part = %part.path.display(),
            items = part.ph.items_count,
            blocks = part.ph.blocks_count,
            metaindex_rows = part.metaindex.len(),
            "opened part"
        );
        Ok(part)
    }

    /// Returns the part header.
    pub fn header(&self) -> &PartHeader {
        &self.ph
    }

    /// Returns the metaindex rows, sorted by first item.
    pub fn metaindex(&self) -> &[MetaIndexRow] {
        &self.metaindex
    }

    /// Reads and decodes the block headers of the index block that
    /// `mr` points at.
    pub fn read_block_headers(&mut self, mr: &MetaIndexRow) -> Result<Vec<BlockHeader>> {
        let compressed = read_range(
            &mut self.index_file,
            &self.path,
            mr.index_block_offset,
            mr.index_block_size,
        )?;
        let mut data = Vec::new();
        decompress(&mut data, &compressed)?;

        let mut bhs = Vec::new();
        unmarshal_block_headers(&mut bhs, &data, mr.block_headers_count)?;
        Ok(bhs)
    }

    /// Reads the data block that `bh` points at and decodes it into
    /// `ib`.
    pub fn read_block(&mut self, bh: &BlockHeader, ib: &mut InMemoryBlock) -> Result<()> {
        let sb = StorageBlock {
            items_data: read_range(
                &mut self.items_file,
                &self.path,
                bh.items_block_offset,
                bh.items_block_size,
            )?,
            lens_data: read_range(
                &mut self.lens_file,
                &self.path,
                bh.lens_block_offset,
                bh.lens_block_size,
            )?,
        };
        ib.unmarshal_data(
            &sb,
            &bh.first_item,
            &bh.common_prefix,
            bh.items_count,
            bh.marshal_type,
        )
    }
}
