//! Block header: per-block metadata stored in the part index.
//!
//! Each data block in a part is described by one header recording its
//! first item, the common prefix of its items, the encoding tag, the
//! item count, and the offsets and sizes of the block's two streams in
//! `items.bin` and `lens.bin`.
//!
//! Wire layout (integers big-endian, byte strings varint-length
//! prefixed):
//!
//! ```text
//! +----------------+-------------+----+-------------+
//! | common_prefix  | first_item  | mt | items_count |
//! |   varint+bytes | varint+bytes| u8 |     u32     |
//! +----------------+-------------+----+-------------+
//! | items_block_offset | lens_block_offset          |
//! |        u64         |        u64                 |
//! +--------------------+----------------------------+
//! | items_block_size   | lens_block_size            |
//! |        u32         |        u32                 |
//! +--------------------+----------------------------+
//! ```

use crate::encoding::{
    marshal_bytes, marshal_u32, marshal_u64, unmarshal_bytes, unmarshal_u32, unmarshal_u64,
};
use crate::error::{PartError, Result};
use crate::part::block::MarshalType;
use crate::part::MAX_INMEMORY_BLOCK_SIZE;

/// Upper bound for a marshaled items stream.
const MAX_ITEMS_BLOCK_SIZE: u64 = 2 * MAX_INMEMORY_BLOCK_SIZE as u64;

/// Upper bound for a marshaled lens stream.
const MAX_LENS_BLOCK_SIZE: u64 = 16 * MAX_INMEMORY_BLOCK_SIZE as u64;

/// Fixed-width tail of the encoding: tag, count, two offsets, two
/// sizes.
const FIXED_TAIL_LEN: usize = 1 + 4 + 8 + 8 + 4 + 4;

/// Owned header for one data block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeader {
    /// Common prefix shared by all items in the block.
    pub common_prefix: Vec<u8>,
    /// The block's first (smallest) item, stored in full.
    pub first_item: Vec<u8>,
    /// Encoding used for the block's streams.
    pub marshal_type: MarshalType,
    /// Number of items in the block; always non-zero.
    pub items_count: u32,
    /// Byte offset of the items stream in `items.bin`.
    pub items_block_offset: u64,
    /// Byte offset of the lens stream in `lens.bin`.
    pub lens_block_offset: u64,
    /// Size of the items stream in bytes.
    pub items_block_size: u32,
    /// Size of the lens stream in bytes.
    pub lens_block_size: u32,
}

impl BlockHeader {
    /// Clears the header for reuse.
    pub fn reset(&mut self) {
        self.common_prefix.clear();
        self.first_item.clear();
        self.marshal_type = MarshalType::Plain;
        self.items_count = 0;
        self.items_block_offset = 0;
        self.lens_block_offset = 0;
        self.items_block_size = 0;
        self.lens_block_size = 0;
    }

    /// Appends the wire encoding of the header to `dst`.
    pub fn marshal(&self, dst: &mut Vec<u8>) {
        marshal_bytes(dst, &self.common_prefix);
        marshal_bytes(dst, &self.first_item);
        dst.push(self.marshal_type as u8);
        marshal_u32(dst, self.items_count);
        marshal_u64(dst, self.items_block_offset);
        marshal_u64(dst, self.lens_block_offset);
        marshal_u32(dst, self.items_block_size);
        marshal_u32(dst, self.lens_block_size);
    }

    /// Parses one header from `src`, returning the unread tail.
    ///
    /// Copies the byte strings into the header; use
    /// [`BlockHeaderRef::unmarshal`] to borrow them instead.
    pub fn unmarshal<'a>(&mut self, src: &'a [u8]) -> Result<&'a [u8]> {
        let (r, tail) = BlockHeaderRef::unmarshal(src)?;
        self.common_prefix.clear();
        self.common_prefix.extend_from_slice(r.common_prefix);
        self.first_item.clear();
        self.first_item.extend_from_slice(r.first_item);
        self.marshal_type = r.marshal_type;
        self.items_count = r.items_count;
        self.items_block_offset = r.items_block_offset;
        self.lens_block_offset = r.lens_block_offset;
        self.items_block_size = r.items_block_size;
        self.lens_block_size = r.lens_block_size;
        Ok(tail)
    }
}

/// Borrowed view of one block header, parsed without copying the byte
/// strings out of the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeaderRef<'a> {
    /// Common prefix shared by all items in the block.
    pub common_prefix: &'a [u8],
    /// The block's first (smallest) item.
    pub first_item: &'a [u8],
    /// Encoding used for the block's streams.
    pub marshal_type: MarshalType,
    /// Number of items in the block; always non-zero.
    pub items_count: u32,
    /// Byte offset of the items stream in `items.bin`.
    pub items_block_offset: u64,
    /// Byte offset of the lens stream in `lens.bin`.
    pub lens_block_offset: u64,
    /// Size of the items stream in bytes.
    pub items_block_size: u32,
    /// Size of the lens stream in bytes.
    pub lens_block_size: u32,
}

impl<'a> BlockHeaderRef<'a> {
    /// Parses one header from `src`, returning the header and the
    /// unread tail.
    pub fn unmarshal(src: &'a [u8]) -> Result<(Self, &'a [u8])> {
        let (common_prefix, n) = unmarshal_bytes(src)?;
        let src = &src[n..];
        let (first_item, n) = unmarshal_bytes(src)?;
        let src = &src[n..];
        if src.len() < FIXED_TAIL_LEN {
            return Err(PartError::UnexpectedEnd {
                field: "block header fixed fields",
                need: FIXED_TAIL_LEN,
                got: src.len(),
            });
        }
        let marshal_type =
            MarshalType::from_u8(src[0]).ok_or(PartError::InvalidMarshalType(src[0]))?;
        let src = &src[1..];
        let items_count = unmarshal_u32(src);
        let src = &src[4..];
        let items_block_offset = unmarshal_u64(src);
        let src = &src[8..];
        let lens_block_offset = unmarshal_u64(src);
        let src = &src[8..];
        let items_block_size = unmarshal_u32(src);
        let src = &src[4..];
        let lens_block_size = unmarshal_u32(src);
        let tail = &src[4..];

        if items_count == 0 {
            return Err(PartError::ZeroItems("block header"));
        }
        if items_block_size as u64 > MAX_ITEMS_BLOCK_SIZE {
            return Err(PartError::SizeExceeded {
                what: "items block size",
                got: items_block_size as u64,
                max: MAX_ITEMS_BLOCK_SIZE,
            });
        }
        if lens_block_size as u64 > MAX_LENS_BLOCK_SIZE {
            return Err(PartError::SizeExceeded {
                what: "lens block size",
                got: lens_block_size as u64,
                max: MAX_LENS_BLOCK_SIZE,
            });
        }

        Ok((
            Self {
                common_prefix,
                first_item,
                marshal_type,
                items_count,
                items_block_offset,
                lens_block_offset,
                items_block_size,
                lens_block_size,
            },
            tail,
        ))
    }

    /// Copies the borrowed header into an owned [`BlockHeader`].
    pub fn to_owned(&self) -> BlockHeader {
        BlockHeader {
            common_prefix: self.common_prefix.to_vec(),
            first_item: self.first_item.to_vec(),
            marshal_type: self.marshal_type,
            items_count: self.items_count,
            items_block_offset: self.items_block_offset,
            lens_block_offset: self.lens_block_offset,
            items_block_size: self.items_block_size,
            lens_block_size: self.lens_block_size,
        }
    }
}

/// Parses exactly `count` consecutive block headers from `src` into
/// `dst`, consuming all of `src`.
///
/// The headers of one index block are stored back to back, ordered by
/// first item; `count` comes from the owning metaindex row. Bytes left
/// over after the last header mean the index block is corrupt.
pub fn unmarshal_block_headers(dst: &mut Vec<BlockHeader>, src: &[u8], count: u32) -> Result<()> {
    if count == 0 {
        return Err(PartError::ZeroItems("block header run"));
    }
    // A marshaled header is at least two varint length bytes plus the
    // fixed tail; check before reserving count-sized capacity.
    let min_run_len = (count as usize).saturating_mul(2 + FIXED_TAIL_LEN);
    if src.len() < min_run_len {
        return Err(PartError::UnexpectedEnd {
            field: "block header run",
            need: min_run_len,
            got: src.len(),
        });
    }
    dst.reserve(count as usize);
    let start = dst.len();
    let mut tail = src;
    for _ in 0..count {
        let mut bh = BlockHeader::default();
        tail = bh.unmarshal(tail)?;
        dst.push(bh);
    }
    if !tail.is_empty() {
        return Err(PartError::UnexpectedTail {
            what: "block header run",
            len: tail.len(),
        });
    }
    if !dst[start..].windows(2).all(|w| w[0].first_item <= w[1].first_item) {
        return Err(PartError::Unsorted("block headers"));
    }
    Ok(())
}
