//! Metaindex rows: the top level of a part's two-level index.
//!
//! `metaindex.bin` holds a zstd-compressed array of rows, one per
//! index block in `index.bin`. Each row records the first item covered
//! by its index block, how many block headers the index block holds,
//! and where the compressed index block lives. The rows are small
//! enough to keep resident for every open part, so lookups touch at
//! most one index block.

use std::io::Read;

use crate::encoding::{
    decompress, marshal_bytes, marshal_u32, marshal_u64, unmarshal_bytes, unmarshal_u32,
    unmarshal_u64,
};
use crate::error::{PartError, Result};
use crate::part::MAX_INDEX_BLOCK_SIZE;

/// Upper bound for a compressed index block referenced by a row.
const MAX_ROW_INDEX_BLOCK_SIZE: u64 = 4 * MAX_INDEX_BLOCK_SIZE as u64;

/// Fixed-width tail of a row: header count, offset, size.
const FIXED_TAIL_LEN: usize = 4 + 8 + 4;

/// One row of the metaindex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaIndexRow {
    /// First item of the first block header in the index block.
    pub first_item: Vec<u8>,
    /// Number of block headers in the index block; always non-zero.
    pub block_headers_count: u32,
    /// Byte offset of the index block in `index.bin`.
    pub index_block_offset: u64,
    /// Compressed size of the index block in bytes.
    pub index_block_size: u32,
}

impl MetaIndexRow {
    /// Clears the row for reuse.
    pub fn reset(&mut self) {
        self.first_item.clear();
        self.block_headers_count = 0;
        self.index_block_offset = 0;
        self.index_block_size = 0;
    }

    /// Appends the wire encoding of the row to `dst`.
    pub fn marshal(&self, dst: &mut Vec<u8>) {
        marshal_bytes(dst, &self.first_item);
        marshal_u32(dst, self.block_headers_count);
        marshal_u64(dst, self.index_block_offset);
        marshal_u32(dst, self.index_block_size);
    }

    /// Parses one row from `src`, returning the unread tail.
    pub fn unmarshal<'a>(&mut self, src: &'a [u8]) -> Result<&'a [u8]> {
        let (first_item, n) = unmarshal_bytes(src)?;
        let src = &src[n..];
        if src.len() < FIXED_TAIL_LEN {
            return Err(PartError::UnexpectedEnd {
                field: "metaindex row fixed fields",
                need: FIXED_TAIL_LEN,
                got: src.len(),
            });
        }
        let block_headers_count = unmarshal_u32(src);
        let src = &src[4..];
        let index_block_offset = unmarshal_u64(src);
        let src = &src[8..];
        let index_block_size = unmarshal_u32(src);
        let tail = &src[4..];

        if block_headers_count == 0 {
            return Err(PartError::ZeroItems("metaindex row"));
        }
        if index_block_size as u64 > MAX_ROW_INDEX_BLOCK_SIZE {
            return Err(PartError::SizeExceeded {
                what: "index block size",
                got: index_block_size as u64,
                max: MAX_ROW_INDEX_BLOCK_SIZE,
            });
        }

        self.first_item.clear();
        self.first_item.extend_from_slice(first_item);
        self.block_headers_count = block_headers_count;
        self.index_block_offset = index_block_offset;
        self.index_block_size = index_block_size;
        Ok(tail)
    }
}

/// Reads, decompresses and parses all metaindex rows from `r`,
/// appending them to `dst`.
///
/// A part must contain at least one row and the rows must be sorted by
/// `first_item` in ascending order; anything else means the file is
/// corrupt.
pub fn unmarshal_metaindex_rows<R: Read>(dst: &mut Vec<MetaIndexRow>, r: &mut R) -> Result<()> {
    let mut compressed = Vec::new();
    r.read_to_end(&mut compressed)?;

    let mut data = Vec::new();
    decompress(&mut data, &compressed)?;

    let start = dst.len();
    let mut src = &data[..];
    while !src.is_empty() {
        let mut row = MetaIndexRow::default();
        src = row.unmarshal(src)?;
        dst.push(row);
    }
    let rows = &dst[start..];
    if rows.is_empty() {
        return Err(PartError::EmptyMetaindex);
    }
    if !rows.windows(2).all(|w| w[0].first_item < w[1].first_item) {
        return Err(PartError::Unsorted("metaindex rows"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::compress_level;

    fn sample(i: u32) -> MetaIndexRow {
        MetaIndexRow {
            first_item: format!("series.{i:04}").into_bytes(),
            block_headers_count: i + 1,
            index_block_offset: i as u64 * 4096,
            index_block_size: 512 + i,
        }
    }

    fn compressed_rows(rows: &[MetaIndexRow]) -> Vec<u8> {
        let mut raw = Vec::new();
        for row in rows {
            row.marshal(&mut raw);
        }
        let mut out = Vec::new();
        compress_level(&mut out, &raw, 3).unwrap();
        out
    }

    #[test]
    fn test_roundtrip() {
        let row = sample(7);
        let mut buf = Vec::new();
        row.marshal(&mut buf);
        buf.push(0xaa);

        let mut got = MetaIndexRow::default();
        let tail = got.unmarshal(&buf).unwrap();
        assert_eq!(got, row);
        assert_eq!(tail, &[0xaa]);
    }

    #[test]
    fn test_truncated() {
        let row = sample(1);
        let mut buf = Vec::new();
        row.marshal(&mut buf);
        for n in 0..buf.len() {
            assert!(MetaIndexRow::default().unmarshal(&buf[..n]).is_err());
        }
    }

    #[test]
    fn test_rejects_zero_headers() {
        let mut row = sample(1);
        row.block_headers_count = 0;
        let mut buf = Vec::new();
        row.marshal(&mut buf);
        assert!(matches!(
            MetaIndexRow::default().unmarshal(&buf).unwrap_err(),
            PartError::ZeroItems(_)
        ));
    }

    #[test]
    fn test_rejects_oversized_index_block() {
        let mut row = sample(1);
        row.index_block_size = (MAX_ROW_INDEX_BLOCK_SIZE + 1) as u32;
        let mut buf = Vec::new();
        row.marshal(&mut buf);
        assert!(matches!(
            MetaIndexRow::default().unmarshal(&buf).unwrap_err(),
            PartError::SizeExceeded { .. }
        ));
    }

    #[test]
    fn test_read_all_rows() {
        let want: Vec<MetaIndexRow> = (0..10).map(sample).collect();
        let buf = compressed_rows(&want);
        let mut got = Vec::new();
        unmarshal_metaindex_rows(&mut got, &mut &buf[..]).unwrap();
        assert_eq!(got, want);
    }

    #[test]
    fn test_rejects_empty_row_set() {
        let buf = compressed_rows(&[]);
        let mut got = Vec::new();
        assert!(matches!(
            unmarshal_metaindex_rows(&mut got, &mut &buf[..]).unwrap_err(),
            PartError::EmptyMetaindex
        ));
    }

    #[test]
    fn test_rejects_unsorted_rows() {
        let rows = vec![sample(5), sample(2)];
        let buf = compressed_rows(&rows);
        let mut got = Vec::new();
        assert!(matches!(
            unmarshal_metaindex_rows(&mut got, &mut &buf[..]).unwrap_err(),
            PartError::Unsorted(_)
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let mut got = Vec::new();
        let buf = b"not a zstd frame at all";
        assert!(unmarshal_metaindex_rows(&mut got, &mut &buf[..]).is_err());
    }
}
