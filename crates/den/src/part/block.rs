//! In-memory block of sorted items and its wire codec.
//!
//! An [`InMemoryBlock`] accumulates raw byte-string items in a flat
//! buffer up to a 64 KiB ceiling, sorts them, factors out the common
//! prefix shared by every item, and marshals the block body into two
//! streams:
//!
//! - the *items stream*: item bytes with the block common prefix and
//!   the prefix shared with the previous item stripped;
//! - the *lens stream*: per-item prefix lengths and item lengths,
//!   XOR-delta'd against the previous item's values and varint-packed.
//!
//! Both streams are zstd-compressed. Blocks that would not benefit
//! from the delta coding (tiny payloads, single items, or payloads
//! that compress poorly) fall back to a plain encoding: raw suffixes
//! plus fixed-width lengths, uncompressed.
//!
//! `unmarshal_data` parses on-disk, potentially attacker-controlled
//! bytes; every length, offset and the final sort order is validated
//! and any inconsistency fails with a specific error.

use crate::encoding::{
    common_prefix_len, compress_level, decompress, marshal_u64, marshal_var_u64s, unmarshal_u64,
    unmarshal_var_u64s,
};
use crate::error::{PartError, Result};
use crate::part::MAX_INMEMORY_BLOCK_SIZE;

/// Number of items to reserve room for on the first `add`.
const ITEMS_CAPACITY_HINT: usize = 512;

/// Plain encoding is used when the payload net of common-prefix
/// savings is below this many bytes.
const PLAIN_ENCODING_MAX_PAYLOAD: usize = 64;

/// Compressed items streams reaching this fraction of the raw suffix
/// payload are discarded in favor of plain encoding.
const MIN_COMPRESSION_RATIO: f64 = 0.9;

/// A half-open byte range locating one item inside a block's flat
/// data buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Item {
    /// Start offset of the item, inclusive.
    pub start: u32,
    /// End offset of the item, exclusive.
    pub end: u32,
}

impl Item {
    /// Creates an item covering `[start, end)`.
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Returns the item's bytes within `data`.
    pub fn bytes<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start as usize..self.end as usize]
    }

    /// Returns the item's length in bytes.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    /// Returns true if the item is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Block encoding tag stored in the block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MarshalType {
    /// Plain encoding: raw suffixes plus fixed-width lengths.
    #[default]
    Plain = 0,
    /// Prefix/delta encoding with zstd-compressed streams.
    Zstd = 1,
}

impl MarshalType {
    /// Creates a MarshalType from a raw u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Plain),
            1 => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// The two raw byte streams backing one encoded block.
///
/// The streams are always produced and consumed together; the owning
/// block header records their sizes and the encoding tag.
#[derive(Debug, Clone, Default)]
pub struct StorageBlock {
    /// Encoded item bytes.
    pub items_data: Vec<u8>,
    /// Encoded item length codes.
    pub lens_data: Vec<u8>,
}

impl StorageBlock {
    /// Clears both streams, keeping their capacity.
    pub fn reset(&mut self) {
        self.items_data.clear();
        self.lens_data.clear();
    }
}

/// One block's worth of items (at most 64 KiB of raw bytes) before or
/// after encoding.
///
/// The block is a single-writer accumulator: `add` items until it
/// refuses, `sort_items`, then marshal exactly once (or reset and
/// reuse). It is not safe for concurrent mutation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlock {
    common_prefix: Vec<u8>,
    data: Vec<u8>,
    items: Vec<Item>,
}

impl InMemoryBlock {
    /// Creates an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the block for reuse, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.common_prefix.clear();
        self.data.clear();
        self.items.clear();
    }

    /// Replaces this block's contents with a copy of `src`.
    pub fn copy_from(&mut self, src: &InMemoryBlock) {
        self.common_prefix.clear();
        self.common_prefix.extend_from_slice(&src.common_prefix);
        self.data.clear();
        self.data.extend_from_slice(&src.data);
        self.items.clear();
        self.items.extend_from_slice(&src.items);
    }

    /// Returns the items in the block.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns the flat data buffer the items point into.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the common prefix shared by every item, as of the last
    /// sort.
    pub fn common_prefix(&self) -> &[u8] {
        &self.common_prefix
    }

    /// Returns the total size of raw item bytes in the block.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Iterates over the items' byte slices in order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.items.iter().map(|it| it.bytes(&self.data))
    }

    /// Appends an item to the block.
    ///
    /// Returns false, leaving the block unchanged, if the flat buffer
    /// would exceed [`MAX_INMEMORY_BLOCK_SIZE`].
    pub fn add(&mut self, item: &[u8]) -> bool {
        if self.data.len() + item.len() > MAX_INMEMORY_BLOCK_SIZE {
            return false;
        }
        if self.data.capacity() == 0 {
            self.data.reserve(MAX_INMEMORY_BLOCK_SIZE);
            self.items.reserve(ITEMS_CAPACITY_HINT);
        }
        let start = self.data.len() as u32;
        self.data.extend_from_slice(item);
        self.items.push(Item::new(start, self.data.len() as u32));
        true
    }

    /// Returns the item's bytes after skipping `skip` leading bytes,
    /// clamped to the item's end for safety against stale prefixes.
    fn item_tail<'a>(data: &'a [u8], it: Item, skip: usize) -> &'a [u8] {
        let start = (it.start as usize + skip).min(it.end as usize);
        &data[start..it.end as usize]
    }

    /// Returns true if the items are sorted by byte-lexicographic
    /// order after stripping the current common prefix.
    pub fn is_sorted(&self) -> bool {
        let skip = self.common_prefix.len();
        self.items
            .windows(2)
            .all(|w| Self::item_tail(&self.data, w[0], skip) <= Self::item_tail(&self.data, w[1], skip))
    }

    /// Sorts the items and recomputes the common prefix.
    ///
    /// Already-sorted blocks take the cheap path: the common prefix of
    /// the first and last item is the common prefix of all of them.
    /// Unsorted blocks recompute the prefix by linear narrowing across
    /// every item before sorting.
    pub fn sort_items(&mut self) {
        if self.is_sorted() {
            self.update_common_prefix_sorted();
            return;
        }
        self.update_common_prefix_unsorted();
        let skip = self.common_prefix.len();
        let data = &self.data;
        self.items
            .sort_by(|&a, &b| Self::item_tail(data, a, skip).cmp(Self::item_tail(data, b, skip)));
    }

    fn update_common_prefix_sorted(&mut self) {
        if self.items.len() <= 1 {
            self.common_prefix.clear();
            return;
        }
        let first = self.items[0].bytes(&self.data);
        let last = self.items[self.items.len() - 1].bytes(&self.data);
        let n = common_prefix_len(first, last);
        let cp = first[..n].to_vec();
        self.common_prefix = cp;
    }

    fn update_common_prefix_unsorted(&mut self) {
        self.common_prefix.clear();
        let Some(&first) = self.items.first() else {
            return;
        };
        let mut cp = first.bytes(&self.data);
        for &it in &self.items[1..] {
            let item = it.bytes(&self.data);
            if item.starts_with(cp) {
                continue;
            }
            let n = common_prefix_len(item, cp);
            if n == 0 {
                return;
            }
            cp = &cp[..n];
        }
        let cp = cp.to_vec();
        self.common_prefix = cp;
    }

    /// Sorts the items, then marshals the block body.
    ///
    /// See [`InMemoryBlock::marshal_sorted_data`] for the outputs.
    pub fn marshal_unsorted_data(
        &mut self,
        sb: &mut StorageBlock,
        first_item_dst: &mut Vec<u8>,
        common_prefix_dst: &mut Vec<u8>,
        compress_level: i32,
    ) -> Result<(u32, MarshalType)> {
        self.sort_items();
        self.marshal_data(sb, first_item_dst, common_prefix_dst, compress_level)
    }

    /// Marshals the block body of an already-sorted block.
    ///
    /// Appends the first item and the common prefix to the caller's
    /// outputs (they are stored in the block header, outside the
    /// compressed streams), fills `sb` with the items and lens
    /// streams, and returns the item count plus the encoding tag that
    /// was actually used. The tag cannot be predicted up front: the
    /// plain-encoding heuristic and the compression-ratio fallback
    /// both decide it during marshaling.
    ///
    /// Calling this on an unsorted block is a programming defect and
    /// fails with [`PartError::Internal`].
    pub fn marshal_sorted_data(
        &mut self,
        sb: &mut StorageBlock,
        first_item_dst: &mut Vec<u8>,
        common_prefix_dst: &mut Vec<u8>,
        compress_level: i32,
    ) -> Result<(u32, MarshalType)> {
        if !self.is_sorted() {
            return Err(PartError::Internal(
                "marshal_sorted_data called on unsorted items".into(),
            ));
        }
        self.update_common_prefix_sorted();
        self.marshal_data(sb, first_item_dst, common_prefix_dst, compress_level)
    }

    fn marshal_data(
        &self,
        sb: &mut StorageBlock,
        first_item_dst: &mut Vec<u8>,
        common_prefix_dst: &mut Vec<u8>,
        compress_lvl: i32,
    ) -> Result<(u32, MarshalType)> {
        if self.items.is_empty() {
            return Err(PartError::Internal("marshal_data: block is empty".into()));
        }
        if self.items.len() > u32::MAX as usize {
            return Err(PartError::Internal(format!(
                "marshal_data: too many items in the block: {}; must fit a u32",
                self.items.len()
            )));
        }
        let items_count = self.items.len() as u32;
        let first_item = self.items[0].bytes(&self.data);
        first_item_dst.extend_from_slice(first_item);
        common_prefix_dst.extend_from_slice(&self.common_prefix);

        let cp_len = self.common_prefix.len();
        let payload = self.data.len() - cp_len * self.items.len();
        if payload < PLAIN_ENCODING_MAX_PAYLOAD || self.items.len() < 2 {
            // Plain encoding is cheaper for tiny blocks.
            self.marshal_data_plain(sb);
            return Ok((items_count, MarshalType::Plain));
        }

        // Strip the block common prefix, then the prefix shared with
        // the previous item, keeping only each item's unique suffix.
        let mut items_buf = Vec::with_capacity(payload);
        let mut x_lens = Vec::with_capacity(self.items.len() - 1);
        let mut prev_item = &first_item[cp_len..];
        let mut prev_prefix_len = 0u64;
        for &it in &self.items[1..] {
            let item = Self::item_tail(&self.data, it, cp_len);
            let prefix_len = common_prefix_len(prev_item, item);
            items_buf.extend_from_slice(&item[prefix_len..]);
            x_lens.push(prefix_len as u64 ^ prev_prefix_len);
            prev_item = item;
            prev_prefix_len = prefix_len as u64;
        }

        let mut lens_buf = Vec::new();
        marshal_var_u64s(&mut lens_buf, &x_lens);

        sb.items_data.clear();
        compress_level(&mut sb.items_data, &items_buf, compress_lvl)?;

        // Item lengths, delta'd the same way.
        x_lens.clear();
        let mut prev_item_len = (first_item.len() - cp_len) as u64;
        for &it in &self.items[1..] {
            let item_len = (it.len() - cp_len) as u64;
            x_lens.push(item_len ^ prev_item_len);
            prev_item_len = item_len;
        }
        marshal_var_u64s(&mut lens_buf, &x_lens);

        sb.lens_data.clear();
        compress_level(&mut sb.lens_data, &lens_buf, compress_lvl)?;

        if sb.items_data.len() as f64 > MIN_COMPRESSION_RATIO * payload as f64 {
            // Bad compression rate; plain encoding is cheaper to decode.
            self.marshal_data_plain(sb);
            return Ok((items_count, MarshalType::Plain));
        }
        Ok((items_count, MarshalType::Zstd))
    }

    /// Plain encoding: suffixes after the common prefix concatenated,
    /// raw item lengths as fixed 8-byte big-endian integers.
    ///
    /// The first item is not marshaled; the caller already received it
    /// from `marshal_data`.
    fn marshal_data_plain(&self, sb: &mut StorageBlock) {
        let cp_len = self.common_prefix.len();
        sb.items_data.clear();
        for &it in &self.items[1..] {
            sb.items_data
                .extend_from_slice(Self::item_tail(&self.data, it, cp_len));
        }
        sb.lens_data.clear();
        for &it in &self.items[1..] {
            marshal_u64(&mut sb.lens_data, (it.len() - cp_len) as u64);
        }
    }

    /// Rebuilds the block from its encoded streams.
    ///
    /// This is the inverse of marshaling and the single most
    /// security-critical decoder in the part format: `sb`, the first
    /// item, the common prefix, the item count and the encoding tag
    /// all come from untrusted on-disk data. Every decoded length is
    /// validated before use and the reconstructed items must come out
    /// sorted.
    pub fn unmarshal_data(
        &mut self,
        sb: &StorageBlock,
        first_item: &[u8],
        common_prefix: &[u8],
        items_count: u32,
        mt: MarshalType,
    ) -> Result<()> {
        if items_count == 0 {
            return Err(PartError::ZeroItems("block"));
        }
        if common_prefix.len() > first_item.len() {
            return Err(PartError::PrefixTooLong {
                prefix_len: common_prefix.len() as u64,
                item_len: first_item.len() as u64,
            });
        }

        self.common_prefix.clear();
        self.common_prefix.extend_from_slice(common_prefix);

        match mt {
            MarshalType::Plain => {
                self.unmarshal_data_plain(sb, first_item, items_count)?;
                if !self.is_sorted() {
                    return Err(PartError::Unsorted("plain data block items"));
                }
                return Ok(());
            }
            MarshalType::Zstd => {}
        }

        let count = items_count as usize;
        let mut lens_buf = Vec::new();
        decompress(&mut lens_buf, &sb.lens_data)?;

        // The lens stream holds two varints per item past the first,
        // each at least one byte. Checking this before sizing any
        // buffer by `count` keeps a forged item count from forcing a
        // huge allocation.
        let min_lens_len = (count - 1).saturating_mul(2);
        if lens_buf.len() < min_lens_len {
            return Err(PartError::UnexpectedEnd {
                field: "lens data",
                need: min_lens_len,
                got: lens_buf.len(),
            });
        }

        // Reverse the two XOR-delta chains; the first element of each
        // chain has delta 0 by definition.
        let mut deltas = vec![0u64; count - 1];
        let mut prefix_lens = vec![0u64; count];
        let tail = unmarshal_var_u64s(&mut deltas, &lens_buf)?;
        for i in 0..count - 1 {
            prefix_lens[i + 1] = deltas[i] ^ prefix_lens[i];
        }

        let mut item_lens = vec![0u64; count];
        let tail = unmarshal_var_u64s(&mut deltas, tail)?;
        if !tail.is_empty() {
            return Err(PartError::UnexpectedTail {
                what: "lens data",
                len: tail.len(),
            });
        }
        item_lens[0] = (first_item.len() - common_prefix.len()) as u64;
        let mut data_len = common_prefix.len() as u64 * count as u64 + item_lens[0];
        for i in 0..count - 1 {
            let item_len = deltas[i] ^ item_lens[i];
            item_lens[i + 1] = item_len;
            data_len = data_len.checked_add(item_len).ok_or(PartError::DataLenMismatch {
                expected: u64::MAX,
                got: data_len,
            })?;
        }

        let mut items_buf = Vec::new();
        decompress(&mut items_buf, &sb.items_data)?;

        self.data.clear();
        self.data.extend_from_slice(first_item);
        self.items.clear();
        self.items.push(Item::new(0, first_item.len() as u32));

        // Previous item's bytes after the common prefix, as a range
        // into self.data so the prefix copy can reuse them.
        let mut prev_start = common_prefix.len();
        let mut prev_end = first_item.len();
        let mut bs = &items_buf[..];
        for i in 1..count {
            let item_len = item_lens[i];
            let prefix_len = prefix_lens[i];
            if prefix_len > item_len {
                return Err(PartError::PrefixTooLong {
                    prefix_len,
                    item_len,
                });
            }
            if prefix_len as usize > prev_end - prev_start {
                return Err(PartError::PrefixTooLong {
                    prefix_len,
                    item_len: (prev_end - prev_start) as u64,
                });
            }
            let suffix_len = (item_len - prefix_len) as usize;
            if bs.len() < suffix_len {
                return Err(PartError::UnexpectedEnd {
                    field: "items data",
                    need: suffix_len,
                    got: bs.len(),
                });
            }
            let start = self.data.len();
            self.data.extend_from_slice(common_prefix);
            self.data
                .extend_from_within(prev_start..prev_start + prefix_len as usize);
            self.data.extend_from_slice(&bs[..suffix_len]);
            bs = &bs[suffix_len..];
            if self.data.len() > u32::MAX as usize {
                return Err(PartError::SizeExceeded {
                    what: "decoded block data",
                    got: self.data.len() as u64,
                    max: u32::MAX as u64,
                });
            }
            self.items.push(Item::new(start as u32, self.data.len() as u32));
            prev_start = start + common_prefix.len();
            prev_end = self.data.len();
        }

        if !bs.is_empty() {
            return Err(PartError::UnexpectedTail {
                what: "items data",
                len: bs.len(),
            });
        }
        if self.data.len() as u64 != data_len {
            return Err(PartError::DataLenMismatch {
                expected: data_len,
                got: self.data.len() as u64,
            });
        }
        if !self.is_sorted() {
            return Err(PartError::Unsorted("decoded data block items"));
        }
        Ok(())
    }

    /// Inverse of the plain encoding.
    fn unmarshal_data_plain(
        &mut self,
        sb: &StorageBlock,
        first_item: &[u8],
        items_count: u32,
    ) -> Result<()> {
        let count = items_count as usize;
        let cp_len = self.common_prefix.len();

        // Fixed 8 bytes per item past the first; validate before any
        // count-sized allocation.
        let need_lens_len = (count - 1).saturating_mul(8);
        if sb.lens_data.len() < need_lens_len {
            return Err(PartError::UnexpectedEnd {
                field: "plain lens data",
                need: need_lens_len,
                got: sb.lens_data.len(),
            });
        }

        let mut lens = vec![0u64; count];
        lens[0] = (first_item.len() - cp_len) as u64;
        let mut b = &sb.lens_data[..];
        for len in lens.iter_mut().skip(1) {
            if b.len() < 8 {
                return Err(PartError::UnexpectedEnd {
                    field: "plain lens data",
                    need: 8,
                    got: b.len(),
                });
            }
            *len = unmarshal_u64(b);
            b = &b[8..];
        }
        if !b.is_empty() {
            return Err(PartError::UnexpectedTail {
                what: "plain lens data",
                len: b.len(),
            });
        }

        let data_len = first_item.len() + sb.items_data.len() + cp_len * (count - 1);
        if data_len > u32::MAX as usize {
            return Err(PartError::SizeExceeded {
                what: "decoded block data",
                got: data_len as u64,
                max: u32::MAX as u64,
            });
        }
        self.data.clear();
        self.data.reserve(data_len);
        self.data.extend_from_slice(first_item);
        self.items.clear();
        self.items.push(Item::new(0, first_item.len() as u32));

        let mut bs = &sb.items_data[..];
        for &item_len in &lens[1..] {
            let item_len = item_len as usize;
            if bs.len() < item_len {
                return Err(PartError::UnexpectedEnd {
                    field: "plain items data",
                    need: item_len,
                    got: bs.len(),
                });
            }
            let start = self.data.len();
            let cp = self.common_prefix.len();
            self.data.extend_from_within(..cp); // common prefix sits at the head of the first item
            self.data.extend_from_slice(&bs[..item_len]);
            self.items.push(Item::new(start as u32, self.data.len() as u32));
            bs = &bs[item_len..];
        }
        if !bs.is_empty() {
            return Err(PartError::UnexpectedTail {
                what: "plain items data",
                len: bs.len(),
            });
        }
        if self.data.len() != data_len {
            return Err(PartError::DataLenMismatch {
                expected: data_len as u64,
                got: self.data.len() as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_from(items: &[&[u8]]) -> InMemoryBlock {
        let mut ib = InMemoryBlock::new();
        for item in items {
            assert!(ib.add(item));
        }
        ib
    }

    fn collect(ib: &InMemoryBlock) -> Vec<Vec<u8>> {
        ib.iter().map(|b| b.to_vec()).collect()
    }

    #[test]
    fn test_add_and_layout() {
        let mut ib = InMemoryBlock::new();
        assert!(ib.add(b"foo"));
        assert!(ib.add(b""));
        assert!(ib.add(b"barbaz"));
        assert_eq!(ib.items().len(), 3);
        assert_eq!(ib.size_bytes(), 9);
        assert_eq!(collect(&ib), vec![b"foo".to_vec(), b"".to_vec(), b"barbaz".to_vec()]);
    }

    #[test]
    fn test_add_refuses_past_ceiling() {
        let mut ib = InMemoryBlock::new();
        let mut added = 0usize;
        for _ in 0..70_000 {
            if !ib.add(b"x") {
                break;
            }
            added += 1;
        }
        assert_eq!(added, MAX_INMEMORY_BLOCK_SIZE);
        assert_eq!(ib.size_bytes(), MAX_INMEMORY_BLOCK_SIZE);
        // A refused add leaves the block unchanged.
        assert!(!ib.add(b"x"));
        assert_eq!(ib.items().len(), added);
    }

    #[test]
    fn test_sort_matches_vec_sort() {
        let mut expected: Vec<Vec<u8>> = vec![
            b"pear".to_vec(),
            b"apple".to_vec(),
            b"peach".to_vec(),
            b"apricot".to_vec(),
            b"".to_vec(),
            b"apple".to_vec(),
        ];
        let mut ib = InMemoryBlock::new();
        for item in &expected {
            assert!(ib.add(item));
        }
        ib.sort_items();
        expected.sort();
        assert_eq!(collect(&ib), expected);
    }

    #[test]
    fn test_common_prefix_sorted_vs_unsorted() {
        // Sorted block: prefix comes from first/last comparison.
        let mut ib = block_from(&[b"node.alpha", b"node.beta", b"node.gamma"]);
        ib.sort_items();
        assert_eq!(ib.common_prefix(), b"node.");

        // Unsorted block: linear narrowing across all items.
        let mut ib = block_from(&[b"node.beta", b"node.alpha", b"nodz"]);
        ib.sort_items();
        assert_eq!(ib.common_prefix(), b"nod");
    }

    #[test]
    fn test_no_shared_prefix() {
        let mut ib = block_from(&[b"abc123", b"abc124", b"abc999", b"xyz"]);
        ib.sort_items();
        assert_eq!(ib.common_prefix(), b"");
        assert_eq!(
            collect(&ib),
            vec![b"abc123".to_vec(), b"abc124".to_vec(), b"abc999".to_vec(), b"xyz".to_vec()]
        );
    }

    fn marshal_roundtrip(items: &[Vec<u8>]) -> MarshalType {
        let mut ib = InMemoryBlock::new();
        for item in items {
            assert!(ib.add(item));
        }
        let mut sb = StorageBlock::default();
        let mut first_item = Vec::new();
        let mut common_prefix = Vec::new();
        let (count, mt) = ib
            .marshal_unsorted_data(&mut sb, &mut first_item, &mut common_prefix, 3)
            .unwrap();
        assert_eq!(count as usize, items.len());

        let mut decoded = InMemoryBlock::new();
        decoded
            .unmarshal_data(&sb, &first_item, &common_prefix, count, mt)
            .unwrap();

        let mut expected: Vec<Vec<u8>> = items.to_vec();
        expected.sort();
        assert_eq!(collect(&decoded), expected);
        assert_eq!(decoded.common_prefix(), ib.common_prefix());
        mt
    }

    #[test]
    fn test_roundtrip_plain_small() {
        // Below the payload threshold, plain encoding wins.
        let mt = marshal_roundtrip(&[b"b".to_vec(), b"a".to_vec(), b"c".to_vec()]);
        assert_eq!(mt, MarshalType::Plain);
    }

    #[test]
    fn test_roundtrip_single_item() {
        let mt = marshal_roundtrip(&[vec![7u8; 200]]);
        assert_eq!(mt, MarshalType::Plain);
    }

    #[test]
    fn test_roundtrip_compressed() {
        let items: Vec<Vec<u8>> = (0..400u32)
            .map(|i| format!("metric.host{i:05}.cpu.usage").into_bytes())
            .collect();
        let mt = marshal_roundtrip(&items);
        assert_eq!(mt, MarshalType::Zstd);
    }

    #[test]
    fn test_roundtrip_mixed_prefixes() {
        marshal_roundtrip(&[
            b"abc123".to_vec(),
            b"abc124".to_vec(),
            b"abc999".to_vec(),
            b"xyz".to_vec(),
        ]);
        // Duplicates and empty items survive the codec.
        marshal_roundtrip(&[b"dup".to_vec(), b"dup".to_vec(), b"".to_vec(), b"zz".to_vec()]);
    }

    #[test]
    fn test_incompressible_falls_back_to_plain() {
        // Pseudo-random bytes compress to >= 90% of raw size, so the
        // compression attempt must be discarded.
        let mut state = 0x9e3779b97f4a7c15u64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u8
        };
        let mut items: Vec<Vec<u8>> = (0..200)
            .map(|_| (0..50).map(|_| next()).collect())
            .collect();
        items.sort();
        items.dedup();

        let mut ib = InMemoryBlock::new();
        for item in &items {
            assert!(ib.add(item));
        }
        let mut sb = StorageBlock::default();
        let mut first_item = Vec::new();
        let mut common_prefix = Vec::new();
        let (count, mt) = ib
            .marshal_sorted_data(&mut sb, &mut first_item, &mut common_prefix, 3)
            .unwrap();
        assert_eq!(mt, MarshalType::Plain);

        let mut decoded = InMemoryBlock::new();
        decoded
            .unmarshal_data(&sb, &first_item, &common_prefix, count, mt)
            .unwrap();
        assert_eq!(collect(&decoded), items);
    }

    #[test]
    fn test_marshal_sorted_rejects_unsorted() {
        let mut ib = block_from(&[b"zzz", b"aaa"]);
        let mut sb = StorageBlock::default();
        let mut first_item = Vec::new();
        let mut common_prefix = Vec::new();
        let err = ib
            .marshal_sorted_data(&mut sb, &mut first_item, &mut common_prefix, 3)
            .unwrap_err();
        assert!(matches!(err, PartError::Internal(_)));
    }

    #[test]
    fn test_unmarshal_rejects_zero_items() {
        let sb = StorageBlock::default();
        let mut ib = InMemoryBlock::new();
        let err = ib
            .unmarshal_data(&sb, b"a", b"", 0, MarshalType::Plain)
            .unwrap_err();
        assert!(matches!(err, PartError::ZeroItems(_)));
    }

    #[test]
    fn test_unmarshal_rejects_unsorted_plain() {
        // Hand-build a plain block whose decoded items are out of
        // order: first item "b" followed by "a".
        let mut sb = StorageBlock::default();
        sb.items_data.extend_from_slice(b"a");
        marshal_u64(&mut sb.lens_data, 1);
        let mut ib = InMemoryBlock::new();
        let err = ib
            .unmarshal_data(&sb, b"b", b"", 2, MarshalType::Plain)
            .unwrap_err();
        assert!(matches!(err, PartError::Unsorted(_)));
    }

    #[test]
    fn test_unmarshal_rejects_truncated_plain() {
        let mut sb = StorageBlock::default();
        sb.items_data.extend_from_slice(b"cd");
        marshal_u64(&mut sb.lens_data, 5); // claims 5 bytes, stream has 2
        let mut ib = InMemoryBlock::new();
        let err = ib
            .unmarshal_data(&sb, b"ab", b"", 2, MarshalType::Plain)
            .unwrap_err();
        assert!(matches!(err, PartError::UnexpectedEnd { .. }));
    }

    #[test]
    fn test_unmarshal_rejects_huge_items_count() {
        // A forged item count far beyond what the lens stream can hold
        // must be rejected up front, not drive buffer sizing.
        let mut sb = StorageBlock::default();
        crate::encoding::compress_level(&mut sb.lens_data, &[0u8; 16], 1).unwrap();
        crate::encoding::compress_level(&mut sb.items_data, b"suffixes", 1).unwrap();
        let mut ib = InMemoryBlock::new();
        let err = ib
            .unmarshal_data(&sb, b"first", b"", u32::MAX, MarshalType::Zstd)
            .unwrap_err();
        assert!(matches!(err, PartError::UnexpectedEnd { field: "lens data", .. }));

        let mut sb = StorageBlock::default();
        sb.lens_data.extend_from_slice(&[0u8; 24]);
        let err = ib
            .unmarshal_data(&sb, b"first", b"", u32::MAX, MarshalType::Plain)
            .unwrap_err();
        assert!(matches!(
            err,
            PartError::UnexpectedEnd { field: "plain lens data", .. }
        ));
    }

    #[test]
    fn test_unmarshal_rejects_corrupt_compressed() {
        let items: Vec<Vec<u8>> = (0..300u32).map(|i| format!("key{i:06}").into_bytes()).collect();
        let mut ib = InMemoryBlock::new();
        for item in &items {
            assert!(ib.add(item));
        }
        let mut sb = StorageBlock::default();
        let mut first_item = Vec::new();
        let mut common_prefix = Vec::new();
        let (count, mt) = ib
            .marshal_sorted_data(&mut sb, &mut first_item, &mut common_prefix, 3)
            .unwrap();
        assert_eq!(mt, MarshalType::Zstd);

        let mut corrupted = sb.clone();
        let n = corrupted.lens_data.len();
        corrupted.lens_data.truncate(n / 2);
        let mut decoded = InMemoryBlock::new();
        assert!(decoded
            .unmarshal_data(&corrupted, &first_item, &common_prefix, count, mt)
            .is_err());
    }

    #[test]
    fn test_lens_stream_bounded() {
        // Pre-compression, the lens stream never exceeds 10 bytes per
        // varint, two varints per item.
        let items: Vec<Vec<u8>> = (0..500u32).map(|i| format!("item-{i:07}").into_bytes()).collect();
        let mut x_lens = Vec::new();
        for w in items.windows(2) {
            x_lens.push(common_prefix_len(&w[0], &w[1]) as u64);
        }
        let mut buf = Vec::new();
        marshal_var_u64s(&mut buf, &x_lens);
        assert!(buf.len() <= 10 * x_lens.len());
    }

    #[test]
    fn test_copy_from_and_reset() {
        let mut src = block_from(&[b"one", b"two"]);
        src.sort_items();
        let mut dst = InMemoryBlock::new();
        dst.copy_from(&src);
        assert_eq!(collect(&dst), collect(&src));
        dst.reset();
        assert!(dst.items().is_empty());
        assert!(dst.data().is_empty());
        assert!(dst.common_prefix().is_empty());
    }
}
