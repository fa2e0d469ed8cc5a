//! zstd wrapper for block stream compression.
//!
//! All compressed part streams (block items, block length codes, the
//! index and metaindex streams) go through these two entry points. The
//! decompressor never trusts a frame that does not declare its
//! decompressed size: such frames are pulled through a bounded-memory
//! streaming reader in fixed-size chunks instead of a single
//! allocate-and-decode call.

use crate::error::{PartError, Result};
use std::io::Read;

/// Chunk size for streaming decompression of unknown-size frames.
const STREAM_CHUNK_SIZE: usize = 16 * 1024;

/// Ceiling on the decompressed size a frame may declare. Guards the
/// upfront allocation against corrupt headers; no legitimate part
/// stream comes anywhere near this.
const MAX_FRAME_CONTENT_SIZE: u64 = 1 << 30;

/// Appends the zstd-compressed form of `src` to `dst`.
///
/// Out-of-range compression levels are clamped to the nearest level
/// zstd supports rather than rejected. Empty `src` appends nothing.
pub fn compress_level(dst: &mut Vec<u8>, src: &[u8], level: i32) -> Result<()> {
    if src.is_empty() {
        return Ok(());
    }
    let range = zstd::compression_level_range();
    let level = level.clamp(*range.start(), *range.end());
    let compressed = zstd::bulk::compress(src, level)
        .map_err(|e| PartError::Internal(format!("zstd compression failed: {e}")))?;
    dst.extend_from_slice(&compressed);
    Ok(())
}

/// Appends the decompressed form of the zstd frame in `src` to `dst`.
///
/// Frames that declare their decompressed size are decoded in one call
/// into an exact-sized buffer; frames with unknown size fall back to
/// [`stream_decompress`]. Corrupt input fails with a descriptive
/// error; empty `src` appends nothing.
pub fn decompress(dst: &mut Vec<u8>, src: &[u8]) -> Result<()> {
    if src.is_empty() {
        return Ok(());
    }
    match zstd::zstd_safe::get_frame_content_size(src) {
        Ok(Some(size)) => {
            if size > MAX_FRAME_CONTENT_SIZE {
                return Err(PartError::Decompress(format!(
                    "frame declares {size} decompressed bytes; limit {MAX_FRAME_CONTENT_SIZE}"
                )));
            }
            let capacity = size as usize;
            let out = zstd::bulk::decompress(src, capacity)
                .map_err(|e| PartError::Decompress(e.to_string()))?;
            dst.extend_from_slice(&out);
            Ok(())
        }
        Ok(None) => stream_decompress(dst, src),
        Err(_) => Err(PartError::Decompress(
            "cannot determine frame content size; invalid zstd frame".into(),
        )),
    }
}

/// Streaming decompression for frames of unknown decompressed size.
///
/// Pulls output through a fixed-size chunk buffer so memory use stays
/// bounded regardless of what the frame expands to per read.
pub fn stream_decompress(dst: &mut Vec<u8>, src: &[u8]) -> Result<()> {
    let mut decoder =
        zstd::stream::read::Decoder::new(src).map_err(|e| PartError::Decompress(e.to_string()))?;
    let mut chunk = [0u8; STREAM_CHUNK_SIZE];
    loop {
        let n = decoder
            .read(&mut chunk)
            .map_err(|e| PartError::Decompress(e.to_string()))?;
        if n == 0 {
            return Ok(());
        }
        dst.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_roundtrip(src: &[u8], level: i32) {
        let mut compressed = Vec::new();
        compress_level(&mut compressed, src, level).unwrap();
        let mut decompressed = Vec::new();
        decompress(&mut decompressed, &compressed).unwrap();
        assert_eq!(decompressed, src, "level {level}");
    }

    #[test]
    fn test_compress_all_levels() {
        let src = b"foobar baz";
        for level in 1..=22 {
            assert_roundtrip(src, level);
        }
    }

    #[test]
    fn test_compress_level_clamping() {
        // Out-of-range levels clamp to the nearest valid level.
        assert_roundtrip(b"foobar baz", -123_456_789);
        assert_roundtrip(b"foobar baz", 234_324);
    }

    #[test]
    fn test_compress_empty() {
        let mut dst = vec![1, 2, 3];
        compress_level(&mut dst, b"", 3).unwrap();
        assert_eq!(dst, vec![1, 2, 3]);
        decompress(&mut dst, b"").unwrap();
        assert_eq!(dst, vec![1, 2, 3]);
    }

    #[test]
    fn test_decompress_appends() {
        let mut compressed = Vec::new();
        compress_level(&mut compressed, b"payload", 1).unwrap();
        let mut dst = b"prefix:".to_vec();
        decompress(&mut dst, &compressed).unwrap();
        assert_eq!(dst, b"prefix:payload");
    }

    #[test]
    fn test_decompress_corrupt() {
        let mut dst = Vec::new();
        assert!(matches!(
            decompress(&mut dst, b"not a zstd frame"),
            Err(PartError::Decompress(_))
        ));

        let mut compressed = Vec::new();
        compress_level(&mut compressed, &vec![7u8; 4096], 3).unwrap();
        let len = compressed.len();
        compressed[len / 2] ^= 0xff;
        let mut dst = Vec::new();
        assert!(decompress(&mut dst, &compressed).is_err());
    }

    #[test]
    fn test_stream_decompress_unknown_size() {
        // An encoder fed through the streaming writer emits a frame
        // without a declared content size, which forces the bounded
        // streaming read path.
        use std::io::Write;
        let src: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), 3).unwrap();
        encoder.write_all(&src).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut dst = Vec::new();
        decompress(&mut dst, &compressed).unwrap();
        assert_eq!(dst, src);
    }
}
