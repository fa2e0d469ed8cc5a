//! Low-level wire encoding primitives shared by the part format.
//!
//! - [`varint`]: LEB128 varints, fixed-width big-endian integers and
//!   length-prefixed byte strings.
//! - [`compress`]: the zstd wrapper used for every compressed stream
//!   in a part.

pub mod compress;
pub mod varint;

pub use compress::{compress_level, decompress, stream_decompress};
pub use varint::{
    marshal_bytes, marshal_u32, marshal_u64, marshal_var_u64, marshal_var_u64s,
    marshal_var_u64s_slow, unmarshal_bytes, unmarshal_u32, unmarshal_u64, unmarshal_var_u64,
    unmarshal_var_u64s, unmarshal_var_u64s_slow, MAX_VARINT_LEN,
};

/// Returns the length of the longest common prefix of `a` and `b`.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::common_prefix_len;

    #[test]
    fn test_common_prefix_len() {
        let f = |a: &str, b: &str, expect: usize| {
            assert_eq!(common_prefix_len(a.as_bytes(), b.as_bytes()), expect, "{a:?} vs {b:?}");
        };
        f("", "", 0);
        f("a", "", 0);
        f("", "a", 0);
        f("a", "a", 1);
        f("abc", "xy", 0);
        f("abc", "abd", 2);
        f("01234567", "01234567", 8);
        f("01234567", "012345678", 8);
        f("012345679", "012345678", 8);
        f("01234569", "012345678", 7);
        f("01234569", "01234568", 7);
    }
}
