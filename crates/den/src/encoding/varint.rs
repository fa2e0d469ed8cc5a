//! Variable-length and fixed-width integer encoding.
//!
//! Unsigned integers use standard LEB128: 7 payload bits per byte, low
//! groups first, continuation flag in the high bit. A `u64` encodes to
//! 1-10 bytes; the 10th byte of a maximal encoding must be `<= 1`.
//! Fixed-width integers are big-endian. Byte strings are prefixed with
//! their length as a varint.
//!
//! The array encoders/decoders carry a fast path for the common case
//! where every value fits in a single byte (delta streams between
//! sorted neighbors are dominated by tiny values), falling back to the
//! general multi-byte path the moment one value needs more.

use crate::error::{PartError, Result};

/// Maximum encoded length of a `u64` varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Appends the varint encoding of `u` to `dst`.
pub fn marshal_var_u64(dst: &mut Vec<u8>, u: u64) {
    if u < 1 << 7 {
        dst.push(u as u8);
        return;
    }
    if u < 1 << (2 * 7) {
        dst.extend_from_slice(&[(u as u8) | 0x80, (u >> 7) as u8]);
        return;
    }
    if u < 1 << (3 * 7) {
        dst.extend_from_slice(&[(u as u8) | 0x80, ((u >> 7) as u8) | 0x80, (u >> 14) as u8]);
        return;
    }
    marshal_var_u64s_slow(dst, &[u]);
}

/// Appends the varint encodings of all `values` to `dst`.
///
/// Tries a byte-per-value fast path first; the first value that does
/// not fit in 7 bits truncates the output back to where this call
/// started and re-encodes the whole array through the general path so
/// the output stays contiguous.
pub fn marshal_var_u64s(dst: &mut Vec<u8>, values: &[u64]) {
    let start = dst.len();
    for &u in values {
        if u >= 1 << 7 {
            dst.truncate(start);
            marshal_var_u64s_slow(dst, values);
            return;
        }
        dst.push(u as u8);
    }
}

/// General multi-byte varint encoding for an array of values.
pub fn marshal_var_u64s_slow(dst: &mut Vec<u8>, values: &[u64]) {
    for &u in values {
        let mut v = u;
        while v >= 0x80 {
            dst.push((v as u8) | 0x80);
            v >>= 7;
        }
        dst.push(v as u8);
    }
}

/// Decodes one varint from the head of `src`.
///
/// Returns the value and the number of bytes consumed. Fails on
/// truncated input and on encodings longer than [`MAX_VARINT_LEN`]
/// bytes (or whose 10th byte is `> 1`).
pub fn unmarshal_var_u64(src: &[u8]) -> Result<(u64, usize)> {
    let Some(&b0) = src.first() else {
        return Err(PartError::VarintTruncated);
    };
    if b0 < 0x80 {
        return Ok((b0 as u64, 1));
    }
    if src.len() == 1 {
        return Err(PartError::VarintTruncated);
    }
    let b1 = src[1];
    if b1 < 0x80 {
        return Ok(((b0 & 0x7f) as u64 | (b1 as u64) << 7, 2));
    }
    uvarint(src)
}

/// General varint decode loop, capped at [`MAX_VARINT_LEN`] bytes.
fn uvarint(src: &[u8]) -> Result<(u64, usize)> {
    let mut x = 0u64;
    let mut shift = 0u32;
    for (i, &b) in src.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(PartError::VarintOverflow { len: i + 1 });
        }
        if b < 0x80 {
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return Err(PartError::VarintOverflow { len: i + 1 });
            }
            return Ok((x | (b as u64) << shift, i + 1));
        }
        x |= ((b & 0x7f) as u64) << shift;
        shift += 7;
    }
    Err(PartError::VarintTruncated)
}

/// Decodes exactly `dst.len()` varints from `src`, returning the
/// unconsumed tail.
///
/// The all-single-byte fast path requires `src.len() >= dst.len()`.
pub fn unmarshal_var_u64s<'a>(dst: &mut [u64], src: &'a [u8]) -> Result<&'a [u8]> {
    if src.len() < dst.len() {
        return Err(PartError::UnexpectedEnd {
            field: "varint array",
            need: dst.len(),
            got: src.len(),
        });
    }
    for (i, out) in dst.iter_mut().enumerate() {
        let c = src[i];
        if c >= 0x80 {
            return unmarshal_var_u64s_slow(dst, src);
        }
        *out = c as u64;
    }
    Ok(&src[dst.len()..])
}

/// General multi-byte decode for an array of varints.
///
/// Inlines the 1/2/3-byte cases and scans continuation bits for longer
/// values; fails if `src` is exhausted mid-value or a value's encoding
/// exceeds [`MAX_VARINT_LEN`] bytes.
pub fn unmarshal_var_u64s_slow<'a>(dst: &mut [u64], src: &'a [u8]) -> Result<&'a [u8]> {
    let mut idx = 0usize;
    for out in dst.iter_mut() {
        let c = *src.get(idx).ok_or(PartError::VarintTruncated)?;
        idx += 1;
        if c < 0x80 {
            *out = c as u64;
            continue;
        }
        let d = *src.get(idx).ok_or(PartError::VarintTruncated)?;
        idx += 1;
        if d < 0x80 {
            *out = (c & 0x7f) as u64 | (d as u64) << 7;
            continue;
        }
        let e = *src.get(idx).ok_or(PartError::VarintTruncated)?;
        idx += 1;
        if e < 0x80 {
            *out = (c & 0x7f) as u64 | ((d & 0x7f) as u64) << 7 | (e as u64) << 14;
            continue;
        }
        let mut u = (c & 0x7f) as u64 | ((d & 0x7f) as u64) << 7 | ((e & 0x7f) as u64) << 14;
        let start = idx;
        loop {
            let b = *src.get(idx).ok_or(PartError::VarintTruncated)?;
            idx += 1;
            if b < 0x80 {
                break;
            }
        }
        let tail = &src[start..idx];
        match tail.len() {
            1..=7 => {
                if tail.len() == 7 && tail[6] > 1 {
                    return Err(PartError::VarintOverflow { len: MAX_VARINT_LEN });
                }
                for (k, &b) in tail.iter().enumerate() {
                    u |= ((b & 0x7f) as u64) << (21 + 7 * k as u32);
                }
            }
            n => return Err(PartError::VarintOverflow { len: n + 3 }),
        }
        *out = u;
    }
    Ok(&src[idx..])
}

/// Appends `u` to `dst` as 8 big-endian bytes.
pub fn marshal_u64(dst: &mut Vec<u8>, u: u64) {
    dst.extend_from_slice(&u.to_be_bytes());
}

/// Decodes a big-endian `u64` from the first 8 bytes of `src`.
///
/// The caller must have verified that `src.len() >= 8`.
pub fn unmarshal_u64(src: &[u8]) -> u64 {
    u64::from_be_bytes(src[..8].try_into().unwrap())
}

/// Appends `u` to `dst` as 4 big-endian bytes.
pub fn marshal_u32(dst: &mut Vec<u8>, u: u32) {
    dst.extend_from_slice(&u.to_be_bytes());
}

/// Decodes a big-endian `u32` from the first 4 bytes of `src`.
///
/// The caller must have verified that `src.len() >= 4`.
pub fn unmarshal_u32(src: &[u8]) -> u32 {
    u32::from_be_bytes(src[..4].try_into().unwrap())
}

/// Appends `b` to `dst` as a varint length prefix followed by the raw
/// bytes.
pub fn marshal_bytes(dst: &mut Vec<u8>, b: &[u8]) {
    marshal_var_u64(dst, b.len() as u64);
    dst.extend_from_slice(b);
}

/// Decodes a length-prefixed byte string from the head of `src`.
///
/// Returns the payload and the total number of bytes consumed
/// (prefix + payload).
pub fn unmarshal_bytes(src: &[u8]) -> Result<(&[u8], usize)> {
    let (n, prefix) = unmarshal_var_u64(src)?;
    let rest = &src[prefix..];
    if (rest.len() as u64) < n {
        return Err(PartError::UnexpectedEnd {
            field: "byte string",
            need: (n as usize).saturating_add(prefix),
            got: src.len(),
        });
    }
    let n = n as usize;
    Ok((&rest[..n], prefix + n))
}
