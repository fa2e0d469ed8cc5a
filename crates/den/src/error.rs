//! Error and Result types for Den part operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for Den operations.
pub type Result<T> = std::result::Result<T, PartError>;

/// The error type for part encode/decode and persistence operations.
#[derive(Debug, Error)]
pub enum PartError {
    /// Input ended before a field could be fully decoded.
    #[error("cannot unmarshal {field}: need {need} bytes, got {got}")]
    UnexpectedEnd {
        /// Name of the field being decoded.
        field: &'static str,
        /// Number of bytes required.
        need: usize,
        /// Number of bytes available.
        got: usize,
    },

    /// Unconsumed bytes remained after a decode that must consume its input.
    #[error("unexpected non-empty tail left after unmarshaling {what}; tail len={len}")]
    UnexpectedTail {
        /// What was being decoded.
        what: &'static str,
        /// Number of leftover bytes.
        len: usize,
    },

    /// A varint ended mid-value (continuation bit set on the last byte).
    #[error("cannot unmarshal varint from truncated data")]
    VarintTruncated,

    /// A varint encoding exceeded the 10-byte limit for u64.
    #[error("too long encoded varint; the maximum allowed length is 10 bytes; got {len} bytes")]
    VarintOverflow {
        /// Observed encoded length in bytes.
        len: usize,
    },

    /// Unknown block encoding tag on disk.
    #[error("invalid marshal type: {0}")]
    InvalidMarshalType(u8),

    /// A decoded size field exceeded its hard ceiling.
    #[error("too big {what}: got {got}; cannot exceed {max}")]
    SizeExceeded {
        /// Name of the size field.
        what: &'static str,
        /// Decoded value.
        got: u64,
        /// Maximum allowed value.
        max: u64,
    },

    /// A decoded item count was zero where at least one item is required.
    #[error("{0} must contain at least one item")]
    ZeroItems(&'static str),

    /// A decoded sequence violated the required sort order.
    #[error("{0} are not sorted")]
    Unsorted(&'static str),

    /// A decoded per-item prefix length exceeded the item length.
    #[error("prefix_len {prefix_len} exceeds item_len {item_len}")]
    PrefixTooLong {
        /// Decoded shared-prefix length.
        prefix_len: u64,
        /// Decoded item length.
        item_len: u64,
    },

    /// Reconstructed block data did not match the length implied by the
    /// decoded item lengths.
    #[error("unexpected data len after unmarshaling items; expected {expected}; got {got}")]
    DataLenMismatch {
        /// Length implied by the decoded lengths.
        expected: u64,
        /// Actual reconstructed length.
        got: u64,
    },

    /// A metaindex stream decoded to zero rows.
    #[error("expecting non-zero metaindex rows; got zero")]
    EmptyMetaindex,

    /// Decompression of a compressed stream failed.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The part metadata record was malformed.
    #[error("invalid part metadata: {0}")]
    InvalidMetadata(String),

    /// An internal invariant was violated; indicates a defect in the
    /// calling code or the encoder itself, not bad input.
    #[error("internal error: {0}")]
    Internal(String),

    /// A storage operation failed on a specific path.
    #[error("storage error on {}: {source}", path.display())]
    Storage {
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
