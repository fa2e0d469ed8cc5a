//! Den - Alopex sorted part storage engine.
//!
//! Den is the on-disk format for immutable sorted runs ("parts") of
//! arbitrary byte-string items, as used by merge-tree style indexes.
//! Items are packed into 64 KiB blocks, prefix- and delta-encoded,
//! zstd-compressed, and indexed by a compact two-level index so point
//! and range lookups read at most one block per level.
//!
//! # Example
//!
//! ```no_run
//! use den::part::{InMemoryBlock, InMemoryPart, Part};
//!
//! # fn main() -> den::Result<()> {
//! let mut block = InMemoryBlock::new();
//! block.add(b"metric.cpu.user");
//! block.add(b"metric.cpu.idle");
//!
//! let mut part = InMemoryPart::new();
//! part.init(&mut block)?;
//! part.store_to_disk("data/parts/0001".as_ref())?;
//!
//! let mut stored = Part::open("data/parts/0001".as_ref())?;
//! assert_eq!(stored.header().items_count, 2);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod encoding;
pub mod error;
pub mod fsutil;
pub mod part;

pub use error::{PartError, Result};
