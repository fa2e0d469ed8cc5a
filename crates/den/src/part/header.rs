//! Part-level metadata, persisted as `metadata.json`.
//!
//! The header summarizes a whole part: total item and block counts
//! plus the first and last items. Items are arbitrary byte strings,
//! so they are hex-encoded in the JSON document.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PartError, Result};
use crate::fsutil;
use crate::part::METADATA_FILENAME;

/// Summary metadata for one part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeader {
    /// Total number of items across all blocks; always non-zero.
    pub items_count: u64,
    /// Number of data blocks; never exceeds `items_count`.
    pub blocks_count: u64,
    /// The smallest item in the part.
    pub first_item: Vec<u8>,
    /// The largest item in the part.
    pub last_item: Vec<u8>,
}

/// JSON shape of `metadata.json`. Byte strings travel hex-encoded.
#[derive(Serialize, Deserialize)]
struct PartHeaderJson {
    items_count: u64,
    blocks_count: u64,
    first_item: String,
    last_item: String,
}

impl PartHeader {
    /// Clears the header for reuse.
    pub fn reset(&mut self) {
        self.items_count = 0;
        self.blocks_count = 0;
        self.first_item.clear();
        self.last_item.clear();
    }

    /// Copies `src` into this header.
    pub fn copy_from(&mut self, src: &PartHeader) {
        self.items_count = src.items_count;
        self.blocks_count = src.blocks_count;
        self.first_item.clear();
        self.first_item.extend_from_slice(&src.first_item);
        self.last_item.clear();
        self.last_item.extend_from_slice(&src.last_item);
    }

    fn validate(&self) -> Result<()> {
        if self.items_count == 0 {
            return Err(PartError::InvalidMetadata(
                "items_count must be positive".into(),
            ));
        }
        if self.blocks_count == 0 {
            return Err(PartError::InvalidMetadata(
                "blocks_count must be positive".into(),
            ));
        }
        if self.blocks_count > self.items_count {
            return Err(PartError::InvalidMetadata(format!(
                "blocks_count {} exceeds items_count {}",
                self.blocks_count, self.items_count
            )));
        }
        Ok(())
    }

    /// Serializes the header to its JSON document.
    pub fn marshal_json(&self) -> Result<Vec<u8>> {
        let doc = PartHeaderJson {
            items_count: self.items_count,
            blocks_count: self.blocks_count,
            first_item: hex::encode(&self.first_item),
            last_item: hex::encode(&self.last_item),
        };
        serde_json::to_vec_pretty(&doc).map_err(|e| PartError::InvalidMetadata(e.to_string()))
    }

    /// Parses and validates the header from its JSON document.
    pub fn unmarshal_json(&mut self, data: &[u8]) -> Result<()> {
        let doc: PartHeaderJson = serde_json::from_slice(data)
            .map_err(|e| PartError::InvalidMetadata(format!("cannot parse metadata: {e}")))?;
        self.items_count = doc.items_count;
        self.blocks_count = doc.blocks_count;
        self.first_item = hex::decode(&doc.first_item)
            .map_err(|e| PartError::InvalidMetadata(format!("cannot decode first_item: {e}")))?;
        self.last_item = hex::decode(&doc.last_item)
            .map_err(|e| PartError::InvalidMetadata(format!("cannot decode last_item: {e}")))?;
        self.validate()
    }

    /// Reads and validates `metadata.json` from the part directory.
    pub fn read_metadata(&mut self, part_dir: &Path) -> Result<()> {
        let path = part_dir.join(METADATA_FILENAME);
        let data = fs::read(&path).map_err(|source| PartError::Storage {
            path: path.clone(),
            source,
        })?;
        self.unmarshal_json(&data)?;
        debug!(
            part = %part_dir.display(),
            items = self.items_count,
            blocks = self.blocks_count,
            "read part metadata"
        );
        Ok(())
    }

    /// Validates the header and atomically writes `metadata.json` into
    /// the part directory.
    pub fn write_metadata(&self, part_dir: &Path) -> Result<()> {
        self.validate()?;
        let data = self.marshal_json()?;
        let path = part_dir.join(METADATA_FILENAME);
        fsutil::write_atomic(&path, &data)?;
        Ok(())
    }
}
