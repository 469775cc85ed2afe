//! Configuration for the storage engine.
//!
//! Every configurable component takes a plain config struct with named
//! fields and a `Default` impl, so callers override only what they care
//! about:
//!
//! ```ignore
//! let config = LogConfig {
//!     segment: SegmentConfig {
//!         max_store_bytes: 64 * 1024 * 1024,
//!         ..Default::default()
//!     },
//! };
//! let log = Log::open("./data/log", config)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::ENTRY_WIDTH;
use crate::store::LEN_WIDTH;

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Capacity of the write buffer in bytes.
    pub buffer_size_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            buffer_size_bytes: 4096,
        }
    }
}

/// Configuration for an [`Index`](crate::Index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum size of the index file in bytes. The file is inflated to
    /// this size at open so the whole mapping is file-backed; segments
    /// always set it explicitly.
    pub max_index_bytes: u64,

    /// Create the index file if it does not exist.
    pub auto_create: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_index_bytes: 1024,
            auto_create: true,
        }
    }
}

/// Configuration for a [`Segment`](crate::Segment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Roll the segment once its store file reaches this many bytes.
    pub max_store_bytes: u64,

    /// Roll the segment once its index holds this many bytes of entries.
    pub max_index_bytes: u64,

    /// Store-level settings for the segment's store file.
    pub store: StoreConfig,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 10 * 1024 * 1024,
            max_index_bytes: 50 * 1024 * 1024,
            store: StoreConfig::default(),
        }
    }
}

impl SegmentConfig {
    /// A segment must be able to hold at least one store entry and one
    /// index entry, otherwise every append would report `Full`.
    pub fn validate(&self) -> Result<()> {
        if self.max_store_bytes <= LEN_WIDTH {
            return Err(Error::InvalidConfig(format!(
                "max_store_bytes must exceed the {LEN_WIDTH}-byte length prefix"
            )));
        }
        if self.max_index_bytes < ENTRY_WIDTH {
            return Err(Error::InvalidConfig(format!(
                "max_index_bytes must hold at least one {ENTRY_WIDTH}-byte entry"
            )));
        }
        Ok(())
    }
}

/// Configuration for a [`Log`](crate::Log).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Settings applied to every segment the log creates.
    pub segment: SegmentConfig,
}
