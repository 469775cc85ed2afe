//! Log Segments
//!
//! A segment pairs one store file with one index file, both named by the
//! segment's base offset (`<base>.store`, `<base>.index`). It is the unit
//! of roll-over and truncation: the log appends to its newest segment until
//! either file hits its configured cap, then starts a new segment whose
//! base offset continues where this one stopped.
//!
//! ## Offset Arithmetic
//!
//! The segment covers the absolute offsets `[base_offset, next_offset)`.
//! Index rows hold offsets *relative* to the base (a `u32`), so a single
//! segment is bounded at 2³² records; the log scales past that with more
//! segments.
//!
//! ## Recovery
//!
//! Opening a segment tail-locates the index (`read(-1)`) to find the last
//! written relative offset and derives `next_offset` from it; an empty
//! index means a fresh segment whose next offset is the base itself.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::config::{IndexConfig, SegmentConfig};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::store::Store;

/// A `(store, index)` pair covering one contiguous window of offsets.
#[derive(Debug)]
pub struct Segment {
    store: Store,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    /// Open (or create) the segment with the given base offset inside
    /// `dir`, recovering `next_offset` from the index tail.
    pub fn open(dir: impl AsRef<Path>, base_offset: u64, config: &SegmentConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref();

        let store = Store::open(
            dir.join(format!("{base_offset}.store")),
            &config.store,
        )?;

        let index = Index::open(
            dir.join(format!("{base_offset}.index")),
            &IndexConfig {
                max_index_bytes: config.max_index_bytes,
                auto_create: true,
            },
        )?;

        let next_offset = match index.read(-1) {
            Ok((relative_offset, _)) => base_offset + u64::from(relative_offset) + 1,
            Err(Error::Empty) => base_offset,
            Err(e) => return Err(e),
        };

        tracing::debug!(base_offset, next_offset, dir = %dir.display(), "segment opened");

        Ok(Self {
            store,
            index,
            base_offset,
            next_offset,
            config: config.clone(),
        })
    }

    /// Append `record`, returning the absolute offset it was assigned.
    ///
    /// Fails with [`Error::Full`] before `next_offset` advances when the
    /// segment is at capacity.
    pub fn append(&mut self, record: &[u8]) -> Result<u64> {
        if self.is_full() {
            return Err(Error::Full);
        }

        let offset = self.next_offset;
        let (_, position) = self.store.append(record)?;

        let relative_offset = (offset - self.base_offset) as u32;
        if let Err(e) = self.index.write(relative_offset, position) {
            // The store entry just written is now orphaned: the index never
            // references it and readers cannot see it.
            tracing::debug!(offset, position, "index write failed after store append: {e}");
            return Err(e);
        }

        self.next_offset += 1;
        Ok(offset)
    }

    /// Read the record at the absolute `offset`.
    pub fn read(&self, offset: u64) -> Result<Bytes> {
        if offset < self.base_offset || offset >= self.next_offset {
            return Err(Error::OutOfRange(offset));
        }

        let relative_offset = (offset - self.base_offset) as i64;
        let (_, position) = self.index.read(relative_offset)?;
        self.store.read(position)
    }

    /// Whether either file has reached its configured cap; the next append
    /// would return [`Error::Full`].
    pub fn is_full(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
    }

    /// First offset this segment covers.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Offset the next append will be assigned; one past the last record.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Path of the store file, for the log's raw byte reader.
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// Close both files and delete them from disk.
    pub fn remove(&mut self) -> Result<()> {
        self.close()?;
        let store_path: PathBuf = self.store.path().to_path_buf();
        let index_path: PathBuf = self.index.path().to_path_buf();
        fs::remove_file(store_path)?;
        fs::remove_file(index_path)?;
        tracing::debug!(base_offset = self.base_offset, "segment removed");
        Ok(())
    }

    /// Close both files; this also syncs the index and truncates it to its
    /// populated size.
    pub fn close(&mut self) -> Result<()> {
        self.store.close()?;
        self.index.close()?;
        Ok(())
    }
}
