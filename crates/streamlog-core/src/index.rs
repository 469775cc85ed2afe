//! Memory-Mapped Offset Index
//!
//! The index maps a segment-relative record offset to the byte position of
//! that record inside the segment's store file. It is a dense, fixed-width
//! table so entry `i` always lives at byte `12 * i` — no search required.
//!
//! ## File Format
//!
//! ```text
//! ┌────────────────────┬────────────────────┐
//! │ Relative offset    │ Store position     │   12 bytes per entry
//! │ (u32, big-endian)  │ (u64, big-endian)  │
//! └────────────────────┴────────────────────┘
//! ```
//!
//! ## The Pre-Truncation Trick
//!
//! Memory mappings cannot grow, so at open the file is inflated to the
//! configured maximum and the whole region is mapped read-write, shared.
//! The populated size is tracked in memory and only advanced after a
//! successful mapped write. On close the mapping is flushed, unmapped, and
//! the file truncated back down so the bytes at rest contain exactly the
//! written entries — no zero padding.
//!
//! Reads that address bytes beyond the populated size fail with
//! `OutOfRange`; they never surface zero-valued phantom entries from the
//! unwritten tail of the mapping.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::config::IndexConfig;
use crate::error::{Error, Result};

/// Width of the relative-offset column.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store-position column.
pub const POSITION_WIDTH: u64 = 8;
/// Total width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

struct Inner {
    file: File,
    mmap: MmapMut,
    /// Bytes of real entries; everything past this is unwritten mapping.
    size: u64,
    /// Mapped capacity, fixed for the lifetime of the index.
    capacity: u64,
}

/// Fixed-width offset→position table over a memory-mapped file.
///
/// The index carries no lock of its own: writes take `&mut self` and the
/// enclosing segment and log serialize access. Shared reads through `&self`
/// only touch the populated, immutable prefix of the mapping.
pub struct Index {
    path: PathBuf,
    inner: Option<Inner>,
}

impl Index {
    /// Open (or create, when `auto_create` is set) the index file at `path`
    /// and map it at `max_index_bytes`.
    pub fn open(path: impl AsRef<Path>, config: &IndexConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !config.auto_create && !path.exists() {
            return Err(Error::InvalidConfig(format!(
                "index file {} does not exist and auto_create is disabled",
                path.display()
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.auto_create)
            .open(&path)?;

        // The populated size is whatever a clean close left on disk; it must
        // be read before the file is inflated to the mapped capacity.
        let size = file.metadata()?.len();
        let capacity = config.max_index_bytes;
        if size > capacity {
            return Err(Error::InvalidConfig(format!(
                "index file {} holds {size} bytes, more than max_index_bytes {capacity}",
                path.display()
            )));
        }

        file.set_len(capacity)?;

        // SAFETY: the mapping is file-backed and shared, and it never
        // outlives `file`; `close` drops it before truncating. The data
        // directory is exclusive to this process.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        tracing::debug!(path = %path.display(), size, capacity, "index opened");

        Ok(Self {
            path,
            inner: Some(Inner {
                file,
                mmap,
                size,
                capacity,
            }),
        })
    }

    /// Append one `(relative offset, position)` entry.
    ///
    /// Fails with [`Error::Full`] once the mapped capacity is exhausted;
    /// the segment treats that as its signal to roll.
    pub fn write(&mut self, relative_offset: u32, position: u64) -> Result<()> {
        let inner = self.inner.as_mut().ok_or(Error::Closed)?;

        if inner.size + ENTRY_WIDTH > inner.capacity {
            return Err(Error::Full);
        }

        let at = inner.size as usize;
        inner.mmap[at..at + OFFSET_WIDTH as usize]
            .copy_from_slice(&relative_offset.to_be_bytes());
        inner.mmap[at + OFFSET_WIDTH as usize..at + ENTRY_WIDTH as usize]
            .copy_from_slice(&position.to_be_bytes());

        inner.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Read entry `i`, or the last entry when `i` is negative.
    ///
    /// `read(-1)` is the tail-locate primitive used at segment open to
    /// recover the next offset.
    pub fn read(&self, i: i64) -> Result<(u32, u64)> {
        let inner = self.inner.as_ref().ok_or(Error::Closed)?;

        if inner.size == 0 {
            return Err(Error::Empty);
        }

        let entry = if i < 0 {
            inner.size / ENTRY_WIDTH - 1
        } else {
            i as u64
        };

        let at = entry * ENTRY_WIDTH;
        if at + ENTRY_WIDTH > inner.size {
            return Err(Error::OutOfRange(entry));
        }

        let at = at as usize;
        let mut offset_buf = [0u8; OFFSET_WIDTH as usize];
        offset_buf.copy_from_slice(&inner.mmap[at..at + OFFSET_WIDTH as usize]);
        let mut position_buf = [0u8; POSITION_WIDTH as usize];
        position_buf
            .copy_from_slice(&inner.mmap[at + OFFSET_WIDTH as usize..at + ENTRY_WIDTH as usize]);

        Ok((
            u32::from_be_bytes(offset_buf),
            u64::from_be_bytes(position_buf),
        ))
    }

    /// Bytes of populated entries. Zero once the index is closed.
    pub fn size(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.size)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the mapping, unmap it, and shrink the file to the populated
    /// size.
    ///
    /// The unmap happens strictly before the truncate and the final close
    /// of the descriptor. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(inner) = self.inner.take() {
            inner.mmap.flush()?;
            inner.file.sync_all()?;
            drop(inner.mmap);
            inner.file.set_len(inner.size)?;
            tracing::debug!(path = %self.path.display(), size = inner.size, "index closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish()
    }
}
