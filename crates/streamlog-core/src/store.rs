//! Append-Only Record Store
//!
//! The store is the bottom layer of the commit log: a length-prefixed,
//! append-only byte file. It knows nothing about offsets; callers address
//! records by the byte *position* returned from [`Store::append`].
//!
//! ## File Format
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬─────────────┬───
//! │ Length (u64) │ Payload      │ Length (u64) │ Payload     │ ...
//! │ big-endian   │ (N bytes)    │ big-endian   │ (M bytes)   │
//! └──────────────┴──────────────┴──────────────┴─────────────┴───
//! ```
//!
//! There is no header and no footer; end of file is the logical end of the
//! store. A position always points at a length prefix.
//!
//! ## Buffered Writes vs. Raw Reads
//!
//! Appends go through a write buffer; reads go through the raw file with
//! positional I/O. The buffer is flushed at the end of every append so that
//! a position handed back by `append` is immediately readable.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Width of the big-endian length prefix in front of every record.
pub const LEN_WIDTH: u64 = 8;

struct Inner {
    /// Buffered writer over the append handle.
    writer: BufWriter<File>,
    /// Second handle on the same file for positional reads.
    reader: File,
    /// Sum of all entry sizes written so far; equals the file length at rest.
    size: u64,
}

/// Length-prefixed append-only byte log over a single file.
///
/// A single lock serializes appends, reads and close: the write buffer is
/// not thread-safe and the logical size is shared state between the two
/// paths.
pub struct Store {
    path: PathBuf,
    inner: Mutex<Option<Inner>>,
}

impl Store {
    /// Open (or create) the store file at `path` in append mode.
    ///
    /// The logical size is recovered from the file length, so reopening an
    /// existing store continues where the previous process left off.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        let reader = file.try_clone()?;
        let writer = BufWriter::with_capacity(config.buffer_size_bytes, file);

        tracing::debug!(path = %path.display(), size, "store opened");

        Ok(Self {
            path,
            inner: Mutex::new(Some(Inner {
                writer,
                reader,
                size,
            })),
        })
    }

    /// Append `record` and return `(bytes_written, position)`.
    ///
    /// `position` is the pre-append logical size and points at the length
    /// prefix of the new entry; `bytes_written` is the payload length plus
    /// the prefix. The buffer is flushed before returning so the entry is
    /// visible to [`read`](Self::read) through the raw file.
    pub fn append(&self, record: &[u8]) -> Result<(u64, u64)> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(Error::Closed)?;

        let position = inner.size;

        inner.writer.write_all(&(record.len() as u64).to_be_bytes())?;
        inner.writer.write_all(record)?;
        inner.writer.flush()?;

        // The size only advances once the entry is fully flushed; a failed
        // write above leaves it untouched.
        let written = record.len() as u64 + LEN_WIDTH;
        inner.size += written;

        Ok((written, position))
    }

    /// Read back the record whose entry starts at `position`.
    pub fn read(&self, position: u64) -> Result<Bytes> {
        let guard = self.inner.lock();
        let inner = guard.as_ref().ok_or(Error::Closed)?;

        if position + LEN_WIDTH > inner.size {
            return Err(Error::OutOfBounds(position));
        }

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        inner.reader.read_exact_at(&mut len_buf, position)?;
        let len = u64::from_be_bytes(len_buf);

        if position + LEN_WIDTH + len > inner.size {
            return Err(Error::OutOfBounds(position));
        }

        let mut record = vec![0u8; len as usize];
        inner.reader.read_exact_at(&mut record, position + LEN_WIDTH)?;

        Ok(Bytes::from(record))
    }

    /// Current logical size in bytes. Zero once the store is closed.
    pub fn size(&self) -> u64 {
        self.inner.lock().as_ref().map_or(0, |inner| inner.size)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the write buffer and release the file handles.
    ///
    /// Closing twice is a no-op; every other operation fails with
    /// [`Error::Closed`] afterwards.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        if let Some(mut inner) = guard.take() {
            inner.writer.flush()?;
            tracing::debug!(path = %self.path.display(), size = inner.size, "store closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(config: &StoreConfig) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("0.store"), config).unwrap();
        (dir, store)
    }

    // ---------------------------------------------------------------
    // Append / read round trips
    // ---------------------------------------------------------------

    #[test]
    fn test_append_read_roundtrip() {
        let (_dir, store) = temp_store(&StoreConfig::default());

        let (written, position) = store.append(b"hello world").unwrap();
        assert_eq!(written, 11 + LEN_WIDTH);
        assert_eq!(position, 0);

        let record = store.read(position).unwrap();
        assert_eq!(&record[..], b"hello world");
    }

    #[test]
    fn test_positions_are_pre_append_sizes() {
        let (_dir, store) = temp_store(&StoreConfig::default());

        let mut expected_position = 0;
        for payload in [&b"a"[..], b"bb", b"ccc", b""] {
            let before = store.size();
            let (written, position) = store.append(payload).unwrap();
            assert_eq!(position, before);
            assert_eq!(position, expected_position);
            assert_eq!(written, payload.len() as u64 + LEN_WIDTH);
            assert_eq!(store.size(), before + written);
            expected_position += written;
        }
    }

    #[test]
    fn test_empty_payload_framing() {
        let (_dir, store) = temp_store(&StoreConfig::default());

        let (written, position) = store.append(b"").unwrap();
        assert_eq!(written, LEN_WIDTH);

        let record = store.read(position).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_interleaved_appends_and_reads() {
        let (_dir, store) = temp_store(&StoreConfig::default());

        let (_, p0) = store.append(b"first").unwrap();
        assert_eq!(&store.read(p0).unwrap()[..], b"first");

        let (_, p1) = store.append(b"second").unwrap();
        assert_eq!(&store.read(p1).unwrap()[..], b"second");
        assert_eq!(&store.read(p0).unwrap()[..], b"first");
    }

    // ---------------------------------------------------------------
    // Bounds
    // ---------------------------------------------------------------

    #[test]
    fn test_read_past_eof_is_out_of_bounds() {
        let (_dir, store) = temp_store(&StoreConfig::default());
        store.append(b"only entry").unwrap();

        let err = store.read(store.size()).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds(_)));
    }

    #[test]
    fn test_read_on_empty_store_is_out_of_bounds() {
        let (_dir, store) = temp_store(&StoreConfig::default());
        assert!(matches!(store.read(0).unwrap_err(), Error::OutOfBounds(0)));
    }

    #[test]
    fn test_read_truncated_entry_is_out_of_bounds() {
        // A position whose length prefix fits but whose payload would run
        // past the logical end.
        let (_dir, store) = temp_store(&StoreConfig::default());
        let (_, position) = store.append(b"0123456789").unwrap();

        // Point mid-entry so the prefix decodes as garbage past EOF.
        let err = store.read(position + 2).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds(_)));
    }

    // ---------------------------------------------------------------
    // Close and reopen
    // ---------------------------------------------------------------

    #[test]
    fn test_close_then_operate_fails() {
        let (_dir, store) = temp_store(&StoreConfig::default());
        let (_, position) = store.append(b"payload").unwrap();

        store.close().unwrap();
        assert!(matches!(store.append(b"x").unwrap_err(), Error::Closed));
        assert!(matches!(store.read(position).unwrap_err(), Error::Closed));

        // Idempotent.
        store.close().unwrap();
    }

    #[test]
    fn test_reopen_recovers_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.store");
        let config = StoreConfig::default();

        let store = Store::open(&path, &config).unwrap();
        let (written, _) = store.append(b"durable").unwrap();
        store.close().unwrap();

        let store = Store::open(&path, &config).unwrap();
        assert_eq!(store.size(), written);

        let record = store.read(0).unwrap();
        assert_eq!(&record[..], b"durable");

        // Appends continue at the recovered size.
        let (_, position) = store.append(b"more").unwrap();
        assert_eq!(position, written);
    }

    #[test]
    fn test_small_buffer_still_flushes_large_records() {
        let (_dir, store) = temp_store(&StoreConfig {
            buffer_size_bytes: 16,
        });

        let payload = vec![7u8; 1024];
        let (_, position) = store.append(&payload).unwrap();
        assert_eq!(store.read(position).unwrap(), Bytes::from(payload));
    }
}
