//! The Log: a Directory of Segments
//!
//! The log stitches segments into one logical, offset-addressed sequence:
//!
//! ```text
//! directory/
//!   0.store      0.index       ← offsets [0, 3)
//!   3.store      3.index       ← offsets [3, 6)
//!   6.store      6.index       ← offsets [6, …)   (active)
//! ```
//!
//! Appends always land in the active (highest-base-offset) segment; when it
//! fills up the log rolls a new segment whose base offset is the previous
//! one's next offset, so windows stay contiguous and non-overlapping. Reads
//! binary-search the ordered segment list for the unique window containing
//! the requested offset.
//!
//! ## Discovery
//!
//! Opening a directory scans it for `<base>.store` / `<base>.index` pairs,
//! parses the base offsets out of the file stems, dedupes and sorts them,
//! and reopens one segment per base offset. An empty directory starts with
//! a single segment at offset 0.
//!
//! ## Concurrency
//!
//! One readers-writer lock guards the segment list: append, truncate,
//! close, delete and reset take it exclusively; read and the raw byte
//! reader share it.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::config::LogConfig;
use crate::error::{Error, Result};
use crate::segment::Segment;

/// Append-only commit log over a directory of segments.
pub struct Log {
    directory: PathBuf,
    config: LogConfig,
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Open the log rooted at `directory`, creating the directory and an
    /// initial segment when nothing exists yet.
    pub fn open(directory: impl AsRef<Path>, config: LogConfig) -> Result<Self> {
        let directory = directory.as_ref();
        if directory.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "log directory path is empty".to_string(),
            ));
        }
        config.segment.validate()?;

        fs::create_dir_all(directory)?;
        let segments = Self::setup(directory, &config)?;

        Ok(Self {
            directory: directory.to_path_buf(),
            config,
            segments: RwLock::new(segments),
        })
    }

    /// Scan `directory` and reopen its segments in base-offset order,
    /// creating the initial one when the directory is empty.
    fn setup(directory: &Path, config: &LogConfig) -> Result<Vec<Segment>> {
        let mut base_offsets = Vec::new();

        for entry in fs::read_dir(directory)? {
            let path = entry?.path();
            let is_segment_file = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("store") | Some("index")
            );
            if !is_segment_file {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let base_offset = stem.parse::<u64>().map_err(|_| {
                Error::InvalidConfig(format!(
                    "segment file {} does not encode a base offset",
                    path.display()
                ))
            })?;
            base_offsets.push(base_offset);
        }

        // Store and index files of one segment share a stem.
        base_offsets.sort_unstable();
        base_offsets.dedup();

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            segments.push(Segment::open(directory, base_offset, &config.segment)?);
        }

        if segments.is_empty() {
            segments.push(Segment::open(directory, 0, &config.segment)?);
        }

        tracing::info!(
            directory = %directory.display(),
            segments = segments.len(),
            next_offset = segments.last().map_or(0, Segment::next_offset),
            "log opened"
        );

        Ok(segments)
    }

    /// Append `record` to the active segment and return its offset.
    ///
    /// A full active segment rolls to a fresh one and the append is retried
    /// there; `Full` only surfaces when the record cannot fit even in an
    /// empty segment.
    pub fn append(&self, record: &[u8]) -> Result<u64> {
        let mut segments = self.segments.write();
        let active = segments.last_mut().ok_or(Error::Closed)?;

        let offset = match active.append(record) {
            Ok(offset) => offset,
            Err(Error::Full) => {
                let base_offset = active.next_offset();
                tracing::debug!(base_offset, "active segment full, rolling");
                segments.push(Segment::open(
                    &self.directory,
                    base_offset,
                    &self.config.segment,
                )?);
                let active = segments
                    .last_mut()
                    .ok_or(Error::Closed)?;
                active.append(record)?
            }
            Err(e) => return Err(e),
        };

        // Roll eagerly once the active segment fills so the next append
        // never pays the failed-append probe.
        let active = segments.last_mut().ok_or(Error::Closed)?;
        if active.is_full() {
            let base_offset = active.next_offset();
            tracing::debug!(base_offset, "active segment full, rolling");
            segments.push(Segment::open(
                &self.directory,
                base_offset,
                &self.config.segment,
            )?);
        }

        Ok(offset)
    }

    /// Read the record at `offset`, routing to the segment whose window
    /// contains it.
    pub fn read(&self, offset: u64) -> Result<Bytes> {
        let segments = self.segments.read();

        let ix = match segments.binary_search_by_key(&offset, Segment::base_offset) {
            Ok(ix) => ix,
            Err(0) => return Err(Error::OutOfRange(offset)),
            Err(ix) => ix - 1,
        };

        let segment = &segments[ix];
        if offset >= segment.next_offset() {
            return Err(Error::OutOfRange(offset));
        }
        segment.read(offset)
    }

    /// Remove every segment whose records all have offsets at or below
    /// `lowest`, i.e. whose `next_offset <= lowest + 1`.
    ///
    /// A failed remove aborts with the error; already-removed segments stay
    /// removed and the rest stay readable.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut segments = self.segments.write();

        let mut drain = std::mem::take(&mut *segments).into_iter();
        let mut retained = Vec::new();
        let mut result = Ok(());

        while let Some(mut segment) = drain.next() {
            if segment.next_offset() <= lowest + 1 {
                if let Err(e) = segment.remove() {
                    // Drop the half-removed segment, keep everything else.
                    result = Err(e);
                    retained.extend(drain);
                    break;
                }
            } else {
                retained.push(segment);
            }
        }

        *segments = retained;
        if result.is_ok() {
            tracing::info!(lowest, retained = segments.len(), "log truncated");
        }
        result
    }

    /// A read-only byte stream over the concatenated store files of every
    /// segment, in base-offset order, including the length-prefix framing.
    ///
    /// This is the raw firehose used for backups and snapshot shipping; it
    /// opens fresh handles so it never disturbs the writer.
    pub fn reader(&self) -> Result<LogReader> {
        let segments = self.segments.read();

        let mut files = Vec::with_capacity(segments.len());
        for segment in segments.iter() {
            files.push(File::open(segment.store_path())?);
        }

        Ok(LogReader {
            files: files.into_iter(),
            current: None,
        })
    }

    /// Close every segment. The log stays openable from the same directory.
    pub fn close(&self) -> Result<()> {
        let mut segments = self.segments.write();
        Self::close_segments(&mut segments)
    }

    /// Close every segment and remove the directory tree.
    pub fn delete(&self) -> Result<()> {
        let mut segments = self.segments.write();
        Self::close_segments(&mut segments)?;
        segments.clear();
        fs::remove_dir_all(&self.directory)?;
        tracing::info!(directory = %self.directory.display(), "log deleted");
        Ok(())
    }

    /// Delete the log and reopen it empty in the same directory.
    pub fn reset(&self) -> Result<()> {
        let mut segments = self.segments.write();
        Self::close_segments(&mut segments)?;
        segments.clear();
        fs::remove_dir_all(&self.directory)?;
        fs::create_dir_all(&self.directory)?;
        *segments = Self::setup(&self.directory, &self.config)?;
        Ok(())
    }

    fn close_segments(segments: &mut [Segment]) -> Result<()> {
        for segment in segments.iter_mut() {
            segment.close()?;
        }
        Ok(())
    }

    /// Directory this log is rooted at.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let segments = self.segments.read();
        f.debug_struct("Log")
            .field("directory", &self.directory)
            .field("segments", &segments.len())
            .field("next_offset", &segments.last().map(Segment::next_offset))
            .finish()
    }
}

/// Sequential reader over the store files of a log, as handed out by
/// [`Log::reader`].
pub struct LogReader {
    files: std::vec::IntoIter<File>,
    current: Option<File>,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let file = match self.current.as_mut() {
                Some(file) => file,
                None => match self.files.next() {
                    Some(file) => self.current.insert(file),
                    None => return Ok(0),
                },
            };

            let n = file.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            // This store is drained; move on to the next segment.
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::index::ENTRY_WIDTH;

    fn entries_config(max_index_entries: u64) -> LogConfig {
        LogConfig {
            segment: SegmentConfig {
                max_index_bytes: max_index_entries * ENTRY_WIDTH,
                ..Default::default()
            },
        }
    }

    // ---------------------------------------------------------------
    // Basic routing
    // ---------------------------------------------------------------

    #[test]
    fn test_append_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();

        assert_eq!(log.append(b"hello").unwrap(), 0);
        assert_eq!(log.append(b"world").unwrap(), 1);

        assert_eq!(&log.read(0).unwrap()[..], b"hello");
        assert_eq!(&log.read(1).unwrap()[..], b"world");
        assert!(matches!(log.read(2).unwrap_err(), Error::OutOfRange(2)));
    }

    #[test]
    fn test_read_empty_log_is_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();
        assert!(matches!(log.read(0).unwrap_err(), Error::OutOfRange(0)));
    }

    #[test]
    fn test_empty_directory_starts_at_offset_zero() {
        let dir = tempfile::tempdir().unwrap();
        let _log = Log::open(dir.path(), LogConfig::default()).unwrap();
        assert!(dir.path().join("0.store").exists());
        assert!(dir.path().join("0.index").exists());
    }

    // ---------------------------------------------------------------
    // Roll-over
    // ---------------------------------------------------------------

    #[test]
    fn test_roll_over_continues_offsets() {
        let dir = tempfile::tempdir().unwrap();
        // Exactly three index entries per segment.
        let log = Log::open(dir.path(), entries_config(3)).unwrap();

        for i in 0..4u64 {
            assert_eq!(log.append(b"data").unwrap(), i);
        }

        assert!(dir.path().join("0.store").exists());
        assert!(dir.path().join("3.store").exists());

        // Both sides of the boundary stay readable.
        assert_eq!(&log.read(2).unwrap()[..], b"data");
        assert_eq!(&log.read(3).unwrap()[..], b"data");
    }

    #[test]
    fn test_boundary_offset_routes_to_next_segment() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(dir.path(), entries_config(2)).unwrap();

        for i in 0..4u64 {
            log.append(format!("record-{i}").as_bytes()).unwrap();
        }

        // Offset 2 is the first segment's next_offset and must resolve in
        // the second segment.
        assert_eq!(&log.read(2).unwrap()[..], b"record-2");
    }

    #[test]
    fn test_oversized_record_overshoots_then_rolls() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(
            dir.path(),
            LogConfig {
                segment: SegmentConfig {
                    max_store_bytes: 64,
                    ..Default::default()
                },
            },
        )
        .unwrap();

        // Fits in a fresh segment even though it overshoots the cap.
        assert_eq!(log.append(&vec![1u8; 100]).unwrap(), 0);
        // The overshoot left the segment full; the next append rolls.
        assert_eq!(log.append(b"small").unwrap(), 1);
        assert_eq!(&log.read(1).unwrap()[..], b"small");
    }

    // ---------------------------------------------------------------
    // Reopen
    // ---------------------------------------------------------------

    #[test]
    fn test_close_and_reopen_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = entries_config(3);
        let records: Vec<String> = (0..8).map(|i| format!("record-{i}")).collect();

        let log = Log::open(dir.path(), config.clone()).unwrap();
        for record in &records {
            log.append(record.as_bytes()).unwrap();
        }
        log.close().unwrap();

        let log = Log::open(dir.path(), config).unwrap();
        for (i, record) in records.iter().enumerate() {
            assert_eq!(&log.read(i as u64).unwrap()[..], record.as_bytes());
        }
        // Appends continue at the recovered tail.
        assert_eq!(log.append(b"next").unwrap(), 8);
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();
        log.append(b"x").unwrap();
        log.close().unwrap();

        assert!(matches!(log.append(b"y").unwrap_err(), Error::Closed));
        assert!(matches!(log.read(0).unwrap_err(), Error::Closed));
    }

    // ---------------------------------------------------------------
    // Truncate
    // ---------------------------------------------------------------

    #[test]
    fn test_truncate_removes_low_segments() {
        let dir = tempfile::tempdir().unwrap();
        // Two records per segment.
        let log = Log::open(dir.path(), entries_config(2)).unwrap();

        for i in 0..10u64 {
            assert_eq!(log.append(format!("r{i}").as_bytes()).unwrap(), i);
        }

        log.truncate(3).unwrap();

        // Segments [0,2) and [2,4) are gone, [4,6) onward remain.
        assert!(matches!(log.read(3).unwrap_err(), Error::OutOfRange(3)));
        assert_eq!(&log.read(4).unwrap()[..], b"r4");
        assert_eq!(&log.read(9).unwrap()[..], b"r9");
        assert!(!dir.path().join("0.store").exists());
        assert!(!dir.path().join("2.index").exists());
        assert!(dir.path().join("4.store").exists());
    }

    #[test]
    fn test_truncate_keeps_partially_covered_segment() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(dir.path(), entries_config(2)).unwrap();

        for i in 0..6u64 {
            log.append(format!("r{i}").as_bytes()).unwrap();
        }

        // Offset 2 sits inside segment [2,4): its next_offset (4) is above
        // lowest + 1, so the whole segment survives.
        log.truncate(2).unwrap();
        assert_eq!(&log.read(2).unwrap()[..], b"r2");
        assert!(matches!(log.read(1).unwrap_err(), Error::OutOfRange(1)));
    }

    // ---------------------------------------------------------------
    // Delete / reset
    // ---------------------------------------------------------------

    #[test]
    fn test_delete_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log");
        let log = Log::open(&log_dir, LogConfig::default()).unwrap();
        log.append(b"gone").unwrap();

        log.delete().unwrap();
        assert!(!log_dir.exists());
    }

    #[test]
    fn test_reset_reopens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();
        for _ in 0..5 {
            log.append(b"old").unwrap();
        }

        log.reset().unwrap();
        assert!(matches!(log.read(0).unwrap_err(), Error::OutOfRange(0)));
        assert_eq!(log.append(b"new").unwrap(), 0);
        assert_eq!(&log.read(0).unwrap()[..], b"new");
    }

    // ---------------------------------------------------------------
    // Reader
    // ---------------------------------------------------------------

    #[test]
    fn test_reader_streams_framed_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();
        log.append(b"first").unwrap();
        log.append(b"second!").unwrap();

        let mut bytes = Vec::new();
        log.reader().unwrap().read_to_end(&mut bytes).unwrap();

        // u64 big-endian length, payload, repeated.
        assert_eq!(&bytes[..8], &5u64.to_be_bytes());
        assert_eq!(&bytes[8..13], b"first");
        assert_eq!(&bytes[13..21], &7u64.to_be_bytes());
        assert_eq!(&bytes[21..28], b"second!");
        assert_eq!(bytes.len(), 28);
    }

    #[test]
    fn test_reader_spans_segments() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(dir.path(), entries_config(2)).unwrap();
        for i in 0..5u64 {
            log.append(format!("r{i}").as_bytes()).unwrap();
        }

        let mut first = Vec::new();
        log.reader().unwrap().read_to_end(&mut first).unwrap();
        // Five 2-byte payloads, each with an 8-byte prefix.
        assert_eq!(first.len(), 5 * 10);

        // Byte-identical across two reads with no writes in between.
        let mut second = Vec::new();
        log.reader().unwrap().read_to_end(&mut second).unwrap();
        assert_eq!(first, second);
    }
}
