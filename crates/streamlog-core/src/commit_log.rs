//! The two-method contract the RPC layer consumes.
//!
//! The server only ever appends bytes and reads bytes back by offset, so
//! that is the whole seam: anything satisfying [`CommitLog`] can sit behind
//! the service, including the trivial [`MemoryLog`] used in tests.

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::log::Log;

/// Append-only, offset-addressed record storage.
pub trait CommitLog: Send + Sync + 'static {
    /// Append an opaque record and return the offset it was assigned.
    fn append(&self, record: Bytes) -> Result<u64>;

    /// Read back the record stored at `offset`.
    fn read(&self, offset: u64) -> Result<Bytes>;
}

impl CommitLog for Log {
    fn append(&self, record: Bytes) -> Result<u64> {
        Log::append(self, &record)
    }

    fn read(&self, offset: u64) -> Result<Bytes> {
        Log::read(self, offset)
    }
}

/// In-memory commit log: a growable list of records.
///
/// Not durable and never full; useful wherever a test wants log semantics
/// without touching disk.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: RwLock<Vec<Bytes>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommitLog for MemoryLog {
    fn append(&self, record: Bytes) -> Result<u64> {
        let mut records = self.records.write();
        records.push(record);
        Ok(records.len() as u64 - 1)
    }

    fn read(&self, offset: u64) -> Result<Bytes> {
        let records = self.records.read();
        records
            .get(offset as usize)
            .cloned()
            .ok_or(Error::OutOfRange(offset))
    }
}
