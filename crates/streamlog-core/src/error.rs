//! Error Types for the Storage Engine
//!
//! This module defines all error kinds the commit log core can produce.
//!
//! ## Error Categories
//!
//! ### Read Errors
//! - `OutOfBounds`: a byte position beyond the store file
//! - `OutOfRange`: an offset outside every segment's window, or an index
//!   entry beyond the populated region
//! - `Empty`: tail-locate on an index with zero entries
//!
//! ### Write Errors
//! - `Full`: an append blocked by the configured store or index capacity.
//!   The log recovers from this by rolling a new segment.
//!
//! ### Lifecycle Errors
//! - `InvalidConfig`: a missing or nonsensical configuration value
//! - `Closed`: an operation on a component that has already been closed
//!
//! ## Usage
//! All fallible operations return `Result<T>`, aliased to `Result<T, Error>`,
//! so call sites propagate with `?`. I/O errors convert via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("position {0} is out of bounds for the store")]
    OutOfBounds(u64),

    #[error("offset {0} is out of range")]
    OutOfRange(u64),

    #[error("index has no entries")]
    Empty,

    #[error("segment is at capacity")]
    Full,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("component is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
