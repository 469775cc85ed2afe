//! Streamlog Protocol Buffer Definitions
//!
//! Message types and the gRPC `Log` service used between clients and the
//! streamlog server. The service exposes four operations:
//!
//! - `Append`: append one record, get its offset back (unary)
//! - `Read`: read one record by offset (unary)
//! - `AppendStream`: append a stream of records, receiving an offset per
//!   record (bidirectional streaming)
//! - `ReadStream`: stream records starting at an offset until the end of
//!   the log (server streaming)
//!
//! ## Usage
//!
//! ### Client side
//!
//! ```ignore
//! use streamlog_proto::v1::{log_client::LogClient, AppendRequest, ReadRequest};
//!
//! let mut client = LogClient::connect("http://localhost:9090").await?;
//!
//! let response = client
//!     .append(AppendRequest { record: b"hello".to_vec() })
//!     .await?;
//! println!("offset: {}", response.into_inner().offset);
//! ```
//!
//! ### Server side
//!
//! ```ignore
//! use streamlog_proto::v1::log_server::{Log, LogServer};
//! ```
//!
//! ## Generated code
//!
//! The Rust sources are pre-generated from `proto/streamlog.proto` and
//! checked in under `src/generated/`, so building this crate does not
//! require protoc. Regenerate with `tonic-build` after editing the proto
//! file.

/// Streamlog wire format, version 1.
pub mod v1 {
    include!("generated/streamlog.v1.rs");
}
