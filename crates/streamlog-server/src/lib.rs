//! Streamlog gRPC Server
//!
//! Fronts the storage engine with the `streamlog.v1.Log` service:
//! unary append/read plus the two streaming variants. The handlers only
//! know the [`CommitLog`](streamlog_core::CommitLog) façade, so tests can
//! swap the file-backed log for an in-memory one.

pub mod service;

pub use service::LogService;
