//! gRPC handlers over the commit-log façade.
//!
//! The service owns nothing but an `Arc<dyn CommitLog>`; any implementation
//! of the two-method contract can sit behind it. The storage engine is
//! synchronous, so every call into it goes through `spawn_blocking` to keep
//! disk I/O and mmap page faults off the runtime's reactor threads.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use streamlog_core::{CommitLog, Error};
use streamlog_proto::v1::log_server::Log as LogRpc;
use streamlog_proto::v1::{AppendRequest, AppendResponse, ReadRequest, ReadResponse};

/// gRPC implementation of the `streamlog.v1.Log` service.
pub struct LogService {
    log: Arc<dyn CommitLog>,
}

impl LogService {
    pub fn new(log: Arc<dyn CommitLog>) -> Self {
        Self { log }
    }
}

/// Map storage errors onto gRPC statuses: missing data is NOT_FOUND, bad
/// configuration is INVALID_ARGUMENT, capacity is RESOURCE_EXHAUSTED, and
/// everything else is internal.
fn status_from(err: Error) -> Status {
    match err {
        Error::OutOfRange(_) | Error::OutOfBounds(_) | Error::Empty => {
            Status::not_found(err.to_string())
        }
        Error::InvalidConfig(_) => Status::invalid_argument(err.to_string()),
        Error::Full => Status::resource_exhausted(err.to_string()),
        Error::Io(_) | Error::Closed => Status::internal(err.to_string()),
    }
}

async fn append_record(log: Arc<dyn CommitLog>, record: Bytes) -> Result<u64, Status> {
    tokio::task::spawn_blocking(move || log.append(record))
        .await
        .map_err(|e| Status::internal(format!("append task failed: {e}")))?
        .map_err(status_from)
}

async fn read_record(log: Arc<dyn CommitLog>, offset: u64) -> Result<Bytes, Status> {
    tokio::task::spawn_blocking(move || log.read(offset))
        .await
        .map_err(|e| Status::internal(format!("read task failed: {e}")))?
        .map_err(status_from)
}

#[tonic::async_trait]
impl LogRpc for LogService {
    #[tracing::instrument(skip(self, request), fields(record_len = request.get_ref().record.len()))]
    async fn append(
        &self,
        request: Request<AppendRequest>,
    ) -> Result<Response<AppendResponse>, Status> {
        let req = request.into_inner();
        let offset = append_record(self.log.clone(), Bytes::from(req.record)).await?;

        tracing::debug!(offset, "record appended");
        Ok(Response::new(AppendResponse { offset }))
    }

    #[tracing::instrument(skip(self, request), fields(offset = request.get_ref().offset))]
    async fn read(&self, request: Request<ReadRequest>) -> Result<Response<ReadResponse>, Status> {
        let req = request.into_inner();
        let record = read_record(self.log.clone(), req.offset).await?;

        Ok(Response::new(ReadResponse {
            record: record.to_vec(),
        }))
    }

    type AppendStreamStream =
        Pin<Box<dyn Stream<Item = Result<AppendResponse, Status>> + Send + 'static>>;

    async fn append_stream(
        &self,
        request: Request<Streaming<AppendRequest>>,
    ) -> Result<Response<Self::AppendStreamStream>, Status> {
        let mut inbound = request.into_inner();
        let log = self.log.clone();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            while let Some(next) = inbound.next().await {
                let result = match next {
                    Ok(req) => append_record(log.clone(), Bytes::from(req.record))
                        .await
                        .map(|offset| AppendResponse { offset }),
                    Err(status) => Err(status),
                };

                let stop = result.is_err();
                if tx.send(result).await.is_err() {
                    // Client went away; nothing left to deliver.
                    break;
                }
                if stop {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    type ReadStreamStream =
        Pin<Box<dyn Stream<Item = Result<ReadResponse, Status>> + Send + 'static>>;

    #[tracing::instrument(skip(self, request), fields(from_offset = request.get_ref().offset))]
    async fn read_stream(
        &self,
        request: Request<ReadRequest>,
    ) -> Result<Response<Self::ReadStreamStream>, Status> {
        let req = request.into_inner();
        let log = self.log.clone();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut offset = req.offset;
            loop {
                let log = log.clone();
                let result =
                    tokio::task::spawn_blocking(move || log.read(offset)).await;

                match result {
                    Ok(Ok(record)) => {
                        let response = ReadResponse {
                            record: record.to_vec(),
                        };
                        if tx.send(Ok(response)).await.is_err() {
                            break;
                        }
                        offset += 1;
                    }
                    // Caught up with the tail of the log: end the stream.
                    Ok(Err(Error::OutOfRange(_))) => break,
                    Ok(Err(err)) => {
                        let _ = tx.send(Err(status_from(err))).await;
                        break;
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(Status::internal(format!("read task failed: {e}"))))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamlog_core::MemoryLog;

    #[tokio::test]
    async fn test_unary_append_and_read() {
        let service = LogService::new(Arc::new(MemoryLog::new()));

        let response = service
            .append(Request::new(AppendRequest {
                record: b"value".to_vec(),
            }))
            .await
            .unwrap();
        assert_eq!(response.get_ref().offset, 0);

        let response = service
            .read(Request::new(ReadRequest { offset: 0 }))
            .await
            .unwrap();
        assert_eq!(response.get_ref().record, b"value");
    }

    #[tokio::test]
    async fn test_read_missing_offset_is_not_found() {
        let service = LogService::new(Arc::new(MemoryLog::new()));

        let status = service
            .read(Request::new(ReadRequest { offset: 9 }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_from(Error::OutOfRange(3)).code(),
            tonic::Code::NotFound
        );
        assert_eq!(
            status_from(Error::OutOfBounds(8)).code(),
            tonic::Code::NotFound
        );
        assert_eq!(status_from(Error::Empty).code(), tonic::Code::NotFound);
        assert_eq!(
            status_from(Error::InvalidConfig("x".into())).code(),
            tonic::Code::InvalidArgument
        );
        assert_eq!(
            status_from(Error::Full).code(),
            tonic::Code::ResourceExhausted
        );
        assert_eq!(status_from(Error::Closed).code(), tonic::Code::Internal);
    }
}
