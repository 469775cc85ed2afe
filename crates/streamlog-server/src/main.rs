//! Streamlog server entry point.
//!
//! ## Configuration
//!
//! All configuration is done via environment variables:
//!
//! - `STREAMLOG_ADDR`: bind address (default: 0.0.0.0:9090)
//! - `STREAMLOG_DATA`: log directory (default: ./data/log)
//! - `STREAMLOG_MAX_STORE_BYTES`: per-segment store cap (default: 10 MiB)
//! - `STREAMLOG_MAX_INDEX_BYTES`: per-segment index cap (default: 50 MiB)
//!
//! ## Logging
//!
//! Controlled via `RUST_LOG`, e.g. `RUST_LOG=debug streamlog-server`.

use std::sync::Arc;

use tonic::transport::Server;

use streamlog_core::{CommitLog, Log, LogConfig, SegmentConfig};
use streamlog_proto::v1::log_server::LogServer;
use streamlog_server::LogService;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind_addr = env_or("STREAMLOG_ADDR", "0.0.0.0:9090").parse()?;
    let directory = env_or("STREAMLOG_DATA", "./data/log");

    let defaults = SegmentConfig::default();
    let config = LogConfig {
        segment: SegmentConfig {
            max_store_bytes: env_or(
                "STREAMLOG_MAX_STORE_BYTES",
                &defaults.max_store_bytes.to_string(),
            )
            .parse()?,
            max_index_bytes: env_or(
                "STREAMLOG_MAX_INDEX_BYTES",
                &defaults.max_index_bytes.to_string(),
            )
            .parse()?,
            ..defaults
        },
    };

    tracing::info!(directory = %directory, "opening log");
    let log = Arc::new(Log::open(&directory, config)?);

    let service = LogService::new(log.clone() as Arc<dyn CommitLog>);

    tracing::info!(%bind_addr, "streamlog server starting");
    Server::builder()
        .add_service(LogServer::new(service))
        .serve_with_shutdown(bind_addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
            }
            tracing::info!("shutting down");
        })
        .await?;

    log.close()?;
    tracing::info!("log closed");

    Ok(())
}
