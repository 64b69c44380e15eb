//! Agentscan Indexer
//!
//! Blockchain indexer for the agent reputation registry with PostgreSQL
//! storage and reorg-aware verification.
//!
//! # Architecture
//!
//! ```text
//! Chain node ── poller (HTTP) ──┐
//!            └─ subscriber (WS) ┴─→ EventDecoder → EventBuffer → PostgreSQL
//!                                                      │
//!                              Verifier ←──────────────┘
//!                        (PENDING / FINALIZED / ORPHANED)
//! ```
//!
//! The processor arbitrates between the two consumers; the verifier
//! reconciles the stored view against finalized chain state.

pub mod buffer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod processor;
pub mod replay;
pub mod rpc;
pub mod storage;
pub mod subscriber;
pub mod uri_queue;
pub mod verifier;

pub use buffer::EventBuffer;
pub use config::{Config, IndexerMode};
pub use decoder::EventDecoder;
pub use error::{IndexerError, Result};
pub use metrics::{IndexerMetrics, MetricsServer};
pub use poller::Poller;
pub use processor::Processor;
pub use replay::ReplayVerifier;
pub use rpc::{ChainRpc, HttpRpcClient};
pub use storage::Storage;
pub use subscriber::WsSubscriber;
pub use uri_queue::UriWorkQueue;
pub use verifier::Verifier;

use std::sync::Arc;
use tracing::{error, info};

/// Capacity of the URI metadata work queue before deferral kicks in.
const URI_QUEUE_CAP: usize = 1_000;

/// Main indexer service
pub struct Indexer {
    config: Config,
    processor: Arc<Processor>,
    metrics: Arc<IndexerMetrics>,
}

impl Indexer {
    /// Create new indexer instance
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing Agentscan Indexer...");

        let storage = Arc::new(Storage::connect(&config.database_url).await?);
        info!("Connected to PostgreSQL");

        storage.run_migrations().await?;

        let rpc: Arc<dyn ChainRpc> = Arc::new(HttpRpcClient::new(&config.rpc_url));
        let metrics = Arc::new(IndexerMetrics::new());
        let uri_queue = Arc::new(UriWorkQueue::new(URI_QUEUE_CAP));
        let buffer = Arc::new(EventBuffer::new(
            config.clone(),
            storage.clone(),
            uri_queue,
            metrics.clone(),
        ));
        let processor = Arc::new(Processor::new(
            config.clone(),
            rpc,
            storage,
            buffer,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            processor,
            metrics,
        })
    }

    /// Run until a shutdown signal arrives, then unwind the processor.
    pub async fn run(self) -> Result<()> {
        if self.config.metrics_endpoint_enabled {
            let server = MetricsServer::new(&self.config.metrics_bind, self.metrics.clone());
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!("Metrics endpoint error: {e}");
                }
            });
        }

        self.processor.start().await?;
        info!("Indexer running");

        wait_for_shutdown_signal().await;
        self.processor.stop().await;
        Ok(())
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("install Ctrl+C handler");
        info!("Received Ctrl+C, shutting down...");
    }
}
