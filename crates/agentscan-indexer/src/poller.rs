//! Polling consumer - backfills signatures since the cursor
//!
//! Each tick reads the persisted cursor, pulls the signature window newer
//! than it, fetches the transactions in bounded chunks and hands the decoded
//! events to the buffer. Cursor advancement happens inside the buffer's
//! flush transaction; the poller only re-reads it for the next window.

use crate::buffer::EventBuffer;
use crate::config::Config;
use crate::decoder::EventDecoder;
use crate::error::Result;
use crate::rpc::{ChainRpc, SignatureInfo};
use crate::storage::Storage;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Max transactions fetched per chunk.
const FETCH_CHUNK: usize = 100;

/// Concurrent chunk fetches in flight.
const FETCH_CONCURRENCY: usize = 3;

/// Signature window size per tick (node-side cap).
const SIGNATURE_LIMIT: usize = 1000;

/// Cadence multiplier while the websocket is healthy.
const SLOW_CADENCE_FACTOR: u64 = 6;

fn cadence_interval(base_ms: u64, fast: bool) -> u64 {
    if fast {
        base_ms
    } else {
        base_ms * SLOW_CADENCE_FACTOR
    }
}

/// Backfill poller feeding the event buffer.
pub struct Poller {
    config: Config,
    rpc: Arc<dyn ChainRpc>,
    storage: Arc<Storage>,
    buffer: Arc<EventBuffer>,
    decoder: EventDecoder,
    running: AtomicBool,
    interval_ms: AtomicU64,
}

impl Poller {
    pub fn new(
        config: Config,
        rpc: Arc<dyn ChainRpc>,
        storage: Arc<Storage>,
        buffer: Arc<EventBuffer>,
    ) -> Self {
        let interval = config.polling_interval_ms;
        Self {
            config,
            rpc,
            storage,
            buffer,
            decoder: EventDecoder::new(),
            running: AtomicBool::new(false),
            interval_ms: AtomicU64::new(interval),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Fast cadence while the poller is primary, slow while the websocket
    /// is healthy and the poller is only a safety net.
    pub fn set_fast_cadence(&self, fast: bool) {
        self.interval_ms
            .store(cadence_interval(self.config.polling_interval_ms, fast), Ordering::SeqCst);
    }

    /// Run the poll loop until stopped. Transient RPC errors retry on the
    /// next tick; the loop itself never panics out.
    pub async fn run(self: Arc<Self>, mut stop: tokio::sync::broadcast::Receiver<()>) {
        self.running.store(true, Ordering::SeqCst);
        info!("Poller started ({} ms base cadence)", self.config.polling_interval_ms);

        while self.running.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(processed) if processed > 0 => {
                    debug!("Poll tick ingested {processed} transactions");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Poll tick failed: {e}");
                }
            }

            let interval = Duration::from_millis(self.interval_ms.load(Ordering::SeqCst));
            tokio::select! {
                _ = sleep(interval) => {}
                _ = stop.recv() => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Poller stopped");
    }

    /// One backfill pass. Returns the number of transactions ingested.
    pub async fn tick(&self) -> Result<usize> {
        let cursor = self.storage.get_cursor().await?;
        let until = cursor.last_signature.as_deref();

        let mut window = self
            .rpc
            .get_signatures_for_address(&self.config.program_address, until, SIGNATURE_LIMIT)
            .await?;
        if window.is_empty() {
            return Ok(0);
        }

        // The node returns newest-first; ingest ascending.
        window.reverse();
        let live: Vec<SignatureInfo> = window.into_iter().filter(|s| !s.failed).collect();
        if live.is_empty() {
            return Ok(0);
        }

        let chunks: Vec<Vec<String>> = live
            .chunks(FETCH_CHUNK)
            .map(|c| c.iter().map(|s| s.signature.clone()).collect())
            .collect();

        // Bounded concurrency, order-preserving.
        let rpc = self.rpc.clone();
        let fetched: Vec<Result<_>> = stream::iter(chunks)
            .map(|chunk| {
                let rpc = rpc.clone();
                async move { rpc.get_parsed_transactions(&chunk).await }
            })
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut processed = 0;
        for chunk in fetched {
            let records = chunk?;
            for record in records.into_iter().flatten() {
                let events = self.decoder.decode_transaction(&record);
                if !events.is_empty() {
                    self.buffer.push(events, "poller");
                }
                processed += 1;
            }
        }

        // Nudge the writer so a quiet deployment still advances promptly.
        if self.buffer.staged_len() > 0 {
            self.buffer.flush().await?;
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_switching() {
        assert_eq!(cadence_interval(5_000, true), 5_000);
        assert_eq!(cadence_interval(5_000, false), 30_000);
    }
}
