//! Event buffer and batch writer
//!
//! Single gateway to storage mutations for ingested events. Decoded events
//! stage here and flush atomically per batch: one transaction applies the
//! events in canonical order and advances the cursor before commit. A batch
//! that exhausts its retry budget is copied to the dead-letter ring and the
//! originals stay staged (fail-stop).

use crate::config::Config;
use crate::error::{IndexerError, Result};
use crate::handlers::{self, EventContext};
use crate::metrics::IndexerMetrics;
use crate::storage::Storage;
use crate::uri_queue::UriWorkQueue;
use agentscan_core::events::DecodedEvent;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Max events applied per flush.
pub const FLUSH_BATCH_CAP: usize = 500;

/// Flush cadence when the cap is not reached.
pub const FLUSH_INTERVAL_MS: u64 = 500;

/// Flush attempts before a batch goes to the dead-letter ring.
const FLUSH_MAX_ATTEMPTS: u32 = 3;

/// Dead-letter ring capacity. Append-only; saturation is fatal.
pub const DEAD_LETTER_CAP: usize = 10_000;

/// Diagnostic record for an event whose flush exhausted the retry budget.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub signature: String,
    pub slot: u64,
    pub event_kind: &'static str,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Append-only diagnostic buffer, never silently evicted.
pub struct DeadLetterRing {
    cap: usize,
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl DeadLetterRing {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append diagnostics for a failed batch. Errors when the ring cannot
    /// hold the whole batch; the caller fail-stops.
    pub fn append(&self, events: &[DecodedEvent], error: &IndexerError) -> Result<()> {
        let mut entries = self.entries.lock().expect("dead-letter ring poisoned");
        if entries.len() + events.len() > self.cap {
            return Err(IndexerError::DeadLetterSaturated(entries.len()));
        }
        let at = Utc::now();
        for event in events {
            entries.push(DeadLetterEntry {
                signature: event.signature.clone(),
                slot: event.slot,
                event_kind: event.event.kind().name(),
                error: error.to_string(),
                at,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("dead-letter ring poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the diagnostic history for post-mortem inspection.
    pub fn snapshot(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().expect("dead-letter ring poisoned").clone()
    }
}

/// Result of one flush request.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Committed this many events.
    Flushed(usize),
    /// Another flush holds the writer; request dropped.
    Busy,
    /// Nothing staged.
    Empty,
}

/// Buffering batch writer.
pub struct EventBuffer {
    config: Config,
    storage: Arc<Storage>,
    uri_queue: Arc<UriWorkQueue>,
    metrics: Arc<IndexerMetrics>,
    staged: Mutex<Vec<DecodedEvent>>,
    flush_in_progress: AtomicBool,
    dead_letter: DeadLetterRing,
    /// Which consumer fed the most recent events; recorded on the cursor.
    source: Mutex<&'static str>,
}

impl EventBuffer {
    pub fn new(
        config: Config,
        storage: Arc<Storage>,
        uri_queue: Arc<UriWorkQueue>,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            config,
            storage,
            uri_queue,
            metrics,
            staged: Mutex::new(Vec::new()),
            flush_in_progress: AtomicBool::new(false),
            dead_letter: DeadLetterRing::new(DEAD_LETTER_CAP),
            source: Mutex::new("poller"),
        }
    }

    pub fn dead_letter(&self) -> &DeadLetterRing {
        &self.dead_letter
    }

    /// Stage decoded events. Never rejects; flush pacing is the only cap.
    pub fn push(&self, events: Vec<DecodedEvent>, source: &'static str) {
        if events.is_empty() {
            return;
        }
        *self.source.lock().expect("source lock poisoned") = source;
        let mut staged = self.staged.lock().expect("buffer lock poisoned");
        staged.extend(events);
    }

    pub fn staged_len(&self) -> usize {
        self.staged.lock().expect("buffer lock poisoned").len()
    }

    /// Whether enough is staged to warrant an immediate flush.
    pub fn at_capacity(&self) -> bool {
        self.staged_len() >= FLUSH_BATCH_CAP
    }

    /// Flush one batch. Single-writer: a concurrent call returns `Busy`
    /// without waiting.
    pub async fn flush(&self) -> Result<FlushOutcome> {
        if self
            .flush_in_progress
            .compare_exchange(false, true, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst)
            .is_err()
        {
            return Ok(FlushOutcome::Busy);
        }
        let outcome = self.flush_inner().await;
        self.flush_in_progress.store(false, AtomicOrdering::SeqCst);
        outcome
    }

    async fn flush_inner(&self) -> Result<FlushOutcome> {
        let batch = {
            let mut staged = self.staged.lock().expect("buffer lock poisoned");
            if staged.is_empty() {
                return Ok(FlushOutcome::Empty);
            }
            let take = staged.len().min(FLUSH_BATCH_CAP);
            let mut batch: Vec<DecodedEvent> = staged.drain(..take).collect();
            batch.sort_by_cached_key(|e| e.canonical_key());
            batch
        };
        let source = *self.source.lock().expect("source lock poisoned");

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_commit(&batch, source).await {
                Ok(()) => {
                    self.metrics
                        .events_processed
                        .fetch_add(batch.len() as u64, AtomicOrdering::Relaxed);
                    self.metrics.flushes_total.fetch_add(1, AtomicOrdering::Relaxed);
                    debug!("Flushed {} events", batch.len());
                    return Ok(FlushOutcome::Flushed(batch.len()));
                }
                Err(e) if attempt < FLUSH_MAX_ATTEMPTS => {
                    self.metrics
                        .flush_retries_total
                        .fetch_add(1, AtomicOrdering::Relaxed);
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                    warn!("Flush attempt {attempt} failed: {e}; retrying in {backoff:?}");
                    sleep(backoff).await;
                }
                Err(e) => {
                    error!("Flush exhausted {FLUSH_MAX_ATTEMPTS} attempts: {e}");
                    // The originals go back to the head of the buffer first;
                    // the ring only ever holds diagnostic copies.
                    {
                        let mut staged = self.staged.lock().expect("buffer lock poisoned");
                        let mut restaged: Vec<DecodedEvent> =
                            Vec::with_capacity(batch.len() + staged.len());
                        restaged.extend(batch.iter().cloned());
                        restaged.append(&mut staged);
                        *staged = restaged;
                    }
                    self.dead_letter.append(&batch, &e)?;
                    self.metrics
                        .dead_letter_events
                        .fetch_add(batch.len() as u64, AtomicOrdering::Relaxed);
                    return Err(IndexerError::FlushExhausted {
                        attempts: FLUSH_MAX_ATTEMPTS,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    /// One all-or-nothing attempt: apply events in order, advance cursor,
    /// commit.
    async fn try_commit(&self, batch: &[DecodedEvent], source: &'static str) -> Result<()> {
        let mut tx = self.storage.pool().begin().await?;
        let ctx = EventContext {
            config: &self.config,
            uri_queue: &self.uri_queue,
        };

        for event in batch {
            handlers::apply_event(&mut tx, &ctx, event).await?;
        }

        let last = batch.last().expect("flush_inner never commits empty batches");
        // Monotone non-decreasing: never move the cursor backwards.
        sqlx::query(
            r#"
            UPDATE indexer_state
            SET last_signature = $1, last_slot = $2, source = $3, updated_at = NOW()
            WHERE id = 'main' AND last_slot <= $2
        "#,
        )
        .bind(&last.signature)
        .bind(last.slot as i64)
        .bind(source)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Periodic flush loop: every `FLUSH_INTERVAL_MS`, or immediately when a
    /// push fills a whole batch. Stops after draining on shutdown.
    pub async fn run_flush_loop(&self, mut stop: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(FLUSH_INTERVAL_MS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.recv() => {
                    info!("Flush loop stopping; draining buffer");
                    loop {
                        match self.flush().await {
                            Ok(FlushOutcome::Flushed(_)) => continue,
                            Ok(_) => break,
                            Err(e) => {
                                error!("Final drain flush failed: {e}");
                                break;
                            }
                        }
                    }
                    return;
                }
            }
            loop {
                match self.flush().await {
                    Ok(FlushOutcome::Flushed(_)) if self.at_capacity() => continue,
                    Ok(_) => break,
                    Err(e) if e.is_fatal() => {
                        // Dead-letter saturation or storage loss past the
                        // retry budget: surface to the supervisor.
                        error!("Fatal flush error: {e}");
                        std::process::exit(1);
                    }
                    Err(e) => {
                        warn!("Flush error: {e}");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscan_core::events::{MetadataDeleted, RegistryEvent};
    use agentscan_core::Address;

    fn event(slot: u64, sig: &str, tx_index: Option<i32>, ordinal: i32) -> DecodedEvent {
        DecodedEvent {
            signature: sig.to_string(),
            slot,
            tx_index,
            event_ordinal: ordinal,
            block_time: None,
            event: RegistryEvent::MetadataDeleted(MetadataDeleted {
                asset: Address([1; 32]),
                key: "k".to_string(),
            }),
        }
    }

    #[test]
    fn test_canonical_sort_orders_by_slot_then_sig_then_ordinal() {
        let mut batch = vec![
            event(101, "b", Some(1), 0),
            event(100, "z", Some(4), 1),
            event(100, "z", Some(4), 0),
            event(100, "a", None, 0),
            event(100, "a", Some(2), 0),
        ];
        batch.sort_by_cached_key(|e| e.canonical_key());
        let keys: Vec<(u64, &str, i32)> = batch
            .iter()
            .map(|e| (e.slot, e.signature.as_str(), e.event_ordinal))
            .collect();
        assert_eq!(
            keys,
            vec![
                (100, "a", 0), // tx_index Some sorts before None
                (100, "a", 0),
                (100, "z", 0),
                (100, "z", 1),
                (101, "b", 0),
            ]
        );
        // NULLS LAST within the same signature
        assert_eq!(batch[0].tx_index, Some(2));
        assert_eq!(batch[1].tx_index, None);
    }

    #[test]
    fn test_dead_letter_ring_appends_until_cap() {
        let ring = DeadLetterRing::new(3);
        let batch = vec![event(1, "a", None, 0), event(2, "b", None, 0)];
        let err = IndexerError::Internal("boom".to_string());
        ring.append(&batch, &err).unwrap();
        assert_eq!(ring.len(), 2);

        // Third fits, fourth would not: the whole second batch is refused.
        let overflow = ring.append(&batch, &err);
        assert!(matches!(
            overflow,
            Err(IndexerError::DeadLetterSaturated(2))
        ));
        assert_eq!(ring.len(), 2, "saturated append must not partially write");

        ring.append(&batch[..1], &err).unwrap();
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_dead_letter_entries_carry_diagnostics() {
        let ring = DeadLetterRing::new(10);
        let err = IndexerError::Internal("storage offline".to_string());
        ring.append(&[event(42, "sig42", None, 0)], &err).unwrap();
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].signature, "sig42");
        assert_eq!(snapshot[0].slot, 42);
        assert_eq!(snapshot[0].event_kind, "MetadataDeleted");
        assert!(snapshot[0].error.contains("storage offline"));
    }
}
