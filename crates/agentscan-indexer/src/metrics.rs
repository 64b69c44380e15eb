//! Process-wide metrics
//!
//! Atomic counters with a snapshot view and a plaintext Prometheus export.
//! Counters are monotonic across the process lifetime; `reset_for_tests`
//! exists for test isolation only.

use axum::{extract::State, routing::get, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Integrity and ingestion counters.
#[derive(Debug, Default)]
pub struct IndexerMetrics {
    /// Completed verifier cycles
    pub verify_cycles_total: AtomicU64,
    /// Highest slot the verifier has checked against
    pub last_verified_slot: AtomicU64,
    /// Hash-chain digest mismatches observed
    pub mismatch_count: AtomicU64,
    /// Rows currently known orphaned (set per cycle)
    pub orphan_count: AtomicU64,
    /// Whether a verifier pass is running right now
    pub verifier_active: AtomicBool,
    /// Rows left PENDING because the RPC error budget ran out
    pub skipped_rpc_errors: AtomicU64,
    /// Websocket logs dropped at the queue boundary
    pub dropped_logs: AtomicU64,
    /// Events applied through the buffer
    pub events_processed: AtomicU64,
    /// Flush batches committed
    pub flushes_total: AtomicU64,
    /// Flush attempts that failed and were restaged
    pub flush_retries_total: AtomicU64,
    /// Events parked in the dead-letter ring
    pub dead_letter_events: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub verify_cycles_total: u64,
    pub last_verified_slot: u64,
    pub mismatch_count: u64,
    pub orphan_count: u64,
    pub verifier_active: bool,
    pub skipped_rpc_errors: u64,
    pub dropped_logs: u64,
    pub events_processed: u64,
    pub flushes_total: u64,
    pub flush_retries_total: u64,
    pub dead_letter_events: u64,
}

impl IndexerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            verify_cycles_total: self.verify_cycles_total.load(Ordering::Relaxed),
            last_verified_slot: self.last_verified_slot.load(Ordering::Relaxed),
            mismatch_count: self.mismatch_count.load(Ordering::Relaxed),
            orphan_count: self.orphan_count.load(Ordering::Relaxed),
            verifier_active: self.verifier_active.load(Ordering::Relaxed),
            skipped_rpc_errors: self.skipped_rpc_errors.load(Ordering::Relaxed),
            dropped_logs: self.dropped_logs.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            flushes_total: self.flushes_total.load(Ordering::Relaxed),
            flush_retries_total: self.flush_retries_total.load(Ordering::Relaxed),
            dead_letter_events: self.dead_letter_events.load(Ordering::Relaxed),
        }
    }

    /// Record that the verifier observed a new finalized slot. Monotonic.
    pub fn record_verified_slot(&self, slot: u64) {
        self.last_verified_slot.fetch_max(slot, Ordering::Relaxed);
    }

    /// Generate Prometheus-compatible metrics output
    pub fn export(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP integrity_verify_cycles_total Completed verifier cycles
# TYPE integrity_verify_cycles_total counter
integrity_verify_cycles_total {}

# HELP integrity_last_verified_slot Highest slot checked by the verifier
# TYPE integrity_last_verified_slot gauge
integrity_last_verified_slot {}

# HELP integrity_mismatch_count Hash-chain digest mismatches observed
# TYPE integrity_mismatch_count counter
integrity_mismatch_count {}

# HELP integrity_orphan_count Rows currently orphaned
# TYPE integrity_orphan_count gauge
integrity_orphan_count {}

# HELP integrity_verifier_active Whether a verifier pass is running
# TYPE integrity_verifier_active gauge
integrity_verifier_active {}

# HELP indexer_skipped_rpc_errors Rows left pending on RPC error budget
# TYPE indexer_skipped_rpc_errors counter
indexer_skipped_rpc_errors {}

# HELP indexer_dropped_logs Websocket logs dropped at the queue cap
# TYPE indexer_dropped_logs counter
indexer_dropped_logs {}

# HELP indexer_events_processed Events applied through the buffer
# TYPE indexer_events_processed counter
indexer_events_processed {}

# HELP indexer_flushes_total Flush batches committed
# TYPE indexer_flushes_total counter
indexer_flushes_total {}

# HELP indexer_flush_retries_total Flush attempts restaged after failure
# TYPE indexer_flush_retries_total counter
indexer_flush_retries_total {}

# HELP indexer_dead_letter_events Events parked in the dead-letter ring
# TYPE indexer_dead_letter_events gauge
indexer_dead_letter_events {}
"#,
            s.verify_cycles_total,
            s.last_verified_slot,
            s.mismatch_count,
            s.orphan_count,
            if s.verifier_active { 1 } else { 0 },
            s.skipped_rpc_errors,
            s.dropped_logs,
            s.events_processed,
            s.flushes_total,
            s.flush_retries_total,
            s.dead_letter_events,
        )
    }

    /// Zero everything. Test isolation only; never called on live paths.
    #[cfg(test)]
    pub fn reset_for_tests(&self) {
        self.verify_cycles_total.store(0, Ordering::Relaxed);
        self.last_verified_slot.store(0, Ordering::Relaxed);
        self.mismatch_count.store(0, Ordering::Relaxed);
        self.orphan_count.store(0, Ordering::Relaxed);
        self.verifier_active.store(false, Ordering::Relaxed);
        self.skipped_rpc_errors.store(0, Ordering::Relaxed);
        self.dropped_logs.store(0, Ordering::Relaxed);
        self.events_processed.store(0, Ordering::Relaxed);
        self.flushes_total.store(0, Ordering::Relaxed);
        self.flush_retries_total.store(0, Ordering::Relaxed);
        self.dead_letter_events.store(0, Ordering::Relaxed);
    }
}

async fn metrics_handler(State(metrics): State<Arc<IndexerMetrics>>) -> String {
    metrics.export()
}

async fn health_handler(State(metrics): State<Arc<IndexerMetrics>>) -> axum::Json<MetricsSnapshot> {
    axum::Json(metrics.snapshot())
}

/// Plaintext metrics endpoint, enabled by `metrics_endpoint_enabled`.
pub struct MetricsServer {
    bind: String,
    metrics: Arc<IndexerMetrics>,
}

impl MetricsServer {
    pub fn new(bind: &str, metrics: Arc<IndexerMetrics>) -> Self {
        Self {
            bind: bind.to_string(),
            metrics,
        }
    }

    pub async fn run(self) -> crate::error::Result<()> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(self.metrics);

        let listener = tokio::net::TcpListener::bind(&self.bind)
            .await
            .map_err(|e| crate::error::IndexerError::Connection(e.to_string()))?;
        info!("Metrics endpoint listening on {}", self.bind);

        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::IndexerError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = IndexerMetrics::new();
        metrics.verify_cycles_total.fetch_add(3, Ordering::Relaxed);
        metrics.mismatch_count.fetch_add(1, Ordering::Relaxed);
        metrics.verifier_active.store(true, Ordering::Relaxed);

        let s = metrics.snapshot();
        assert_eq!(s.verify_cycles_total, 3);
        assert_eq!(s.mismatch_count, 1);
        assert!(s.verifier_active);
    }

    #[test]
    fn test_verified_slot_is_monotonic() {
        let metrics = IndexerMetrics::new();
        metrics.record_verified_slot(100);
        metrics.record_verified_slot(50);
        assert_eq!(metrics.snapshot().last_verified_slot, 100);
    }

    #[test]
    fn test_export_uses_integrity_names() {
        let metrics = IndexerMetrics::new();
        metrics.verify_cycles_total.fetch_add(7, Ordering::Relaxed);
        let out = metrics.export();
        assert!(out.contains("integrity_verify_cycles_total 7"));
        assert!(out.contains("integrity_mismatch_count 0"));
        assert!(out.contains("integrity_orphan_count 0"));
        assert!(out.contains("integrity_last_verified_slot 0"));
        assert!(out.contains("integrity_verifier_active 0"));
    }

    #[test]
    fn test_reset_for_tests() {
        let metrics = IndexerMetrics::new();
        metrics.dropped_logs.fetch_add(5, Ordering::Relaxed);
        metrics.reset_for_tests();
        assert_eq!(metrics.snapshot().dropped_logs, 0);
    }
}
