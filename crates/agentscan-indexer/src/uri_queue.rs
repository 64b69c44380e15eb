//! URI metadata work queue
//!
//! The indexer core does not fetch URIs itself; it enqueues work for the
//! external metadata fetcher and accepts its freshness-checked writeback.
//! The queue is the one soft-backpressure point in the pipeline: when full
//! it defers (one pending item per asset, newest wins) instead of dropping.

use crate::error::Result;
use crate::storage::Storage;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Reserved key prefix for URI-derived metadata rows. These never overwrite
/// chain-rooted entries and auto-finalize in the verifier.
pub const URI_KEY_PREFIX: &str = "_uri:";

/// One unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriWorkItem {
    pub asset: String,
    pub uri: String,
}

struct QueueInner {
    /// Assets in FIFO order; at most one live entry per asset.
    order: VecDeque<String>,
    /// asset -> newest uri for queued assets.
    queued: HashMap<String, String>,
    /// Deferred work held back while the queue is full; newest wins.
    deferred: HashMap<String, String>,
}

/// Bounded work queue with per-asset dedup and newest-wins deferral.
pub struct UriWorkQueue {
    cap: usize,
    inner: Mutex<QueueInner>,
}

impl UriWorkQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            inner: Mutex::new(QueueInner {
                order: VecDeque::new(),
                queued: HashMap::new(),
                deferred: HashMap::new(),
            }),
        }
    }

    /// Enqueue fetch work for an asset. A second enqueue for the same asset
    /// replaces the pending URI. When the queue is at capacity the item is
    /// deferred, never lost.
    pub fn enqueue(&self, asset: &str, uri: &str) {
        let mut inner = self.inner.lock().expect("uri queue poisoned");

        if inner.queued.contains_key(asset) {
            inner.queued.insert(asset.to_string(), uri.to_string());
            debug!("URI work for {asset} updated in place");
            return;
        }

        // A previously deferred asset re-enters through the normal path.
        inner.deferred.remove(asset);

        if inner.order.len() >= self.cap {
            inner.deferred.insert(asset.to_string(), uri.to_string());
            warn!("URI queue full; deferring work for {asset}");
            return;
        }

        inner.order.push_back(asset.to_string());
        inner.queued.insert(asset.to_string(), uri.to_string());
    }

    /// Pop the next work item, promoting one deferred asset into the freed
    /// slot.
    pub fn take_next(&self) -> Option<UriWorkItem> {
        let mut inner = self.inner.lock().expect("uri queue poisoned");
        let asset = inner.order.pop_front()?;
        let uri = inner
            .queued
            .remove(&asset)
            .expect("queued entry missing for ordered asset");

        if let Some(promoted) = inner.deferred.keys().next().cloned() {
            let promoted_uri = inner
                .deferred
                .remove(&promoted)
                .expect("deferred key just observed");
            inner.order.push_back(promoted.clone());
            inner.queued.insert(promoted, promoted_uri);
        }

        Some(UriWorkItem { asset, uri })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("uri queue poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn deferred_len(&self) -> usize {
        self.inner.lock().expect("uri queue poisoned").deferred.len()
    }
}

/// Fetcher writeback: upsert URI-derived metadata for an asset, but only if
/// the agent's URI still matches the one the document was fetched from.
/// Immutable rows are never overwritten; non-reserved keys are refused.
pub async fn apply_uri_writeback(
    storage: &Storage,
    asset: &str,
    source_uri: &str,
    entries: &[(String, Vec<u8>)],
) -> Result<usize> {
    let Some(agent) = storage.get_agent(asset).await? else {
        debug!("URI writeback for unknown agent {asset}; skipping");
        return Ok(0);
    };
    if agent.agent_uri.as_deref() != Some(source_uri) {
        debug!("URI writeback for {asset} is stale ({source_uri}); skipping");
        return Ok(0);
    }

    let mut written = 0;
    for (key, value) in entries {
        if !key.starts_with(URI_KEY_PREFIX) {
            warn!("URI writeback attempted non-reserved key {key}; refusing");
            continue;
        }
        let result = sqlx::query(
            r#"
            INSERT INTO metadata_entries
                (asset, key, value_bytes, immutable, status, slot, tx_signature)
            VALUES ($1, $2, $3, FALSE, 'PENDING', $4, $5)
            ON CONFLICT (asset, key) DO UPDATE SET
                value_bytes = EXCLUDED.value_bytes,
                status = 'PENDING',
                updated_at = NOW()
            WHERE NOT metadata_entries.immutable
        "#,
        )
        .bind(asset)
        .bind(key)
        .bind(value)
        .bind(agent.slot)
        .bind(&agent.tx_signature)
        .execute(storage.pool())
        .await?;
        written += result.rows_affected() as usize;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = UriWorkQueue::new(8);
        queue.enqueue("A", "ipfs://1");
        queue.enqueue("B", "ipfs://2");
        assert_eq!(queue.take_next().unwrap().asset, "A");
        assert_eq!(queue.take_next().unwrap().asset, "B");
        assert!(queue.take_next().is_none());
    }

    #[test]
    fn test_newest_wins_per_asset() {
        let queue = UriWorkQueue::new(8);
        queue.enqueue("A", "ipfs://old");
        queue.enqueue("A", "ipfs://new");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.take_next().unwrap().uri, "ipfs://new");
    }

    #[test]
    fn test_full_queue_defers_instead_of_dropping() {
        let queue = UriWorkQueue::new(2);
        queue.enqueue("A", "ipfs://1");
        queue.enqueue("B", "ipfs://2");
        queue.enqueue("C", "ipfs://3");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.deferred_len(), 1);

        // Draining promotes the deferred asset.
        assert_eq!(queue.take_next().unwrap().asset, "A");
        assert_eq!(queue.deferred_len(), 0);
        let rest: Vec<_> = std::iter::from_fn(|| queue.take_next()).collect();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().any(|i| i.asset == "C"));
    }

    #[test]
    fn test_deferred_newest_wins() {
        let queue = UriWorkQueue::new(1);
        queue.enqueue("A", "ipfs://1");
        queue.enqueue("B", "ipfs://old");
        queue.enqueue("B", "ipfs://new");
        assert_eq!(queue.deferred_len(), 1);
        queue.take_next();
        assert_eq!(queue.take_next().unwrap().uri, "ipfs://new");
    }
}
