//! Websocket subscriber - live program-log subscription
//!
//! Maintains a single JSON-RPC log subscription with a bounded in-memory
//! queue between the socket reader and the dispatch path. Overflow is fatal
//! to this subscriber instance: the queue cap is the authoritative
//! backpressure signal and partial streams are never dropped silently.

use crate::buffer::EventBuffer;
use crate::config::Config;
use crate::decoder::EventDecoder;
use crate::error::{IndexerError, Result};
use crate::metrics::IndexerMetrics;
use crate::rpc::{ChainRpc, TxRecord};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Bounded incoming queue size. Overflow fail-stops the subscriber.
pub const WS_QUEUE_CAP: usize = 10_000;

/// Health check cadence.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Silence beyond this triggers the chain-side probe.
const STALENESS_THRESHOLD: Duration = Duration::from_secs(120);

/// Consecutive dispatch errors before a forced reconnect.
const ERROR_THRESHOLD: u32 = 10;

/// One log notification off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsLogEntry {
    pub signature: String,
    pub slot: u64,
    pub failed: bool,
    pub logs: Vec<String>,
}

/// Parse a `logsNotification` frame. Returns None for anything else
/// (subscription acks, pings, unrelated methods).
pub fn parse_log_notification(text: &str) -> Option<WsLogEntry> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("method").and_then(|m| m.as_str()) != Some("logsNotification") {
        return None;
    }
    let result = value.get("params")?.get("result")?;
    let slot = result.get("context")?.get("slot")?.as_u64()?;
    let inner = result.get("value")?;
    let signature = inner.get("signature")?.as_str()?.to_string();
    let failed = inner.get("err").map(|e| !e.is_null()).unwrap_or(false);
    let logs = inner
        .get("logs")?
        .as_array()?
        .iter()
        .filter_map(|l| l.as_str().map(str::to_string))
        .collect();
    Some(WsLogEntry {
        signature,
        slot,
        failed,
        logs,
    })
}

/// Quick reachability probe used by the processor before choosing a mode.
pub async fn test_ws_connection(ws_url: &str, timeout_ms: u64) -> bool {
    match timeout(Duration::from_millis(timeout_ms), connect_async(ws_url)).await {
        Ok(Ok((mut stream, _))) => {
            let _ = stream.close(None).await;
            true
        }
        _ => false,
    }
}

/// Live websocket consumer.
pub struct WsSubscriber {
    config: Config,
    rpc: Arc<dyn ChainRpc>,
    buffer: Arc<EventBuffer>,
    metrics: Arc<IndexerMetrics>,
    decoder: EventDecoder,
    running: AtomicBool,
    /// Subscription currently live and reading.
    active: AtomicBool,
    /// Reconnect in progress (single holder).
    recovering: AtomicBool,
    /// Health probe in progress (single holder).
    checking_health: AtomicBool,
    consecutive_errors: AtomicU32,
    dropped_logs: AtomicU64,
    last_activity: Mutex<Instant>,
    force_reconnect: Notify,
}

impl WsSubscriber {
    pub fn new(
        config: Config,
        rpc: Arc<dyn ChainRpc>,
        buffer: Arc<EventBuffer>,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            config,
            rpc,
            buffer,
            metrics,
            decoder: EventDecoder::new(),
            running: AtomicBool::new(false),
            active: AtomicBool::new(false),
            recovering: AtomicBool::new(false),
            checking_health: AtomicBool::new(false),
            consecutive_errors: AtomicU32::new(0),
            dropped_logs: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
            force_reconnect: Notify::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.force_reconnect.notify_one();
    }

    fn touch_activity(&self) {
        *self.last_activity.lock().expect("activity lock poisoned") = Instant::now();
    }

    fn activity_age(&self) -> Duration {
        self.last_activity
            .lock()
            .expect("activity lock poisoned")
            .elapsed()
    }

    /// Run until stopped or fatally failed. Returns the fatal error so the
    /// supervisor can fail-stop or fall back.
    pub async fn run(self: Arc<Self>, stop: broadcast::Receiver<()>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Websocket subscriber starting against {}", self.config.ws_url);

        let (queue_tx, queue_rx) = mpsc::channel::<WsLogEntry>(WS_QUEUE_CAP);

        let dispatcher = {
            let this = self.clone();
            let stop = stop.resubscribe();
            tokio::spawn(async move { this.dispatch_loop(queue_rx, stop).await })
        };
        let health = {
            let this = self.clone();
            let stop = stop.resubscribe();
            tokio::spawn(async move { this.health_loop(stop).await })
        };

        let outcome = self.connection_loop(queue_tx, stop).await;

        self.active.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        health.abort();
        // Let the dispatcher drain what it already holds.
        let _ = dispatcher.await;

        if let Err(e) = &outcome {
            error!("Websocket subscriber terminated: {e}");
        } else {
            info!("Websocket subscriber stopped");
        }
        outcome
    }

    /// Reconnecting connection owner.
    async fn connection_loop(
        &self,
        queue_tx: mpsc::Sender<WsLogEntry>,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut retries: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            if self
                .recovering
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // Another holder is already reconnecting.
                sleep(Duration::from_millis(50)).await;
                continue;
            }

            let session = self.read_session(&queue_tx, &mut stop).await;
            self.active.store(false, Ordering::SeqCst);

            match session {
                Ok(SessionEnd::Stopped) => {
                    self.recovering.store(false, Ordering::SeqCst);
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect) => {
                    retries = 0;
                }
                Err(e) if e.is_fatal() => {
                    self.recovering.store(false, Ordering::SeqCst);
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.ws_max_retries {
                        self.recovering.store(false, Ordering::SeqCst);
                        self.running.store(false, Ordering::SeqCst);
                        return Err(IndexerError::Connection(format!(
                            "websocket gave up after {retries} attempts: {e}"
                        )));
                    }
                    let backoff = Duration::from_millis(
                        self.config.ws_reconnect_interval_ms * retries as u64,
                    );
                    warn!("Websocket session failed ({e}); reconnect {retries} in {backoff:?}");
                    // A stop during the wait aborts before resubscribing.
                    tokio::select! {
                        _ = sleep(backoff) => {}
                        _ = stop.recv() => {
                            self.recovering.store(false, Ordering::SeqCst);
                            return Ok(());
                        }
                    }
                }
            }
            self.recovering.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    /// One connect-subscribe-read session.
    async fn read_session(
        &self,
        queue_tx: &mpsc::Sender<WsLogEntry>,
        stop: &mut broadcast::Receiver<()>,
    ) -> Result<SessionEnd> {
        let (ws_stream, _) = connect_async(&self.config.ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "logsSubscribe",
            "params": [
                { "mentions": [self.config.program_address] },
                { "commitment": "finalized" }
            ]
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        info!("Subscribed to program logs");

        self.recovering.store(false, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        self.touch_activity();
        let mut subscription_id: Option<u64> = None;

        loop {
            tokio::select! {
                message = read.next() => {
                    let Some(message) = message else {
                        warn!("Websocket stream ended");
                        return Ok(SessionEnd::Reconnect);
                    };
                    match message {
                        Ok(Message::Text(text)) => {
                            self.touch_activity();
                            if let Some(entry) = parse_log_notification(&text) {
                                self.enqueue(queue_tx, entry)?;
                            } else if subscription_id.is_none() {
                                // First non-notification frame is the ack.
                                if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                    subscription_id = value.get("result").and_then(|r| r.as_u64());
                                    if let Some(id) = subscription_id {
                                        debug!("Subscription confirmed: {id}");
                                    }
                                }
                            }
                        }
                        Ok(Message::Ping(data)) => {
                            self.touch_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Ok(Message::Close(_)) => {
                            warn!("Websocket closed by server");
                            return Ok(SessionEnd::Reconnect);
                        }
                        Err(e) => return Err(IndexerError::WebSocket(e)),
                        _ => {}
                    }
                }
                _ = self.force_reconnect.notified() => {
                    if !self.running.load(Ordering::SeqCst) {
                        self.unsubscribe(&mut write, subscription_id).await;
                        return Ok(SessionEnd::Stopped);
                    }
                    info!("Forced reconnect requested");
                    self.unsubscribe(&mut write, subscription_id).await;
                    return Ok(SessionEnd::Reconnect);
                }
                _ = stop.recv() => {
                    self.unsubscribe(&mut write, subscription_id).await;
                    return Ok(SessionEnd::Stopped);
                }
            }
        }
    }

    /// Best-effort unsubscribe; removal failure is tolerated.
    async fn unsubscribe<S>(&self, write: &mut S, subscription_id: Option<u64>)
    where
        S: SinkExt<Message> + Unpin,
    {
        let Some(id) = subscription_id else { return };
        let frame = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "logsUnsubscribe",
            "params": [id]
        });
        if write.send(Message::Text(frame.to_string())).await.is_err() {
            debug!("Unsubscribe for {id} failed; ignoring");
        }
    }

    /// Bounded enqueue. Overflow flips the subscriber off and surfaces a
    /// fatal error; nothing is dropped silently.
    fn enqueue(&self, queue_tx: &mpsc::Sender<WsLogEntry>, entry: WsLogEntry) -> Result<()> {
        match queue_tx.try_send(entry) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped_logs.fetch_add(1, Ordering::SeqCst) + 1;
                self.metrics.dropped_logs.fetch_add(1, Ordering::Relaxed);
                self.running.store(false, Ordering::SeqCst);
                Err(IndexerError::QueueOverflow(dropped))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(IndexerError::Internal("ws dispatch queue closed".to_string()))
            }
        }
    }

    /// Drains the bounded queue and feeds the buffer.
    async fn dispatch_loop(
        &self,
        mut queue_rx: mpsc::Receiver<WsLogEntry>,
        mut stop: broadcast::Receiver<()>,
    ) {
        loop {
            let entry = tokio::select! {
                entry = queue_rx.recv() => entry,
                _ = stop.recv() => None,
            };
            let Some(entry) = entry else {
                debug!("Websocket dispatch loop exiting");
                return;
            };

            match self.dispatch(entry).await {
                Ok(()) => {
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                }
                Err(e) => {
                    let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!("PROCESSING_FAILED: {e} ({errors} consecutive)");
                    if errors > ERROR_THRESHOLD {
                        warn!("Error threshold exceeded; forcing reconnect");
                        self.consecutive_errors.store(0, Ordering::SeqCst);
                        self.force_reconnect.notify_one();
                    }
                }
            }
        }
    }

    /// Decode one notification and push it through the buffer. The cursor
    /// only advances inside a successful flush.
    async fn dispatch(&self, entry: WsLogEntry) -> Result<()> {
        let record = TxRecord {
            signature: entry.signature,
            slot: entry.slot,
            block_time: None,
            tx_index: None,
            log_messages: entry.logs,
            failed: entry.failed,
        };
        let events = self.decoder.decode_transaction(&record);
        if events.is_empty() {
            return Ok(());
        }
        self.buffer.push(events, "websocket");
        self.buffer.flush().await?;
        Ok(())
    }

    /// Periodic staleness check. Silence plus a failing slot probe forces a
    /// reconnect; silence with a healthy chain just resets the timer.
    async fn health_loop(&self, mut stop: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = sleep(HEALTH_CHECK_INTERVAL) => {}
                _ = stop.recv() => return,
            }
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            if self
                .checking_health
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }

            if self.activity_age() > STALENESS_THRESHOLD {
                match self.rpc.get_slot().await {
                    Ok(slot) => {
                        debug!("Websocket silent but chain at slot {slot}; quiescent");
                        self.touch_activity();
                    }
                    Err(e) => {
                        warn!("Websocket stale and slot probe failed ({e}); forcing reconnect");
                        self.force_reconnect.notify_one();
                    }
                }
            }

            self.checking_health.store(false, Ordering::SeqCst);
        }
    }
}

enum SessionEnd {
    Stopped,
    Reconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_notification() {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "subscription": 7,
                "result": {
                    "context": { "slot": 123 },
                    "value": {
                        "signature": "sigA",
                        "err": null,
                        "logs": ["Program data: aGVsbG8="]
                    }
                }
            }
        });
        let entry = parse_log_notification(&frame.to_string()).unwrap();
        assert_eq!(entry.signature, "sigA");
        assert_eq!(entry.slot, 123);
        assert!(!entry.failed);
        assert_eq!(entry.logs.len(), 1);
    }

    #[test]
    fn test_parse_failed_tx_notification() {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": { "slot": 5 },
                    "value": {
                        "signature": "sigB",
                        "err": { "InstructionError": [0, "Custom"] },
                        "logs": []
                    }
                }
            }
        });
        let entry = parse_log_notification(&frame.to_string()).unwrap();
        assert!(entry.failed);
    }

    #[test]
    fn test_parse_rejects_ack_and_garbage() {
        let ack = json!({ "jsonrpc": "2.0", "id": 1, "result": 42 });
        assert_eq!(parse_log_notification(&ack.to_string()), None);
        assert_eq!(parse_log_notification("not json"), None);
        let other = json!({ "method": "slotNotification", "params": {} });
        assert_eq!(parse_log_notification(&other.to_string()), None);
    }

    #[tokio::test]
    async fn test_queue_cap_is_authoritative() {
        // Exactly `cap` entries fit; the next one is the overflow signal.
        let (tx, mut rx) = mpsc::channel::<WsLogEntry>(2);
        let entry = WsLogEntry {
            signature: "s".to_string(),
            slot: 1,
            failed: false,
            logs: vec![],
        };
        assert!(tx.try_send(entry.clone()).is_ok());
        assert!(tx.try_send(entry.clone()).is_ok());
        assert!(matches!(
            tx.try_send(entry.clone()),
            Err(mpsc::error::TrySendError::Full(_))
        ));
        rx.recv().await.unwrap();
        assert!(tx.try_send(entry).is_ok());
    }
}
