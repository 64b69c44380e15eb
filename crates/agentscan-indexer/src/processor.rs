//! Processor - consumer mode arbitration
//!
//! Owns the lifecycles of the poller, the websocket subscriber and the
//! verifier. In `auto` mode the websocket is primary and the poller stays
//! on as an always-on fallback at slow cadence; a monitor loop restores
//! fast polling whenever the websocket is neither active nor recovering.

use crate::buffer::EventBuffer;
use crate::config::{Config, IndexerMode};
use crate::error::Result;
use crate::metrics::IndexerMetrics;
use crate::poller::Poller;
use crate::rpc::ChainRpc;
use crate::storage::Storage;
use crate::subscriber::{test_ws_connection, WsSubscriber};
use crate::verifier::Verifier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Fallback monitor cadence in auto mode.
const MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Reachability probe budget for the initial mode decision.
const WS_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Consumer supervisor.
pub struct Processor {
    config: Config,
    buffer: Arc<EventBuffer>,
    poller: Arc<Poller>,
    subscriber: Arc<WsSubscriber>,
    verifier: Option<Arc<Verifier>>,
    stop_tx: broadcast::Sender<()>,
    running: AtomicBool,
    monitor_tick_running: AtomicBool,
}

impl Processor {
    pub fn new(
        config: Config,
        rpc: Arc<dyn ChainRpc>,
        storage: Arc<Storage>,
        buffer: Arc<EventBuffer>,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(4);
        let poller = Arc::new(Poller::new(
            config.clone(),
            rpc.clone(),
            storage.clone(),
            buffer.clone(),
        ));
        let subscriber = Arc::new(WsSubscriber::new(
            config.clone(),
            rpc.clone(),
            buffer.clone(),
            metrics.clone(),
        ));
        let verifier = config.verification_enabled.then(|| {
            Arc::new(Verifier::new(
                config.clone(),
                rpc,
                storage,
                metrics,
            ))
        });
        Self {
            config,
            buffer,
            poller,
            subscriber,
            verifier,
            stop_tx,
            running: AtomicBool::new(false),
            monitor_tick_running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the configured consumers plus the verifier, then return; the
    /// work continues on spawned tasks until `stop`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        // The buffer's periodic flush loop runs in every mode.
        {
            let buffer = self.buffer.clone();
            let stop = self.stop_tx.subscribe();
            tokio::spawn(async move { buffer.run_flush_loop(stop).await });
        }

        if let Some(verifier) = &self.verifier {
            let verifier = verifier.clone();
            let stop = self.stop_tx.subscribe();
            tokio::spawn(async move { verifier.run(stop).await });
        }

        match self.config.indexer_mode {
            IndexerMode::Polling => {
                info!("Starting in polling mode");
                self.spawn_poller(true);
            }
            IndexerMode::Websocket => {
                info!("Starting in websocket mode");
                self.spawn_subscriber();
            }
            IndexerMode::Auto => {
                if test_ws_connection(&self.config.ws_url, WS_PROBE_TIMEOUT_MS).await {
                    info!("Starting in auto mode: websocket primary, poller fallback");
                    self.spawn_subscriber();
                    self.spawn_poller(false);
                } else {
                    warn!("Websocket unreachable; auto mode falling back to polling");
                    self.spawn_poller(true);
                }
                let this = self.clone();
                let stop = self.stop_tx.subscribe();
                tokio::spawn(async move { this.monitor_loop(stop).await });
            }
        }
        Ok(())
    }

    fn spawn_poller(&self, fast: bool) {
        self.poller.set_fast_cadence(fast);
        if self.poller.is_running() {
            return;
        }
        let poller = self.poller.clone();
        let stop = self.stop_tx.subscribe();
        tokio::spawn(async move { poller.run(stop).await });
    }

    fn spawn_subscriber(&self) {
        let subscriber = self.subscriber.clone();
        let stop = self.stop_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = subscriber.run(stop).await {
                if e.is_fatal() {
                    // Queue overflow and friends are process-fatal; the
                    // supervisor restarts us from a clean cursor.
                    error!("Websocket subscriber failed fatally: {e}");
                    std::process::exit(1);
                }
                error!("Websocket subscriber failed: {e}");
            }
        });
    }

    /// Auto-mode fallback monitor. Errors are contained; the processor
    /// keeps running.
    async fn monitor_loop(self: Arc<Self>, mut stop: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = sleep(MONITOR_INTERVAL) => {}
                _ = stop.recv() => return,
            }
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            // Reentrancy guard: a slow tick never overlaps the next one.
            if self
                .monitor_tick_running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }

            let ws_healthy = self.subscriber.is_active() || self.subscriber.is_recovering();
            if ws_healthy {
                self.poller.set_fast_cadence(false);
            } else {
                warn!("Websocket down and not recovering; polling at fast cadence");
                self.spawn_poller(true);
            }

            self.monitor_tick_running.store(false, Ordering::SeqCst);
        }
    }

    /// Stop everything: monitor, websocket, poller, verifier. The flush
    /// loop drains the buffer on its way out.
    pub async fn stop(&self) {
        info!("Processor stopping");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(());
        self.subscriber.stop();
        self.poller.stop();
        if let Some(verifier) = &self.verifier {
            verifier.stop();
        }
        // Bounded drain window for the in-flight flush.
        sleep(Duration::from_millis(200)).await;
        info!("Processor stopped");
    }
}
