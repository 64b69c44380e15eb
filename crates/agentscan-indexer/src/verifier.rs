//! Reorg reconciler
//!
//! Background loop that drives every persisted row through the
//! PENDING / FINALIZED / ORPHANED lifecycle against a safety-margin slot,
//! detects hash-chain divergence between the view and the chain, and
//! periodically rescues orphans whose accounts re-emerged.

use crate::config::Config;
use crate::error::Result;
use crate::ids;
use crate::metrics::IndexerMetrics;
use crate::rpc::ChainRpc;
use crate::storage::{EventTable, Storage};
use agentscan_core::{AgentAccount, RowStatus};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Chunk size for batched account lookups.
const ACCOUNT_BATCH: usize = 100;

/// Outcome of probing one account address.
#[derive(Debug, Clone)]
pub enum AccountProbe {
    /// Account exists; raw data attached.
    Exists(Vec<u8>),
    /// Confirmed absent at finalized commitment.
    Absent,
    /// RPC budget exhausted; no state transition allowed.
    Unknown,
}

/// Digest comparison outcome, straight from the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestVerdict {
    Match,
    Mismatch,
    /// Chain is ahead of the view; wait.
    IndexerBehind,
    /// View is ahead of the chain; observation-only.
    PossibleReorg,
}

/// Compare the view's chain head against the on-chain digest head.
pub fn digest_verdict(
    db_count: i64,
    db_digest: Option<&[u8]>,
    chain_count: i64,
    chain_digest: &[u8; 32],
) -> DigestVerdict {
    if db_count == 0 && chain_count == 0 {
        return DigestVerdict::Match;
    }
    if chain_count > db_count {
        return DigestVerdict::IndexerBehind;
    }
    if chain_count < db_count {
        return DigestVerdict::PossibleReorg;
    }
    match db_digest {
        Some(d) if d == chain_digest => DigestVerdict::Match,
        _ => DigestVerdict::Mismatch,
    }
}

/// Per-cycle cache of agent account probes, keyed by asset. Populated
/// lazily; a double fetch across concurrently-checked chains is acceptable.
struct CycleCache {
    accounts: HashMap<String, AccountProbe>,
}

impl CycleCache {
    fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }
}

/// Background verifier.
pub struct Verifier {
    config: Config,
    rpc: Arc<dyn ChainRpc>,
    storage: Arc<Storage>,
    metrics: Arc<IndexerMetrics>,
    running: AtomicBool,
    verify_in_progress: AtomicBool,
    cycle_count: AtomicU64,
}

impl Verifier {
    pub fn new(
        config: Config,
        rpc: Arc<dyn ChainRpc>,
        storage: Arc<Storage>,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            config,
            rpc,
            storage,
            metrics,
            running: AtomicBool::new(false),
            verify_in_progress: AtomicBool::new(false),
            cycle_count: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Periodic run loop.
    pub async fn run(self: Arc<Self>, mut stop: tokio::sync::broadcast::Receiver<()>) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Verifier started ({} ms cadence, safety margin {} slots)",
            self.config.verify_interval_ms, self.config.verify_safety_margin_slots
        );

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.verify_cycle().await {
                warn!("Verify cycle failed: {e}");
            }
            tokio::select! {
                _ = sleep(Duration::from_millis(self.config.verify_interval_ms)) => {}
                _ = stop.recv() => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Verifier stopped");
    }

    /// One verification pass. Reentrancy-guarded; a concurrent call returns
    /// immediately.
    pub async fn verify_cycle(&self) -> Result<()> {
        if self
            .verify_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Verify cycle already in progress; skipping");
            return Ok(());
        }
        self.metrics.verifier_active.store(true, Ordering::Relaxed);

        let outcome = self.verify_cycle_inner().await;

        self.metrics.verifier_active.store(false, Ordering::Relaxed);
        self.verify_in_progress.store(false, Ordering::SeqCst);
        outcome
    }

    async fn verify_cycle_inner(&self) -> Result<()> {
        let current_slot = self.rpc.get_slot().await?;
        let cutoff = current_slot.saturating_sub(self.config.verify_safety_margin_slots) as i64;
        let mut cache = CycleCache::new();

        self.verify_agents(cutoff, &mut cache).await?;
        self.verify_event_chains(cutoff, &mut cache).await?;
        self.verify_validations(cutoff, &mut cache).await?;
        self.verify_metadata(cutoff, &mut cache).await?;
        self.verify_collections(cutoff).await?;

        let cycle = self.cycle_count.fetch_add(1, Ordering::SeqCst) + 1;
        if cycle % self.config.verify_recovery_cycles as u64 == 0 {
            self.recovery_scan(cutoff, &mut cache).await?;
        }

        let orphans = self.storage.count_orphans().await?;
        self.metrics.orphan_count.store(orphans as u64, Ordering::Relaxed);
        self.metrics.record_verified_slot(current_slot);
        self.metrics.verify_cycles_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // ======== Batch verify ========

    /// Probe a set of addresses: one batched lookup per chunk, per-address
    /// fallback with the retry budget on chunk failure. `Unknown` never
    /// causes a state transition.
    async fn probe_accounts(&self, addresses: &[String]) -> HashMap<String, AccountProbe> {
        let mut probes = HashMap::with_capacity(addresses.len());
        for chunk in addresses.chunks(ACCOUNT_BATCH) {
            match self.rpc.get_multiple_accounts(chunk).await {
                Ok(results) => {
                    for (address, result) in chunk.iter().zip(results) {
                        let probe = match result {
                            Some(data) => AccountProbe::Exists(data),
                            None => AccountProbe::Absent,
                        };
                        probes.insert(address.clone(), probe);
                    }
                }
                Err(e) => {
                    debug!("Batched account lookup failed ({e}); falling back per-address");
                    for address in chunk {
                        probes.insert(address.clone(), self.probe_single(address).await);
                    }
                }
            }
        }
        probes
    }

    async fn probe_single(&self, address: &str) -> AccountProbe {
        for attempt in 0..self.config.verify_max_retries {
            match self.rpc.get_account_info(address).await {
                Ok(Some(data)) => return AccountProbe::Exists(data),
                Ok(None) => return AccountProbe::Absent,
                Err(e) => {
                    debug!(
                        "Account probe {address} attempt {} failed: {e}",
                        attempt + 1
                    );
                }
            }
        }
        self.metrics.skipped_rpc_errors.fetch_add(1, Ordering::Relaxed);
        AccountProbe::Unknown
    }

    /// Probe one asset through the per-cycle cache.
    async fn probe_cached(&self, cache: &mut CycleCache, asset: &str) -> AccountProbe {
        if let Some(probe) = cache.accounts.get(asset) {
            return probe.clone();
        }
        let probe = self.probe_single(asset).await;
        // Unknown stays uncached so a later chain in the same cycle retries.
        if !matches!(probe, AccountProbe::Unknown) {
            cache.accounts.insert(asset.to_string(), probe.clone());
        }
        probe
    }

    // ======== Agents ========

    async fn verify_agents(&self, cutoff: i64, cache: &mut CycleCache) -> Result<()> {
        let pending = self
            .storage
            .fetch_pending_agents(cutoff, self.config.verify_batch_size as i64)
            .await?;
        if pending.is_empty() {
            return Ok(());
        }

        let addresses: Vec<String> = pending.iter().map(|a| a.asset.clone()).collect();
        let probes = self.probe_accounts(&addresses).await;

        let mut to_finalize = Vec::new();
        for agent in &pending {
            match probes.get(&agent.asset) {
                Some(AccountProbe::Exists(data)) => {
                    cache
                        .accounts
                        .insert(agent.asset.clone(), AccountProbe::Exists(data.clone()));
                    to_finalize.push(agent);
                }
                Some(AccountProbe::Absent) => {
                    info!("Agent {} confirmed absent; orphaning with cascade", agent.asset);
                    cache
                        .accounts
                        .insert(agent.asset.clone(), AccountProbe::Absent);
                    self.storage.orphan_agent_cascade(&agent.asset).await?;
                }
                Some(AccountProbe::Unknown) | None => {
                    // Budget exhausted; row stays PENDING for the next cycle.
                }
            }
        }

        for agent in to_finalize {
            self.finalize_agent(&agent.asset, agent.agent_id, cutoff).await?;
        }
        Ok(())
    }

    /// Finalize one agent; a recovered agent (NULL id) gets the next global
    /// id at the tail of the scope.
    async fn finalize_agent(&self, asset: &str, agent_id: Option<i64>, cutoff: i64) -> Result<()> {
        let mut tx = self.storage.pool().begin().await?;
        let assigned = match agent_id {
            Some(id) => id,
            None => ids::allocate(&mut tx, &ids::agent_scope()).await?,
        };
        sqlx::query(
            r#"
            UPDATE agents
            SET agent_id = $2, status = 'FINALIZED', verified_at = NOW(),
                verified_slot = $3, updated_at = NOW()
            WHERE asset = $1 AND status = 'PENDING'
        "#,
        )
        .bind(asset)
        .bind(assigned)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // ======== Event chains ========

    async fn verify_event_chains(&self, cutoff: i64, cache: &mut CycleCache) -> Result<()> {
        for table in [EventTable::Feedback, EventTable::Response, EventTable::Revocation] {
            let pending = self
                .storage
                .fetch_pending_event_rows(table, cutoff, self.config.verify_batch_size as i64)
                .await?;
            if pending.is_empty() {
                continue;
            }

            // Group row ids by asset, preserving canonical order.
            let mut by_asset: BTreeMap<String, Vec<i64>> = BTreeMap::new();
            for (id, asset) in pending {
                by_asset.entry(asset).or_default().push(id);
            }

            for (asset, row_ids) in by_asset {
                // Orphaned owners never get hash-chain replay.
                match self.storage.agent_status(&asset).await? {
                    Some(RowStatus::Orphaned) | None => continue,
                    _ => {}
                }

                let probe = self.probe_cached(cache, &asset).await;
                let account = match probe {
                    AccountProbe::Exists(data) => match AgentAccount::parse(&data) {
                        Ok(account) => account,
                        Err(e) => {
                            debug!("Agent account {asset} unparseable ({e}); leaving PENDING");
                            continue;
                        }
                    },
                    AccountProbe::Absent => {
                        info!("Owning agent {asset} absent; orphaning with cascade");
                        self.storage.orphan_agent_cascade(&asset).await?;
                        continue;
                    }
                    AccountProbe::Unknown => continue,
                };

                let chain = account.digest_for(table.chain_type());
                let (db_digest, db_count) = self.storage.chain_head(table, &asset).await?;
                match digest_verdict(
                    db_count,
                    db_digest.as_deref(),
                    chain.count as i64,
                    &chain.digest.0,
                ) {
                    DigestVerdict::Match => {
                        self.finalize_event_rows(table, &asset, &row_ids).await?;
                        self.refresh_digest_cache(&asset, &account, cutoff).await?;
                    }
                    DigestVerdict::Mismatch => {
                        warn!(
                            "Digest mismatch on {} chain for {asset} at count {db_count}: \
                             view {} vs chain {}",
                            table.chain_type(),
                            db_digest.as_deref().map(hex::encode).unwrap_or_default(),
                            hex::encode(chain.digest.0)
                        );
                        self.metrics.mismatch_count.fetch_add(1, Ordering::Relaxed);
                    }
                    DigestVerdict::IndexerBehind => {
                        debug!(
                            "Indexer behind on {} chain for {asset} ({} < {})",
                            table.chain_type(),
                            db_count,
                            chain.count
                        );
                    }
                    DigestVerdict::PossibleReorg => {
                        warn!(
                            "Possible reorg on {} chain for {asset}: view has {db_count}, chain {}",
                            table.chain_type(),
                            chain.count
                        );
                        self.metrics.mismatch_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
        Ok(())
    }

    /// Finalize event rows; recovered rows (NULL scoped id) get fresh ids at
    /// the tail of their scope, in the order given.
    async fn finalize_event_rows(
        &self,
        table: EventTable,
        asset: &str,
        row_ids: &[i64],
    ) -> Result<()> {
        let mut tx = self.storage.pool().begin().await?;

        for &row_id in row_ids {
            // Plain read first; the scope's advisory lock is taken before
            // any row lock so ordering matches the write handlers.
            let select = format!(
                "SELECT {}, client_address, feedback_index FROM {} WHERE id = $1",
                table.id_column(),
                table.table()
            );
            let row: Option<(Option<i64>, String, i64)> = sqlx::query_as(&select)
                .bind(row_id)
                .fetch_optional(&mut *tx)
                .await?;
            let Some((scoped_id, client, feedback_index)) = row else {
                continue;
            };

            if scoped_id.is_none() {
                let scope = match table {
                    EventTable::Feedback => ids::feedback_scope(asset),
                    EventTable::Revocation => ids::revocation_scope(asset),
                    EventTable::Response => ids::response_scope(asset, &client, feedback_index),
                };
                let fresh = ids::allocate(&mut tx, &scope).await?;
                let update = format!(
                    "UPDATE {} SET {} = $2, status = 'FINALIZED' WHERE id = $1",
                    table.table(),
                    table.id_column()
                );
                sqlx::query(&update)
                    .bind(row_id)
                    .bind(fresh)
                    .execute(&mut *tx)
                    .await?;
            } else {
                let update = format!(
                    "UPDATE {} SET status = 'FINALIZED' WHERE id = $1 AND status = 'PENDING'",
                    table.table()
                );
                sqlx::query(&update).bind(row_id).execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn refresh_digest_cache(
        &self,
        asset: &str,
        account: &AgentAccount,
        cutoff: i64,
    ) -> Result<()> {
        let cache_row = crate::models::DigestCacheRow {
            asset: asset.to_string(),
            feedback_digest: Some(account.feedback.digest.0.to_vec()),
            feedback_count: account.feedback.count as i64,
            response_digest: Some(account.response.digest.0.to_vec()),
            response_count: account.response.count as i64,
            revoke_digest: Some(account.revoke.digest.0.to_vec()),
            revoke_count: account.revoke.count as i64,
            last_verified_at: Some(Utc::now()),
            last_verified_slot: Some(cutoff),
            needs_gap_fill: false,
            gap_fill_from_slot: None,
        };
        self.storage.update_digest_cache(&cache_row).await
    }

    // ======== Validations, metadata, collections ========

    async fn verify_validations(&self, cutoff: i64, cache: &mut CycleCache) -> Result<()> {
        let pending = self
            .storage
            .fetch_pending_validations(cutoff, self.config.verify_batch_size as i64)
            .await?;
        let mut finalize = Vec::new();
        let mut orphan = Vec::new();
        for row in &pending {
            match self.probe_cached(cache, &row.asset).await {
                AccountProbe::Exists(_) => finalize.push(row.id),
                AccountProbe::Absent => orphan.push(row.id),
                AccountProbe::Unknown => {}
            }
        }
        self.storage.finalize_rows("validations", &finalize, cutoff).await?;
        self.storage.orphan_rows("validations", &orphan).await?;
        Ok(())
    }

    async fn verify_metadata(&self, cutoff: i64, cache: &mut CycleCache) -> Result<()> {
        let pending = self
            .storage
            .fetch_pending_metadata(cutoff, self.config.verify_batch_size as i64)
            .await?;
        let mut finalize = Vec::new();
        let mut orphan = Vec::new();
        for row in &pending {
            // URI-derived entries are not chain-rooted; auto-finalize.
            if row.key.starts_with(crate::uri_queue::URI_KEY_PREFIX) {
                finalize.push(row.id);
                continue;
            }
            match self.probe_cached(cache, &row.asset).await {
                AccountProbe::Exists(_) => finalize.push(row.id),
                AccountProbe::Absent => orphan.push(row.id),
                AccountProbe::Unknown => {}
            }
        }
        self.storage
            .finalize_rows("metadata_entries", &finalize, cutoff)
            .await?;
        self.storage.orphan_rows("metadata_entries", &orphan).await?;
        Ok(())
    }

    async fn verify_collections(&self, cutoff: i64) -> Result<()> {
        let pending = self
            .storage
            .fetch_pending_collections(cutoff, self.config.verify_batch_size as i64)
            .await?;
        if pending.is_empty() {
            return Ok(());
        }
        let addresses: Vec<String> = pending.iter().map(|c| c.collection_pointer.clone()).collect();
        let probes = self.probe_accounts(&addresses).await;

        let mut finalize = Vec::new();
        let mut orphan = Vec::new();
        for row in &pending {
            match probes.get(&row.collection_pointer) {
                Some(AccountProbe::Exists(_)) => finalize.push(row.id),
                Some(AccountProbe::Absent) => orphan.push(row.id),
                _ => {}
            }
        }
        self.storage.finalize_rows("collections", &finalize, cutoff).await?;
        self.storage.orphan_rows("collections", &orphan).await?;
        Ok(())
    }

    // ======== Recovery ========

    /// Rescue orphans whose accounts re-emerged. A recovered agent re-enters
    /// PENDING, is re-examined immediately and its event rows follow in
    /// canonical on-chain order.
    async fn recovery_scan(&self, cutoff: i64, cache: &mut CycleCache) -> Result<()> {
        let orphaned = self
            .storage
            .fetch_orphaned_agents(self.config.verify_batch_size as i64)
            .await?;
        if orphaned.is_empty() {
            return Ok(());
        }
        info!("Recovery scan over {} orphaned agents", orphaned.len());

        for agent in orphaned {
            let probe = self.probe_single(&agent.asset).await;
            let AccountProbe::Exists(data) = probe else {
                continue;
            };
            info!("Orphaned agent {} re-emerged; recovering", agent.asset);
            cache
                .accounts
                .insert(agent.asset.clone(), AccountProbe::Exists(data));

            self.storage.mark_agent_pending(&agent.asset).await?;
            // Immediate re-examination: existence just confirmed, so the
            // agent finalizes now with a fresh id at the tail of the scope.
            self.finalize_agent(&agent.asset, None, cutoff).await?;

            for table in [EventTable::Feedback, EventTable::Response, EventTable::Revocation] {
                let rows = self
                    .storage
                    .fetch_orphaned_event_rows(table, &agent.asset)
                    .await?;
                for row_id in rows {
                    self.storage.mark_event_row_pending(table, row_id).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D1: [u8; 32] = [1u8; 32];
    const D2: [u8; 32] = [2u8; 32];

    #[test]
    fn test_trivial_match_on_empty_chains() {
        assert_eq!(digest_verdict(0, None, 0, &D1), DigestVerdict::Match);
    }

    #[test]
    fn test_match_on_equal_digests() {
        assert_eq!(digest_verdict(5, Some(&D1[..]), 5, &D1), DigestVerdict::Match);
    }

    #[test]
    fn test_mismatch_on_equal_counts() {
        assert_eq!(digest_verdict(5, Some(&D2[..]), 5, &D1), DigestVerdict::Mismatch);
    }

    #[test]
    fn test_missing_db_digest_with_nonzero_counts_is_mismatch() {
        assert_eq!(digest_verdict(5, None, 5, &D1), DigestVerdict::Mismatch);
    }

    #[test]
    fn test_indexer_behind() {
        assert_eq!(
            digest_verdict(3, Some(&D1[..]), 7, &D2),
            DigestVerdict::IndexerBehind
        );
        // Empty view against a populated chain also just waits.
        assert_eq!(digest_verdict(0, None, 4, &D1), DigestVerdict::IndexerBehind);
    }

    #[test]
    fn test_possible_reorg() {
        assert_eq!(
            digest_verdict(7, Some(&D1[..]), 3, &D2),
            DigestVerdict::PossibleReorg
        );
    }
}
