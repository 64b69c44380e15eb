//! Hash-chain replay verification and checkpoints
//!
//! Replays a chain's event hashes in canonical order from the origin (or
//! the latest checkpoint at or below the target), validates every stored
//! running digest on the way, and reports the first divergence. Checkpoints
//! land every `CHECKPOINT_INTERVAL` events so the next replay is incremental.

use crate::error::Result;
use crate::storage::{EventTable, Storage};
use agentscan_core::{hashchain, Hash32};
use std::sync::Arc;
use tracing::{debug, warn};

/// Events between persisted checkpoints.
pub const CHECKPOINT_INTERVAL: i64 = 1_000;

/// Result of replaying a suffix of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Digest after the last replayed event.
    pub final_digest: Hash32,
    /// Events replayed by this pass (excludes the checkpoint prefix).
    pub replayed: usize,
    /// 0-based chain index of the first event whose stored running digest
    /// disagrees with the recomputation, if any. Replay stops there.
    pub first_mismatch: Option<i64>,
    /// Checkpoint positions crossed during this pass: (event_count, digest).
    pub checkpoints_due: Vec<(i64, Hash32)>,
}

/// Pure replay over `(event_hash, stored_running_digest)` pairs starting
/// from `start_digest` at chain position `start_count`.
pub fn replay_entries(
    start_digest: Hash32,
    start_count: i64,
    entries: &[(Option<Hash32>, Option<Hash32>)],
) -> ReplayOutcome {
    let mut digest = start_digest;
    let mut count = start_count;
    let mut checkpoints_due = Vec::new();

    for (i, (event_hash, stored)) in entries.iter().enumerate() {
        digest = hashchain::next_digest(&digest, event_hash.as_ref().unwrap_or(&Hash32::ZERO));
        count += 1;

        if let Some(stored) = stored {
            if *stored != digest {
                return ReplayOutcome {
                    final_digest: digest,
                    replayed: i + 1,
                    first_mismatch: Some(count - 1),
                    checkpoints_due,
                };
            }
        }

        if count % CHECKPOINT_INTERVAL == 0 {
            checkpoints_due.push((count, digest));
        }
    }

    ReplayOutcome {
        final_digest: digest,
        replayed: entries.len(),
        first_mismatch: None,
        checkpoints_due,
    }
}

/// Storage-backed incremental replay verifier.
pub struct ReplayVerifier {
    storage: Arc<Storage>,
}

impl ReplayVerifier {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Replay one `(asset, chain)` from the latest usable checkpoint and
    /// persist any checkpoints crossed. Returns the outcome including the
    /// first mismatch index, if any.
    pub async fn verify_chain(&self, asset: &str, table: EventTable) -> Result<ReplayOutcome> {
        let (_, total) = self.storage.chain_head(table, asset).await?;

        let checkpoint = self
            .storage
            .latest_checkpoint(asset, table.chain_type(), total)
            .await?;
        let (start_digest, start_count) = match checkpoint {
            Some(cp) => {
                debug!(
                    "Resuming {} replay for {asset} from checkpoint at {}",
                    table.chain_type(),
                    cp.event_count
                );
                (Hash32::from_slice(&cp.digest)?, cp.event_count)
            }
            None => (hashchain::ZERO_DIGEST, 0),
        };

        let rows = self
            .storage
            .chain_event_hashes(table, asset, start_count)
            .await?;
        let entries: Vec<(Option<Hash32>, Option<Hash32>)> = rows
            .iter()
            .map(|(_, hash, stored)| {
                let hash = hash.as_deref().and_then(|h| Hash32::from_slice(h).ok());
                let stored = stored.as_deref().and_then(|d| Hash32::from_slice(d).ok());
                (hash, stored)
            })
            .collect();

        let outcome = replay_entries(start_digest, start_count, &entries);

        if let Some(index) = outcome.first_mismatch {
            warn!(
                "Replay mismatch on {} chain for {asset} at index {index}",
                table.chain_type()
            );
        }

        for (count, digest) in &outcome.checkpoints_due {
            self.storage
                .insert_checkpoint(asset, table.chain_type(), *count, &digest.0)
                .await?;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscan_core::hashchain::{next_digest, ZERO_DIGEST};

    fn chain_of(hashes: &[Hash32]) -> Vec<(Option<Hash32>, Option<Hash32>)> {
        // Entries with correct stored running digests.
        let mut digest = ZERO_DIGEST;
        hashes
            .iter()
            .map(|h| {
                digest = next_digest(&digest, h);
                (Some(*h), Some(digest))
            })
            .collect()
    }

    #[test]
    fn test_clean_replay_has_no_mismatch() {
        let entries = chain_of(&[Hash32([1; 32]), Hash32([2; 32]), Hash32([3; 32])]);
        let outcome = replay_entries(ZERO_DIGEST, 0, &entries);
        assert_eq!(outcome.first_mismatch, None);
        assert_eq!(outcome.replayed, 3);
        assert_eq!(outcome.final_digest, entries[2].1.unwrap());
    }

    #[test]
    fn test_reports_first_mismatch_index_and_stops() {
        let mut entries = chain_of(&[Hash32([1; 32]), Hash32([2; 32]), Hash32([3; 32])]);
        entries[1].1 = Some(Hash32([0xEE; 32]));
        let outcome = replay_entries(ZERO_DIGEST, 0, &entries);
        assert_eq!(outcome.first_mismatch, Some(1));
        assert_eq!(outcome.replayed, 2);
    }

    #[test]
    fn test_null_stored_digest_is_not_checked() {
        let mut entries = chain_of(&[Hash32([1; 32]), Hash32([2; 32])]);
        entries[0].1 = None;
        let outcome = replay_entries(ZERO_DIGEST, 0, &entries);
        assert_eq!(outcome.first_mismatch, None);
    }

    #[test]
    fn test_absent_event_hash_chains_as_zeros() {
        let direct = replay_entries(ZERO_DIGEST, 0, &[(None, None)]);
        let explicit = replay_entries(ZERO_DIGEST, 0, &[(Some(Hash32::ZERO), None)]);
        assert_eq!(direct.final_digest, explicit.final_digest);
    }

    #[test]
    fn test_checkpoints_land_on_interval_multiples() {
        let hashes: Vec<Hash32> = (0..2_001u32)
            .map(|i| {
                let mut h = [0u8; 32];
                h[..4].copy_from_slice(&i.to_le_bytes());
                Hash32(h)
            })
            .collect();
        let entries: Vec<(Option<Hash32>, Option<Hash32>)> =
            hashes.iter().map(|h| (Some(*h), None)).collect();
        let outcome = replay_entries(ZERO_DIGEST, 0, &entries);
        let positions: Vec<i64> = outcome.checkpoints_due.iter().map(|(c, _)| *c).collect();
        assert_eq!(positions, vec![1_000, 2_000]);
    }

    #[test]
    fn test_resume_from_checkpoint_matches_full_replay() {
        let hashes = [Hash32([1; 32]), Hash32([2; 32]), Hash32([3; 32]), Hash32([4; 32])];
        let entries: Vec<(Option<Hash32>, Option<Hash32>)> =
            hashes.iter().map(|h| (Some(*h), None)).collect();
        let full = replay_entries(ZERO_DIGEST, 0, &entries);

        let prefix = replay_entries(ZERO_DIGEST, 0, &entries[..2]);
        let resumed = replay_entries(prefix.final_digest, 2, &entries[2..]);
        assert_eq!(resumed.final_digest, full.final_digest);
    }
}
