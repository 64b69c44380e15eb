//! Running-digest (hash chain) primitives
//!
//! Every per-agent event chain (feedback, response, revoke) carries a rolling
//! digest: `d_n = sha256(d_{n-1} || h_n)` with `d_0 = 0^32`, where `h_n` is
//! the event's 32-byte hash (zeros when the source hash is absent).

use crate::types::Hash32;
use sha2::{Digest, Sha256};

/// Chain origin: 32 zero bytes.
pub const ZERO_DIGEST: Hash32 = Hash32([0u8; 32]);

/// Advance the chain by one event.
pub fn next_digest(prev: &Hash32, event_hash: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(prev.0);
    hasher.update(event_hash.0);
    Hash32(hasher.finalize().into())
}

/// Replay a whole chain from the origin. `None` entries hash as zeros.
pub fn replay_digest<'a, I>(event_hashes: I) -> Hash32
where
    I: IntoIterator<Item = Option<&'a Hash32>>,
{
    let mut digest = ZERO_DIGEST;
    for h in event_hashes {
        digest = next_digest(&digest, h.unwrap_or(&Hash32::ZERO));
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chain_is_zero() {
        assert_eq!(replay_digest(std::iter::empty()), ZERO_DIGEST);
    }

    #[test]
    fn test_chain_is_order_sensitive() {
        let a = Hash32([1u8; 32]);
        let b = Hash32([2u8; 32]);
        let ab = replay_digest([Some(&a), Some(&b)]);
        let ba = replay_digest([Some(&b), Some(&a)]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_replay_matches_stepwise() {
        let hashes = [Hash32([3u8; 32]), Hash32([4u8; 32]), Hash32([5u8; 32])];
        let mut digest = ZERO_DIGEST;
        for h in &hashes {
            digest = next_digest(&digest, h);
        }
        assert_eq!(replay_digest(hashes.iter().map(Some)), digest);
    }

    #[test]
    fn test_absent_hash_chains_as_zeros() {
        let present = replay_digest([Some(&Hash32::ZERO)]);
        let absent = replay_digest([None]);
        assert_eq!(present, absent);
        assert_ne!(absent, ZERO_DIGEST);
    }
}
