//! Agent account binary layout
//!
//! Layout (little-endian, fixed offsets):
//!
//! ```text
//! discriminator(8) | collection(32) | owner(32) | asset(32) | bump(1)
//! | atom_enabled(1) | wallet tag(1) + wallet(32)
//! | feedback_digest(32) | feedback_count(u64)
//! | response_digest(32) | response_count(u64)
//! | revoke_digest(32)   | revoke_count(u64)
//! ```
//!
//! The wallet slot is always reserved; the tag byte decides whether the
//! 32 bytes that follow are meaningful.

use crate::codec::ByteReader;
use crate::error::{CoreError, Result};
use crate::types::{Address, ChainType, Hash32};

/// Minimum account size for a parseable agent record.
pub const AGENT_ACCOUNT_LEN: usize = 8 + 32 + 32 + 32 + 1 + 1 + 33 + 3 * (32 + 8);

/// One chain's on-chain digest head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDigest {
    pub digest: Hash32,
    pub count: u64,
}

/// Parsed on-chain agent account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAccount {
    pub collection: Address,
    pub owner: Address,
    pub asset: Address,
    pub bump: u8,
    pub atom_enabled: bool,
    pub wallet: Option<Address>,
    pub feedback: ChainDigest,
    pub response: ChainDigest,
    pub revoke: ChainDigest,
}

impl AgentAccount {
    /// Parse raw account data. Errors if the buffer is smaller than the
    /// fixed layout requires.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < AGENT_ACCOUNT_LEN {
            return Err(CoreError::AccountTooShort {
                need: AGENT_ACCOUNT_LEN,
                got: data.len(),
            });
        }

        let mut r = ByteReader::new(data, "agent account");
        let _discriminator = r.u64()?;
        let collection = r.address()?;
        let owner = r.address()?;
        let asset = r.address()?;
        let bump = r.u8()?;
        let atom_enabled = r.bool()?;

        // Fixed-width optional: tag byte, then 32 reserved bytes either way.
        let wallet_tag = r.bool()?;
        let wallet_bytes = r.address()?;
        let wallet = if wallet_tag { Some(wallet_bytes) } else { None };

        let feedback = ChainDigest {
            digest: r.hash()?,
            count: r.u64()?,
        };
        let response = ChainDigest {
            digest: r.hash()?,
            count: r.u64()?,
        };
        let revoke = ChainDigest {
            digest: r.hash()?,
            count: r.u64()?,
        };

        Ok(Self {
            collection,
            owner,
            asset,
            bump,
            atom_enabled,
            wallet,
            feedback,
            response,
            revoke,
        })
    }

    /// Digest head for one of the three chains.
    pub fn digest_for(&self, chain: ChainType) -> ChainDigest {
        match chain {
            ChainType::Feedback => self.feedback,
            ChainType::Response => self.response,
            ChainType::Revoke => self.revoke,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account(wallet_tag: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(AGENT_ACCOUNT_LEN);
        data.extend_from_slice(&0xDEADu64.to_le_bytes()); // discriminator
        data.extend_from_slice(&[1u8; 32]); // collection
        data.extend_from_slice(&[2u8; 32]); // owner
        data.extend_from_slice(&[3u8; 32]); // asset
        data.push(255); // bump
        data.push(1); // atom_enabled
        data.push(wallet_tag);
        data.extend_from_slice(&[4u8; 32]); // wallet bytes (reserved)
        for (fill, count) in [(5u8, 10u64), (6, 20), (7, 30)] {
            data.extend_from_slice(&[fill; 32]);
            data.extend_from_slice(&count.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_parse_full_layout() {
        let acct = AgentAccount::parse(&sample_account(1)).unwrap();
        assert_eq!(acct.collection, Address([1u8; 32]));
        assert_eq!(acct.owner, Address([2u8; 32]));
        assert_eq!(acct.asset, Address([3u8; 32]));
        assert!(acct.atom_enabled);
        assert_eq!(acct.wallet, Some(Address([4u8; 32])));
        assert_eq!(acct.feedback.count, 10);
        assert_eq!(acct.response.count, 20);
        assert_eq!(acct.revoke.count, 30);
        assert_eq!(acct.digest_for(ChainType::Revoke).digest, Hash32([7u8; 32]));
    }

    #[test]
    fn test_wallet_tag_zero_means_none() {
        let acct = AgentAccount::parse(&sample_account(0)).unwrap();
        assert_eq!(acct.wallet, None);
    }

    #[test]
    fn test_short_account_is_rejected() {
        let data = sample_account(1);
        let err = AgentAccount::parse(&data[..data.len() - 1]).unwrap_err();
        assert!(matches!(err, CoreError::AccountTooShort { .. }));
    }
}
