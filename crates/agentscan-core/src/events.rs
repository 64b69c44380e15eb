//! Typed registry events
//!
//! Events are framed in transaction logs as a program-data line carrying a
//! binary payload: an 8-byte discriminator (sha256 of `event:<Name>`,
//! truncated) followed by little-endian fields. Decoding is total per event:
//! either the whole payload parses or the event is rejected.

use crate::codec::ByteReader;
use crate::error::{CoreError, Result};
use crate::types::{Address, Hash32};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Discriminator tag for an event name: `sha256("event:<name>")[..8]`.
pub fn discriminator(name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(b"event:");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    digest[..8].try_into().expect("sha256 output is 32 bytes")
}

/// Event variant names, used for dispatch and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AgentRegistered,
    UriUpdated,
    WalletUpdated,
    AtomEnabled,
    AgentOwnerSynced,
    MetadataSet,
    MetadataDeleted,
    NewFeedback,
    FeedbackRevoked,
    ResponseAppended,
    ValidationRequested,
    ValidationResponded,
    RegistryInitialized,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::AgentRegistered,
        EventKind::UriUpdated,
        EventKind::WalletUpdated,
        EventKind::AtomEnabled,
        EventKind::AgentOwnerSynced,
        EventKind::MetadataSet,
        EventKind::MetadataDeleted,
        EventKind::NewFeedback,
        EventKind::FeedbackRevoked,
        EventKind::ResponseAppended,
        EventKind::ValidationRequested,
        EventKind::ValidationResponded,
        EventKind::RegistryInitialized,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::AgentRegistered => "AgentRegistered",
            EventKind::UriUpdated => "UriUpdated",
            EventKind::WalletUpdated => "WalletUpdated",
            EventKind::AtomEnabled => "AtomEnabled",
            EventKind::AgentOwnerSynced => "AgentOwnerSynced",
            EventKind::MetadataSet => "MetadataSet",
            EventKind::MetadataDeleted => "MetadataDeleted",
            EventKind::NewFeedback => "NewFeedback",
            EventKind::FeedbackRevoked => "FeedbackRevoked",
            EventKind::ResponseAppended => "ResponseAppended",
            EventKind::ValidationRequested => "ValidationRequested",
            EventKind::ValidationResponded => "ValidationResponded",
            EventKind::RegistryInitialized => "RegistryInitialized",
        }
    }
}

fn discriminator_table() -> &'static [([u8; 8], EventKind); 13] {
    static TABLE: OnceLock<[([u8; 8], EventKind); 13]> = OnceLock::new();
    TABLE.get_or_init(|| {
        EventKind::ALL.map(|kind| (discriminator(kind.name()), kind))
    })
}

/// ATOM reputation metrics piggybacked on feedback events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomMetrics {
    /// 0-4: Unrated/Bronze/Silver/Gold/Platinum
    pub trust_tier: u8,
    /// 0-10000
    pub quality_score: u16,
    /// 0-10000
    pub confidence: u16,
    /// 0-100
    pub risk_score: u8,
    /// 0-255
    pub diversity_ratio: u8,
}

impl AtomMetrics {
    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            trust_tier: r.u8()?,
            quality_score: r.u16()?,
            confidence: r.u16()?,
            risk_score: r.u8()?,
            diversity_ratio: r.u8()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRegistered {
    pub asset: Address,
    pub owner: Address,
    pub collection: Address,
    pub creator: Address,
    pub parent_asset: Option<Address>,
    pub agent_uri: String,
    pub atom_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriUpdated {
    pub asset: Address,
    pub agent_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletUpdated {
    pub asset: Address,
    /// Zero address means "wallet cleared" and stores as NULL.
    pub wallet: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomEnabled {
    pub asset: Address,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOwnerSynced {
    pub asset: Address,
    pub owner: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSet {
    pub asset: Address,
    pub key: String,
    pub value: Vec<u8>,
    pub immutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDeleted {
    pub asset: Address,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedback {
    pub asset: Address,
    pub client_address: Address,
    /// Client-declared counter, not the scoped sequential id.
    pub feedback_index: u64,
    pub value: u64,
    pub value_decimals: u8,
    pub score: u8,
    pub tag1: String,
    pub tag2: String,
    pub endpoint: Option<String>,
    pub feedback_uri: Option<String>,
    /// All zeros means unsealed and stores as NULL.
    pub seal_hash: Hash32,
    pub atom: Option<AtomMetrics>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRevoked {
    pub asset: Address,
    pub client_address: Address,
    pub feedback_index: u64,
    pub seal_hash: Hash32,
    pub original_score: u8,
    pub atom_enabled: bool,
    pub had_impact: bool,
    pub atom: Option<AtomMetrics>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseAppended {
    pub asset: Address,
    pub client_address: Address,
    pub feedback_index: u64,
    pub responder: Address,
    /// Seal of the feedback being responded to; must match the stored one.
    pub seal_hash: Hash32,
    pub response_uri: Option<String>,
    pub response_hash: Hash32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequested {
    pub asset: Address,
    pub validator_address: Address,
    pub nonce: u128,
    pub request_uri: Option<String>,
    pub request_hash: Hash32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResponded {
    pub asset: Address,
    pub validator_address: Address,
    pub nonce: u128,
    pub response: u8,
    pub response_uri: Option<String>,
    pub response_hash: Option<Hash32>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryInitialized {
    pub collection: Address,
    pub authority: Address,
    /// 0 = BASE, 1 = USER
    pub registry_type: u8,
}

/// A decoded registry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    AgentRegistered(AgentRegistered),
    UriUpdated(UriUpdated),
    WalletUpdated(WalletUpdated),
    AtomEnabled(AtomEnabled),
    AgentOwnerSynced(AgentOwnerSynced),
    MetadataSet(MetadataSet),
    MetadataDeleted(MetadataDeleted),
    NewFeedback(NewFeedback),
    FeedbackRevoked(FeedbackRevoked),
    ResponseAppended(ResponseAppended),
    ValidationRequested(ValidationRequested),
    ValidationResponded(ValidationResponded),
    RegistryInitialized(RegistryInitialized),
}

impl RegistryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RegistryEvent::AgentRegistered(_) => EventKind::AgentRegistered,
            RegistryEvent::UriUpdated(_) => EventKind::UriUpdated,
            RegistryEvent::WalletUpdated(_) => EventKind::WalletUpdated,
            RegistryEvent::AtomEnabled(_) => EventKind::AtomEnabled,
            RegistryEvent::AgentOwnerSynced(_) => EventKind::AgentOwnerSynced,
            RegistryEvent::MetadataSet(_) => EventKind::MetadataSet,
            RegistryEvent::MetadataDeleted(_) => EventKind::MetadataDeleted,
            RegistryEvent::NewFeedback(_) => EventKind::NewFeedback,
            RegistryEvent::FeedbackRevoked(_) => EventKind::FeedbackRevoked,
            RegistryEvent::ResponseAppended(_) => EventKind::ResponseAppended,
            RegistryEvent::ValidationRequested(_) => EventKind::ValidationRequested,
            RegistryEvent::ValidationResponded(_) => EventKind::ValidationResponded,
            RegistryEvent::RegistryInitialized(_) => EventKind::RegistryInitialized,
        }
    }

    /// Asset this event belongs to, when it has one.
    pub fn asset(&self) -> Option<Address> {
        match self {
            RegistryEvent::AgentRegistered(e) => Some(e.asset),
            RegistryEvent::UriUpdated(e) => Some(e.asset),
            RegistryEvent::WalletUpdated(e) => Some(e.asset),
            RegistryEvent::AtomEnabled(e) => Some(e.asset),
            RegistryEvent::AgentOwnerSynced(e) => Some(e.asset),
            RegistryEvent::MetadataSet(e) => Some(e.asset),
            RegistryEvent::MetadataDeleted(e) => Some(e.asset),
            RegistryEvent::NewFeedback(e) => Some(e.asset),
            RegistryEvent::FeedbackRevoked(e) => Some(e.asset),
            RegistryEvent::ResponseAppended(e) => Some(e.asset),
            RegistryEvent::ValidationRequested(e) => Some(e.asset),
            RegistryEvent::ValidationResponded(e) => Some(e.asset),
            RegistryEvent::RegistryInitialized(_) => None,
        }
    }

    /// Decode a full event payload: discriminator tag plus body.
    pub fn decode(payload: &[u8]) -> Result<RegistryEvent> {
        if payload.len() < 8 {
            return Err(CoreError::TruncatedPayload(
                "payload shorter than discriminator".to_string(),
            ));
        }
        let tag: [u8; 8] = payload[..8].try_into().expect("length checked");
        let kind = discriminator_table()
            .iter()
            .find(|(d, _)| *d == tag)
            .map(|(_, k)| *k)
            .ok_or_else(|| CoreError::UnknownDiscriminator(hex::encode(tag)))?;

        let mut r = ByteReader::new(&payload[8..], kind.name());
        let event = match kind {
            EventKind::AgentRegistered => RegistryEvent::AgentRegistered(AgentRegistered {
                asset: r.address()?,
                owner: r.address()?,
                collection: r.address()?,
                creator: r.address()?,
                parent_asset: r.option(|r| r.address())?,
                agent_uri: r.string()?,
                atom_enabled: r.bool()?,
            }),
            EventKind::UriUpdated => RegistryEvent::UriUpdated(UriUpdated {
                asset: r.address()?,
                agent_uri: r.string()?,
            }),
            EventKind::WalletUpdated => RegistryEvent::WalletUpdated(WalletUpdated {
                asset: r.address()?,
                wallet: r.address()?,
            }),
            EventKind::AtomEnabled => RegistryEvent::AtomEnabled(AtomEnabled {
                asset: r.address()?,
                enabled: r.bool()?,
            }),
            EventKind::AgentOwnerSynced => RegistryEvent::AgentOwnerSynced(AgentOwnerSynced {
                asset: r.address()?,
                owner: r.address()?,
            }),
            EventKind::MetadataSet => RegistryEvent::MetadataSet(MetadataSet {
                asset: r.address()?,
                key: r.string()?,
                value: r.bytes()?,
                immutable: r.bool()?,
            }),
            EventKind::MetadataDeleted => RegistryEvent::MetadataDeleted(MetadataDeleted {
                asset: r.address()?,
                key: r.string()?,
            }),
            EventKind::NewFeedback => RegistryEvent::NewFeedback(NewFeedback {
                asset: r.address()?,
                client_address: r.address()?,
                feedback_index: r.u64()?,
                value: r.u64()?,
                value_decimals: r.u8()?,
                score: r.u8()?,
                tag1: r.string()?,
                tag2: r.string()?,
                endpoint: r.option(|r| r.string())?,
                feedback_uri: r.option(|r| r.string())?,
                seal_hash: r.hash()?,
                atom: r.option(AtomMetrics::read)?,
            }),
            EventKind::FeedbackRevoked => RegistryEvent::FeedbackRevoked(FeedbackRevoked {
                asset: r.address()?,
                client_address: r.address()?,
                feedback_index: r.u64()?,
                seal_hash: r.hash()?,
                original_score: r.u8()?,
                atom_enabled: r.bool()?,
                had_impact: r.bool()?,
                atom: r.option(AtomMetrics::read)?,
            }),
            EventKind::ResponseAppended => RegistryEvent::ResponseAppended(ResponseAppended {
                asset: r.address()?,
                client_address: r.address()?,
                feedback_index: r.u64()?,
                responder: r.address()?,
                seal_hash: r.hash()?,
                response_uri: r.option(|r| r.string())?,
                response_hash: r.hash()?,
            }),
            EventKind::ValidationRequested => {
                RegistryEvent::ValidationRequested(ValidationRequested {
                    asset: r.address()?,
                    validator_address: r.address()?,
                    nonce: r.u128()?,
                    request_uri: r.option(|r| r.string())?,
                    request_hash: r.hash()?,
                })
            }
            EventKind::ValidationResponded => {
                RegistryEvent::ValidationResponded(ValidationResponded {
                    asset: r.address()?,
                    validator_address: r.address()?,
                    nonce: r.u128()?,
                    response: r.u8()?,
                    response_uri: r.option(|r| r.string())?,
                    response_hash: r.option(|r| r.hash())?,
                    tag: r.option(|r| r.string())?,
                })
            }
            EventKind::RegistryInitialized => {
                RegistryEvent::RegistryInitialized(RegistryInitialized {
                    collection: r.address()?,
                    authority: r.address()?,
                    registry_type: r.u8()?,
                })
            }
        };
        Ok(event)
    }
}

/// A decoded event tagged with its position in the source transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub signature: String,
    pub slot: u64,
    /// Position of the transaction within its block, when the source knows it.
    pub tx_index: Option<i32>,
    /// 0-based position of this event within the transaction.
    pub event_ordinal: i32,
    /// Unix seconds, when the source carries a block time.
    pub block_time: Option<i64>,
    pub event: RegistryEvent,
}

impl DecodedEvent {
    /// Canonical order key for this event, before it has a row id.
    pub fn canonical_key(&self) -> crate::types::CanonicalKey {
        crate::types::CanonicalKey {
            slot: self.slot,
            tx_signature: self.signature.clone(),
            tx_index: self.tx_index,
            event_ordinal: Some(self.event_ordinal),
            row_id: 0,
        }
    }
}

pub mod encode {
    //! Event payload encoders, layout-mirrored against `decode`.
    //!
    //! The indexer never writes to chain; these exist for tests and local
    //! fixture tooling.

    use super::*;

    pub fn string(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    pub fn bytes(out: &mut Vec<u8>, b: &[u8]) {
        out.extend_from_slice(&(b.len() as u32).to_le_bytes());
        out.extend_from_slice(b);
    }

    pub fn opt_string(out: &mut Vec<u8>, s: &Option<String>) {
        match s {
            Some(s) => {
                out.push(1);
                string(out, s);
            }
            None => out.push(0),
        }
    }

    pub fn payload(kind: EventKind, body: &[u8]) -> Vec<u8> {
        let mut out = discriminator(kind.name()).to_vec();
        out.extend_from_slice(body);
        out
    }

    pub fn new_feedback(e: &NewFeedback) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&e.asset.0);
        body.extend_from_slice(&e.client_address.0);
        body.extend_from_slice(&e.feedback_index.to_le_bytes());
        body.extend_from_slice(&e.value.to_le_bytes());
        body.push(e.value_decimals);
        body.push(e.score);
        string(&mut body, &e.tag1);
        string(&mut body, &e.tag2);
        opt_string(&mut body, &e.endpoint);
        opt_string(&mut body, &e.feedback_uri);
        body.extend_from_slice(&e.seal_hash.0);
        match &e.atom {
            Some(a) => {
                body.push(1);
                body.push(a.trust_tier);
                body.extend_from_slice(&a.quality_score.to_le_bytes());
                body.extend_from_slice(&a.confidence.to_le_bytes());
                body.push(a.risk_score);
                body.push(a.diversity_ratio);
            }
            None => body.push(0),
        }
        payload(EventKind::NewFeedback, &body)
    }

    pub fn agent_registered(e: &AgentRegistered) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&e.asset.0);
        body.extend_from_slice(&e.owner.0);
        body.extend_from_slice(&e.collection.0);
        body.extend_from_slice(&e.creator.0);
        match &e.parent_asset {
            Some(p) => {
                body.push(1);
                body.extend_from_slice(&p.0);
            }
            None => body.push(0),
        }
        string(&mut body, &e.agent_uri);
        body.push(e.atom_enabled as u8);
        payload(EventKind::AgentRegistered, &body)
    }

    fn atom(out: &mut Vec<u8>, a: &Option<AtomMetrics>) {
        match a {
            Some(a) => {
                out.push(1);
                out.push(a.trust_tier);
                out.extend_from_slice(&a.quality_score.to_le_bytes());
                out.extend_from_slice(&a.confidence.to_le_bytes());
                out.push(a.risk_score);
                out.push(a.diversity_ratio);
            }
            None => out.push(0),
        }
    }

    pub fn uri_updated(e: &UriUpdated) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        string(&mut body, &e.agent_uri);
        payload(EventKind::UriUpdated, &body)
    }

    pub fn wallet_updated(e: &WalletUpdated) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        body.extend_from_slice(&e.wallet.0);
        payload(EventKind::WalletUpdated, &body)
    }

    pub fn atom_enabled(e: &AtomEnabled) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        body.push(e.enabled as u8);
        payload(EventKind::AtomEnabled, &body)
    }

    pub fn agent_owner_synced(e: &AgentOwnerSynced) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        body.extend_from_slice(&e.owner.0);
        payload(EventKind::AgentOwnerSynced, &body)
    }

    pub fn metadata_set(e: &MetadataSet) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        string(&mut body, &e.key);
        bytes(&mut body, &e.value);
        body.push(e.immutable as u8);
        payload(EventKind::MetadataSet, &body)
    }

    pub fn metadata_deleted(e: &MetadataDeleted) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        string(&mut body, &e.key);
        payload(EventKind::MetadataDeleted, &body)
    }

    pub fn feedback_revoked(e: &FeedbackRevoked) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        body.extend_from_slice(&e.client_address.0);
        body.extend_from_slice(&e.feedback_index.to_le_bytes());
        body.extend_from_slice(&e.seal_hash.0);
        body.push(e.original_score);
        body.push(e.atom_enabled as u8);
        body.push(e.had_impact as u8);
        atom(&mut body, &e.atom);
        payload(EventKind::FeedbackRevoked, &body)
    }

    pub fn response_appended(e: &ResponseAppended) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        body.extend_from_slice(&e.client_address.0);
        body.extend_from_slice(&e.feedback_index.to_le_bytes());
        body.extend_from_slice(&e.responder.0);
        body.extend_from_slice(&e.seal_hash.0);
        opt_string(&mut body, &e.response_uri);
        body.extend_from_slice(&e.response_hash.0);
        payload(EventKind::ResponseAppended, &body)
    }

    pub fn validation_requested(e: &ValidationRequested) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        body.extend_from_slice(&e.validator_address.0);
        body.extend_from_slice(&e.nonce.to_le_bytes());
        opt_string(&mut body, &e.request_uri);
        body.extend_from_slice(&e.request_hash.0);
        payload(EventKind::ValidationRequested, &body)
    }

    pub fn validation_responded(e: &ValidationResponded) -> Vec<u8> {
        let mut body = e.asset.0.to_vec();
        body.extend_from_slice(&e.validator_address.0);
        body.extend_from_slice(&e.nonce.to_le_bytes());
        body.push(e.response);
        opt_string(&mut body, &e.response_uri);
        match &e.response_hash {
            Some(h) => {
                body.push(1);
                body.extend_from_slice(&h.0);
            }
            None => body.push(0),
        }
        opt_string(&mut body, &e.tag);
        payload(EventKind::ValidationResponded, &body)
    }

    pub fn registry_initialized(e: &RegistryInitialized) -> Vec<u8> {
        let mut body = e.collection.0.to_vec();
        body.extend_from_slice(&e.authority.0);
        body.push(e.registry_type);
        payload(EventKind::RegistryInitialized, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminators_are_distinct() {
        let table = discriminator_table();
        for i in 0..table.len() {
            for j in (i + 1)..table.len() {
                assert_ne!(table[i].0, table[j].0, "{:?} vs {:?}", table[i].1, table[j].1);
            }
        }
    }

    #[test]
    fn test_unknown_discriminator_is_rejected() {
        let payload = [0xFFu8; 16];
        let err = RegistryEvent::decode(&payload).unwrap_err();
        assert!(matches!(err, CoreError::UnknownDiscriminator(_)));
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let err = RegistryEvent::decode(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, CoreError::TruncatedPayload(_)));
    }

    #[test]
    fn test_agent_registered_roundtrip() {
        let event = AgentRegistered {
            asset: Address([1u8; 32]),
            owner: Address([2u8; 32]),
            collection: Address([3u8; 32]),
            creator: Address([4u8; 32]),
            parent_asset: None,
            agent_uri: "ipfs://QmAgent".to_string(),
            atom_enabled: true,
        };
        let decoded = RegistryEvent::decode(&encode::agent_registered(&event)).unwrap();
        assert_eq!(decoded, RegistryEvent::AgentRegistered(event));
    }

    #[test]
    fn test_new_feedback_roundtrip_with_atom() {
        let event = NewFeedback {
            asset: Address([1u8; 32]),
            client_address: Address([9u8; 32]),
            feedback_index: 0,
            value: 100,
            value_decimals: 0,
            score: 87,
            tag1: "latency".to_string(),
            tag2: String::new(),
            endpoint: Some("api.example.com/v1".to_string()),
            feedback_uri: None,
            seal_hash: Hash32([0xAB; 32]),
            atom: Some(AtomMetrics {
                trust_tier: 2,
                quality_score: 8100,
                confidence: 9000,
                risk_score: 12,
                diversity_ratio: 190,
            }),
        };
        let decoded = RegistryEvent::decode(&encode::new_feedback(&event)).unwrap();
        assert_eq!(decoded, RegistryEvent::NewFeedback(event));
    }

    #[test]
    fn test_truncated_feedback_is_rejected() {
        let event = NewFeedback {
            asset: Address([1u8; 32]),
            client_address: Address([9u8; 32]),
            feedback_index: 3,
            value: 5,
            value_decimals: 2,
            score: 50,
            tag1: String::new(),
            tag2: String::new(),
            endpoint: None,
            feedback_uri: None,
            seal_hash: Hash32::ZERO,
            atom: None,
        };
        let mut payload = encode::new_feedback(&event);
        payload.truncate(payload.len() - 10);
        assert!(RegistryEvent::decode(&payload).is_err());
    }

    #[test]
    fn test_event_asset_accessor() {
        let event = RegistryEvent::RegistryInitialized(RegistryInitialized {
            collection: Address([1u8; 32]),
            authority: Address([2u8; 32]),
            registry_type: 0,
        });
        assert_eq!(event.asset(), None);
        assert_eq!(event.kind().name(), "RegistryInitialized");
    }
}
