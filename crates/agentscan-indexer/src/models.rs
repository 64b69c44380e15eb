//! Database models for indexed data
//!
//! Hashes are opaque BYTEA blobs, addresses canonical base58 text, all row
//! keys 8-byte signed integers. Status columns hold the PENDING / FINALIZED
//! / ORPHANED lifecycle (`RowStatus::as_str`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Indexed agent
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentRow {
    pub id: i64,
    /// Scoped sequential id (scope `agent:global`); NULL iff ORPHANED
    pub agent_id: Option<i64>,
    pub asset: String,
    pub owner: String,
    pub collection_pointer: String,
    pub creator: String,
    pub parent_asset: Option<String>,
    pub agent_uri: Option<String>,
    pub wallet: Option<String>,
    pub atom_enabled: bool,
    pub trust_tier: Option<i16>,
    pub quality_score: Option<i32>,
    pub confidence: Option<i32>,
    pub risk_score: Option<i16>,
    pub diversity_ratio: Option<i16>,
    pub feedback_digest: Option<Vec<u8>>,
    pub feedback_count: i64,
    pub response_digest: Option<Vec<u8>>,
    pub response_count: i64,
    pub revoke_digest: Option<Vec<u8>>,
    pub revoke_count: i64,
    pub status: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_slot: Option<i64>,
    pub slot: i64,
    pub tx_signature: String,
    pub tx_index: Option<i32>,
    pub event_ordinal: Option<i32>,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Indexed feedback event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedbackRow {
    pub id: i64,
    /// Scoped sequential id (scope `feedback:<asset>`); NULL iff ORPHANED
    pub feedback_id: Option<i64>,
    pub asset: String,
    pub client_address: String,
    /// Client-declared counter from the event, not the scoped id
    pub feedback_index: i64,
    pub value: i64,
    pub value_decimals: i16,
    pub score: i16,
    pub tag1: String,
    pub tag2: String,
    pub endpoint: Option<String>,
    pub feedback_uri: Option<String>,
    /// Seal hash; NULL when the event carried all zeros
    pub feedback_hash: Option<Vec<u8>>,
    pub running_digest: Option<Vec<u8>>,
    pub is_revoked: bool,
    pub status: String,
    pub slot: i64,
    pub tx_signature: String,
    pub tx_index: Option<i32>,
    pub event_ordinal: Option<i32>,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Indexed response event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResponseRow {
    pub id: i64,
    /// Scoped sequential id (scope `response:<asset>:<client>:<index>`)
    pub response_id: Option<i64>,
    pub asset: String,
    pub client_address: String,
    pub feedback_index: i64,
    pub responder: String,
    pub response_uri: Option<String>,
    pub response_hash: Option<Vec<u8>>,
    pub running_digest: Option<Vec<u8>>,
    /// On-chain response chain length at this event
    pub response_count: i64,
    pub status: String,
    pub slot: i64,
    pub tx_signature: String,
    pub tx_index: Option<i32>,
    pub event_ordinal: Option<i32>,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Indexed revocation event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RevocationRow {
    pub id: i64,
    /// Scoped sequential id (scope `revocation:<asset>`); NULL iff ORPHANED
    pub revocation_id: Option<i64>,
    pub asset: String,
    pub client_address: String,
    pub feedback_index: i64,
    pub feedback_hash: Option<Vec<u8>>,
    pub running_digest: Option<Vec<u8>>,
    pub revoke_count: i64,
    pub original_score: i16,
    pub atom_enabled: bool,
    pub had_impact: bool,
    pub status: String,
    pub slot: i64,
    pub tx_signature: String,
    pub tx_index: Option<i32>,
    pub event_ordinal: Option<i32>,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Indexed validation request/response pair
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidationRow {
    pub id: i64,
    pub asset: String,
    pub validator_address: String,
    /// Wide integer, stored as decimal text
    pub nonce: String,
    pub request_uri: Option<String>,
    pub request_hash: Option<Vec<u8>>,
    pub response: Option<i16>,
    pub response_uri: Option<String>,
    pub response_hash: Option<Vec<u8>>,
    pub tag: Option<String>,
    pub status: String,
    pub slot: i64,
    pub tx_signature: String,
    pub tx_index: Option<i32>,
    pub event_ordinal: Option<i32>,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Registry collection
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectionRow {
    pub id: i64,
    pub collection_pointer: String,
    pub authority: String,
    /// BASE or USER
    pub registry_type: String,
    pub status: String,
    pub slot: i64,
    pub tx_signature: String,
    pub tx_index: Option<i32>,
    pub event_ordinal: Option<i32>,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// On-chain metadata entry. Keys prefixed `_uri:` are URI-derived and owned
/// by the metadata fetcher.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MetadataRow {
    pub id: i64,
    pub asset: String,
    pub key: String,
    pub value_bytes: Vec<u8>,
    pub immutable: bool,
    pub status: String,
    pub slot: i64,
    pub tx_signature: String,
    pub tx_index: Option<i32>,
    pub event_ordinal: Option<i32>,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One row per ID allocation scope
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdCounterRow {
    pub scope: String,
    pub next_value: i64,
}

/// Periodic hash-chain snapshot for incremental verification
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckpointRow {
    pub id: i64,
    pub asset: String,
    pub chain_type: String,
    pub event_count: i64,
    pub digest: Vec<u8>,
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Per-agent digest cache maintained by the verifier
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DigestCacheRow {
    pub asset: String,
    pub feedback_digest: Option<Vec<u8>>,
    pub feedback_count: i64,
    pub response_digest: Option<Vec<u8>>,
    pub response_count: i64,
    pub revoke_digest: Option<Vec<u8>>,
    pub revoke_count: i64,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_verified_slot: Option<i64>,
    pub needs_gap_fill: bool,
    pub gap_fill_from_slot: Option<i64>,
}

/// Global consumer position
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CursorRow {
    pub id: String,
    pub last_signature: Option<String>,
    pub last_slot: i64,
    /// poller or websocket
    pub source: String,
    #[sqlx(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
