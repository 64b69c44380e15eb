//! Agentscan core types
//!
//! Chain-facing value types shared by the indexer:
//! - base58 addresses, 32-byte hashes, row lifecycle status
//! - canonical order keys for replay-stable ordering
//! - typed registry events with binary decoding
//! - agent account layout parsing
//! - running-digest (hash chain) primitives

pub mod account;
mod codec;
pub mod error;
pub mod events;
pub mod hashchain;
pub mod types;

pub use account::{AgentAccount, ChainDigest};
pub use error::{CoreError, Result};
pub use events::{DecodedEvent, EventKind, RegistryEvent};
pub use hashchain::{next_digest, ZERO_DIGEST};
pub use types::{Address, CanonicalKey, ChainType, Hash32, RowStatus};
