//! Core error types

use thiserror::Error;

/// Error type for chain data parsing
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Account data too short: need {need} bytes, got {got}")]
    AccountTooShort { need: usize, got: usize },

    #[error("Unknown event discriminator: {0}")]
    UnknownDiscriminator(String),

    #[error("Truncated event payload: {0}")]
    TruncatedPayload(String),

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
