//! Indexer error types

use thiserror::Error;

/// Indexer error type
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Chain data error: {0}")]
    Chain(#[from] agentscan_core::CoreError),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Websocket queue overflow after {0} dropped logs")]
    QueueOverflow(u64),

    #[error("Dead-letter ring saturated ({0} entries)")]
    DeadLetterSaturated(usize),

    #[error("Flush failed after {attempts} attempts: {source}")]
    FlushExhausted {
        attempts: u32,
        #[source]
        source: Box<IndexerError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl IndexerError {
    /// Storage connectivity loss, as opposed to a statement-level failure
    /// (constraint violation, decode error) that retrying cannot cure but
    /// that leaves the database itself reachable.
    pub fn is_storage_unavailable(&self) -> bool {
        match self {
            IndexerError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }

    /// Errors that mean the process should fail-stop rather than retry.
    /// An exhausted flush is only fatal when the underlying cause is
    /// storage connectivity loss; a persistent statement failure stays in
    /// the buffer and the dead-letter ring for the operator.
    pub fn is_fatal(&self) -> bool {
        match self {
            IndexerError::QueueOverflow(_)
            | IndexerError::DeadLetterSaturated(_)
            | IndexerError::Config(_) => true,
            IndexerError::FlushExhausted { source, .. } => source.is_storage_unavailable(),
            _ => false,
        }
    }
}

/// Result type for indexer operations
pub type Result<T> = std::result::Result<T, IndexerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn exhausted(source: IndexerError) -> IndexerError {
        IndexerError::FlushExhausted {
            attempts: 3,
            source: Box::new(source),
        }
    }

    #[test]
    fn test_queue_overflow_and_saturation_are_fatal() {
        assert!(IndexerError::QueueOverflow(1).is_fatal());
        assert!(IndexerError::DeadLetterSaturated(10_000).is_fatal());
        assert!(IndexerError::Config("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_exhausted_flush_on_connectivity_loss_is_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down");
        let err = exhausted(IndexerError::Database(sqlx::Error::Io(io)));
        assert!(err.is_fatal());

        let err = exhausted(IndexerError::Database(sqlx::Error::PoolTimedOut));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_exhausted_flush_on_statement_failure_is_not_fatal() {
        let err = exhausted(IndexerError::Database(sqlx::Error::RowNotFound));
        assert!(!err.is_fatal());

        let err = exhausted(IndexerError::Internal("handler bug".to_string()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_transient_errors_are_not_fatal() {
        assert!(!IndexerError::Rpc("timeout".to_string()).is_fatal());
        assert!(!IndexerError::Database(sqlx::Error::RowNotFound).is_fatal());
    }
}
