//! Error types for the engine bridge.

use thiserror::Error;

/// Errors surfaced by the engine or by the node wrapping it.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine failed to start: {0}")]
    StartFailed(String),

    #[error("Engine already started")]
    AlreadyStarted,

    #[error("Engine failed to stop: {0}")]
    StopFailed(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Block not found: {hash}")]
    BlockNotFound { hash: String },

    #[error("Transaction not found: {hash}")]
    TxNotFound { hash: String },

    #[error("{0}")]
    Other(String),
}

impl NodeError {
    /// Returns `true` for errors a caller is expected to retry (poll failures).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Poll(_))
    }

    /// Returns `true` if a lookup found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlockNotFound { .. } | Self::TxNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(NodeError::Poll("busy".into()).is_transient());
        assert!(!NodeError::StopFailed("x".into()).is_transient());
        assert!(NodeError::TxNotFound { hash: "ab".into() }.is_not_found());
        assert!(!NodeError::Engine("x".into()).is_not_found());
    }

    #[test]
    fn display_includes_hash() {
        let err = NodeError::BlockNotFound { hash: "00ff".into() };
        assert_eq!(err.to_string(), "Block not found: 00ff");
    }
}
