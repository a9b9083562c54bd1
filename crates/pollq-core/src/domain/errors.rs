//! Errors - consumer error taxonomy.
//!
//! Collaborators (store, transaction manager, domain handler) report failures
//! as [`BoxError`]; the consumer classifies them into [`ConsumerError`] by the
//! phase in which they occurred.

use thiserror::Error;

/// Error type returned by collaborator ports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// ConsumerError はフェーズごとのエラー分類
///
/// - `InvalidConfiguration`: construction time, fatal to startup.
/// - `Fetch`: due-item discovery failed; the cycle is aborted.
/// - `Processing`: one item failed; converted into failure bookkeeping.
/// - `Bookkeeping`: recording a failed attempt failed.
/// - `Transaction`: begin/commit failure reported by a transaction manager.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to fetch due items: {0}")]
    Fetch(#[source] BoxError),

    #[error("failed to process item {item}: {source}")]
    Processing {
        item: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to record failed attempt of item {item}: {source}")]
    Bookkeeping {
        item: String,
        #[source]
        source: BoxError,
    },

    #[error("transaction failure: {0}")]
    Transaction(#[source] BoxError),
}

impl ConsumerError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Is this a startup-time configuration error?
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, ConsumerError::InvalidConfiguration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_item_and_cause() {
        let err = ConsumerError::Processing {
            item: "42".to_string(),
            source: "boom".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error as _;

        let err = ConsumerError::Fetch("connection refused".into());
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection refused"));
        assert!(!err.is_invalid_configuration());
        assert!(ConsumerError::invalid("x").is_invalid_configuration());
    }
}
