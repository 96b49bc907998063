//! Error types for the kgraph facade.

use kgraph_core::{ConfigurationError, ValidationError};
use kgraph_ledger::LedgerError;
use kgraph_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KgError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Identifier collision: '{id}' has already been issued")]
    Collision { id: String },

    #[error("Identifier exhaustion: no unused identifier for kind '{kind}' after {attempts} attempts")]
    Exhausted { kind: String, attempts: usize },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Identifier ledger IO error: {0}")]
    LedgerIo(#[source] std::io::Error),

    #[error("Not found: {id}")]
    NotFound { id: String },

    #[error("{backend} backend unavailable: {error}")]
    BackendUnavailable {
        backend: &'static str,
        #[source]
        error: anyhow::Error,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl KgError {
    /// The rule a validation failure violated, if this is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<LedgerError> for KgError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Collision { id } => Self::Collision { id },
            LedgerError::Exhausted { kind, attempts } => Self::Exhausted { kind, attempts },
            LedgerError::InvalidIdentifier(id) => Self::InvalidIdentifier(id),
            LedgerError::Io(e) => Self::LedgerIo(e),
        }
    }
}

impl From<StoreError> for KgError {
    fn from(e: StoreError) -> Self {
        let backend = match &e {
            StoreError::Unavailable { backend, .. } => *backend,
            StoreError::Query(_) => "neo4j",
            StoreError::Http(_) => "terminusdb",
            _ => "",
        };
        if e.is_transport() {
            return Self::BackendUnavailable {
                backend,
                error: anyhow::anyhow!("{e}"),
            };
        }
        match e {
            StoreError::NotFound { id } => Self::NotFound { id },
            StoreError::Conflict { id } => Self::Collision { id },
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, KgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_onto_the_taxonomy() {
        let unavailable = KgError::from(StoreError::Unavailable {
            backend: "neo4j",
            message: "connection refused".into(),
        });
        assert!(matches!(
            unavailable,
            KgError::BackendUnavailable { backend: "neo4j", .. }
        ));
        assert!(unavailable.to_string().contains("connection refused"));

        assert!(KgError::from(StoreError::NotFound { id: "A/1".into() }).is_not_found());
        assert!(matches!(
            KgError::from(StoreError::Conflict { id: "A/1".into() }),
            KgError::Collision { .. }
        ));
        assert!(matches!(
            KgError::from(StoreError::Rejected {
                status: 400,
                message: "bad".into()
            }),
            KgError::Storage(_)
        ));
    }

    #[test]
    fn test_ledger_errors_keep_their_kind() {
        let e = KgError::from(LedgerError::Exhausted {
            kind: "Person".into(),
            attempts: 5,
        });
        assert!(matches!(e, KgError::Exhausted { attempts: 5, .. }));
        assert!(matches!(
            KgError::from(LedgerError::Collision { id: "Person/1".into() }),
            KgError::Collision { .. }
        ));
    }
}
