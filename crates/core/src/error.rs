// crates/core/src/error.rs
use thiserror::Error;

/// Errors surfaced by an [`crate::store::EventStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Source collection unreachable: {name}")]
    SourceUnreachable { name: String },

    #[error("Store backend error: {message}")]
    Backend { message: String },

    #[error("Malformed materialized document: {0}")]
    MalformedDocument(#[from] serde_json::Error),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn source_unreachable(name: impl Into<String>) -> Self {
        Self::SourceUnreachable { name: name.into() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-record failure while turning an enriched document into a
/// performance record. Always contained at the record boundary: the
/// orchestrator logs it with the record's request id and moves on.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("field `{field}` has unexpected type")]
    BadType { field: &'static str },
}
