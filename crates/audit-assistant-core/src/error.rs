//! Error taxonomy for the query core.
//!
//! Only [`AuditError::StoreUnavailable`] (when every evidence source is
//! down) and [`AuditError::EmbeddingDimensionMismatch`] are allowed to fail
//! a query. Everything else is absorbed by the engine and turned into a
//! degraded but non-empty answer.

pub type Result<T, E = AuditError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },
    #[error("Embedding dimension mismatch: index expects {expected} dims, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },
    #[error("Embedding error: {message}")]
    Embedding { message: String },
    #[error("Document store error: {message}")]
    DocumentStore { message: String },
    #[error("Model completion failed: {message}")]
    ModelCompletion { message: String },
    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },
}

impl AuditError {
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::EmbeddingDimensionMismatch { .. })
    }
}
