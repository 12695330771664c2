//! Error types for the vector database
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages. Conflict errors get their
//! own variant so callers can choose to update instead of insert.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::VectorId;

/// Errors raised by the similarity indexes (exact and approximate).
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Distance space mismatch: index was built with '{stored}', caller requested '{requested}'"
    )]
    SpaceMismatch { stored: String, requested: String },

    #[error("Batch length mismatch: {embeddings} embeddings but {ids} ids")]
    LengthMismatch { embeddings: usize, ids: usize },

    #[error("Vector id {0} not found in index\nSuggestion: Verify the vector was indexed")]
    UnknownId(VectorId),

    #[error("Failed to persist index to '{path}': {source}")]
    Persist {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to load index from '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Index appears to be corrupted: {reason}")]
    Corrupt { reason: String },

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Io(#[from] std::io::Error),
}

/// Errors raised while generating embeddings.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model: {0}\nSuggestion: Ensure you have internet connection for first-time model download"
    )]
    ModelInit(String),

    #[error("Failed to generate embeddings: {0}")]
    Embedding(String),

    #[error("Unknown embedding model '{0}'")]
    UnknownModel(String),

    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Configuration errors, fatal at startup or first use.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("Failed to read configuration: {0}")]
    Read(String),
}

/// Main error type for record store and manager operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Missing required text/identity information, mismatched ids.
    /// The operation is aborted and no partial state is written.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Duplicate identity within a collection scope. Distinct from
    /// validation so callers can choose to update instead of insert.
    #[error("Vector with object id {object_id} already exists{}", scope_suffix(.collection))]
    Conflict {
        object_id: u64,
        collection: Option<String>,
    },

    #[error("Record {0} not found")]
    RecordNotFound(VectorId),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::RecordNotFound(_) => "RECORD_NOT_FOUND",
            Self::Index(_) => "INDEX_ERROR",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// True when the error is a duplicate-identity conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

fn scope_suffix(collection: &Option<String>) -> String {
    match collection {
        Some(kind) => format!(" in collection '{kind}'"),
        None => String::new(),
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Result type alias for store and manager operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_distinguishable() {
        let err = StoreError::Conflict {
            object_id: 7,
            collection: None,
        };
        assert!(err.is_conflict());
        assert_eq!(err.status_code(), "CONFLICT");

        let err = StoreError::Validation("missing text".into());
        assert!(!err.is_conflict());
        assert_eq!(err.status_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_conflict_message_includes_scope() {
        let err = StoreError::Conflict {
            object_id: 7,
            collection: Some("post".into()),
        };
        assert!(err.to_string().contains("collection 'post'"));

        let err = StoreError::Conflict {
            object_id: 7,
            collection: None,
        };
        assert!(!err.to_string().contains("collection"));
    }
}
