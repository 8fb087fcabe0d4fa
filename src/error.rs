//! Error types for the embedding index
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::types::{CollectionId, NodeId};
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for index, registry and search operations
#[derive(Error, Debug)]
pub enum IndexError {
    /// Malformed vectors, bad keys, embedding failures
    #[error(transparent)]
    Vector(#[from] VectorError),

    /// Storage layer failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Collection {id} not found. Run 'semspace collections list' to see known collections.")]
    CollectionNotFound { id: CollectionId },

    #[error("Node {node} not found in collection {collection}")]
    NodeNotFound {
        collection: CollectionId,
        node: NodeId,
    },

    #[error("A collection named '{name}' already exists")]
    DuplicateCollection { name: String },

    /// Contract violation: nodes exist but the parameters that produced their keys are gone.
    #[error(
        "Collection {collection} has indexed nodes but no quantization parameters. The index is inconsistent."
    )]
    MissingQuantizationParams { collection: CollectionId },

    #[error(
        "Collection {collection} has no quantization parameters yet\nSuggestion: Import a first batch so bounds can be fitted before inserting nodes"
    )]
    NotFitted { collection: CollectionId },

    #[error("Search was cancelled")]
    Cancelled,

    #[error("Failed to create collection ID: maximum collection count reached")]
    CollectionIdExhausted,

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(VectorError::InvalidDimension { .. }) => "INVALID_DIMENSION",
            Self::Vector(VectorError::InsufficientDimensions { .. }) => "INSUFFICIENT_DIMENSIONS",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::DuplicateCollection { .. } => "DUPLICATE_COLLECTION",
            Self::MissingQuantizationParams { .. } => "MISSING_QUANTIZATION_PARAMS",
            Self::NotFitted { .. } => "NOT_FITTED",
            Self::Cancelled => "CANCELLED",
            Self::CollectionIdExhausted => "COLLECTION_ID_EXHAUSTED",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::ConfigError { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// True for invariant breaches that must never be swallowed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingQuantizationParams { .. } | Self::Storage(StorageError::Corrupted { .. })
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(VectorError::InvalidDimension { .. }) => vec![
                "All nodes of a collection must use the same embedding model",
                "The rejected vector was not written; the index is unchanged",
            ],
            Self::CollectionNotFound { .. } => vec![
                "Run 'semspace collections list' to see collection ids",
                "Collections are created by 'semspace import'",
            ],
            Self::MissingQuantizationParams { .. } => vec![
                "Delete the collection and import it again",
                "Check the snapshot file for corruption",
            ],
            Self::Storage(StorageError::Corrupted { .. })
            | Self::Storage(StorageError::UnsupportedVersion { .. }) => vec![
                "Remove the snapshot in data_path and re-import your collections",
            ],
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
            ],
            Self::ConfigError { .. } => vec![
                "Run 'semspace config' to inspect the effective settings",
                "Run 'semspace init --force' to regenerate the settings file",
            ],
            _ => vec![],
        }
    }
}

/// Errors specific to storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store appears to be corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for StorageError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for StorageError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
