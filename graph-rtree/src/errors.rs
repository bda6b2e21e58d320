//! Error and result types for the index and the graph store it runs on.

use std::io;
use thiserror::Error;

use crate::store::NodeId;

// ============================================================================
// Store Errors
// ============================================================================

/// Errors reported by a graph store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Transaction is already closed")]
    TransactionClosed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for graph store operations
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Index Errors
// ============================================================================

/// Errors that can occur while creating, mutating or querying an index.
#[derive(Debug, Error)]
pub enum RTreeError {
    #[error("Index '{0}' already exists")]
    DuplicateIndex(String),

    #[error("Index '{0}' does not exist")]
    IndexNotFound(String),

    #[error("No entry with payload '{0}' found in the index")]
    EntryNotFound(String),

    #[error("Tree invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid rectangle: {0}")]
    InvalidRect(String),

    #[error("Writer session is closed")]
    SessionClosed,

    #[error("Store failure: {0}")]
    StoreFailure(#[from] StoreError),
}

impl RTreeError {
    /// Returns `true` when the failed call left the session usable.
    ///
    /// A missing remove/update target and a rejected rectangle are
    /// recoverable, since both are detected before the tree is touched.
    /// Every other failure poisons the writer session that produced it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RTreeError::EntryNotFound(_) | RTreeError::InvalidRect(_))
    }
}

/// Result type for index operations
pub type RTreeResult<T> = Result<T, RTreeError>;
