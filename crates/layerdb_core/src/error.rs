//! Error types for LayerDB containers.

use crate::node::NodeId;
use layerdb_kv::KvError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for container operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The node store could not take another node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The configured node limit is reached.
    #[error("node store is full: {max} nodes")]
    CapacityExceeded {
        /// Configured limit.
        max: usize,
    },

    /// Reserving memory for a node slot failed.
    #[error("out of memory while reserving a node slot")]
    OutOfMemory,
}

/// Why an index layer refused a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A unique layer already holds the key.
    DuplicateKey,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey => f.write_str("duplicate key"),
        }
    }
}

/// Persistent adapter failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A column family could not be opened.
    #[error("failed to open store: {0}")]
    Open(#[source] KvError),

    /// Reading or writing the store failed.
    #[error("store I/O failed: {0}")]
    Io(#[source] KvError),
}

/// Failures while cloning a container.
#[derive(Debug, Error)]
pub enum CloneError {
    /// The clone's node store ran out of room.
    #[error("clone allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    /// A layer referenced a node that has no copy.
    #[error("layer {layer} references node {node} which was not copied")]
    DanglingReference {
        /// Layer being rebuilt.
        layer: String,
        /// Source node without a mapping.
        node: NodeId,
    },
}

/// Errors that can occur in container operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Node allocation failed; nothing was changed.
    #[error("allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    /// A layer refused the mutation; every layer was rolled back.
    #[error("conflict in layer {layer}: {kind}")]
    Conflict {
        /// Name of the refusing layer.
        layer: String,
        /// What was violated.
        kind: ConflictKind,
    },

    /// Persistent store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Clone failed; the partial clone was discarded.
    #[error(transparent)]
    Clone(#[from] CloneError),

    /// A record payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// I/O error while reading or writing a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted or snapshot data does not match the container.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// The node handle does not refer to a live node.
    #[error("node not found: {node}")]
    NodeNotFound {
        /// Handle that was looked up.
        node: NodeId,
    },

    /// No layer at that position or with that name.
    #[error("layer not found: {name}")]
    LayerNotFound {
        /// Position or name that was looked up.
        name: String,
    },

    /// The layer exists but is not of the requested type.
    #[error("layer {layer} is not of the requested type")]
    LayerTypeMismatch {
        /// Name of the layer.
        layer: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// An earlier flush failed. In-memory layers may be ahead of the store,
    /// so the container refuses further mutations.
    #[error("container is poisoned by an earlier flush failure")]
    Poisoned,
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a duplicate key conflict.
    pub fn conflict(layer: impl Into<String>, kind: ConflictKind) -> Self {
        Self::Conflict {
            layer: layer.into(),
            kind,
        }
    }

    /// Returns true for a rolled-back layer conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = CoreError::conflict("by_name", ConflictKind::DuplicateKey);
        assert_eq!(err.to_string(), "conflict in layer by_name: duplicate key");
        assert!(err.is_conflict());

        let err: CoreError = AllocationError::CapacityExceeded { max: 4 }.into();
        assert_eq!(err.to_string(), "allocation failed: node store is full: 4 nodes");
    }

    #[test]
    fn store_errors_keep_their_source() {
        let err: CoreError = StoreError::Io(KvError::Injected("write".into())).into();
        assert!(err.to_string().contains("injected failure"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
