//! Repository Error Types
//!
//! Every fallible operation of the content repository reports one of the
//! variants below. Storage backends speak `anyhow::Error`; those failures are
//! carried through unchanged in [`RepositoryError::Storage`].

use thiserror::Error;

/// Content repository errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Malformed or out-of-range path
    #[error("Invalid path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },

    /// Node or workspace name outside the allowed character set
    #[error("Invalid name \"{name}\" (names must only contain characters, numbers and the \"-\" sign)")]
    InvalidName { name: String },

    /// A node already occupies the target path
    #[error("Node with path \"{path}\" already exists")]
    NodeExists { path: String },

    /// A node with the requested identifier already exists
    #[error("Node with identifier \"{identifier}\" already exists")]
    IdentifierInUse { identifier: String },

    /// Unknown node type
    #[error("The node type \"{name}\" is not available")]
    NodeTypeNotFound { name: String },

    /// Supertype declarations loop back on themselves
    #[error("Cyclic supertype declaration: {}", chain.join(" -> "))]
    CyclicNodeType { chain: Vec<String> },

    /// Node type declaration could not be interpreted
    #[error("Invalid declaration for node type \"{name}\": {reason}")]
    InvalidNodeTypeDeclaration { name: String, reason: String },

    /// Path or identifier does not resolve to an item
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Illegal operation on a node (root rename, missing property, ...)
    #[error("Node error: {0}")]
    Node(String),

    /// A node staged for removal is still referenced
    #[error("Node {identifier} cannot be removed: it is still referenced by node {referrer} (property \"{property}\")")]
    ReferentialIntegrity {
        identifier: String,
        referrer: String,
        property: String,
    },

    /// Operation is part of the repository surface but not implemented
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Namespace registration or lookup failed
    #[error("Namespace error: {0}")]
    Namespace(String),

    /// The session has been logged out
    #[error("Session is not live")]
    SessionClosed,

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage backend failure
    #[error("Storage operation failed: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RepositoryError {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    pub fn node_exists(path: impl Into<String>) -> Self {
        Self::NodeExists { path: path.into() }
    }

    pub fn node_type_not_found(name: impl Into<String>) -> Self {
        Self::NodeTypeNotFound { name: name.into() }
    }

    pub fn item_not_found(what: impl Into<String>) -> Self {
        Self::ItemNotFound(what.into())
    }

    pub fn node(msg: impl Into<String>) -> Self {
        Self::Node(msg.into())
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation(operation.into())
    }

    pub fn namespace(msg: impl Into<String>) -> Self {
        Self::Namespace(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for errors raised by the storage backend rather than by the core
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_chain() {
        let err = RepositoryError::CyclicNodeType {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic supertype declaration: a -> b -> a");
    }

    #[test]
    fn test_storage_errors_convert_from_anyhow() {
        let err: RepositoryError = anyhow::anyhow!("disk full").into();
        assert!(err.is_storage());
        assert!(err.to_string().contains("disk full"));
    }
}
