//! NodeStore Trait - Storage Abstraction Layer
//!
//! This module defines the `NodeStore` trait the session persists through.
//! Node records and property records are stored separately and keyed by
//! `(workspace, identifier)`; identifiers are unique within a workspace and
//! shared between a record and its overlay clones in derived workspaces.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: every method is async so embedded and networked backends
//!    fit behind the same seam
//! 2. **Ownership Semantics**: writes take their records by value
//! 3. **Error Handling**: `anyhow::Result`; the core wraps failures in
//!    `RepositoryError::Storage` without interpreting them
//! 4. **Joined Reads**: node records come back with their property records
//!    folded into the node's inline property map
//!
//! # Examples
//!
//! ```rust
//! use nodetree_core::db::{InMemoryStore, NodeStore};
//! use nodetree_core::models::{Node, NodeAccess};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store: Arc<dyn NodeStore> = Arc::new(InMemoryStore::new());
//! let node = Node::new("/news", "live", None).unwrap();
//! store.create_node(node.clone()).await.unwrap();
//!
//! let found = store.find_node_by_path("live", "/news").await.unwrap().unwrap();
//! assert_eq!(found.identifier(), node.identifier());
//! # });
//! ```

use crate::models::{Node, PropertyRecord};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of an idempotent delete
///
/// ```rust
/// use nodetree_core::db::DeleteResult;
///
/// assert!(DeleteResult::existed().existed);
/// assert!(!DeleteResult::not_found().existed);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    /// Whether the record existed before deletion
    pub existed: bool,
}

impl DeleteResult {
    pub fn existed() -> Self {
        Self { existed: true }
    }

    pub fn not_found() -> Self {
        Self { existed: false }
    }
}

/// Persisted node type declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeRecord {
    pub name: String,
    /// Declaration as configured (supertypes, flags, configuration tree)
    pub declaration: Value,
    pub is_mixin: bool,
}

/// Abstraction layer for node and property persistence
///
/// Implementations must be `Send + Sync`; sessions share one store through an
/// `Arc<dyn NodeStore>`.
#[async_trait]
pub trait NodeStore: Send + Sync {
    //
    // NODE LOOKUPS
    //

    /// Root record of a workspace
    async fn get_root_node(&self, workspace: &str) -> Result<Option<Node>>;

    async fn get_node_by_identifier(&self, workspace: &str, identifier: &str)
        -> Result<Option<Node>>;

    async fn find_node_by_path(&self, workspace: &str, path: &str) -> Result<Option<Node>>;

    /// Records whose parent path is `parent_path`, ordered by sibling index.
    ///
    /// `node_type` restricts the result to records of exactly that type. The
    /// root record never counts as its own child.
    async fn find_nodes_by_parent(
        &self,
        workspace: &str,
        parent_path: &str,
        node_type: Option<&str>,
    ) -> Result<Vec<Node>>;

    /// First record of [`NodeStore::find_nodes_by_parent`]
    async fn find_first_node_by_parent(
        &self,
        workspace: &str,
        parent_path: &str,
        node_type: Option<&str>,
    ) -> Result<Option<Node>>;

    async fn has_identifier(&self, workspace: &str, identifier: &str) -> Result<bool>;

    //
    // NODE WRITES
    //

    /// Insert a node record; its inline properties are not persisted here
    async fn create_node(&self, node: Node) -> Result<()>;

    /// Replace a node record's hierarchy, type and visibility fields
    async fn update_node(&self, node: Node) -> Result<()>;

    /// Delete a node record together with its property records
    async fn delete_node(&self, workspace: &str, identifier: &str) -> Result<DeleteResult>;

    //
    // PROPERTY WRITES
    //

    async fn create_property(&self, property: PropertyRecord) -> Result<()>;

    async fn update_property(&self, property: PropertyRecord) -> Result<()>;

    async fn delete_property(
        &self,
        workspace: &str,
        node_identifier: &str,
        name: &str,
    ) -> Result<DeleteResult>;

    //
    // REFERENCES
    //

    /// Whether any reference property in `workspace` points at `identifier`
    async fn is_reference_target(&self, workspace: &str, identifier: &str) -> Result<bool>;

    /// Reference properties in `workspace` pointing at `identifier`
    async fn find_referrers(&self, workspace: &str, identifier: &str)
        -> Result<Vec<PropertyRecord>>;

    //
    // NODE TYPES
    //

    async fn load_node_types(&self) -> Result<Vec<NodeTypeRecord>>;

    /// Insert or replace a node type declaration
    async fn save_node_type(&self, record: NodeTypeRecord) -> Result<()>;

    async fn delete_node_type(&self, name: &str) -> Result<DeleteResult>;

    //
    // LIFECYCLE
    //

    /// Release backend resources held for a session
    async fn disconnect(&self) -> Result<()>;
}
