//! Lookups through the workspace chain
//!
//! Records are searched nearest workspace first. The identity cache is
//! authoritative: a cached node hides every stored record with its
//! identifier, and nodes staged for removal are invisible. A record from a
//! base workspace is skipped when a nearer workspace holds a record with the
//! same identifier (the node was changed or moved there) or already
//! provided a node at the same path.
//!
//! Public lookups apply the context's removed/visibility/access filters;
//! the `*_raw` helpers used by the mutation code do not.

use super::Session;
use crate::models::{ContentNode, Node, NodeAccess};
use crate::services::error::{RepositoryError, Result};
use crate::utils::{self, ROOT_PATH};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Node or property addressed by a path
#[derive(Debug, Clone)]
pub enum Item {
    Node(ContentNode),
    Property {
        node: ContentNode,
        name: String,
        value: Value,
    },
}

impl Item {
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }
}

impl Session {
    /// The workspace's root node
    pub async fn root_node(&mut self) -> Result<ContentNode> {
        self.ensure_live()?;
        self.find_raw(ROOT_PATH)
            .await?
            .ok_or_else(|| RepositoryError::item_not_found(ROOT_PATH))
    }

    /// Node at an absolute path (relative paths resolve against the root)
    pub async fn get_node(&mut self, path: &str) -> Result<Option<ContentNode>> {
        self.ensure_live()?;
        let path = utils::normalize(Some(ROOT_PATH), path)?;
        let found = self.find_raw(&path).await?;
        Ok(found.and_then(|node| self.context.filter(node)))
    }

    /// Node at `path` relative to the node `from`
    pub async fn get_node_relative(
        &mut self,
        from: &str,
        path: &str,
    ) -> Result<Option<ContentNode>> {
        self.ensure_live()?;
        let base = self.load(from).await?;
        let path = utils::normalize(Some(base.path()), path)?;
        let found = self.find_raw(&path).await?;
        Ok(found.and_then(|node| self.context.filter(node)))
    }

    /// Node by identifier, unfiltered
    pub async fn get_node_by_identifier(&mut self, identifier: &str) -> Result<ContentNode> {
        self.ensure_live()?;
        self.load(identifier).await
    }

    /// Whether any workspace of the chain knows the identifier
    pub async fn has_identifier(&mut self, identifier: &str) -> Result<bool> {
        self.ensure_live()?;
        if self.loaded.contains_key(identifier) {
            return Ok(true);
        }
        if self.unit_of_work.is_removed(identifier) {
            return Ok(false);
        }
        for workspace in self.chain_names() {
            if self.store.has_identifier(&workspace, identifier).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Parent node; `None` for the root or a filtered parent
    pub async fn get_parent(&mut self, identifier: &str) -> Result<Option<ContentNode>> {
        self.ensure_live()?;
        let node = self.load(identifier).await?;
        if node.is_root() {
            return Ok(None);
        }
        let parent = self.find_raw(node.parent_path()).await?;
        Ok(parent.and_then(|parent| self.context.filter(parent)))
    }

    /// Children in sibling order, optionally restricted by a type filter
    /// (see `NodeTypeRegistry::matches_filter`)
    pub async fn get_child_nodes(
        &mut self,
        identifier: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<ContentNode>> {
        self.ensure_live()?;
        let parent = self.load(identifier).await?;
        let children = self.raw_children(parent.path()).await?;
        Ok(children
            .into_iter()
            .filter(|child| {
                type_filter.map_or(true, |filter| {
                    self.node_types.matches_filter(child.node_type(), filter)
                })
            })
            .filter(|child| self.context.admits(child))
            .collect())
    }

    pub async fn has_child_nodes(
        &mut self,
        identifier: &str,
        type_filter: Option<&str>,
    ) -> Result<bool> {
        Ok(!self.get_child_nodes(identifier, type_filter).await?.is_empty())
    }

    /// First child in sibling order
    pub async fn get_primary_child_node(
        &mut self,
        identifier: &str,
    ) -> Result<Option<ContentNode>> {
        self.ensure_live()?;
        let parent = self.load(identifier).await?;

        // Single-workspace sessions with nothing cached below the parent can
        // ask the store directly. A stored record whose node is cached or
        // staged for removal may be stale (moved away, removed), so those
        // fall back to the merged child list.
        let nothing_cached = !self
            .loaded
            .values()
            .any(|node| node.parent_path() == parent.path() && !node.is_root());
        if self.workspace().is_bottom() && nothing_cached {
            let workspace = self.workspace_name();
            if let Some(record) = self
                .store
                .find_first_node_by_parent(&workspace, parent.path(), None)
                .await?
            {
                if !self.loaded.contains_key(record.identifier())
                    && !self.unit_of_work.is_removed(record.identifier())
                {
                    let node = self.adopt(record);
                    if self.context.admits(&node) {
                        return Ok(Some(node));
                    }
                }
            }
        }

        Ok(self
            .get_child_nodes(identifier, None)
            .await?
            .into_iter()
            .next())
    }

    /// Node or property at an absolute path; nodes take precedence
    pub async fn get_item(&mut self, path: &str) -> Result<Item> {
        self.ensure_live()?;
        let path = utils::normalize(Some(ROOT_PATH), path)?;
        if let Some(node) = self.get_node(&path).await? {
            return Ok(Item::Node(node));
        }
        if path != ROOT_PATH {
            let name = utils::name_of(&path).to_string();
            if let Some(node) = self.get_node(&utils::parent_of(&path)).await? {
                if node.has_property(&name) {
                    let value = node.get_property(&name)?.unwrap_or(Value::Null);
                    return Ok(Item::Property { node, name, value });
                }
            }
        }
        Err(RepositoryError::item_not_found(path))
    }

    /// Property value at an absolute path
    pub async fn get_property_at(&mut self, path: &str) -> Result<Value> {
        match self.get_item(path).await? {
            Item::Property { value, .. } => Ok(value),
            Item::Node(_) => Err(RepositoryError::item_not_found(format!(
                "property {}",
                path
            ))),
        }
    }

    pub async fn item_exists(&mut self, path: &str) -> Result<bool> {
        match self.get_item(path).await {
            Ok(_) => Ok(true),
            Err(RepositoryError::ItemNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn node_exists(&mut self, path: &str) -> Result<bool> {
        Ok(self.get_node(path).await?.is_some())
    }

    pub async fn property_exists(&mut self, path: &str) -> Result<bool> {
        match self.get_item(path).await {
            Ok(item) => Ok(!item.is_node()),
            Err(RepositoryError::ItemNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    //
    // UNFILTERED HELPERS
    //

    /// Cached or stored node by identifier
    pub(super) async fn load(&mut self, identifier: &str) -> Result<ContentNode> {
        if let Some(node) = self.loaded.get(identifier) {
            return Ok(node.clone());
        }
        if !self.unit_of_work.is_removed(identifier) {
            for workspace in self.chain_names() {
                if let Some(record) = self
                    .store
                    .get_node_by_identifier(&workspace, identifier)
                    .await?
                {
                    return Ok(self.adopt(record));
                }
            }
        }
        Err(RepositoryError::item_not_found(format!("node {}", identifier)))
    }

    /// Node at a normalized path, ignoring the context filters
    pub(super) async fn find_raw(&mut self, path: &str) -> Result<Option<ContentNode>> {
        if let Some(node) = self.loaded.values().find(|node| node.path() == path) {
            return Ok(Some(node.clone()));
        }

        let chain = self.chain_names();
        for (position, workspace) in chain.iter().enumerate() {
            let Some(record) = self.store.find_node_by_path(workspace, path).await? else {
                continue;
            };
            if self.loaded.contains_key(record.identifier())
                || self.unit_of_work.is_removed(record.identifier())
                || self.is_shadowed(&record, &chain[..position]).await?
            {
                continue;
            }
            debug!("Resolved {} from workspace {}", path, workspace);
            return Ok(Some(self.adopt(record)));
        }
        Ok(None)
    }

    /// Children of `parent_path` across the chain, sorted by index then path,
    /// ignoring the context filters
    pub(super) async fn raw_children(&mut self, parent_path: &str) -> Result<Vec<ContentNode>> {
        let mut children: Vec<ContentNode> = self
            .loaded
            .values()
            .filter(|node| node.parent_path() == parent_path && !node.is_root())
            .cloned()
            .collect();
        let mut seen_paths: HashSet<String> =
            children.iter().map(|node| node.path().to_string()).collect();

        let chain = self.chain_names();
        for (position, workspace) in chain.iter().enumerate() {
            let records = self
                .store
                .find_nodes_by_parent(workspace, parent_path, None)
                .await?;
            for record in records {
                if self.loaded.contains_key(record.identifier())
                    || self.unit_of_work.is_removed(record.identifier())
                    || seen_paths.contains(record.path())
                    || self.is_shadowed(&record, &chain[..position]).await?
                {
                    continue;
                }
                seen_paths.insert(record.path().to_string());
                children.push(self.adopt(record));
            }
        }

        children.sort_by(|a, b| {
            a.index()
                .cmp(&b.index())
                .then_with(|| a.path().cmp(b.path()))
        });
        Ok(children)
    }

    /// Whether any of the `nearer` workspaces holds a record with the same identifier
    async fn is_shadowed(&self, record: &Node, nearer: &[String]) -> Result<bool> {
        for workspace in nearer {
            if self
                .store
                .has_identifier(workspace, record.identifier())
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The node and all its descendants in pre-order, as (identifier, path)
    pub(super) async fn collect_subtree(&mut self, identifier: &str) -> Result<Vec<(String, String)>> {
        let top = self.load(identifier).await?;
        let mut subtree = Vec::new();
        let mut pending = vec![top];
        while let Some(node) = pending.pop() {
            let children = self.raw_children(node.path()).await?;
            subtree.push((node.identifier().to_string(), node.path().to_string()));
            pending.extend(children.into_iter().rev());
        }
        Ok(subtree)
    }
}
