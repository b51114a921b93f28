//! In-memory NodeStore
//!
//! Reference backend used by tests and embedded setups. Node records and
//! property records live in separate tables behind a single `tokio` lock.
//! Every successful write is appended to an operation log, and a single
//! failure can be injected for the next write of a given kind, which lets
//! tests observe exactly what a save flushed and how it behaves when the
//! backend gives up halfway.

use crate::db::error::StoreError;
use crate::db::node_store::{DeleteResult, NodeStore, NodeTypeRecord};
use crate::models::{Node, NodeAccess, PropertyRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

type RecordKey = (String, String);

/// Kind of a write operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperationKind {
    CreateNode,
    UpdateNode,
    DeleteNode,
    CreateProperty,
    UpdateProperty,
    DeleteProperty,
}

impl fmt::Display for StoreOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateNode => "create_node",
            Self::UpdateNode => "update_node",
            Self::DeleteNode => "delete_node",
            Self::CreateProperty => "create_property",
            Self::UpdateProperty => "update_property",
            Self::DeleteProperty => "delete_property",
        };
        f.write_str(name)
    }
}

/// One logged write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    CreateNode { workspace: String, identifier: String },
    UpdateNode { workspace: String, identifier: String },
    DeleteNode { workspace: String, identifier: String },
    CreateProperty { workspace: String, identifier: String, name: String },
    UpdateProperty { workspace: String, identifier: String, name: String },
    DeleteProperty { workspace: String, identifier: String, name: String },
}

impl StoreOperation {
    pub fn kind(&self) -> StoreOperationKind {
        match self {
            Self::CreateNode { .. } => StoreOperationKind::CreateNode,
            Self::UpdateNode { .. } => StoreOperationKind::UpdateNode,
            Self::DeleteNode { .. } => StoreOperationKind::DeleteNode,
            Self::CreateProperty { .. } => StoreOperationKind::CreateProperty,
            Self::UpdateProperty { .. } => StoreOperationKind::UpdateProperty,
            Self::DeleteProperty { .. } => StoreOperationKind::DeleteProperty,
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::CreateNode { identifier, .. }
            | Self::UpdateNode { identifier, .. }
            | Self::DeleteNode { identifier, .. }
            | Self::CreateProperty { identifier, .. }
            | Self::UpdateProperty { identifier, .. }
            | Self::DeleteProperty { identifier, .. } => identifier,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    nodes: HashMap<RecordKey, Node>,
    properties: HashMap<RecordKey, BTreeMap<String, PropertyRecord>>,
    node_types: BTreeMap<String, NodeTypeRecord>,
    operations: Vec<StoreOperation>,
    fail_next: Option<StoreOperationKind>,
}

impl StoreState {
    fn check_fault(&mut self, kind: StoreOperationKind) -> Result<()> {
        if self.fail_next == Some(kind) {
            self.fail_next = None;
            return Err(StoreError::injected(kind.to_string()).into());
        }
        Ok(())
    }

    /// Node record with its property records folded in
    fn joined(&self, key: &RecordKey) -> Option<Node> {
        let mut node = self.nodes.get(key)?.clone();
        if let Some(properties) = self.properties.get(key) {
            let inline = node.inline_properties_mut();
            for (name, record) in properties {
                inline.insert(name.clone(), record.value.clone());
            }
        }
        Some(node)
    }

    fn references_to<'a>(
        &'a self,
        workspace: &'a str,
        identifier: &'a str,
    ) -> impl Iterator<Item = &'a PropertyRecord> + 'a {
        self.properties
            .iter()
            .filter(move |((ws, _), _)| ws == workspace)
            .flat_map(|(_, properties)| properties.values())
            .filter(move |record| record.reference_target() == Some(identifier))
    }
}

fn key(workspace: &str, identifier: &str) -> RecordKey {
    (workspace.to_string(), identifier.to_string())
}

/// Strip inline properties; they are persisted as separate records
fn bare(mut node: Node) -> Node {
    node.inline_properties_mut().clear();
    node
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    disconnects: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write of `kind` fail
    pub async fn fail_next(&self, kind: StoreOperationKind) {
        self.state.write().await.fail_next = Some(kind);
    }

    /// All successful writes so far, oldest first
    pub async fn operations(&self) -> Vec<StoreOperation> {
        self.state.read().await.operations.clone()
    }

    pub async fn clear_operations(&self) {
        self.state.write().await.operations.clear();
    }

    /// Number of node records stored for `workspace`
    pub async fn node_count(&self, workspace: &str) -> usize {
        self.state
            .read()
            .await
            .nodes
            .keys()
            .filter(|(ws, _)| ws == workspace)
            .count()
    }

    /// Property records of one node
    pub async fn property_records(&self, workspace: &str, identifier: &str) -> Vec<PropertyRecord> {
        self.state
            .read()
            .await
            .properties
            .get(&key(workspace, identifier))
            .map(|properties| properties.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeStore for InMemoryStore {
    async fn get_root_node(&self, workspace: &str) -> Result<Option<Node>> {
        self.find_node_by_path(workspace, crate::utils::ROOT_PATH).await
    }

    async fn get_node_by_identifier(
        &self,
        workspace: &str,
        identifier: &str,
    ) -> Result<Option<Node>> {
        Ok(self.state.read().await.joined(&key(workspace, identifier)))
    }

    async fn find_node_by_path(&self, workspace: &str, path: &str) -> Result<Option<Node>> {
        let state = self.state.read().await;
        let found = state
            .nodes
            .iter()
            .find(|((ws, _), node)| ws == workspace && node.path() == path)
            .map(|(key, _)| key.clone());
        Ok(found.and_then(|key| state.joined(&key)))
    }

    async fn find_nodes_by_parent(
        &self,
        workspace: &str,
        parent_path: &str,
        node_type: Option<&str>,
    ) -> Result<Vec<Node>> {
        let state = self.state.read().await;
        let mut children: Vec<Node> = state
            .nodes
            .iter()
            .filter(|((ws, _), node)| {
                ws == workspace
                    && node.parent_path() == parent_path
                    && node.path() != parent_path
                    && node_type.map_or(true, |t| node.node_type() == t)
            })
            .filter_map(|(key, _)| state.joined(key))
            .collect();
        children.sort_by(|a, b| a.index().cmp(&b.index()).then_with(|| a.path().cmp(b.path())));
        Ok(children)
    }

    async fn find_first_node_by_parent(
        &self,
        workspace: &str,
        parent_path: &str,
        node_type: Option<&str>,
    ) -> Result<Option<Node>> {
        let children = self
            .find_nodes_by_parent(workspace, parent_path, node_type)
            .await?;
        Ok(children.into_iter().next())
    }

    async fn has_identifier(&self, workspace: &str, identifier: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .nodes
            .contains_key(&key(workspace, identifier)))
    }

    async fn create_node(&self, node: Node) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_fault(StoreOperationKind::CreateNode)?;
        let record_key = key(node.workspace(), node.identifier());
        if state.nodes.contains_key(&record_key) {
            return Err(StoreError::duplicate("node", format!("{:?}", record_key)).into());
        }
        state.operations.push(StoreOperation::CreateNode {
            workspace: record_key.0.clone(),
            identifier: record_key.1.clone(),
        });
        state.nodes.insert(record_key, bare(node));
        Ok(())
    }

    async fn update_node(&self, node: Node) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_fault(StoreOperationKind::UpdateNode)?;
        let record_key = key(node.workspace(), node.identifier());
        if !state.nodes.contains_key(&record_key) {
            return Err(StoreError::not_found("node", format!("{:?}", record_key)).into());
        }
        state.operations.push(StoreOperation::UpdateNode {
            workspace: record_key.0.clone(),
            identifier: record_key.1.clone(),
        });
        state.nodes.insert(record_key, bare(node));
        Ok(())
    }

    async fn delete_node(&self, workspace: &str, identifier: &str) -> Result<DeleteResult> {
        let mut state = self.state.write().await;
        state.check_fault(StoreOperationKind::DeleteNode)?;
        let record_key = key(workspace, identifier);
        state.properties.remove(&record_key);
        let existed = state.nodes.remove(&record_key).is_some();
        state.operations.push(StoreOperation::DeleteNode {
            workspace: workspace.to_string(),
            identifier: identifier.to_string(),
        });
        Ok(if existed {
            DeleteResult::existed()
        } else {
            DeleteResult::not_found()
        })
    }

    async fn create_property(&self, property: PropertyRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_fault(StoreOperationKind::CreateProperty)?;
        let record_key = key(&property.workspace, &property.node_identifier);
        let properties = state.properties.entry(record_key.clone()).or_default();
        if properties.contains_key(&property.name) {
            return Err(StoreError::duplicate(
                "property",
                format!("{:?}/{}", record_key, property.name),
            )
            .into());
        }
        let operation = StoreOperation::CreateProperty {
            workspace: property.workspace.clone(),
            identifier: property.node_identifier.clone(),
            name: property.name.clone(),
        };
        properties.insert(property.name.clone(), property);
        state.operations.push(operation);
        Ok(())
    }

    async fn update_property(&self, property: PropertyRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_fault(StoreOperationKind::UpdateProperty)?;
        let record_key = key(&property.workspace, &property.node_identifier);
        let Some(existing) = state
            .properties
            .get_mut(&record_key)
            .and_then(|properties| properties.get_mut(&property.name))
        else {
            return Err(StoreError::not_found(
                "property",
                format!("{:?}/{}", record_key, property.name),
            )
            .into());
        };
        let operation = StoreOperation::UpdateProperty {
            workspace: property.workspace.clone(),
            identifier: property.node_identifier.clone(),
            name: property.name.clone(),
        };
        *existing = property;
        state.operations.push(operation);
        Ok(())
    }

    async fn delete_property(
        &self,
        workspace: &str,
        node_identifier: &str,
        name: &str,
    ) -> Result<DeleteResult> {
        let mut state = self.state.write().await;
        state.check_fault(StoreOperationKind::DeleteProperty)?;
        let existed = state
            .properties
            .get_mut(&key(workspace, node_identifier))
            .and_then(|properties| properties.remove(name))
            .is_some();
        state.operations.push(StoreOperation::DeleteProperty {
            workspace: workspace.to_string(),
            identifier: node_identifier.to_string(),
            name: name.to_string(),
        });
        Ok(if existed {
            DeleteResult::existed()
        } else {
            DeleteResult::not_found()
        })
    }

    async fn is_reference_target(&self, workspace: &str, identifier: &str) -> Result<bool> {
        let state = self.state.read().await;
        let referenced = state.references_to(workspace, identifier).next().is_some();
        Ok(referenced)
    }

    async fn find_referrers(
        &self,
        workspace: &str,
        identifier: &str,
    ) -> Result<Vec<PropertyRecord>> {
        let state = self.state.read().await;
        let referrers = state.references_to(workspace, identifier).cloned().collect();
        Ok(referrers)
    }

    async fn load_node_types(&self) -> Result<Vec<NodeTypeRecord>> {
        Ok(self.state.read().await.node_types.values().cloned().collect())
    }

    async fn save_node_type(&self, record: NodeTypeRecord) -> Result<()> {
        self.state
            .write()
            .await
            .node_types
            .insert(record.name.clone(), record);
        Ok(())
    }

    async fn delete_node_type(&self, name: &str) -> Result<DeleteResult> {
        let existed = self.state.write().await.node_types.remove(name).is_some();
        Ok(if existed {
            DeleteResult::existed()
        } else {
            DeleteResult::not_found()
        })
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyType;
    use serde_json::json;

    fn property(node: &Node, name: &str, value: serde_json::Value, t: PropertyType) -> PropertyRecord {
        PropertyRecord {
            node_identifier: node.identifier().to_string(),
            workspace: node.workspace().to_string(),
            name: name.to_string(),
            value,
            property_type: t,
        }
    }

    async fn seeded() -> (InMemoryStore, Node, Node, Node) {
        let store = InMemoryStore::new();
        let root = Node::root("live");
        let mut b = Node::new("/b", "live", None).unwrap();
        b.set_index(1);
        let mut a = Node::new("/a", "live", None).unwrap();
        a.set_node_type("page");
        store.create_node(root.clone()).await.unwrap();
        store.create_node(b.clone()).await.unwrap();
        store.create_node(a.clone()).await.unwrap();
        (store, root, a, b)
    }

    #[tokio::test]
    async fn test_children_are_ordered_and_exclude_root() {
        let (store, root, a, b) = seeded().await;

        let children = store.find_nodes_by_parent("live", "/", None).await.unwrap();
        let ids: Vec<&str> = children.iter().map(|n| n.identifier()).collect();
        assert_eq!(ids, vec![a.identifier(), b.identifier()]);
        assert!(!ids.contains(&root.identifier()));

        let pages = store.find_nodes_by_parent("live", "/", Some("page")).await.unwrap();
        assert_eq!(pages.len(), 1);
        let first = store.find_first_node_by_parent("live", "/", None).await.unwrap();
        assert_eq!(first.unwrap().identifier(), a.identifier());
        assert!(store.find_nodes_by_parent("other", "/", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_properties_are_joined_and_cascade_on_delete() {
        let (store, _, a, _) = seeded().await;
        store
            .create_property(property(&a, "title", json!("A"), PropertyType::String))
            .await
            .unwrap();

        let loaded = store.get_node_by_identifier("live", a.identifier()).await.unwrap().unwrap();
        assert_eq!(loaded.get_property("title").unwrap(), Some(json!("A")));

        assert!(store.delete_node("live", a.identifier()).await.unwrap().existed);
        assert!(store.property_records("live", a.identifier()).await.is_empty());
        assert!(!store.delete_node("live", a.identifier()).await.unwrap().existed);
    }

    #[tokio::test]
    async fn test_node_records_do_not_carry_inline_properties() {
        let store = InMemoryStore::new();
        let mut node = Node::new("/a", "live", None).unwrap();
        node.set_property("title", json!("not persisted")).unwrap();
        store.create_node(node.clone()).await.unwrap();

        let loaded = store.get_node_by_identifier("live", node.identifier()).await.unwrap().unwrap();
        assert!(loaded.properties().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_records_are_errors() {
        let (store, _, a, _) = seeded().await;
        assert!(store.create_node(a.clone()).await.is_err());

        let ghost = Node::new("/ghost", "live", None).unwrap();
        assert!(store.update_node(ghost.clone()).await.is_err());
        let err = store
            .update_property(property(&ghost, "x", json!(1), PropertyType::Long))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::RecordNotFound { kind: "property", .. })
        ));
    }

    #[tokio::test]
    async fn test_reference_lookup() {
        let (store, _, a, b) = seeded().await;
        store
            .create_property(property(&a, "link", json!(b.identifier()), PropertyType::Reference))
            .await
            .unwrap();
        store
            .create_property(property(&a, "text", json!(b.identifier()), PropertyType::String))
            .await
            .unwrap();

        assert!(store.is_reference_target("live", b.identifier()).await.unwrap());
        assert!(!store.is_reference_target("user", b.identifier()).await.unwrap());
        let referrers = store.find_referrers("live", b.identifier()).await.unwrap();
        assert_eq!(referrers.len(), 1);
        assert_eq!(referrers[0].name, "link");
    }

    #[tokio::test]
    async fn test_injected_failure_hits_once_and_is_not_logged() {
        let store = InMemoryStore::new();
        store.fail_next(StoreOperationKind::CreateNode).await;

        let node = Node::new("/a", "live", None).unwrap();
        let err = store.create_node(node.clone()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InjectedFailure { .. })
        ));
        assert!(store.operations().await.is_empty());

        store.create_node(node).await.unwrap();
        assert_eq!(store.operations().await.len(), 1);
        assert_eq!(store.operations().await[0].kind(), StoreOperationKind::CreateNode);
    }

    #[tokio::test]
    async fn test_node_type_records() {
        let store = InMemoryStore::new();
        store
            .save_node_type(NodeTypeRecord {
                name: "page".into(),
                declaration: json!({ "superTypes": ["document"] }),
                is_mixin: false,
            })
            .await
            .unwrap();
        assert_eq!(store.load_node_types().await.unwrap().len(), 1);
        assert!(store.delete_node_type("page").await.unwrap().existed);
        assert!(store.load_node_types().await.unwrap().is_empty());
    }
}
