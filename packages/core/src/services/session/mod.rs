//! Session
//!
//! A session is the single-writer view of one workspace. It owns
//!
//! - an identity cache of every node it has loaded, keyed by identifier, so
//!   repeated lookups hand out the same logical node
//! - the [`UnitOfWork`] holding everything staged since the last save
//! - local namespace remappings layered over the repository's registry
//!
//! Navigation reads through the workspace chain (see `navigation`); tree
//! mutations (`mutation`, `ordering`) go through the session so it can
//! materialize inherited nodes, stage the change and emit events in one
//! place; `persistence` flushes the staged changes to the store.
//!
//! Sessions are not shared between tasks: every method takes `&mut self`.

mod mutation;
mod navigation;
mod ordering;
mod persistence;

pub use navigation::Item;

use crate::db::{NodeStore, SessionEvent};
use crate::models::{ContentNode, Node, NodeAccess, Workspace};
use crate::services::context::Context;
use crate::services::error::{RepositoryError, Result};
use crate::services::namespace::{validate_mapping, NamespaceRegistry};
use crate::services::node_type_registry::NodeTypeRegistry;
use crate::services::unit_of_work::{StagingSummary, UnitOfWork};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the session event channel
const SESSION_EVENT_CHANNEL_CAPACITY: usize = 128;

pub struct Session {
    context: Context,
    store: Arc<dyn NodeStore>,
    node_types: Arc<NodeTypeRegistry>,
    namespaces: Arc<NamespaceRegistry>,
    unit_of_work: UnitOfWork,
    loaded: HashMap<String, ContentNode>,
    local_namespaces: BTreeMap<String, String>,
    live: bool,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub(crate) fn new(
        context: Context,
        store: Arc<dyn NodeStore>,
        node_types: Arc<NodeTypeRegistry>,
        namespaces: Arc<NamespaceRegistry>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(SESSION_EVENT_CHANNEL_CAPACITY);
        Self {
            context,
            store,
            node_types,
            namespaces,
            unit_of_work: UnitOfWork::new(),
            loaded: HashMap::new(),
            local_namespaces: BTreeMap::new(),
            live: true,
            event_tx,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        self.context.workspace()
    }

    pub fn node_type_registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.node_types
    }

    /// False once the session has been logged out
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Staged changes, read-only
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.unit_of_work
    }

    pub fn has_pending_changes(&self) -> bool {
        self.unit_of_work.has_pending_changes()
    }

    pub fn pending_changes(&self) -> StagingSummary {
        self.unit_of_work.summary()
    }

    /// Whether the identity cache holds the node
    pub fn is_loaded(&self, identifier: &str) -> bool {
        self.loaded.contains_key(identifier)
    }

    /// Subscribe to the events this session emits
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// End the session.
    ///
    /// Disconnects from the store and drops the identity cache together with
    /// anything staged but not saved; every later call fails with
    /// [`RepositoryError::SessionClosed`].
    pub async fn logout(&mut self) -> Result<()> {
        self.ensure_live()?;
        let dropped = self.unit_of_work.summary();
        self.store.disconnect().await?;
        self.live = false;
        self.loaded.clear();
        self.unit_of_work.clear();
        info!(
            "Logged out of workspace {} ({} new, {} dirty, {} removed nodes dropped)",
            self.workspace().name(),
            dropped.new_nodes,
            dropped.dirty_nodes,
            dropped.removed_nodes
        );
        Ok(())
    }

    //
    // NAMESPACES
    //

    /// Map `prefix` to `uri` for this session only.
    ///
    /// A URI has at most one local prefix: an existing local prefix for `uri`
    /// is dropped first.
    pub fn set_namespace_prefix(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.ensure_live()?;
        validate_mapping(prefix, uri)?;
        self.local_namespaces.retain(|_, mapped| mapped != uri);
        self.local_namespaces
            .insert(prefix.to_string(), uri.to_string());
        Ok(())
    }

    /// All prefixes visible in this session
    pub fn get_namespace_prefixes(&mut self) -> Result<Vec<String>> {
        self.ensure_live()?;
        for prefix in self.namespaces.prefixes() {
            self.load_namespace_from_prefix(&prefix)?;
        }
        Ok(self.local_namespaces.keys().cloned().collect())
    }

    pub fn get_namespace_uri(&mut self, prefix: &str) -> Result<String> {
        self.ensure_live()?;
        self.load_namespace_from_prefix(prefix)?;
        self.local_namespaces.get(prefix).cloned().ok_or_else(|| {
            RepositoryError::namespace(format!("Prefix \"{}\" is not mapped in this session", prefix))
        })
    }

    pub fn get_namespace_prefix(&mut self, uri: &str) -> Result<String> {
        self.ensure_live()?;
        if let Some(prefix) = self.local_prefix_for(uri) {
            return Ok(prefix);
        }
        let prefix = self.namespaces.prefix(uri)?;
        if !self.local_namespaces.contains_key(&prefix) {
            self.local_namespaces.insert(prefix.clone(), uri.to_string());
            return Ok(prefix);
        }
        Err(RepositoryError::namespace(format!(
            "URI \"{}\" is not mapped in this session",
            uri
        )))
    }

    /// Copy a global mapping into the local table unless the prefix or the
    /// URI is already mapped locally
    fn load_namespace_from_prefix(&mut self, prefix: &str) -> Result<()> {
        if self.local_namespaces.contains_key(prefix) {
            return Ok(());
        }
        let uri = self.namespaces.uri(prefix)?;
        if self.local_prefix_for(&uri).is_none() {
            self.local_namespaces.insert(prefix.to_string(), uri);
        }
        Ok(())
    }

    fn local_prefix_for(&self, uri: &str) -> Option<String> {
        self.local_namespaces
            .iter()
            .find(|(_, mapped)| *mapped == uri)
            .map(|(prefix, _)| prefix.clone())
    }

    //
    // UNSUPPORTED SURFACE
    //

    pub fn refresh(&mut self, _keep_changes: bool) -> Result<()> {
        Err(RepositoryError::unsupported("refresh"))
    }

    pub fn impersonate(&self, _user: &str) -> Result<Session> {
        Err(RepositoryError::unsupported("impersonate"))
    }

    pub fn import_xml(&mut self, _parent_path: &str, _document: &str) -> Result<()> {
        Err(RepositoryError::unsupported("import_xml"))
    }

    pub fn export_system_view(&self, _path: &str) -> Result<String> {
        Err(RepositoryError::unsupported("export_system_view"))
    }

    pub fn export_document_view(&self, _path: &str) -> Result<String> {
        Err(RepositoryError::unsupported("export_document_view"))
    }

    pub fn checkin(&mut self, _path: &str) -> Result<()> {
        Err(RepositoryError::unsupported("versioning"))
    }

    pub fn lock(&mut self, _path: &str) -> Result<()> {
        Err(RepositoryError::unsupported("locking"))
    }

    pub fn add_hold(&mut self, _path: &str, _name: &str) -> Result<()> {
        Err(RepositoryError::unsupported("retention"))
    }

    //
    // SHARED HELPERS
    //

    fn ensure_live(&self) -> Result<()> {
        if self.live {
            Ok(())
        } else {
            Err(RepositoryError::SessionClosed)
        }
    }

    fn workspace_name(&self) -> String {
        self.context.workspace().name().to_string()
    }

    /// Workspace names to read through, nearest first
    fn chain_names(&self) -> Vec<String> {
        self.context.workspace().chain_names()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Snapshot of a cached node
    fn cached(&self, identifier: &str) -> Result<ContentNode> {
        self.loaded
            .get(identifier)
            .cloned()
            .ok_or_else(|| RepositoryError::item_not_found(format!("node {}", identifier)))
    }

    /// Cache a record read from the store, wrapping inherited ones
    fn adopt(&mut self, record: Node) -> ContentNode {
        let node = ContentNode::for_workspace(record, self.context.workspace().name());
        self.loaded
            .insert(node.identifier().to_string(), node.clone());
        node
    }

    /// Cache a node created in this session and stage it with its properties
    fn stage_new(&mut self, node: Node) -> ContentNode {
        let identifier = node.identifier().to_string();
        self.unit_of_work.register_node_as_new(&identifier);
        for name in node.inline_properties().keys() {
            self.unit_of_work.register_property_as_new(&identifier, name);
        }
        debug!("Staged new node {} at {}", identifier, node.path());
        let node = ContentNode::Direct(node);
        self.loaded.insert(identifier, node.clone());
        node
    }

    /// Stage the clone an overlay just got as a new record
    fn stage_materialized(&mut self, identifier: &str) -> Result<()> {
        let node = self.cached(identifier)?;
        self.unit_of_work.register_node_as_new(identifier);
        for name in node.record().inline_properties().keys() {
            self.unit_of_work.register_property_as_new(identifier, name);
        }
        let workspace = self.workspace_name();
        debug!("Materialized {} in workspace {}", identifier, workspace);
        self.emit(SessionEvent::NodeMaterialized {
            identifier: identifier.to_string(),
            workspace,
        });
        Ok(())
    }

    /// Apply `change` to the writable record of a cached node.
    ///
    /// An inherited node is materialized first; the clone is staged even when
    /// `change` fails so the cache never holds an unstaged clone. Returns the
    /// closure's result and whether this call materialized the node.
    fn modify<R>(
        &mut self,
        identifier: &str,
        change: impl FnOnce(&mut Node) -> Result<R>,
    ) -> Result<(R, bool)> {
        let workspace = self.workspace_name();
        let (result, fresh) = {
            let entry = self
                .loaded
                .get_mut(identifier)
                .ok_or_else(|| RepositoryError::item_not_found(format!("node {}", identifier)))?;
            let (node, fresh) = entry.writable(&workspace);
            (change(node), fresh)
        };
        if fresh {
            self.stage_materialized(identifier)?;
        }
        Ok((result?, fresh))
    }

    /// [`Session::modify`] for node-level fields; stages the node as dirty
    /// when `change` reports a change
    fn touch(
        &mut self,
        identifier: &str,
        change: impl FnOnce(&mut Node) -> Result<bool>,
    ) -> Result<bool> {
        let (changed, _) = self.modify(identifier, change)?;
        if changed {
            self.unit_of_work.register_node_as_dirty(identifier);
        }
        Ok(changed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("workspace", &self.context.workspace().name())
            .field("live", &self.live)
            .field("loaded", &self.loaded.len())
            .field("pending", &self.unit_of_work.summary())
            .finish()
    }
}
