//! Repository
//!
//! Entry point of the content repository: holds the store, the node type and
//! namespace registries and the configured workspaces, and hands out
//! [`Session`]s bound to one workspace.
//!
//! # Examples
//!
//! ```rust
//! use nodetree_core::config::RepositoryConfig;
//! use nodetree_core::models::NodeAccess;
//! use nodetree_core::services::Repository;
//!
//! # tokio_test::block_on(async {
//! let repository = Repository::in_memory(RepositoryConfig::default()).await?;
//! let mut session = repository.login("live").await?;
//! let root = session.root_node().await?;
//! let news = session.create_node(root.identifier(), "news", None, None).await?;
//! session.save().await?;
//! assert_eq!(news.path(), "/news");
//! # Ok::<(), nodetree_core::services::RepositoryError>(())
//! # }).unwrap();
//! ```

use crate::config::RepositoryConfig;
use crate::db::{InMemoryStore, NodeStore};
use crate::models::{Node, NodeType, NodeTypeDeclaration, Workspace};
use crate::services::context::{
    Clock, Context, ContextOptions, SecurityContext, StaticRoles, SystemClock,
};
use crate::services::error::{RepositoryError, Result};
use crate::services::namespace::NamespaceRegistry;
use crate::services::node_type_registry::NodeTypeRegistry;
use crate::services::session::Session;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct Repository {
    config: RepositoryConfig,
    store: Arc<dyn NodeStore>,
    node_types: Arc<NodeTypeRegistry>,
    namespaces: Arc<NamespaceRegistry>,
    workspaces: BTreeMap<String, Arc<Workspace>>,
    clock: Arc<dyn Clock>,
    security: Arc<dyn SecurityContext>,
}

impl Repository {
    /// Build a repository over `store`.
    ///
    /// Node types are taken from the configuration and from the store;
    /// bottom workspaces without a root record get one.
    pub async fn new(config: RepositoryConfig, store: Arc<dyn NodeStore>) -> Result<Self> {
        config.validate()?;

        let node_types = NodeTypeRegistry::new(config.node_types.clone());
        node_types.load_from_store(store.as_ref()).await?;

        let mut workspaces: BTreeMap<String, Arc<Workspace>> = BTreeMap::new();
        for declared in &config.workspaces {
            let workspace = match &declared.base {
                None => Workspace::new(&declared.name),
                Some(base) => {
                    let base = workspaces.get(base).cloned().ok_or_else(|| {
                        RepositoryError::configuration(format!(
                            "base workspace \"{}\" of \"{}\" is unknown",
                            base, declared.name
                        ))
                    })?;
                    Workspace::with_base(&declared.name, base)
                }
            };
            workspaces.insert(declared.name.clone(), Arc::new(workspace));
        }

        for workspace in workspaces.values().filter(|ws| ws.is_bottom()) {
            ensure_root(store.as_ref(), workspace.name()).await?;
        }

        info!(
            "Repository ready with {} workspaces and {} node types",
            workspaces.len(),
            node_types.node_types()?.len()
        );

        Ok(Self {
            config,
            store,
            node_types: Arc::new(node_types),
            namespaces: Arc::new(NamespaceRegistry::new()),
            workspaces,
            clock: Arc::new(SystemClock),
            security: Arc::new(StaticRoles::anonymous()),
        })
    }

    /// Repository over a fresh [`InMemoryStore`]
    pub async fn in_memory(config: RepositoryConfig) -> Result<Self> {
        Self::new(config, Arc::new(InMemoryStore::new())).await
    }

    /// Clock handed to new sessions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Security context handed to new sessions
    pub fn with_security_context(mut self, security: Arc<dyn SecurityContext>) -> Self {
        self.security = security;
        self
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn workspace(&self, name: &str) -> Option<&Arc<Workspace>> {
        self.workspaces.get(name)
    }

    pub fn workspace_names(&self) -> Vec<String> {
        self.workspaces.keys().cloned().collect()
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn node_type_registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.node_types
    }

    pub fn namespace_registry(&self) -> &Arc<NamespaceRegistry> {
        &self.namespaces
    }

    /// Open a session on `workspace` with the configured filter switches
    pub async fn login(&self, workspace: &str) -> Result<Session> {
        self.login_with_options(workspace, self.config.context).await
    }

    /// Open a session on the configured default workspace
    pub async fn login_default(&self) -> Result<Session> {
        self.login(&self.config.default_workspace).await
    }

    pub async fn login_with_options(
        &self,
        workspace: &str,
        options: ContextOptions,
    ) -> Result<Session> {
        if workspace.is_empty() {
            return Err(RepositoryError::invalid_name(workspace));
        }
        let workspace = self
            .workspaces
            .get(workspace)
            .cloned()
            .ok_or_else(|| RepositoryError::item_not_found(format!("workspace {}", workspace)))?;

        info!("Session opened on workspace {}", workspace.name());
        let context = Context::new(workspace, options, self.clock.clone(), self.security.clone());
        Ok(Session::new(
            context,
            self.store.clone(),
            self.node_types.clone(),
            self.namespaces.clone(),
        ))
    }

    /// Declare a node type at runtime; see [`NodeTypeRegistry::register_node_type`]
    pub async fn register_node_type(
        &self,
        name: &str,
        declaration: NodeTypeDeclaration,
    ) -> Result<Arc<NodeType>> {
        self.node_types
            .register_node_type(self.store.as_ref(), name, declaration)
            .await
    }

    pub async fn unregister_node_type(&self, name: &str) -> Result<()> {
        self.node_types
            .unregister_node_type(self.store.as_ref(), name)
            .await
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("workspaces", &self.workspaces.keys().collect::<Vec<_>>())
            .field("default_workspace", &self.config.default_workspace)
            .finish()
    }
}

/// Create the root record of a bottom workspace if it is missing
async fn ensure_root(store: &dyn NodeStore, workspace: &str) -> Result<()> {
    if store.get_root_node(workspace).await?.is_none() {
        store.create_node(Node::root(workspace)).await?;
        info!("Created root node for workspace {}", workspace);
    }
    Ok(())
}
