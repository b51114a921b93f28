//! Node Type Registry
//!
//! Resolves node type declarations into [`NodeType`]s. Resolution is lazy and
//! memoized: the first lookup of a type resolves its supertypes depth-first
//! (in declaration order), merges their configurations recursively and lays
//! the type's own configuration over the result. Later supertypes win over
//! earlier ones; the type itself wins over all of them.
//!
//! Declarations come from configuration and from the store, where types
//! registered at runtime are persisted.

use crate::db::{NodeStore, NodeTypeRecord};
use crate::models::{NodeType, NodeTypeDeclaration, UNSTRUCTURED};
use crate::services::error::{RepositoryError, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct NodeTypeRegistry {
    declarations: RwLock<BTreeMap<String, NodeTypeDeclaration>>,
    resolved: RwLock<HashMap<String, Arc<NodeType>>>,
}

impl NodeTypeRegistry {
    /// Registry over `declarations`; the unstructured type is always available
    pub fn new(mut declarations: BTreeMap<String, NodeTypeDeclaration>) -> Self {
        declarations
            .entry(UNSTRUCTURED.to_string())
            .or_default();
        Self {
            declarations: RwLock::new(declarations),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Registry over a JSON object mapping type names to declarations
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            RepositoryError::configuration("node type configuration must be an object")
        })?;
        let mut declarations = BTreeMap::new();
        for (name, declaration) in object {
            declarations.insert(name.clone(), parse_declaration(name, declaration.clone())?);
        }
        Ok(Self::new(declarations))
    }

    /// Add declarations persisted in the store; they replace configured ones
    /// of the same name. Returns the number of declarations loaded.
    pub async fn load_from_store(&self, store: &dyn NodeStore) -> Result<usize> {
        let records = store.load_node_types().await?;
        let count = records.len();
        {
            let mut declarations = self.declarations_mut();
            for record in records {
                let declaration = parse_declaration(&record.name, record.declaration)?;
                declarations.insert(record.name, declaration);
            }
        }
        self.invalidate();
        debug!("Loaded {} node type declarations from store", count);
        Ok(count)
    }

    /// Resolved node type
    pub fn get_node_type(&self, name: &str) -> Result<Arc<NodeType>> {
        self.resolve(name, &mut Vec::new())
    }

    /// Whether `name` is declared and resolves cleanly
    pub fn has_node_type(&self, name: &str) -> bool {
        self.get_node_type(name).is_ok()
    }

    /// Every declared type, sorted by name
    pub fn node_types(&self) -> Result<Vec<Arc<NodeType>>> {
        let names: Vec<String> = self.declarations().keys().cloned().collect();
        names.iter().map(|name| self.get_node_type(name)).collect()
    }

    /// Declared types that are not mixins
    pub fn primary_node_types(&self) -> Result<Vec<Arc<NodeType>>> {
        Ok(self
            .node_types()?
            .into_iter()
            .filter(|node_type| !node_type.is_mixin())
            .collect())
    }

    pub fn mixin_node_types(&self) -> Result<Vec<Arc<NodeType>>> {
        Ok(self
            .node_types()?
            .into_iter()
            .filter(|node_type| node_type.is_mixin())
            .collect())
    }

    /// All types inheriting directly or indirectly from `super_type`, excluding itself
    pub fn sub_node_types(&self, super_type: &str) -> Result<Vec<Arc<NodeType>>> {
        Ok(self
            .node_types()?
            .into_iter()
            .filter(|node_type| {
                node_type.name() != super_type && node_type.is_of_type(super_type)
            })
            .collect())
    }

    /// Merged configuration of every declared type
    pub fn full_configuration(&self) -> Result<BTreeMap<String, Map<String, Value>>> {
        Ok(self
            .node_types()?
            .into_iter()
            .map(|node_type| (node_type.name().to_string(), node_type.configuration().clone()))
            .collect())
    }

    /// Whether a node of type `node_type` passes a type filter.
    ///
    /// The filter is a comma separated list of type names; names prefixed
    /// with `!` exclude. Subtypes match their supertypes' names.
    pub fn matches_filter(&self, node_type: &str, filter: &str) -> bool {
        let resolved = self.get_node_type(node_type).ok();
        let is_of = |name: &str| match &resolved {
            Some(resolved) => resolved.is_of_type(name),
            None => node_type == name,
        };

        let mut has_positive = false;
        let mut matched = false;
        for entry in filter.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some(excluded) = entry.strip_prefix('!') {
                if is_of(excluded) {
                    return false;
                }
            } else {
                has_positive = true;
                matched |= is_of(entry);
            }
        }
        !has_positive || matched
    }

    /// Declare a new type at runtime and persist the declaration
    pub async fn register_node_type(
        &self,
        store: &dyn NodeStore,
        name: &str,
        declaration: NodeTypeDeclaration,
    ) -> Result<Arc<NodeType>> {
        if self.declarations().contains_key(name) {
            return Err(RepositoryError::InvalidNodeTypeDeclaration {
                name: name.to_string(),
                reason: "a node type with this name is already registered".to_string(),
            });
        }

        self.declarations_mut()
            .insert(name.to_string(), declaration.clone());
        let node_type = match self.get_node_type(name) {
            Ok(node_type) => node_type,
            Err(e) => {
                self.declarations_mut().remove(name);
                return Err(e);
            }
        };

        let record = NodeTypeRecord {
            name: name.to_string(),
            declaration: serde_json::to_value(&declaration).map_err(|e| {
                RepositoryError::InvalidNodeTypeDeclaration {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?,
            is_mixin: declaration.is_mixin,
        };
        if let Err(e) = store.save_node_type(record).await {
            self.declarations_mut().remove(name);
            self.invalidate();
            return Err(e.into());
        }

        info!("Registered node type {}", name);
        Ok(node_type)
    }

    /// Drop a type declared at runtime or in configuration
    pub async fn unregister_node_type(&self, store: &dyn NodeStore, name: &str) -> Result<()> {
        if self.declarations_mut().remove(name).is_none() {
            return Err(RepositoryError::node_type_not_found(name));
        }
        self.invalidate();
        store.delete_node_type(name).await?;
        info!("Unregistered node type {}", name);
        Ok(())
    }

    /// Creating types outside of declarations is not supported
    pub fn create_node_type(&self, name: &str) -> Result<Arc<NodeType>> {
        Err(RepositoryError::unsupported(format!(
            "create node type \"{}\" (declare it in configuration or register it)",
            name
        )))
    }

    fn resolve(&self, name: &str, stack: &mut Vec<String>) -> Result<Arc<NodeType>> {
        if let Some(node_type) = self.resolved_read().get(name) {
            return Ok(node_type.clone());
        }
        if stack.iter().any(|entry| entry == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(RepositoryError::CyclicNodeType { chain });
        }

        let declaration = self
            .declarations()
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::node_type_not_found(name))?;

        stack.push(name.to_string());
        let mut configuration = Map::new();
        let mut ancestors = BTreeSet::new();
        for super_name in &declaration.super_types {
            let super_type = self.resolve(super_name, stack)?;
            merge_configuration(&mut configuration, super_type.configuration());
            ancestors.insert(super_name.clone());
            ancestors.extend(super_type.ancestors().iter().cloned());
        }
        stack.pop();
        merge_configuration(&mut configuration, &declaration.configuration);

        let node_type = Arc::new(NodeType::new(
            name.to_string(),
            &declaration,
            ancestors,
            configuration,
        ));
        debug!("Resolved node type {}", name);
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), node_type.clone());
        Ok(node_type)
    }

    fn invalidate(&self) {
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn declarations(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, NodeTypeDeclaration>> {
        self.declarations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn declarations_mut(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, NodeTypeDeclaration>> {
        self.declarations.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolved_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<NodeType>>> {
        self.resolved.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_declaration(name: &str, value: Value) -> Result<NodeTypeDeclaration> {
    serde_json::from_value(value).map_err(|e| RepositoryError::InvalidNodeTypeDeclaration {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Recursively merge `overlay` into `target`: nested objects are merged key by
/// key, any other value in `overlay` replaces the one in `target`
pub fn merge_configuration(target: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_configuration(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
