//! Unit of Work
//!
//! Staging area between session mutations and the store. Nodes are staged as
//! new, dirty or removed; properties are staged per node identifier and
//! property name. Each set remembers insertion order, so a save flushes
//! parents before the children created under them.
//!
//! Registration rules:
//!
//! - a node staged as new is never additionally staged as dirty
//! - staging a node as removed cancels its new and dirty staging along with
//!   any property staging for it
//! - a property staged as new and then removed is simply forgotten
//! - re-setting a property staged as removed stages it as dirty

use crate::models::{Node, NodeAccess};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Identifier-keyed set preserving insertion order
#[derive(Debug, Clone)]
struct OrderedSet<T> {
    next: u64,
    order: BTreeMap<u64, String>,
    entries: HashMap<String, (u64, T)>,
}

impl<T> Default for OrderedSet<T> {
    fn default() -> Self {
        Self {
            next: 0,
            order: BTreeMap::new(),
            entries: HashMap::new(),
        }
    }
}

impl<T> OrderedSet<T> {
    /// Insert or replace; replacing keeps the original position
    fn insert(&mut self, id: &str, value: T) -> bool {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.1 = value;
            return false;
        }
        let seq = self.next;
        self.next += 1;
        self.order.insert(seq, id.to_string());
        self.entries.insert(id.to_string(), (seq, value));
        true
    }

    fn remove(&mut self, id: &str) -> Option<T> {
        let (seq, value) = self.entries.remove(id)?;
        self.order.remove(&seq);
        Some(value)
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn ids(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.order
            .values()
            .filter_map(|id| self.entries.get(id).map(|(_, value)| value))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

type PropertyStaging = HashMap<String, BTreeSet<String>>;

fn stage(staging: &mut PropertyStaging, id: &str, name: &str) {
    staging
        .entry(id.to_string())
        .or_default()
        .insert(name.to_string());
}

fn unstage(staging: &mut PropertyStaging, id: &str, name: &str) -> bool {
    let Some(names) = staging.get_mut(id) else {
        return false;
    };
    let removed = names.remove(name);
    if names.is_empty() {
        staging.remove(id);
    }
    removed
}

fn is_staged(staging: &PropertyStaging, id: &str, name: &str) -> bool {
    staging.get(id).is_some_and(|names| names.contains(name))
}

fn staged_names(staging: &PropertyStaging, id: &str) -> Vec<String> {
    staging
        .get(id)
        .map(|names| names.iter().cloned().collect())
        .unwrap_or_default()
}

fn count(staging: &PropertyStaging) -> usize {
    staging.values().map(BTreeSet::len).sum()
}

/// Counts of everything currently staged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingSummary {
    pub new_nodes: usize,
    pub dirty_nodes: usize,
    pub removed_nodes: usize,
    pub new_properties: usize,
    pub dirty_properties: usize,
    pub removed_properties: usize,
}

impl StagingSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Default, Clone)]
pub struct UnitOfWork {
    new_nodes: OrderedSet<()>,
    dirty_nodes: OrderedSet<()>,
    removed_nodes: OrderedSet<Node>,
    new_properties: PropertyStaging,
    dirty_properties: PropertyStaging,
    removed_properties: PropertyStaging,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    //
    // NODES
    //

    pub fn register_node_as_new(&mut self, identifier: &str) {
        self.dirty_nodes.remove(identifier);
        self.new_nodes.insert(identifier, ());
    }

    /// Returns `false` when the node is already staged as new or removed
    pub fn register_node_as_dirty(&mut self, identifier: &str) -> bool {
        if self.new_nodes.contains(identifier) || self.removed_nodes.contains(identifier) {
            return false;
        }
        self.dirty_nodes.insert(identifier, ());
        true
    }

    /// Stage `node` for deletion, keeping its last state for the flush.
    ///
    /// Property staging of the node is dropped: `NodeStore::delete_node`
    /// deletes the node's property records along with it.
    pub fn register_node_as_removed(&mut self, node: Node) {
        let identifier = node.identifier().to_string();
        self.new_nodes.remove(&identifier);
        self.dirty_nodes.remove(&identifier);
        self.new_properties.remove(&identifier);
        self.dirty_properties.remove(&identifier);
        self.removed_properties.remove(&identifier);
        self.removed_nodes.insert(&identifier, node);
    }

    pub fn is_new(&self, identifier: &str) -> bool {
        self.new_nodes.contains(identifier)
    }

    pub fn is_dirty(&self, identifier: &str) -> bool {
        self.dirty_nodes.contains(identifier)
    }

    pub fn is_removed(&self, identifier: &str) -> bool {
        self.removed_nodes.contains(identifier)
    }

    pub fn new_node_ids(&self) -> Vec<String> {
        self.new_nodes.ids()
    }

    pub fn dirty_node_ids(&self) -> Vec<String> {
        self.dirty_nodes.ids()
    }

    /// Nodes staged for removal, in staging order
    pub fn removed_nodes(&self) -> Vec<Node> {
        self.removed_nodes.values().cloned().collect()
    }

    pub fn clear_new_node(&mut self, identifier: &str) {
        self.new_nodes.remove(identifier);
    }

    pub fn clear_dirty_node(&mut self, identifier: &str) {
        self.dirty_nodes.remove(identifier);
    }

    pub fn clear_removed_node(&mut self, identifier: &str) {
        self.removed_nodes.remove(identifier);
    }

    //
    // PROPERTIES
    //

    pub fn register_property_as_new(&mut self, identifier: &str, name: &str) {
        unstage(&mut self.dirty_properties, identifier, name);
        unstage(&mut self.removed_properties, identifier, name);
        stage(&mut self.new_properties, identifier, name);
    }

    /// Returns `false` when the property is already staged as new
    pub fn register_property_as_dirty(&mut self, identifier: &str, name: &str) -> bool {
        if is_staged(&self.new_properties, identifier, name) {
            return false;
        }
        unstage(&mut self.removed_properties, identifier, name);
        stage(&mut self.dirty_properties, identifier, name);
        true
    }

    /// Returns `false` when this only cancelled a pending creation
    pub fn register_property_as_removed(&mut self, identifier: &str, name: &str) -> bool {
        if unstage(&mut self.new_properties, identifier, name) {
            return false;
        }
        unstage(&mut self.dirty_properties, identifier, name);
        stage(&mut self.removed_properties, identifier, name);
        true
    }

    pub fn is_property_removed(&self, identifier: &str, name: &str) -> bool {
        is_staged(&self.removed_properties, identifier, name)
    }

    pub fn new_property_names(&self, identifier: &str) -> Vec<String> {
        staged_names(&self.new_properties, identifier)
    }

    pub fn dirty_property_names(&self, identifier: &str) -> Vec<String> {
        staged_names(&self.dirty_properties, identifier)
    }

    pub fn removed_property_names(&self, identifier: &str) -> Vec<String> {
        staged_names(&self.removed_properties, identifier)
    }

    pub fn clear_new_property(&mut self, identifier: &str, name: &str) {
        unstage(&mut self.new_properties, identifier, name);
    }

    pub fn clear_dirty_property(&mut self, identifier: &str, name: &str) {
        unstage(&mut self.dirty_properties, identifier, name);
    }

    pub fn clear_removed_property(&mut self, identifier: &str, name: &str) {
        unstage(&mut self.removed_properties, identifier, name);
    }

    //
    // WHOLE UNIT
    //

    pub fn summary(&self) -> StagingSummary {
        StagingSummary {
            new_nodes: self.new_nodes.len(),
            dirty_nodes: self.dirty_nodes.len(),
            removed_nodes: self.removed_nodes.len(),
            new_properties: count(&self.new_properties),
            dirty_properties: count(&self.dirty_properties),
            removed_properties: count(&self.removed_properties),
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.summary().is_empty()
    }

    pub fn clear(&mut self) {
        self.new_nodes.clear();
        self.dirty_nodes.clear();
        self.removed_nodes.clear();
        self.new_properties.clear();
        self.dirty_properties.clear();
        self.removed_properties.clear();
    }
}
