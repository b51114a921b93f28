//! Node Data Structures
//!
//! A [`Node`] is one record of the hierarchy in one workspace: its place in
//! the tree (path, parent path, depth, sibling index), its type, its
//! properties and its visibility settings.
//!
//! # Property storage
//!
//! Properties normally live in the node's own map. Attaching a content object
//! switches the node to delegated storage: reads and writes then go to the
//! object's accessors while the inline map is retained untouched, ready to be
//! used again once the object is detached.
//!
//! # Reading nodes
//!
//! All read access goes through the [`NodeAccess`] trait, implemented by plain
//! nodes as well as by the overlay wrappers a session hands out for records
//! inherited from a base workspace.
//!
//! ```rust
//! use nodetree_core::models::{Node, NodeAccess};
//! use serde_json::json;
//!
//! let mut node = Node::new("/sites/news", "live", None).unwrap();
//! node.set_property("title", json!("<b>Latest</b> news")).unwrap();
//!
//! assert_eq!(node.parent_path(), "/sites");
//! assert_eq!(node.depth(), 2);
//! assert_eq!(node.label(), "Latest news");
//! ```

use crate::models::content_object::SharedContentObject;
use crate::models::node_type::UNSTRUCTURED;
use crate::services::context::{SecurityContext, EVERYBODY_ROLE};
use crate::services::error::{RepositoryError, Result};
use crate::utils::{self, crop, strip_tags};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Labels are cropped to this many characters
pub const LABEL_MAXIMUM_CHARACTERS: usize = 30;

/// Abstracts are cropped to this many characters
pub const ABSTRACT_MAXIMUM_CHARACTERS: usize = 253;

/// Where a node's properties are read from and written to
#[derive(Debug, Clone)]
pub enum PropertyStorage {
    Inline(Map<String, Value>),
    Delegated {
        object: SharedContentObject,
        retained: Map<String, Value>,
    },
}

/// Effect of a property write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    /// Inline value was already equal, or the content object refused the write
    Unchanged,
    /// Inline property did not exist before
    Added,
    /// Inline property existed with another value
    Updated,
    /// Written through to the attached content object
    Delegated,
}

/// One node record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "NodeRecord", try_from = "NodeRecord")]
pub struct Node {
    identifier: String,
    path: String,
    parent_path: String,
    depth: usize,
    workspace: String,
    index: u32,
    node_type: String,
    storage: PropertyStorage,
    removed: bool,
    hidden: bool,
    hidden_before: Option<DateTime<Utc>>,
    hidden_after: Option<DateTime<Utc>>,
    hidden_in_index: bool,
    access_roles: Vec<String>,
}

impl Node {
    /// Create a node record at `path` in `workspace`.
    ///
    /// A fresh v4 UUID is generated when no identifier is given.
    pub fn new(
        path: impl Into<String>,
        workspace: impl Into<String>,
        identifier: Option<String>,
    ) -> Result<Self> {
        let path = path.into();
        utils::validate_path(&path)?;
        Ok(Self {
            identifier: identifier.unwrap_or_else(|| Uuid::new_v4().to_string()),
            parent_path: utils::parent_of(&path),
            depth: utils::depth(&path),
            path,
            workspace: workspace.into(),
            index: 0,
            node_type: UNSTRUCTURED.to_string(),
            storage: PropertyStorage::Inline(Map::new()),
            removed: false,
            hidden: false,
            hidden_before: None,
            hidden_after: None,
            hidden_in_index: false,
            access_roles: Vec::new(),
        })
    }

    /// Root record of a workspace
    pub fn root(workspace: impl Into<String>) -> Self {
        Self {
            identifier: Uuid::new_v4().to_string(),
            path: utils::ROOT_PATH.to_string(),
            parent_path: utils::ROOT_PATH.to_string(),
            depth: 0,
            workspace: workspace.into(),
            index: 0,
            node_type: UNSTRUCTURED.to_string(),
            storage: PropertyStorage::Inline(Map::new()),
            removed: false,
            hidden: false,
            hidden_before: None,
            hidden_after: None,
            hidden_in_index: false,
            access_roles: Vec::new(),
        }
    }

    /// Copy of `original` owned by `workspace`, keeping identifier and path
    pub fn materialized_from(original: &Node, workspace: &str) -> Self {
        let mut clone = original.clone();
        clone.workspace = workspace.to_string();
        clone
    }

    /// Move the record to a new path, recomputing parent path and depth.
    ///
    /// Returns whether anything changed. Descendants are not touched.
    pub fn set_path(&mut self, path: &str) -> Result<bool> {
        utils::validate_path(path)?;
        if self.path == path {
            return Ok(false);
        }
        self.path = path.to_string();
        self.parent_path = utils::parent_of(path);
        self.depth = utils::depth(path);
        Ok(true)
    }

    pub fn set_index(&mut self, index: u32) -> bool {
        let changed = self.index != index;
        self.index = index;
        changed
    }

    pub fn set_node_type(&mut self, node_type: &str) -> bool {
        if self.node_type == node_type {
            return false;
        }
        self.node_type = node_type.to_string();
        true
    }

    pub fn set_property(&mut self, name: &str, value: Value) -> Result<PropertyChange> {
        match &mut self.storage {
            PropertyStorage::Delegated { object, .. } => {
                if !object.is_settable(name) {
                    return Ok(PropertyChange::Unchanged);
                }
                object
                    .set_property(name, value)
                    .map_err(|e| RepositoryError::node(e.to_string()))?;
                Ok(PropertyChange::Delegated)
            }
            PropertyStorage::Inline(properties) => {
                let change = match properties.get(name) {
                    Some(existing) if *existing == value => return Ok(PropertyChange::Unchanged),
                    Some(_) => PropertyChange::Updated,
                    None => PropertyChange::Added,
                };
                properties.insert(name.to_string(), value);
                Ok(change)
            }
        }
    }

    /// Remove an inline property.
    ///
    /// Returns `false` without touching anything while a content object is
    /// attached; fails for inline properties that do not exist.
    pub fn remove_property(&mut self, name: &str) -> Result<bool> {
        match &mut self.storage {
            PropertyStorage::Delegated { .. } => Ok(false),
            PropertyStorage::Inline(properties) => {
                if properties.remove(name).is_none() {
                    return Err(RepositoryError::node(format!(
                        "Cannot remove non-existing property \"{}\" from node {}",
                        name, self.path
                    )));
                }
                Ok(true)
            }
        }
    }

    /// Attach a content object; returns `false` if that exact object is already attached
    pub fn set_content_object(&mut self, object: SharedContentObject) -> bool {
        let retained = match &mut self.storage {
            PropertyStorage::Delegated { object: current, .. } if Arc::ptr_eq(current, &object) => {
                return false;
            }
            PropertyStorage::Delegated { retained, .. } => std::mem::take(retained),
            PropertyStorage::Inline(properties) => std::mem::take(properties),
        };
        self.storage = PropertyStorage::Delegated { object, retained };
        true
    }

    /// Detach the content object, going back to the retained inline map
    pub fn unset_content_object(&mut self) -> bool {
        match &mut self.storage {
            PropertyStorage::Inline(_) => false,
            PropertyStorage::Delegated { retained, .. } => {
                let retained = std::mem::take(retained);
                self.storage = PropertyStorage::Inline(retained);
                true
            }
        }
    }

    pub fn set_removed(&mut self, removed: bool) -> bool {
        let changed = self.removed != removed;
        self.removed = removed;
        changed
    }

    pub fn set_hidden(&mut self, hidden: bool) -> bool {
        let changed = self.hidden != hidden;
        self.hidden = hidden;
        changed
    }

    pub fn set_hidden_before(&mut self, at: Option<DateTime<Utc>>) -> bool {
        let changed = self.hidden_before != at;
        self.hidden_before = at;
        changed
    }

    pub fn set_hidden_after(&mut self, at: Option<DateTime<Utc>>) -> bool {
        let changed = self.hidden_after != at;
        self.hidden_after = at;
        changed
    }

    pub fn set_hidden_in_index(&mut self, hidden: bool) -> bool {
        let changed = self.hidden_in_index != hidden;
        self.hidden_in_index = hidden;
        changed
    }

    pub fn set_access_roles(&mut self, roles: Vec<String>) -> bool {
        if self.access_roles == roles {
            return false;
        }
        self.access_roles = roles;
        true
    }

    /// Take over properties, type, index, visibility settings, access roles
    /// and content object from `source`. Path and identifier stay as they are.
    pub fn make_similar_to<N: NodeAccess + ?Sized>(&mut self, source: &N) -> Result<()> {
        for (name, value) in source.properties() {
            self.set_property(&name, value)?;
        }
        let source = source.record();
        self.node_type = source.node_type.clone();
        self.index = source.index;
        self.hidden = source.hidden;
        self.hidden_before = source.hidden_before;
        self.hidden_after = source.hidden_after;
        self.hidden_in_index = source.hidden_in_index;
        self.access_roles = source.access_roles.clone();
        if let PropertyStorage::Delegated { object, .. } = &source.storage {
            self.set_content_object(object.clone());
        }
        Ok(())
    }

    /// The node's own property map; while a content object is attached this
    /// is the retained map, which is what gets persisted
    pub fn inline_properties(&self) -> &Map<String, Value> {
        match &self.storage {
            PropertyStorage::Inline(properties) => properties,
            PropertyStorage::Delegated { retained, .. } => retained,
        }
    }

    pub(crate) fn inline_properties_mut(&mut self) -> &mut Map<String, Value> {
        match &mut self.storage {
            PropertyStorage::Inline(properties) => properties,
            PropertyStorage::Delegated { retained, .. } => retained,
        }
    }

    pub fn storage(&self) -> &PropertyStorage {
        &self.storage
    }
}

/// Read access to a node, shared by plain records and overlays
pub trait NodeAccess {
    /// The record reads are served from
    fn record(&self) -> &Node;

    fn identifier(&self) -> &str {
        &self.record().identifier
    }

    fn path(&self) -> &str {
        &self.record().path
    }

    /// Parent path; the root reports itself
    fn parent_path(&self) -> &str {
        &self.record().parent_path
    }

    fn depth(&self) -> usize {
        self.record().depth
    }

    fn name(&self) -> &str {
        utils::name_of(&self.record().path)
    }

    fn is_root(&self) -> bool {
        self.record().path == utils::ROOT_PATH
    }

    /// Workspace owning the record
    fn workspace(&self) -> &str {
        &self.record().workspace
    }

    fn index(&self) -> u32 {
        self.record().index
    }

    fn node_type(&self) -> &str {
        &self.record().node_type
    }

    fn has_property(&self, name: &str) -> bool {
        match &self.record().storage {
            PropertyStorage::Inline(properties) => properties.contains_key(name),
            PropertyStorage::Delegated { object, .. } => {
                object.gettable_property_names().iter().any(|n| n == name)
            }
        }
    }

    /// Property value; `None` for missing inline properties, an error for
    /// properties the attached content object does not expose
    fn get_property(&self, name: &str) -> Result<Option<Value>> {
        match &self.record().storage {
            PropertyStorage::Inline(properties) => Ok(properties.get(name).cloned()),
            PropertyStorage::Delegated { object, .. } => {
                if object.gettable_property_names().iter().any(|n| n == name) {
                    Ok(object.get_property(name))
                } else {
                    Err(RepositoryError::node(format!(
                        "Property \"{}\" does not exist in content object of type {}",
                        name,
                        object.type_name()
                    )))
                }
            }
        }
    }

    fn properties(&self) -> Map<String, Value> {
        match &self.record().storage {
            PropertyStorage::Inline(properties) => properties.clone(),
            PropertyStorage::Delegated { object, .. } => object
                .gettable_property_names()
                .into_iter()
                .filter_map(|name| object.get_property(&name).map(|value| (name, value)))
                .collect(),
        }
    }

    fn property_names(&self) -> Vec<String> {
        match &self.record().storage {
            PropertyStorage::Inline(properties) => properties.keys().cloned().collect(),
            PropertyStorage::Delegated { object, .. } => object.gettable_property_names(),
        }
    }

    fn content_object(&self) -> Option<&SharedContentObject> {
        match &self.record().storage {
            PropertyStorage::Inline(_) => None,
            PropertyStorage::Delegated { object, .. } => Some(object),
        }
    }

    fn is_removed(&self) -> bool {
        self.record().removed
    }

    fn is_hidden(&self) -> bool {
        self.record().hidden
    }

    fn hidden_before(&self) -> Option<DateTime<Utc>> {
        self.record().hidden_before
    }

    fn hidden_after(&self) -> Option<DateTime<Utc>> {
        self.record().hidden_after
    }

    fn is_hidden_in_index(&self) -> bool {
        self.record().hidden_in_index
    }

    fn access_roles(&self) -> &[String] {
        &self.record().access_roles
    }

    /// Not hidden, and `now` lies inside the hidden-before/hidden-after window
    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        let record = self.record();
        if record.hidden {
            return false;
        }
        if matches!(record.hidden_before, Some(before) if before > now) {
            return false;
        }
        if matches!(record.hidden_after, Some(after) if after < now) {
            return false;
        }
        true
    }

    /// A role list consisting of just the everybody role counts as unrestricted
    fn has_access_restrictions(&self) -> bool {
        let roles = &self.record().access_roles;
        !(roles.is_empty() || (roles.len() == 1 && roles[0] == EVERYBODY_ROLE))
    }

    fn is_accessible(&self, security: &dyn SecurityContext) -> bool {
        if !self.has_access_restrictions() {
            return true;
        }
        self.record()
            .access_roles
            .iter()
            .any(|role| security.has_role(role))
    }

    /// Tag-free `title` property, or `(type) name`, cropped
    fn label(&self) -> String {
        let label = match self.get_property("title").ok().flatten() {
            Some(Value::String(title)) => strip_tags(&title),
            Some(other) if !other.is_null() => strip_tags(&other.to_string()),
            _ => format!("({}) {}", self.node_type(), self.name()),
        };
        crop(&label, LABEL_MAXIMUM_CHARACTERS)
    }

    /// Scalar property values joined with " – ", tag-free and cropped
    fn abstract_text(&self) -> String {
        let parts: Vec<String> = self
            .properties()
            .into_iter()
            .filter_map(|(_, value)| match value {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect();
        crop(&strip_tags(&parts.join(" – ")), ABSTRACT_MAXIMUM_CHARACTERS)
    }

    /// Path qualified with the viewing workspace unless that is `live`
    fn context_path(&self, workspace: &str) -> String {
        if workspace == crate::models::workspace::LIVE_WORKSPACE {
            self.path().to_string()
        } else {
            format!("{}@{}", self.path(), workspace)
        }
    }
}

impl NodeAccess for Node {
    fn record(&self) -> &Node {
        self
    }
}

/// Serialized form of a node record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    identifier: String,
    path: String,
    #[serde(default, skip_deserializing)]
    parent_path: String,
    #[serde(default, skip_deserializing)]
    depth: usize,
    workspace: String,
    #[serde(default)]
    index: u32,
    #[serde(default = "default_node_type")]
    node_type: String,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    removed: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hidden_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hidden_after: Option<DateTime<Utc>>,
    #[serde(default)]
    hidden_in_index: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    access_roles: Vec<String>,
}

fn default_node_type() -> String {
    UNSTRUCTURED.to_string()
}

impl From<Node> for NodeRecord {
    fn from(node: Node) -> Self {
        let properties = node.inline_properties().clone();
        Self {
            identifier: node.identifier,
            path: node.path,
            parent_path: node.parent_path,
            depth: node.depth,
            workspace: node.workspace,
            index: node.index,
            node_type: node.node_type,
            properties,
            removed: node.removed,
            hidden: node.hidden,
            hidden_before: node.hidden_before,
            hidden_after: node.hidden_after,
            hidden_in_index: node.hidden_in_index,
            access_roles: node.access_roles,
        }
    }
}

impl TryFrom<NodeRecord> for Node {
    type Error = RepositoryError;

    fn try_from(record: NodeRecord) -> Result<Self> {
        let mut node = Node::new(record.path, record.workspace, Some(record.identifier))?;
        node.index = record.index;
        node.node_type = record.node_type;
        node.storage = PropertyStorage::Inline(record.properties);
        node.removed = record.removed;
        node.hidden = record.hidden;
        node.hidden_before = record.hidden_before;
        node.hidden_after = record.hidden_after;
        node.hidden_in_index = record.hidden_in_index;
        node.access_roles = record.access_roles;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content_object::JsonContentObject;
    use crate::services::context::StaticRoles;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn node(path: &str) -> Node {
        Node::new(path, "live", None).unwrap()
    }

    #[test]
    fn test_new_node_derives_hierarchy_fields() {
        let news = node("/sites/news");
        assert_eq!(news.parent_path(), "/sites");
        assert_eq!(news.depth(), 2);
        assert_eq!(news.name(), "news");
        assert_eq!(news.node_type(), UNSTRUCTURED);

        let root = Node::root("live");
        assert!(root.is_root());
        assert_eq!(root.parent_path(), "/");
        assert_eq!(root.depth(), 0);
    }

    #[test]
    fn test_invalid_paths_are_rejected() {
        assert!(Node::new("sites", "live", None).is_err());
        assert!(Node::new("/a_b", "live", None).is_err());
        let mut news = node("/news");
        assert!(news.set_path("/news/").is_err());
        assert_eq!(news.path(), "/news");
    }

    #[test]
    fn test_set_path_recomputes_parent_and_depth() {
        let mut news = node("/news");
        assert!(news.set_path("/sites/main/news").unwrap());
        assert_eq!(news.parent_path(), "/sites/main");
        assert_eq!(news.depth(), 3);
        assert!(!news.set_path("/sites/main/news").unwrap());
    }

    #[test]
    fn test_property_changes_are_classified() {
        let mut news = node("/news");
        assert_eq!(news.set_property("title", json!("A")).unwrap(), PropertyChange::Added);
        assert_eq!(news.set_property("title", json!("A")).unwrap(), PropertyChange::Unchanged);
        assert_eq!(news.set_property("title", json!("B")).unwrap(), PropertyChange::Updated);
        assert!(news.remove_property("title").unwrap());
        assert!(news.remove_property("title").is_err());
    }

    #[test]
    fn test_content_object_delegation_retains_inline_map() {
        let mut news = node("/news");
        news.set_property("teaser", json!("inline")).unwrap();

        let mut fields = Map::new();
        fields.insert("title".into(), json!("From object"));
        let object = JsonContentObject::new("Article", fields).shared();

        assert!(news.set_content_object(object.clone()));
        assert!(!news.set_content_object(object.clone()));
        assert_eq!(news.get_property("title").unwrap(), Some(json!("From object")));
        assert!(news.get_property("teaser").is_err());
        assert!(!news.has_property("teaser"));
        assert_eq!(news.set_property("title", json!("Changed")).unwrap(), PropertyChange::Delegated);
        assert_eq!(object.get_property("title"), Some(json!("Changed")));
        assert_eq!(news.set_property("missing", json!(1)).unwrap(), PropertyChange::Unchanged);
        assert!(!news.remove_property("title").unwrap());

        assert!(news.unset_content_object());
        assert_eq!(news.get_property("teaser").unwrap(), Some(json!("inline")));
        assert_eq!(news.get_property("title").unwrap(), None);
    }

    #[test]
    fn test_make_similar_copies_everything_but_identity() {
        let mut source = node("/source");
        source.set_property("title", json!("Hello")).unwrap();
        source.set_node_type("article");
        source.set_index(4);
        source.set_hidden(true);
        source.set_access_roles(vec!["Editor".into()]);

        let mut target = node("/target");
        target.make_similar_to(&source).unwrap();

        assert_eq!(target.path(), "/target");
        assert_ne!(target.identifier(), source.identifier());
        assert_eq!(target.properties(), source.properties());
        assert_eq!(target.node_type(), "article");
        assert_eq!(target.index(), 4);
        assert!(target.is_hidden());
        assert_eq!(target.access_roles(), &["Editor".to_string()]);
    }

    #[test]
    fn test_visibility_window() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut news = node("/news");
        assert!(news.is_visible(now));

        news.set_hidden_before(Some(now + Duration::hours(1)));
        assert!(!news.is_visible(now));
        news.set_hidden_before(Some(now - Duration::hours(1)));
        assert!(news.is_visible(now));

        news.set_hidden_after(Some(now - Duration::minutes(1)));
        assert!(!news.is_visible(now));
        news.set_hidden_after(None);

        news.set_hidden(true);
        assert!(!news.is_visible(now));
    }

    #[test]
    fn test_accessibility() {
        let editor = StaticRoles::new(["Editor"]);
        let anonymous = StaticRoles::new(Vec::<String>::new());
        let mut news = node("/news");

        assert!(news.is_accessible(&anonymous));
        news.set_access_roles(vec![EVERYBODY_ROLE.into()]);
        assert!(!news.has_access_restrictions());
        assert!(news.is_accessible(&anonymous));

        news.set_access_roles(vec!["Editor".into(), "Admin".into()]);
        assert!(news.is_accessible(&editor));
        assert!(!news.is_accessible(&anonymous));
    }

    #[test]
    fn test_label_and_abstract() {
        let mut news = node("/news");
        news.set_node_type("page");
        assert_eq!(news.label(), "(page) news");

        news.set_property("title", json!("<h1>A headline that is definitely too long</h1>"))
            .unwrap();
        assert_eq!(news.label(), "A headline that is definitely  …");

        news.set_property("title", json!("Short")).unwrap();
        news.set_property("text", json!("<p>Body</p>")).unwrap();
        assert_eq!(news.abstract_text(), "Body – Short");
    }

    #[test]
    fn test_context_path() {
        let news = node("/news");
        assert_eq!(news.context_path("live"), "/news");
        assert_eq!(news.context_path("user-admin"), "/news@user-admin");
    }

    #[test]
    fn test_serialized_shape() {
        let mut news = node("/sites/news");
        news.set_property("title", json!("Hello")).unwrap();

        let value = serde_json::to_value(&news).unwrap();
        assert_eq!(value["parentPath"], json!("/sites"));
        assert_eq!(value["nodeType"], json!(UNSTRUCTURED));
        assert_eq!(value["properties"]["title"], json!("Hello"));

        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back.identifier(), news.identifier());
        assert_eq!(back.depth(), 2);
    }
}
