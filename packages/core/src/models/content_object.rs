//! External content objects
//!
//! A node can delegate its properties to an object owned by another
//! subsystem. While attached, property reads and writes go to the object's
//! gettable/settable accessors instead of the node's own map.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Property accessor protocol of an attached content object
pub trait ContentObject: Send + Sync + fmt::Debug {
    /// Type name reported as the node's content object type
    fn type_name(&self) -> &str;

    /// Names of all properties readable through the object
    fn gettable_property_names(&self) -> Vec<String>;

    fn get_property(&self, name: &str) -> Option<Value>;

    fn is_settable(&self, name: &str) -> bool;

    fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()>;
}

pub type SharedContentObject = Arc<dyn ContentObject>;

/// Content object holding a fixed set of JSON fields
#[derive(Debug)]
pub struct JsonContentObject {
    type_name: String,
    fields: RwLock<Map<String, Value>>,
    read_only: BTreeSet<String>,
}

impl JsonContentObject {
    pub fn new(type_name: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: RwLock::new(fields),
            read_only: BTreeSet::new(),
        }
    }

    /// Mark a field as gettable but not settable
    pub fn with_read_only(mut self, name: impl Into<String>) -> Self {
        self.read_only.insert(name.into());
        self
    }

    pub fn shared(self) -> SharedContentObject {
        Arc::new(self)
    }
}

impl ContentObject for JsonContentObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn gettable_property_names(&self) -> Vec<String> {
        self.fields
            .read()
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        self.fields.read().ok()?.get(name).cloned()
    }

    fn is_settable(&self, name: &str) -> bool {
        !self.read_only.contains(name)
            && self
                .fields
                .read()
                .map(|fields| fields.contains_key(name))
                .unwrap_or(false)
    }

    fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
        if !self.is_settable(name) {
            anyhow::bail!("property \"{}\" of {} is not settable", name, self.type_name);
        }
        let mut fields = self
            .fields
            .write()
            .map_err(|e| anyhow::anyhow!("content object lock poisoned: {}", e))?;
        fields.insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article() -> JsonContentObject {
        let mut fields = Map::new();
        fields.insert("title".into(), json!("Hello"));
        fields.insert("slug".into(), json!("hello"));
        JsonContentObject::new("Article", fields).with_read_only("slug")
    }

    #[test]
    fn test_settable_fields_accept_writes() {
        let object = article();
        object.set_property("title", json!("Bye")).unwrap();
        assert_eq!(object.get_property("title"), Some(json!("Bye")));
    }

    #[test]
    fn test_read_only_and_unknown_fields_reject_writes() {
        let object = article();
        assert!(object.set_property("slug", json!("x")).is_err());
        assert!(object.set_property("body", json!("x")).is_err());
        assert_eq!(object.gettable_property_names(), vec!["slug", "title"]);
    }
}
