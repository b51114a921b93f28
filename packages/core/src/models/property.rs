//! Property records as handed to the storage backend

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a property, taken from the node type configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    Undefined,
    String,
    Boolean,
    Long,
    Double,
    Date,
    /// Value is the identifier of another node
    Reference,
}

impl PropertyType {
    /// Parse the `type` entry of a property declaration; unknown names map to `Undefined`
    pub fn from_declaration(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "boolean" => Self::Boolean,
            "integer" | "long" => Self::Long,
            "float" | "double" => Self::Double,
            "date" | "datetime" => Self::Date,
            "reference" => Self::Reference,
            _ => Self::Undefined,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference)
    }
}

/// One persisted property of one node in one workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub node_identifier: String,
    pub workspace: String,
    pub name: String,
    pub value: Value,
    pub property_type: PropertyType,
}

impl PropertyRecord {
    /// Identifier of the referenced node, for reference-typed string values
    pub fn reference_target(&self) -> Option<&str> {
        if self.property_type.is_reference() {
            self.value.as_str()
        } else {
            None
        }
    }
}
