//! Data Models
//!
//! Node records, the overlay wrappers sessions hand out for inherited records,
//! workspaces, node types, property records and content objects.

pub mod content_object;
pub mod node;
pub mod node_type;
pub mod overlay_node;
pub mod property;
pub mod workspace;

pub use content_object::{ContentObject, JsonContentObject, SharedContentObject};
pub use node::{
    Node, NodeAccess, PropertyChange, PropertyStorage, ABSTRACT_MAXIMUM_CHARACTERS,
    LABEL_MAXIMUM_CHARACTERS,
};
pub use node_type::{NodeType, NodeTypeDeclaration, UNSTRUCTURED};
pub use overlay_node::{ContentNode, OverlayNode};
pub use property::{PropertyRecord, PropertyType};
pub use workspace::{Workspace, LIVE_WORKSPACE};
