//! Copy-on-write overlays over inherited records
//!
//! A session bound to a derived workspace reads records that belong to one of
//! its base workspaces. Those records are wrapped in an [`OverlayNode`]: reads
//! are served from the original until the first write, at which point a clone
//! owned by the session's workspace is created (same identifier, same path)
//! and every further read and write goes to the clone. The original record is
//! never modified.

use crate::models::node::{Node, NodeAccess};
use crate::services::error::RepositoryError;

#[derive(Debug, Clone)]
pub struct OverlayNode {
    original: Node,
    materialized: Option<Node>,
}

impl OverlayNode {
    pub fn new(original: Node) -> Self {
        Self {
            original,
            materialized: None,
        }
    }

    /// The inherited record, as read from its workspace
    pub fn original(&self) -> &Node {
        &self.original
    }

    pub fn materialized(&self) -> Option<&Node> {
        self.materialized.as_ref()
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized.is_some()
    }

    /// Writable clone owned by `workspace`, created on first use.
    ///
    /// The flag reports whether this call created the clone.
    pub fn materialize(&mut self, workspace: &str) -> (&mut Node, bool) {
        let fresh = self.materialized.is_none();
        let original = &self.original;
        let node = self
            .materialized
            .get_or_insert_with(|| Node::materialized_from(original, workspace));
        (node, fresh)
    }
}

impl NodeAccess for OverlayNode {
    fn record(&self) -> &Node {
        self.materialized.as_ref().unwrap_or(&self.original)
    }
}

/// A node as handed out by a session
#[derive(Debug, Clone)]
pub enum ContentNode {
    /// Record owned by the session's workspace
    Direct(Node),
    /// Record inherited from a base workspace
    Overlay(OverlayNode),
}

impl ContentNode {
    /// Wrap `node` for a session bound to `workspace`
    pub fn for_workspace(node: Node, workspace: &str) -> Self {
        if node.workspace() == workspace {
            Self::Direct(node)
        } else {
            Self::Overlay(OverlayNode::new(node))
        }
    }

    pub fn is_overlay(&self) -> bool {
        matches!(self, Self::Overlay(_))
    }

    pub fn as_overlay(&self) -> Option<&OverlayNode> {
        match self {
            Self::Overlay(overlay) => Some(overlay),
            Self::Direct(_) => None,
        }
    }

    /// Writable record, materializing an overlay if needed.
    ///
    /// The flag reports whether an overlay was materialized by this call.
    pub fn writable(&mut self, workspace: &str) -> (&mut Node, bool) {
        match self {
            Self::Direct(node) => (node, false),
            Self::Overlay(overlay) => overlay.materialize(workspace),
        }
    }

    pub fn into_record(self) -> Node {
        match self {
            Self::Direct(node) => node,
            Self::Overlay(overlay) => overlay.materialized.unwrap_or(overlay.original),
        }
    }
}

impl NodeAccess for ContentNode {
    fn record(&self) -> &Node {
        match self {
            Self::Direct(node) => node,
            Self::Overlay(overlay) => overlay.record(),
        }
    }
}

impl TryFrom<ContentNode> for OverlayNode {
    type Error = RepositoryError;

    /// Overlays are only ever built over plain records
    fn try_from(node: ContentNode) -> Result<Self, Self::Error> {
        match node {
            ContentNode::Direct(node) => Ok(OverlayNode::new(node)),
            ContentNode::Overlay(_) => Err(RepositoryError::node(
                "the original node of an overlay must not be an overlay itself",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_node() -> Node {
        let mut node = Node::new("/news", "live", None).unwrap();
        node.set_property("title", json!("Live title")).unwrap();
        node
    }

    #[test]
    fn test_reads_come_from_original_until_materialized() {
        let overlay = OverlayNode::new(base_node());
        assert!(!overlay.is_materialized());
        assert_eq!(overlay.workspace(), "live");
        assert_eq!(overlay.get_property("title").unwrap(), Some(json!("Live title")));
    }

    #[test]
    fn test_first_write_materializes_once() {
        let original = base_node();
        let mut overlay = OverlayNode::new(original.clone());

        let (clone, fresh) = overlay.materialize("user-admin");
        assert!(fresh);
        clone.set_property("title", json!("Draft title")).unwrap();

        let (_, fresh) = overlay.materialize("user-admin");
        assert!(!fresh);

        assert_eq!(overlay.identifier(), original.identifier());
        assert_eq!(overlay.path(), original.path());
        assert_eq!(overlay.workspace(), "user-admin");
        assert_eq!(overlay.get_property("title").unwrap(), Some(json!("Draft title")));
        assert_eq!(
            overlay.original().get_property("title").unwrap(),
            Some(json!("Live title"))
        );
    }

    #[test]
    fn test_content_node_wraps_by_workspace() {
        assert!(!ContentNode::for_workspace(base_node(), "live").is_overlay());
        let mut inherited = ContentNode::for_workspace(base_node(), "user-admin");
        assert!(inherited.is_overlay());

        let (node, fresh) = inherited.writable("user-admin");
        assert!(fresh);
        node.set_index(3);
        assert_eq!(inherited.index(), 3);
        assert_eq!(inherited.as_overlay().unwrap().original().index(), 0);
    }

    #[test]
    fn test_overlay_over_overlay_is_rejected() {
        let nested = ContentNode::Overlay(OverlayNode::new(base_node()));
        assert!(OverlayNode::try_from(nested).is_err());
        assert!(OverlayNode::try_from(ContentNode::Direct(base_node())).is_ok());
    }
}
