//! Session Events
//!
//! Events are emitted by a session through a tokio broadcast channel, so any
//! number of subscribers can follow path changes, copy-on-write
//! materializations and saves without the session knowing about them.
//!
//! ```rust
//! use nodetree_core::db::SessionEvent;
//!
//! let event = SessionEvent::NodePathChanged {
//!     identifier: "42".into(),
//!     old_path: "/a".into(),
//!     new_path: "/b".into(),
//! };
//! assert_eq!(event.identifier(), Some("42"));
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A node's path changed through rename or move
    #[serde(rename_all = "camelCase")]
    NodePathChanged {
        identifier: String,
        old_path: String,
        new_path: String,
    },

    /// An inherited node got its own record in the session's workspace
    #[serde(rename_all = "camelCase")]
    NodeMaterialized {
        identifier: String,
        workspace: String,
    },

    /// Staged changes were written to the store
    #[serde(rename_all = "camelCase")]
    ChangesSaved {
        workspace: String,
        created: usize,
        updated: usize,
        removed: usize,
    },
}

impl SessionEvent {
    /// Identifier of the node the event is about
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::NodePathChanged { identifier, .. } | Self::NodeMaterialized { identifier, .. } => {
                Some(identifier)
            }
            Self::ChangesSaved { .. } => None,
        }
    }
}
