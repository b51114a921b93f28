//! Workspaces and their base chains
//!
//! A workspace is a named layer of node records. A derived workspace points at
//! a base workspace; reads fall through the chain until a record is found while
//! writes always land in the workspace the session is bound to.

use std::sync::Arc;

/// Name of the published, bottom-most workspace
pub const LIVE_WORKSPACE: &str = "live";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    name: String,
    base: Option<Arc<Workspace>>,
}

impl Workspace {
    /// Create a bottom workspace (no base)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
        }
    }

    /// Create a workspace layered on top of `base`
    pub fn with_base(name: impl Into<String>, base: Arc<Workspace>) -> Self {
        Self {
            name: name.into(),
            base: Some(base),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_workspace(&self) -> Option<&Arc<Workspace>> {
        self.base.as_ref()
    }

    /// True when records removed here are deleted outright instead of tombstoned
    pub fn is_bottom(&self) -> bool {
        self.base.is_none()
    }

    pub fn is_live(&self) -> bool {
        self.name == LIVE_WORKSPACE
    }

    /// This workspace followed by its bases, nearest first
    pub fn chain(&self) -> impl Iterator<Item = &Workspace> {
        std::iter::successors(Some(self), |ws| ws.base.as_deref())
    }

    /// Names along [`Workspace::chain`]
    pub fn chain_names(&self) -> Vec<String> {
        self.chain().map(|ws| ws.name.clone()).collect()
    }
}
