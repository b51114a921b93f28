//! Session context
//!
//! The context decides which nodes a session sees: the workspace it reads
//! through, the current time used for visibility windows, the roles of the
//! current user and three switches that let removed, invisible or
//! inaccessible nodes through anyway.

use crate::models::{NodeAccess, Workspace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Role every user implicitly holds
pub const EVERYBODY_ROLE: &str = "Everybody";

/// Source of the current date and time
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Role membership of the current user
pub trait SecurityContext: Send + Sync + fmt::Debug {
    fn has_role(&self, role: &str) -> bool;
}

/// Fixed role set; the everybody role is always granted
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    roles: BTreeSet<String>,
}

impl StaticRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// A user holding no roles beyond the everybody role
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl SecurityContext for StaticRoles {
    fn has_role(&self, role: &str) -> bool {
        role == EVERYBODY_ROLE || self.roles.contains(role)
    }
}

/// Filter switches of a context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextOptions {
    pub show_removed: bool,
    pub show_invisible: bool,
    pub show_inaccessible: bool,
}

impl ContextOptions {
    /// Let every node through
    pub fn show_all() -> Self {
        Self {
            show_removed: true,
            show_invisible: true,
            show_inaccessible: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    workspace: Arc<Workspace>,
    options: ContextOptions,
    clock: Arc<dyn Clock>,
    security: Arc<dyn SecurityContext>,
}

impl Context {
    pub fn new(
        workspace: Arc<Workspace>,
        options: ContextOptions,
        clock: Arc<dyn Clock>,
        security: Arc<dyn SecurityContext>,
    ) -> Self {
        Self {
            workspace,
            options,
            clock,
            security,
        }
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn options(&self) -> ContextOptions {
        self.options
    }

    pub fn current_date_time(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn security(&self) -> &dyn SecurityContext {
        self.security.as_ref()
    }

    /// Whether `node` passes the removed, visibility and access filters
    pub fn admits<N: NodeAccess + ?Sized>(&self, node: &N) -> bool {
        if !self.options.show_removed && node.is_removed() {
            return false;
        }
        if !self.options.show_invisible && !node.is_visible(self.current_date_time()) {
            return false;
        }
        if !self.options.show_inaccessible && !node.is_accessible(self.security()) {
            return false;
        }
        true
    }

    /// Pass `node` through the filters
    pub fn filter<N: NodeAccess>(&self, node: N) -> Option<N> {
        self.admits(&node).then_some(node)
    }
}
