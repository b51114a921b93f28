//! Repository Services
//!
//! This module contains the content repository's logic:
//!
//! - `Repository` - Workspaces, shared registries and session factory
//! - `Session` - Navigation, tree mutations and `save` for one workspace
//! - `UnitOfWork` - Staging sets for new, dirty and removed nodes and properties
//! - `NodeTypeRegistry` - Node type resolution with supertype configuration merging
//! - `NamespaceRegistry` - Repository-wide namespace prefixes
//! - `Context` - Workspace, visibility switches, clock and security collaborators
//!
//! Services coordinate between the storage layer (`db`) and the node model,
//! enforcing path uniqueness, sibling order and referential integrity.

pub mod context;
pub mod error;
pub mod namespace;
pub mod node_type_registry;
pub mod repository;
pub mod session;
pub mod unit_of_work;

pub use context::{
    Clock, Context, ContextOptions, FixedClock, SecurityContext, StaticRoles, SystemClock,
    EVERYBODY_ROLE,
};
pub use error::{RepositoryError, Result};
pub use namespace::NamespaceRegistry;
pub use node_type_registry::{merge_configuration, NodeTypeRegistry};
pub use repository::Repository;
pub use session::{Item, Session};
pub use unit_of_work::{StagingSummary, UnitOfWork};
