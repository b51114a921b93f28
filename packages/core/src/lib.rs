//! Nodetree Core
//!
//! A hierarchical content repository: nodes addressed by path and identifier,
//! grouped into workspaces that can be layered on top of each other.
//!
//! # Architecture
//!
//! - **Workspace chains**: a derived workspace reads through to its base
//!   workspaces; the first write to an inherited node gives it a copy-on-write
//!   record in the derived workspace
//! - **Unit of work**: sessions stage creations, changes and removals and
//!   write them in one `save`, after checking referential integrity
//! - **Node types**: declared in configuration, resolved with supertype
//!   configuration merging, providing default properties and auto-created
//!   child nodes
//! - **Pluggable storage**: everything is persisted through the async
//!   `NodeStore` trait; `InMemoryStore` is bundled
//!
//! # Modules
//!
//! - [`models`] - Node records, overlays, workspaces, node types
//! - [`services`] - Repository, Session, UnitOfWork, registries, context
//! - [`db`] - Storage trait, in-memory backend, session events
//! - [`utils`] - Path algebra and text helpers
//! - [`config`] - Repository configuration
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::RepositoryConfig;
pub use db::{InMemoryStore, NodeStore, SessionEvent};
pub use models::*;
pub use services::*;
