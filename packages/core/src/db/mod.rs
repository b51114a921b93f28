//! Storage Layer
//!
//! The `NodeStore` seam the repository persists through, the bundled
//! in-memory backend and the events sessions broadcast.

mod error;
mod events;
mod memory_store;
mod node_store;

pub use error::StoreError;
pub use events::SessionEvent;
pub use memory_store::{InMemoryStore, StoreOperation, StoreOperationKind};
pub use node_store::{DeleteResult, NodeStore, NodeTypeRecord};
