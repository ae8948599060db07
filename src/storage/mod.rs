//! Storage backends
//!
//! Queries reach a backend through the `GraphStore` trait. The bundled
//! implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    edge_key, CreationStatistics, GraphStore, OpenStore, Projected, QueryRow, StorageError,
    StorageResult,
};
