//! wfquery: query translation and provenance views over a workflow graph store
//!
//! A workflow provenance graph records data and process nodes connected by
//! typed links. This crate turns REST-style node requests into query
//! descriptions, runs them against a [`GraphStore`], and shapes the rows
//! into the response envelopes a transport serves.
//!
//! # Core Concepts
//!
//! - **Full types**: `node_type|process_type` strings, possibly with `%`
//!   wildcards, that identify families of nodes
//! - **Resources**: node listings restricted to one family (calcjobs,
//!   structures, ...)
//! - **Content**: per-node views such as attributes, repository listings
//!   or subtype-specific downloads
//! - **Provenance tree**: the incoming and outgoing links of one node
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wfquery::{NodeRequest, OpenStore, RestApi, ServiceConfig, SqliteStore};
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let api = RestApi::new(Arc::new(store), ServiceConfig::default()).unwrap();
//! let envelope = api.get_nodes(&NodeRequest::default()).unwrap();
//! assert_eq!(envelope.total_count, 0);
//! ```

pub mod api;
pub mod config;
pub mod dump;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod identifiers;
pub mod pagination;
pub mod provenance;
pub mod query;
pub mod storage;

pub use api::{Envelope, NodeRequest, RestApi, Schema};
pub use config::{default_db_path, ConfigError, ServiceConfig};
pub use dump::{Dump, ImportSummary};
pub use error::{ErrorKind, RestError, RestResult};
pub use graph::{Link, LinkType, Node, NodeId, Repository, User};
pub use handlers::{Download, NodeSubtype, SubtypeHandler, SubtypeRegistry};
pub use identifiers::{Namespace, NodeIdentifier};
pub use pagination::PageLinks;
pub use provenance::{TreeNode, TreeResult};
pub use query::{
    ContentArgs, ContentSelector, ContentValue, Filter, FilterSet, Resource, ResultType,
};
pub use storage::{GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
