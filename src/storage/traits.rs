//! Storage trait definitions

use crate::graph::{CommentView, Link, LinkView, Node, NodeId, User};
use crate::query::QueryDescription;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Value returned for one tag of a row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Projected {
    Node(Box<Node>),
    User(User),
    Fields(Map<String, Value>),
}

impl Projected {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_fields(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Fields(fields) => Some(fields),
            _ => None,
        }
    }
}

/// One result row: projected values by tag and traversed links by tag pair
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRow {
    pub values: BTreeMap<String, Projected>,
    /// Keyed `"<from>--<to>"` where `to` is the segment carrying the projection
    pub edges: BTreeMap<String, LinkView>,
}

impl QueryRow {
    pub fn get(&self, tag: &str) -> Option<&Projected> {
        self.values.get(tag)
    }

    pub fn node(&self, tag: &str) -> Option<&Node> {
        self.values.get(tag).and_then(Projected::as_node)
    }

    pub fn fields(&self, tag: &str) -> Option<&Map<String, Value>> {
        self.values.get(tag).and_then(Projected::as_fields)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&LinkView> {
        self.edges.get(&edge_key(from, to))
    }
}

pub fn edge_key(from: &str, to: &str) -> String {
    format!("{}--{}", from, to)
}

/// Node creation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreationStatistics {
    pub total: u64,
    pub types: BTreeMap<String, u64>,
    pub ctime_by_day: BTreeMap<String, u64>,
}

/// Trait for graph storage backends
///
/// Implementations must be thread-safe (Send + Sync) so one store can be
/// shared by every request.
pub trait GraphStore: Send + Sync {
    // === Query Operations ===

    /// Number of rows the description selects, ignoring limit and offset
    fn count(&self, query: &QueryDescription) -> StorageResult<usize>;

    /// Rows the description selects
    fn fetch(&self, query: &QueryDescription) -> StorageResult<Vec<QueryRow>>;

    /// First row, if any
    fn first(&self, query: &QueryDescription) -> StorageResult<Option<QueryRow>> {
        let query = query.clone().limit(1);
        Ok(self.fetch(&query)?.into_iter().next())
    }

    /// Comments on a node, oldest first
    fn comments(&self, node_id: NodeId) -> StorageResult<Vec<CommentView>>;

    /// Aggregate creation counts, optionally for one user
    fn creation_statistics(&self, user_id: Option<i64>) -> StorageResult<CreationStatistics>;

    // === Write Operations ===

    fn save_user(&self, user: &User) -> StorageResult<()>;

    /// Save a node (insert or update)
    fn save_node(&self, node: &Node) -> StorageResult<()>;

    fn save_link(&self, link: &Link) -> StorageResult<()>;

    /// Attach a comment; returns its key
    fn save_comment(&self, node_id: NodeId, user_id: i64, content: &str) -> StorageResult<i64>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
