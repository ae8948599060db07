//! Provenance tree records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A neighbor of the tree root, with the link that connects them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub id: i64,
    pub uuid: Uuid,
    pub node_type: String,
    pub node_label: String,
    pub description: String,
    pub link_label: String,
    pub link_type: String,
}

/// The tree root and its immediate neighborhood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub id: i64,
    pub uuid: Uuid,
    pub node_type: String,
    pub node_label: String,
    pub description: String,
    /// Ascending by neighbor id
    pub incoming: Vec<TreeEntry>,
    /// Ascending by neighbor id
    pub outgoing: Vec<TreeEntry>,
}

/// Truncation bookkeeping: compare `sent_*` with `total_*`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMetadata {
    pub total_no_of_incomings: usize,
    pub total_no_of_outgoings: usize,
    pub sent_no_of_incomings: usize,
    pub sent_no_of_outgoings: usize,
}

impl TreeMetadata {
    pub fn is_truncated(&self) -> bool {
        self.sent_no_of_incomings < self.total_no_of_incomings
            || self.sent_no_of_outgoings < self.total_no_of_outgoings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeResult {
    pub nodes: Vec<TreeNode>,
    pub metadata: Vec<TreeMetadata>,
}
