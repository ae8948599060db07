//! JSON dumps of users, nodes, links and comments, loaded into a store

use crate::graph::{Link, Node, NodeId, User};
use crate::storage::{GraphStore, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub node_id: NodeId,
    pub user_id: i64,
    pub content: String,
}

/// Contents of one dump file; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dump {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}

/// Number of records written per section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub users: usize,
    pub nodes: usize,
    pub links: usize,
    pub comments: usize,
}

impl Dump {
    pub fn from_json(text: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn read(path: impl AsRef<Path>) -> StorageResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Write every record; users and nodes first so links and comments resolve
    pub fn load_into(&self, store: &dyn GraphStore) -> StorageResult<ImportSummary> {
        for user in &self.users {
            store.save_user(user)?;
        }
        for node in &self.nodes {
            store.save_node(node)?;
        }
        for link in &self.links {
            store.save_link(link)?;
        }
        for comment in &self.comments {
            store.save_comment(comment.node_id, comment.user_id, &comment.content)?;
        }
        let summary = ImportSummary {
            users: self.users.len(),
            nodes: self.nodes.len(),
            links: self.links.len(),
            comments: self.comments.len(),
        };
        info!(?summary, "dump imported");
        Ok(summary)
    }
}
