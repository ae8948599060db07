//! Node representation in the provenance graph

use super::repository::Repository;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Integer primary key of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i64);

impl NodeId {
    pub fn new(pk: i64) -> Self {
        Self(pk)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for NodeId {
    fn from(pk: i64) -> Self {
        Self(pk)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arbitrary-valued mapping used for both attributes and extras
pub type Properties = Map<String, Value>;

/// A computation or data record in the provenance graph
///
/// Identity (`id`, `uuid`, `node_type`, `process_type`) never changes.
/// Attributes, extras and the repository are mutated only by the engine
/// that owns the store; this crate reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub uuid: Uuid,
    /// Dotted type string, e.g. `process.calculation.calcjob.CalcJobNode.`
    pub node_type: String,
    /// Entry-point reference or module path; only set on process nodes
    #[serde(default)]
    pub process_type: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub user_id: Option<i64>,
    #[serde(default)]
    pub attributes: Properties,
    #[serde(default)]
    pub extras: Properties,
    #[serde(default)]
    pub repository: Repository,
}

impl Node {
    /// Create a node with the given key and type, stamped with the current time
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        // Stores keep microsecond precision
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: id.into(),
            uuid: Uuid::new_v4(),
            node_type: node_type.into(),
            process_type: None,
            label: String::new(),
            description: String::new(),
            ctime: now,
            mtime: now,
            user_id: None,
            attributes: Map::new(),
            extras: Map::new(),
            repository: Repository::default(),
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_process_type(mut self, process_type: impl Into<String>) -> Self {
        self.process_type = Some(process_type.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repository = repository;
        self
    }

    /// Class name encoded in the node type (its second-to-last dotted segment)
    ///
    /// `data.structure.StructureData.` yields `StructureData`.
    pub fn class_name(&self) -> &str {
        class_name_of(&self.node_type)
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Second-to-last dotted segment of a node type string
pub fn class_name_of(node_type: &str) -> &str {
    let mut parts = node_type.rsplit('.');
    let last = parts.next().unwrap_or_default();
    match parts.next() {
        Some(class) => class,
        None => last,
    }
}

/// Owner of nodes and comments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub institution: String,
}

impl User {
    pub fn new(id: i64, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            institution: String::new(),
        }
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Free-text comment attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub node_id: NodeId,
    pub user_id: i64,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub content: String,
}

/// Comment as returned by the `comments` content view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentView {
    pub created_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    pub user_display_name: String,
    pub message: String,
}
