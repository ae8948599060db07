//! Subtype handlers: per-subtype derived data, downloads and descriptions
//!
//! Node subtypes form a closed set ([`NodeSubtype`]). Each handled subtype
//! is registered once, from a static table, into a [`SubtypeRegistry`];
//! nodes of any other subtype fall back to [`BaseHandler`].

mod process;
mod structure;
mod upf;

pub use process::{process_description, ProcessHandler};
pub use structure::StructureHandler;
pub use upf::UpfHandler;

use crate::error::{RestError, RestResult};
use crate::graph::{Node, RepoObject};
use crate::storage::GraphStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Node subtypes with dedicated handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeSubtype {
    CalcJob,
    CalcFunction,
    WorkChain,
    WorkFunction,
    Structure,
    Upf,
}

impl NodeSubtype {
    pub const ALL: [NodeSubtype; 6] = [
        Self::CalcJob,
        Self::CalcFunction,
        Self::WorkChain,
        Self::WorkFunction,
        Self::Structure,
        Self::Upf,
    ];

    /// Class name as it appears in node types
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::CalcJob => "CalcJobNode",
            Self::CalcFunction => "CalcFunctionNode",
            Self::WorkChain => "WorkChainNode",
            Self::WorkFunction => "WorkFunctionNode",
            Self::Structure => "StructureData",
            Self::Upf => "UpfData",
        }
    }

    pub fn from_class_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.class_name() == name)
    }

    pub fn of(node: &Node) -> Option<Self> {
        Self::from_class_name(node.class_name())
    }
}

/// Export formats per subtype
pub const DOWNLOAD_FORMATS: &[(NodeSubtype, &[&str])] = &[(NodeSubtype::Structure, &["cif", "xyz"])];

/// Formats a subtype can be exported to
pub fn formats_of(subtype: NodeSubtype) -> &'static [&'static str] {
    DOWNLOAD_FORMATS
        .iter()
        .find(|(s, _)| *s == subtype)
        .map(|(_, formats)| *formats)
        .unwrap_or(&[])
}

/// Export formats of every subtype that has any, keyed by class name
pub fn all_download_formats() -> BTreeMap<String, Vec<String>> {
    DOWNLOAD_FORMATS
        .iter()
        .filter(|(_, formats)| !formats.is_empty())
        .map(|(subtype, formats)| {
            (
                subtype.class_name().to_string(),
                formats.iter().map(|f| f.to_string()).collect(),
            )
        })
        .collect()
}

/// Payload of a `download` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub filename: String,
    pub data: String,
}

fn unavailable(what: &str, node: &Node) -> RestError {
    RestError::not_available(format!("{} is not available for node type {}", what, node.node_type))
}

/// Subtype-specific behaviour
///
/// Every method has the generic behaviour as its default, so a handler
/// only overrides what its subtype supports.
pub trait SubtypeHandler: Send + Sync {
    /// Short human description of the node's state
    fn description(&self, node: &Node) -> RestResult<String> {
        Err(unavailable("description", node))
    }

    fn derived_properties(&self, node: &Node) -> RestResult<Value> {
        Err(unavailable("derived_properties", node))
    }

    /// Data nodes export to nothing by default; other nodes cannot export
    fn download_formats(&self, node: &Node) -> RestResult<Vec<String>> {
        if node.node_type.starts_with("data.") {
            Ok(Vec::new())
        } else {
            Err(unavailable("download_formats", node))
        }
    }

    fn download(&self, node: &Node, _format: Option<&str>) -> RestResult<Download> {
        Err(unavailable("download", node))
    }

    fn retrieved_inputs(&self, _node: &Node, _path: &str) -> RestResult<Vec<RepoObject>> {
        Ok(Vec::new())
    }

    fn retrieved_outputs(&self, _node: &Node, _path: &str, _store: &dyn GraphStore) -> RestResult<Vec<RepoObject>> {
        Ok(Vec::new())
    }
}

/// Generic behaviour for nodes without a dedicated handler
#[derive(Debug, Default)]
pub struct BaseHandler;

impl SubtypeHandler for BaseHandler {}

/// Handler table keyed by subtype
pub struct SubtypeRegistry {
    handlers: HashMap<NodeSubtype, Arc<dyn SubtypeHandler>>,
    base: BaseHandler,
}

impl SubtypeRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            base: BaseHandler,
        }
    }

    /// Registry with every built-in handler
    pub fn builtin() -> RestResult<Self> {
        let table: Vec<(NodeSubtype, Arc<dyn SubtypeHandler>)> = vec![
            (NodeSubtype::CalcJob, Arc::new(ProcessHandler::calc_job())),
            (NodeSubtype::CalcFunction, Arc::new(ProcessHandler::function())),
            (NodeSubtype::WorkChain, Arc::new(ProcessHandler::function())),
            (NodeSubtype::WorkFunction, Arc::new(ProcessHandler::function())),
            (NodeSubtype::Structure, Arc::new(StructureHandler)),
            (NodeSubtype::Upf, Arc::new(UpfHandler)),
        ];
        let mut registry = Self::new();
        for (subtype, handler) in table {
            registry.register(subtype, handler)?;
        }
        debug!(handlers = registry.len(), "subtype registry built");
        Ok(registry)
    }

    /// Add a handler; a subtype can only be registered once
    pub fn register(&mut self, subtype: NodeSubtype, handler: Arc<dyn SubtypeHandler>) -> RestResult<()> {
        if self.handlers.contains_key(&subtype) {
            return Err(RestError::HandlerConflict(subtype.class_name().to_string()));
        }
        self.handlers.insert(subtype, handler);
        Ok(())
    }

    pub fn get(&self, subtype: NodeSubtype) -> Option<&dyn SubtypeHandler> {
        self.handlers.get(&subtype).map(|h| h.as_ref())
    }

    /// Handler for the node's subtype, or the base handler
    pub fn handler_for(&self, node: &Node) -> &dyn SubtypeHandler {
        NodeSubtype::of(node)
            .and_then(|subtype| self.get(subtype))
            .unwrap_or(&self.base)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for SubtypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
