//! Directed, labelled provenance links

use super::node::NodeId;
use serde::{Deserialize, Serialize};

/// Semantic role of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Calculation created a data node
    Create,
    /// Workflow returned a data node
    Return,
    /// Data node consumed by a calculation
    InputCalc,
    /// Data node consumed by a workflow
    InputWork,
    /// Workflow called a calculation
    CallCalc,
    /// Workflow called another workflow
    CallWork,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Return => "return",
            Self::InputCalc => "input_calc",
            Self::InputWork => "input_work",
            Self::CallCalc => "call_calc",
            Self::CallWork => "call_work",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "return" => Ok(Self::Return),
            "input_calc" => Ok(Self::InputCalc),
            "input_work" => Ok(Self::InputWork),
            "call_calc" => Ok(Self::CallCalc),
            "call_work" => Ok(Self::CallWork),
            _ => Err(format!("unknown link type: {}", s)),
        }
    }
}

/// A directed edge from `source` to `target`
///
/// Identity is `(source, target, label)`; links are read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: NodeId,
    pub target: NodeId,
    pub label: String,
    pub link_type: LinkType,
}

impl Link {
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        label: impl Into<String>,
        link_type: LinkType,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: label.into(),
            link_type,
        }
    }
}

/// Edge projection carried alongside a traversal row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkView {
    pub label: String,
    pub link_type: String,
}
