//! Node resources addressable by requests

use crate::error::{RestError, RestResult};
use std::fmt;
use std::str::FromStr;

/// A node collection and the node-type prefixes it accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Resource {
    #[default]
    Nodes,
    Processes,
    CalcJobs,
    CalcFunctions,
    WorkChains,
    WorkFunctions,
    Data,
    Structures,
    Upfs,
}

impl Resource {
    pub const ALL: [Resource; 9] = [
        Self::Nodes,
        Self::Processes,
        Self::CalcJobs,
        Self::CalcFunctions,
        Self::WorkChains,
        Self::WorkFunctions,
        Self::Data,
        Self::Structures,
        Self::Upfs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Processes => "processes",
            Self::CalcJobs => "calcjobs",
            Self::CalcFunctions => "calcfunctions",
            Self::WorkChains => "workchains",
            Self::WorkFunctions => "workfunctions",
            Self::Data => "data",
            Self::Structures => "structures",
            Self::Upfs => "upfs",
        }
    }

    /// Node-type prefixes of the base segment; empty accepts every node
    pub fn type_prefixes(&self) -> &'static [&'static str] {
        match self {
            Self::Nodes => &[],
            Self::Processes => &["process."],
            Self::CalcJobs => &["process.calculation.calcjob."],
            Self::CalcFunctions => &["process.calculation.calcfunction."],
            Self::WorkChains => &["process.workflow.workchain."],
            Self::WorkFunctions => &["process.workflow.workfunction."],
            Self::Data => &["data."],
            Self::Structures => &["data.structure."],
            Self::Upfs => &["data.upf."],
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resource {
    type Err = RestError;

    fn from_str(s: &str) -> RestResult<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| RestError::validation(format!("unknown resource `{}`", s)))
    }
}

/// Which records a node query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultType {
    /// The resource's own nodes
    #[default]
    Default,
    /// Nodes with a link into the requested node
    Incoming,
    /// Nodes the requested node links to
    Outgoing,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl FromStr for ResultType {
    type Err = RestError;

    fn from_str(s: &str) -> RestResult<Self> {
        match s {
            "default" => Ok(Self::Default),
            "incoming" => Ok(Self::Incoming),
            "outgoing" => Ok(Self::Outgoing),
            other => Err(RestError::validation(format!("invalid result type `{}`", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_names_parse_back() {
        for resource in Resource::ALL {
            assert_eq!(resource.name().parse::<Resource>().unwrap(), resource);
        }
        assert!("computers".parse::<Resource>().is_err());
    }

    #[test]
    fn test_prefixes() {
        assert!(Resource::Nodes.type_prefixes().is_empty());
        assert_eq!(Resource::CalcJobs.type_prefixes(), &["process.calculation.calcjob."]);
    }

    #[test]
    fn test_result_type() {
        assert_eq!("outgoing".parse::<ResultType>().unwrap(), ResultType::Outgoing);
        assert!("sideways".parse::<ResultType>().is_err());
    }
}
