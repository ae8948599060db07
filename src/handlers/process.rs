//! Process nodes: calculation jobs, calculation functions and workflows

use super::SubtypeHandler;
use crate::error::{RestError, RestResult};
use crate::graph::{Node, RepoObject, RepositoryError};
use crate::query::{Filter, FilterSet, Projection, QueryDescription, Relation, Segment};
use crate::storage::GraphStore;
use serde_json::json;
use tracing::debug;

/// Label of the link from a calculation job to its retrieved folder
pub const RETRIEVED_LINK_LABEL: &str = "retrieved";

/// Human description built from the `process_state` attribute
///
/// Finished processes report their exit status, e.g. `Finished [0]`.
pub fn process_description(node: &Node) -> RestResult<String> {
    let state = node
        .attribute_str("process_state")
        .ok_or_else(|| RestError::not_available(format!("node {} has no process state", node.id)))?;
    let description = match state {
        "created" => "Created".to_string(),
        "waiting" => "Waiting".to_string(),
        "running" => "Running".to_string(),
        "excepted" => "Excepted".to_string(),
        "killed" => "Killed".to_string(),
        "finished" => {
            let exit_status = node
                .attribute("exit_status")
                .and_then(|v| v.as_i64())
                .unwrap_or_default();
            format!("Finished [{}]", exit_status)
        }
        other => {
            return Err(RestError::not_available(format!(
                "unknown process state `{}` on node {}",
                other, node.id
            )))
        }
    };
    Ok(description)
}

fn listing(node: &Node, path: &str) -> RestResult<Vec<RepoObject>> {
    node.repository
        .listing(path)
        .map_err(|e: RepositoryError| RestError::validation(e.to_string()))
}

/// Handler shared by every process subtype
///
/// Only calculation jobs own retrieved files.
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandler {
    has_retrieved_files: bool,
}

impl ProcessHandler {
    pub fn calc_job() -> Self {
        Self {
            has_retrieved_files: true,
        }
    }

    pub fn function() -> Self {
        Self {
            has_retrieved_files: false,
        }
    }
}

impl SubtypeHandler for ProcessHandler {
    fn description(&self, node: &Node) -> RestResult<String> {
        process_description(node)
    }

    fn retrieved_inputs(&self, node: &Node, path: &str) -> RestResult<Vec<RepoObject>> {
        if !self.has_retrieved_files {
            return Ok(Vec::new());
        }
        listing(node, path)
    }

    fn retrieved_outputs(&self, node: &Node, path: &str, store: &dyn GraphStore) -> RestResult<Vec<RepoObject>> {
        if !self.has_retrieved_files {
            return Ok(Vec::new());
        }

        let query = QueryDescription::new()
            .with_segment(
                Segment::nodes("calc").with_filters(FilterSet::new().with("id", Filter::Eq(json!(node.id.get())))),
            )?
            .with_segment(
                Segment::nodes("retrieved")
                    .with_projection(Projection::All)
                    .with_edge_filters(
                        FilterSet::new().with("label", Filter::Eq(json!(RETRIEVED_LINK_LABEL))),
                    )
                    .with_relation(Relation::WithIncoming("calc".into())),
            )?;

        match store.first(&query)? {
            Some(row) => match row.node("retrieved") {
                Some(folder) => listing(folder, path),
                None => Ok(Vec::new()),
            },
            None => {
                debug!(node = %node.id, "no retrieved folder");
                Ok(Vec::new())
            }
        }
    }
}
