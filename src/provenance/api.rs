//! Bounded one-hop provenance tree around a single node.
//!
//! The tree is built directly from link traversals; it does not go through
//! the request translator.

use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::graph::{class_name_of, Node};
use crate::handlers::SubtypeRegistry;
use crate::identifiers::NodeIdentifier;
use crate::query::{Direction, OrderSpec, Projection, QueryDescription, Relation, Segment};
use crate::storage::GraphStore;

use super::types::{TreeEntry, TreeMetadata, TreeNode, TreeResult};

const ROOT_TAG: &str = "main";

/// Provenance reads over one store.
pub struct ProvenanceApi<'a> {
    store: &'a dyn GraphStore,
    registry: &'a SubtypeRegistry,
}

impl<'a> ProvenanceApi<'a> {
    pub fn new(store: &'a dyn GraphStore, registry: &'a SubtypeRegistry) -> Self {
        Self { store, registry }
    }

    /// Resolve an identifier to exactly one node.
    ///
    /// Every reading of the identifier is tried; matches are counted once
    /// per node.
    pub fn resolve(&self, identifier: &NodeIdentifier) -> RestResult<Node> {
        let mut matches: Vec<Node> = Vec::new();
        for filters in identifier.readings() {
            let query = QueryDescription::new()
                .with_segment(
                    Segment::nodes(ROOT_TAG)
                        .with_filters(filters)
                        .with_projection(Projection::All),
                )?
                .limit(2);
            for row in self.store.fetch(&query)? {
                if let Some(node) = row.node(ROOT_TAG) {
                    if !matches.iter().any(|m| m.id == node.id) {
                        matches.push(node.clone());
                    }
                }
            }
        }
        match matches.len() {
            0 => Err(RestError::NotFound(format!("no node matches `{}`", identifier))),
            1 => matches
                .pop()
                .ok_or_else(|| RestError::NotFound(format!("no node matches `{}`", identifier))),
            _ => Err(RestError::NonUniqueResult(format!(
                "more than one node matches `{}`",
                identifier
            ))),
        }
    }

    /// Subtype description, or the class name when none can be produced.
    fn describe(&self, node: &Node) -> String {
        match self.registry.handler_for(node).description(node) {
            Ok(description) => description,
            Err(e) => {
                debug!(node = %node.id, error = %e, "falling back to class name");
                class_name_of(&node.node_type).to_string()
            }
        }
    }

    fn neighbors_query(&self, root: &Node, direction: Direction, limit: Option<usize>) -> RestResult<QueryDescription> {
        let tag = match direction {
            Direction::Incoming => "in",
            Direction::Outgoing => "out",
        };
        let mut query = QueryDescription::new()
            .with_segment(Segment::nodes(ROOT_TAG).with_filters(NodeIdentifier::Pk(root.id.get()).filters()))?
            .with_segment(
                Segment::nodes(tag)
                    .with_projection(Projection::All)
                    .with_edge_projection()
                    .with_relation(Relation::neighbor_of(ROOT_TAG, direction)),
            )?
            .order_by(OrderSpec::asc(tag, "id"));
        query.limit = limit;
        Ok(query)
    }

    /// Neighbors on one side, truncated to `limit`, and the untruncated total.
    fn neighbors(&self, root: &Node, direction: Direction, limit: Option<usize>) -> RestResult<(Vec<TreeEntry>, usize)> {
        let query = self.neighbors_query(root, direction, limit)?;
        let total = self.store.count(&query)?;
        let tag = query.primary().unwrap_or(ROOT_TAG).to_string();

        let mut entries = Vec::new();
        for row in self.store.fetch(&query)? {
            let (Some(node), Some(link)) = (row.node(&tag), row.edge(ROOT_TAG, &tag)) else {
                continue;
            };
            entries.push(TreeEntry {
                ctime: node.ctime,
                mtime: node.mtime,
                id: node.id.get(),
                uuid: node.uuid,
                node_type: node.node_type.clone(),
                node_label: node.label.clone(),
                description: self.describe(node),
                link_label: link.label.clone(),
                link_type: link.link_type.clone(),
            });
        }
        Ok((entries, total))
    }

    /// Root node plus its incoming and outgoing neighbors.
    ///
    /// `None` limits return every neighbor.
    pub fn get_io_tree(
        &self,
        identifier: &NodeIdentifier,
        in_limit: Option<usize>,
        out_limit: Option<usize>,
    ) -> RestResult<TreeResult> {
        let root = self.resolve(identifier)?;
        let (incoming, total_in) = self.neighbors(&root, Direction::Incoming, in_limit)?;
        let (outgoing, total_out) = self.neighbors(&root, Direction::Outgoing, out_limit)?;

        let metadata = TreeMetadata {
            total_no_of_incomings: total_in,
            total_no_of_outgoings: total_out,
            sent_no_of_incomings: incoming.len(),
            sent_no_of_outgoings: outgoing.len(),
        };
        debug!(node = %root.id, ?metadata, "provenance tree built");

        let node = TreeNode {
            ctime: root.ctime,
            mtime: root.mtime,
            id: root.id.get(),
            uuid: root.uuid,
            node_type: root.node_type.clone(),
            node_label: root.label.clone(),
            description: self.describe(&root),
            incoming,
            outgoing,
        };
        Ok(TreeResult {
            nodes: vec![node],
            metadata: vec![metadata],
        })
    }
}
