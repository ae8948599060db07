//! Provenance tree: a node's incoming and outgoing links with truncation metadata.

pub mod api;
pub mod types;

pub use api::ProvenanceApi;
pub use types::{TreeEntry, TreeMetadata, TreeNode, TreeResult};
