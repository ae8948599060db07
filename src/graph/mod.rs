//! Provenance graph records

mod link;
mod node;
mod repository;

pub use link::{Link, LinkType, LinkView};
pub use node::{class_name_of, Comment, CommentView, Node, NodeId, Properties, User};
pub use repository::{ObjectType, RepoObject, Repository, RepositoryError};
