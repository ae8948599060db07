//! Query assembly for node requests
//!
//! Requests are translated into a backend-agnostic [`QueryDescription`],
//! executed by a [`GraphStore`](crate::storage::GraphStore), and either
//! flattened into records or routed through the content dispatcher.

mod content;
mod description;
mod resource;
mod translator;

pub use content::{select_keys, ContentArgs, ContentDispatcher, ContentSelector, ContentValue};
pub use description::{
    escape_like, Category, Direction, Filter, FilterSet, OrderSpec, Projection, QueryDescription,
    Relation, Segment, SortOrder,
};
pub use resource::{Resource, ResultType};
pub use translator::{NodeTranslator, QueryRequest, Results, ALL_FIELDS, DEFAULT_PROJECTIONS, USER_EMAIL};
