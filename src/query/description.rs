//! Backend-agnostic query description
//!
//! A description is an ordered path of segments. Every segment selects
//! one entity category under a unique tag, may filter and project it, and
//! (except the first) is tied to an earlier segment by a [`Relation`].
//! Stores translate a description into their own query language.

use crate::storage::{StorageError, StorageResult};
use serde_json::Value;

/// Entity category a segment selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Node,
    User,
}

/// Direction of link traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow links leaving a node (source -> target)
    Outgoing,
    /// Follow links entering a node (target <- source)
    Incoming,
}

/// A single predicate on one field
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// SQL-style pattern: `%` matches any run, `\` escapes
    Like(String),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
}

/// Predicates keyed by field name, combined with AND
///
/// A field may carry several predicates; insertion order is preserved so
/// generated queries are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    predicates: Vec<(String, Filter)>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, filter: Filter) -> Self {
        self.push(field, filter);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, filter: Filter) {
        self.predicates.push((field.into(), filter));
    }

    /// Append every predicate of `other`
    pub fn merge(&mut self, other: FilterSet) {
        self.predicates.extend(other.predicates);
    }

    pub fn get(&self, field: &str) -> Option<&Filter> {
        self.predicates
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, filter)| filter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Filter)> {
        self.predicates.iter().map(|(f, filter)| (f.as_str(), filter))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }
}

/// Which part of a segment's record is returned
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Projection {
    /// Segment only constrains the path
    #[default]
    None,
    /// Entire record
    All,
    /// Named fields, returned as a mapping
    Fields(Vec<String>),
}

impl Projection {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(Into::into).collect())
    }
}

/// How a segment is tied to an earlier one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// This segment is reached by a link leaving the tagged node
    WithIncoming(String),
    /// This segment has a link leading to the tagged node
    WithOutgoing(String),
    /// This (user) segment owns the tagged node
    WithNode(String),
}

impl Relation {
    pub fn tag(&self) -> &str {
        match self {
            Self::WithIncoming(t) | Self::WithOutgoing(t) | Self::WithNode(t) => t,
        }
    }

    /// Relation placing a new segment on the `direction` side of `tag`
    pub fn neighbor_of(tag: impl Into<String>, direction: Direction) -> Self {
        match direction {
            Direction::Outgoing => Self::WithIncoming(tag.into()),
            Direction::Incoming => Self::WithOutgoing(tag.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub category: Category,
    /// Accepted node-type prefixes; empty accepts every node
    pub type_prefixes: Vec<String>,
    pub tag: String,
    pub filters: FilterSet,
    pub projection: Projection,
    /// Return the link traversed to reach this segment
    pub edge_projection: bool,
    /// Predicates on that link's `label` and `type`
    pub edge_filters: FilterSet,
    pub relation: Option<Relation>,
}

impl Segment {
    pub fn nodes(tag: impl Into<String>) -> Self {
        Self {
            category: Category::Node,
            type_prefixes: Vec::new(),
            tag: tag.into(),
            filters: FilterSet::new(),
            projection: Projection::None,
            edge_projection: false,
            edge_filters: FilterSet::new(),
            relation: None,
        }
    }

    pub fn users(tag: impl Into<String>) -> Self {
        Self {
            category: Category::User,
            ..Self::nodes(tag)
        }
    }

    pub fn with_type_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_edge_projection(mut self) -> Self {
        self.edge_projection = true;
        self
    }

    pub fn with_edge_filters(mut self, filters: FilterSet) -> Self {
        self.edge_filters = filters;
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub tag: String,
    pub field: String,
    pub order: SortOrder,
}

impl OrderSpec {
    pub fn asc(tag: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(tag: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            order: SortOrder::Desc,
            ..Self::asc(tag, field)
        }
    }

    /// Parse the `field` / `-field` / `+field` convention of request parameters
    pub fn parse(tag: &str, spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self::desc(tag, field),
            None => Self::asc(tag, spec.strip_prefix('+').unwrap_or(spec)),
        }
    }
}

/// An assembled query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescription {
    segments: Vec<Segment>,
    pub order: Vec<OrderSpec>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub distinct: bool,
    primary: Option<String>,
}

impl QueryDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment, checking tag uniqueness and relation targets
    pub fn append(&mut self, segment: Segment) -> StorageResult<()> {
        if self.segment(&segment.tag).is_some() {
            return Err(StorageError::InvalidQuery(format!(
                "duplicate tag `{}`",
                segment.tag
            )));
        }
        match (&segment.relation, self.segments.is_empty()) {
            (None, true) => {}
            (None, false) => {
                return Err(StorageError::InvalidQuery(format!(
                    "segment `{}` has no relation to an earlier segment",
                    segment.tag
                )))
            }
            (Some(_), true) => {
                return Err(StorageError::InvalidQuery(format!(
                    "first segment `{}` cannot be related",
                    segment.tag
                )))
            }
            (Some(rel), false) => {
                let target = self.segment(rel.tag()).ok_or_else(|| {
                    StorageError::InvalidQuery(format!("unknown relation tag `{}`", rel.tag()))
                })?;
                let valid = match rel {
                    Relation::WithNode(_) => {
                        segment.category == Category::User && target.category == Category::Node
                    }
                    _ => segment.category == Category::Node && target.category == Category::Node,
                };
                if !valid {
                    return Err(StorageError::InvalidQuery(format!(
                        "relation of `{}` to `{}` joins incompatible categories",
                        segment.tag,
                        rel.tag()
                    )));
                }
            }
        }
        self.segments.push(segment);
        Ok(())
    }

    pub fn with_segment(mut self, segment: Segment) -> StorageResult<Self> {
        self.append(segment)?;
        Ok(self)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, tag: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.tag == tag)
    }

    pub fn segment_mut(&mut self, tag: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.tag == tag)
    }

    /// Mark the segment whose records are the result; defaults to the last one
    pub fn set_primary(&mut self, tag: impl Into<String>) -> StorageResult<()> {
        let tag = tag.into();
        if self.segment(&tag).is_none() {
            return Err(StorageError::InvalidQuery(format!("unknown primary tag `{}`", tag)));
        }
        self.primary = Some(tag);
        Ok(())
    }

    pub fn primary(&self) -> Option<&str> {
        self.primary
            .as_deref()
            .or_else(|| self.segments.last().map(|s| s.tag.as_str()))
    }

    pub fn order_by(mut self, spec: OrderSpec) -> Self {
        self.order.push(spec);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Copy without limit and offset, used for counting
    pub fn unbounded(&self) -> Self {
        Self {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

/// Escape `%`, `_` and `\` so `s` matches literally inside a like pattern
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
