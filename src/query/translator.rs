//! Request parameters to query descriptions, and results back to records

use super::content::{ContentArgs, ContentDispatcher, ContentSelector, ContentValue};
use super::description::{
    Direction, FilterSet, OrderSpec, Projection, QueryDescription, Relation, Segment,
};
use super::resource::{Resource, ResultType};
use crate::error::{RestError, RestResult};
use crate::handlers::SubtypeRegistry;
use crate::identifiers::NodeIdentifier;
use crate::storage::{GraphStore, Projected, QueryRow};
use serde_json::{Map, Value};
use tracing::debug;

/// Fields returned when the caller names none
pub const DEFAULT_PROJECTIONS: [&str; 7] = ["id", "label", "node_type", "ctime", "mtime", "uuid", "user_id"];

/// Projection name for the owner's email, served by a join on users
pub const USER_EMAIL: &str = "user_email";

/// Projection name selecting the entire record
pub const ALL_FIELDS: &str = "**";

const USER_TAG: &str = "user";

/// Parsed parameters of one node request
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub resource: Resource,
    pub node_id: Option<NodeIdentifier>,
    pub filters: FilterSet,
    /// `field` or `-field`, applied in order
    pub orders: Vec<String>,
    pub projections: Vec<String>,
    pub result: ResultType,
    pub content: ContentSelector,
    pub content_args: ContentArgs,
}

/// What a node query produced
#[derive(Debug, Clone, PartialEq)]
pub enum Results {
    /// One flattened record per row
    Rows(Vec<Value>),
    /// Content of the requested node; `None` when it matched nothing
    Content(Option<ContentValue>),
}

/// Builds and runs the query behind one node request
pub struct NodeTranslator<'a> {
    store: &'a dyn GraphStore,
    registry: &'a SubtypeRegistry,
    request: QueryRequest,
    query: Option<QueryDescription>,
    limit: Option<usize>,
    offset: Option<usize>,
    total_count: Option<usize>,
}

impl<'a> NodeTranslator<'a> {
    pub fn new(store: &'a dyn GraphStore, registry: &'a SubtypeRegistry) -> Self {
        Self {
            store,
            registry,
            request: QueryRequest::default(),
            query: None,
            limit: None,
            offset: None,
            total_count: None,
        }
    }

    fn base_tag(&self) -> &'static str {
        self.request.resource.name()
    }

    /// Tag whose records are returned
    pub fn result_tag(&self) -> &'static str {
        match self.request.result {
            ResultType::Default => self.base_tag(),
            other => other.as_str(),
        }
    }

    /// Assemble the query; can only happen once per translator
    pub fn set_query(&mut self, request: QueryRequest) -> RestResult<()> {
        if self.query.is_some() {
            return Err(RestError::InvalidOperation("the query has already been set".into()));
        }
        if request.node_id.is_none() && !(request.content.is_default() && request.result == ResultType::Default) {
            return Err(RestError::validation(
                "non default result/content can only be applied to a specific node (specify an id)",
            ));
        }
        if !request.content.is_default() && request.result != ResultType::Default {
            return Err(RestError::validation(format!(
                "content `{}` cannot be combined with `{}` results",
                request.content,
                request.result.as_str()
            )));
        }
        if request.content_args.include.is_some() && request.content_args.exclude.is_some() {
            return Err(RestError::validation(
                "you cannot specify both an include list and an exclude list",
            ));
        }

        self.request = request;
        let query = self.build()?;
        debug!(
            resource = %self.request.resource,
            result = self.request.result.as_str(),
            content = %self.request.content,
            segments = query.segments().len(),
            "query assembled"
        );
        self.query = Some(query);
        Ok(())
    }

    fn projections(&self) -> (Projection, bool) {
        if !self.request.content.is_default() {
            return (Projection::All, false);
        }
        let names: Vec<&str> = if self.request.projections.is_empty() {
            DEFAULT_PROJECTIONS.iter().copied().chain([USER_EMAIL]).collect()
        } else {
            self.request.projections.iter().map(String::as_str).collect()
        };
        if names.contains(&ALL_FIELDS) {
            return (Projection::All, names.contains(&USER_EMAIL));
        }
        let with_user = names.contains(&USER_EMAIL);
        let fields = names.into_iter().filter(|n| *n != USER_EMAIL);
        (Projection::fields(fields), with_user)
    }

    fn build(&self) -> RestResult<QueryDescription> {
        let request = &self.request;
        let base = self.base_tag();
        let result = self.result_tag();
        let (projection, with_user) = self.projections();

        let mut base_filters = request
            .node_id
            .as_ref()
            .map(NodeIdentifier::filters)
            .unwrap_or_default();
        let mut base_segment = Segment::nodes(base).with_type_prefixes(request.resource.type_prefixes().iter().copied());

        let mut query = QueryDescription::new();
        match request.result {
            ResultType::Default => {
                base_filters.merge(request.filters.clone());
                base_segment = base_segment.with_filters(base_filters).with_projection(projection);
                query.append(base_segment)?;
            }
            ResultType::Incoming | ResultType::Outgoing => {
                let direction = if request.result == ResultType::Incoming {
                    Direction::Incoming
                } else {
                    Direction::Outgoing
                };
                query.append(base_segment.with_filters(base_filters))?;
                query.append(
                    Segment::nodes(result)
                        .with_filters(request.filters.clone())
                        .with_projection(projection)
                        .with_edge_projection()
                        .with_relation(Relation::neighbor_of(base, direction)),
                )?;
            }
        }

        if with_user {
            query.append(
                Segment::users(USER_TAG)
                    .with_projection(Projection::fields(["email"]))
                    .with_relation(Relation::WithNode(result.to_string())),
            )?;
        }
        query.set_primary(result)?;

        for spec in &request.orders {
            query.order.push(OrderSpec::parse(result, spec));
        }
        if query.order.is_empty() {
            query.order.push(OrderSpec::asc(result, "id"));
        }
        Ok(query)
    }

    fn query(&self) -> RestResult<&QueryDescription> {
        self.query
            .as_ref()
            .ok_or_else(|| RestError::InvalidOperation("query builder object has not been initialized".into()))
    }

    /// Absolute bounds for the executed query
    pub fn set_limit_offset(&mut self, limit: Option<usize>, offset: Option<usize>) {
        self.limit = limit;
        self.offset = offset;
    }

    /// Number of records the query selects; computed once
    pub fn get_total_count(&mut self) -> RestResult<usize> {
        if let Some(count) = self.total_count {
            return Ok(count);
        }
        let count = self.store.count(self.query()?)?;
        self.total_count = Some(count);
        Ok(count)
    }

    fn bounded(&self) -> RestResult<QueryDescription> {
        let mut query = self.query()?.clone();
        query.limit = self.limit;
        query.offset = self.offset;
        Ok(query)
    }

    pub fn get_results(&mut self) -> RestResult<Results> {
        let query = self.bounded()?;
        if !self.request.content.is_default() {
            return self.get_content(&query).map(Results::Content);
        }
        let rows = self.store.fetch(&query)?;
        debug!(rows = rows.len(), "query executed");
        Ok(Results::Rows(rows.iter().map(|row| self.flatten(row)).collect()))
    }

    fn get_content(&mut self, query: &QueryDescription) -> RestResult<Option<ContentValue>> {
        if self.get_total_count()? == 0 {
            return Ok(None);
        }
        let Some(row) = self.store.first(query)? else {
            return Ok(None);
        };
        let node = row
            .node(self.base_tag())
            .ok_or_else(|| RestError::InvalidOperation("content requires the full node record".into()))?;
        ContentDispatcher::new(self.registry, self.store)
            .dispatch(self.request.content, &self.request.content_args, node)
            .map(Some)
    }

    /// One record: the result's fields, the traversed link and the owner email
    fn flatten(&self, row: &QueryRow) -> Value {
        let result = self.result_tag();
        let mut record = match row.get(result) {
            Some(Projected::Fields(fields)) => fields.clone(),
            Some(Projected::Node(node)) => match serde_json::to_value(node) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            Some(Projected::User(_)) | None => Map::new(),
        };
        if self.request.result != ResultType::Default {
            if let Some(link) = row.edge(self.base_tag(), result) {
                record.insert("link_label".into(), Value::String(link.label.clone()));
                record.insert("link_type".into(), Value::String(link.link_type.clone()));
            }
        }
        if self.query.as_ref().and_then(|q| q.segment(USER_TAG)).is_some() {
            let email = row
                .fields(USER_TAG)
                .and_then(|f| f.get("email"))
                .cloned()
                .unwrap_or(Value::Null);
            record.insert(USER_EMAIL.into(), email);
        }
        Value::Object(record)
    }
}
