//! Transport-independent API layer.
//!
//! `RestApi` is the single entry point for every consumer-facing operation.
//! Transports (HTTP routing, the CLI, direct embedding) pass already parsed
//! parameters and receive plain values; status codes and headers stay on
//! their side.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::error::{RestError, RestResult};
use crate::handlers::{all_download_formats, SubtypeRegistry};
use crate::identifiers::{
    build_namespace_tree, filters_for, load_handler, EntryPoint, EntryPointRegistry, Namespace,
    NodeIdentifier, PluginRegistry,
};
use crate::pagination::{paginate, PageLinks};
use crate::provenance::{ProvenanceApi, TreeResult};
use crate::query::{
    ContentArgs, ContentSelector, ContentValue, FilterSet, NodeTranslator, Projection,
    QueryDescription, QueryRequest, Resource, Results, ResultType, Segment, DEFAULT_PROJECTIONS,
    USER_EMAIL,
};
use crate::storage::{CreationStatistics, GraphStore};

/// Parameters of a node request, as decoded by the transport
#[derive(Debug, Clone, Default)]
pub struct NodeRequest {
    pub resource: Resource,
    /// Primary key or UUID prefix
    pub id: Option<String>,
    pub page: Option<usize>,
    pub perpage: Option<usize>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub filters: FilterSet,
    pub full_type: Option<String>,
    pub orders: Vec<String>,
    pub projections: Vec<String>,
    pub result: ResultType,
    pub content: ContentSelector,
    pub content_args: ContentArgs,
}

/// Response body shared by every node request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub resource_type: String,
    pub id: Option<String>,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel_pages: Option<PageLinks>,
    pub data: Value,
}

impl Envelope {
    /// `Link` header value for paged responses
    pub fn link_header(&self, prefix: &str) -> Option<String> {
        let base = format!("{}/{}", prefix.trim_end_matches('/'), self.resource_type);
        self.rel_pages.map(|links| links.header_value(&base))
    }
}

/// One projectable node field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub display_name: &'static str,
    pub help_text: &'static str,
    pub is_foreign_key: bool,
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub is_display: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub fields: BTreeMap<&'static str, FieldSchema>,
    pub ordering: Vec<&'static str>,
}

const SCHEMA: [(&str, &str, &str, bool, &str, bool); 10] = [
    ("id", "Id", "Id of the object", false, "int", false),
    ("label", "Label", "User-assigned label", false, "str", true),
    ("node_type", "Type", "Node type", false, "str", true),
    ("ctime", "Creation time", "Creation time of the node", false, "datetime.datetime", true),
    ("mtime", "Last Modification time", "Last modification time", false, "datetime.datetime", true),
    ("uuid", "Unique ID", "Universally Unique Identifier", false, "unicode", false),
    ("user_id", "Id of creator", "Id of the user that created the node", true, "int", false),
    ("user_email", "Email of creator", "Email of the user that created the node", false, "str", true),
    ("attributes", "Attributes", "Attributes of the node", false, "dict", false),
    ("extras", "Extras", "Extras of the node", false, "dict", false),
];

/// Single entry point for all consumer-facing operations.
#[derive(Clone)]
pub struct RestApi {
    store: Arc<dyn GraphStore>,
    subtypes: Arc<SubtypeRegistry>,
    plugins: Arc<dyn PluginRegistry>,
    config: ServiceConfig,
}

impl RestApi {
    /// Built-in handlers plus the plugins the config declares
    pub fn new(store: Arc<dyn GraphStore>, config: ServiceConfig) -> RestResult<Self> {
        let subtypes = Arc::new(SubtypeRegistry::builtin()?);
        let plugins: Arc<dyn PluginRegistry> = Arc::new(EntryPointRegistry::with_plugins(&config.plugins)?);
        Ok(Self::with_registries(store, subtypes, plugins, config))
    }

    pub fn with_registries(
        store: Arc<dyn GraphStore>,
        subtypes: Arc<SubtypeRegistry>,
        plugins: Arc<dyn PluginRegistry>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            subtypes,
            plugins,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    fn provenance(&self) -> ProvenanceApi<'_> {
        ProvenanceApi::new(self.store.as_ref(), self.subtypes.as_ref())
    }

    // --- Node queries ---

    /// Reject parameter combinations that have no meaning
    pub fn validate_request(&self, request: &NodeRequest) -> RestResult<()> {
        let limit_default = self.config.limit_default;
        if request.page.is_some() && (request.limit.is_some() || request.offset.is_some()) {
            return Err(RestError::validation(
                "requesting a specific page is incompatible with limit and offset",
            ));
        }
        if request.perpage.is_some() && request.page.is_none() {
            return Err(RestError::validation("perpage key is incompatible with limit and offset"));
        }
        if let Some(perpage) = request.perpage {
            if perpage > limit_default {
                return Err(RestError::validation(format!(
                    "perpage ({}) cannot exceed {}",
                    perpage, limit_default
                )));
            }
        }
        if let Some(limit) = request.limit {
            if limit > limit_default {
                return Err(RestError::validation(format!(
                    "limit ({}) cannot exceed {}",
                    limit, limit_default
                )));
            }
        }
        if let Some(offset) = request.offset {
            // Stores bind offsets as signed 64-bit integers
            if i64::try_from(offset).is_err() {
                return Err(RestError::validation(format!("offset ({}) is out of range", offset)));
            }
        }
        if let Some(full_type) = &request.full_type {
            crate::identifiers::validate(full_type)?;
        }
        Ok(())
    }

    /// List, filter, page or enrich nodes of one resource
    pub fn get_nodes(&self, request: &NodeRequest) -> RestResult<Envelope> {
        self.validate_request(request)?;

        let node_id = match &request.id {
            Some(id) => {
                let identifier = NodeIdentifier::parse(id)?;
                let node = self.provenance().resolve(&identifier)?;
                Some(NodeIdentifier::Pk(node.id.get()))
            }
            None => None,
        };

        let mut filters = request.filters.clone();
        if let Some(full_type) = &request.full_type {
            filters.merge(filters_for(full_type)?);
        }

        let mut translator = NodeTranslator::new(self.store.as_ref(), self.subtypes.as_ref());
        translator.set_query(QueryRequest {
            resource: request.resource,
            node_id,
            filters,
            orders: request.orders.clone(),
            projections: request.projections.clone(),
            result: request.result,
            content: request.content,
            content_args: request.content_args.clone(),
        })?;

        let total_count = translator.get_total_count()?;
        let rel_pages = match request.page {
            Some(page) => {
                let perpage = request.perpage.unwrap_or(self.config.perpage_default);
                let page = paginate(page, perpage, total_count)?;
                translator.set_limit_offset(Some(page.limit), Some(page.offset));
                Some(page.links)
            }
            None => {
                let limit = request.limit.unwrap_or(self.config.limit_default);
                translator.set_limit_offset(Some(limit), request.offset);
                None
            }
        };

        let data = match translator.get_results()? {
            Results::Rows(rows) => {
                let label = match request.result {
                    ResultType::Default => request.resource.name(),
                    other => other.as_str(),
                };
                json!({ label: rows })
            }
            Results::Content(None) => Value::Object(Map::new()),
            Results::Content(Some(content)) => {
                let value = match content {
                    ContentValue::Json(value) => value,
                    ContentValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
                    ContentValue::Download(download) => json!(download),
                };
                json!({ request.content.as_str(): value })
            }
        };

        info!(
            resource = %request.resource,
            total_count,
            content = %request.content,
            "node request served"
        );
        Ok(Envelope {
            resource_type: request.resource.name().to_string(),
            id: request.id.clone(),
            total_count,
            rel_pages,
            data,
        })
    }

    // --- Provenance ---

    pub fn get_tree(&self, id: &str, in_limit: Option<usize>, out_limit: Option<usize>) -> RestResult<TreeResult> {
        let identifier = NodeIdentifier::parse(id)?;
        self.provenance().get_io_tree(&identifier, in_limit, out_limit)
    }

    // --- Node-level endpoints ---

    fn distinct_types(&self, resource: Resource) -> RestResult<Vec<(String, Option<String>)>> {
        let segment = Segment::nodes("node")
            .with_type_prefixes(resource.type_prefixes().iter().copied())
            .with_projection(Projection::fields(["node_type", "process_type"]));
        let query = QueryDescription::new().with_segment(segment)?.distinct();
        let mut pairs = Vec::new();
        for row in self.store.fetch(&query)? {
            let Some(fields) = row.fields("node") else {
                continue;
            };
            let node_type = fields.get("node_type").and_then(Value::as_str).unwrap_or_default();
            let process_type = fields.get("process_type").and_then(Value::as_str);
            pairs.push((node_type.to_string(), process_type.map(str::to_string)));
        }
        Ok(pairs)
    }

    /// Namespace tree over every full type present in the store
    pub fn full_types(&self) -> RestResult<Namespace> {
        let pairs = self.distinct_types(Resource::Nodes)?;
        debug!(pairs = pairs.len(), "building namespace tree");
        build_namespace_tree(
            pairs.iter().map(|(n, p)| (n.as_str(), p.as_deref())),
            self.plugins.as_ref(),
        )
    }

    /// Distinct node types of one resource grouped by their first segment
    pub fn types(&self, resource: Resource) -> RestResult<BTreeMap<String, Vec<String>>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (node_type, _) in self.distinct_types(resource)? {
            let key = node_type.split('.').next().unwrap_or_default().to_string();
            let group = groups.entry(key).or_default();
            if !group.contains(&node_type) {
                group.push(node_type);
            }
        }
        for group in groups.values_mut() {
            group.sort();
        }
        Ok(groups)
    }

    pub fn statistics(&self, user_id: Option<i64>) -> RestResult<CreationStatistics> {
        Ok(self.store.creation_statistics(user_id)?)
    }

    /// Projectable node fields and their display order
    pub fn schema(&self) -> Schema {
        let fields = SCHEMA
            .into_iter()
            .map(|(name, display_name, help_text, is_foreign_key, field_type, is_display)| {
                (
                    name,
                    FieldSchema {
                        display_name,
                        help_text,
                        is_foreign_key,
                        field_type,
                        is_display,
                    },
                )
            })
            .collect();
        let ordering = DEFAULT_PROJECTIONS
            .iter()
            .copied()
            .chain([USER_EMAIL, "attributes", "extras"])
            .collect();
        Schema { fields, ordering }
    }

    /// Export formats of every subtype that has any
    pub fn download_formats(&self) -> BTreeMap<String, Vec<String>> {
        all_download_formats()
    }

    pub fn load_handler(&self, full_type: &str) -> RestResult<EntryPoint> {
        load_handler(full_type, self.plugins.as_ref())
    }
}
