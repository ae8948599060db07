//! Content selectors and their dispatch on a single resolved node

use crate::error::{RestError, RestResult};
use crate::graph::{Node, Properties, RepositoryError};
use crate::handlers::{Download, SubtypeRegistry};
use crate::storage::{GraphStore, StorageError};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Enrichment view requested for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentSelector {
    #[default]
    Default,
    Attributes,
    Extras,
    DerivedProperties,
    DownloadFormats,
    Download,
    Comments,
    RepoList,
    RepoContents,
    RetrievedInputs,
    RetrievedOutputs,
}

impl ContentSelector {
    pub const ALL: [ContentSelector; 11] = [
        Self::Default,
        Self::Attributes,
        Self::Extras,
        Self::DerivedProperties,
        Self::DownloadFormats,
        Self::Download,
        Self::Comments,
        Self::RepoList,
        Self::RepoContents,
        Self::RetrievedInputs,
        Self::RetrievedOutputs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Attributes => "attributes",
            Self::Extras => "extras",
            Self::DerivedProperties => "derived_properties",
            Self::DownloadFormats => "download_formats",
            Self::Download => "download",
            Self::Comments => "comments",
            Self::RepoList => "repo_list",
            Self::RepoContents => "repo_contents",
            Self::RetrievedInputs => "retrieved_inputs",
            Self::RetrievedOutputs => "retrieved_outputs",
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::Default
    }
}

impl fmt::Display for ContentSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentSelector {
    type Err = RestError;

    fn from_str(s: &str) -> RestResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| RestError::validation(format!("invalid content type `{}`", s)))
    }
}

/// Arguments that accompany a content selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentArgs {
    /// Keys to keep (attributes / extras)
    pub include: Option<Vec<String>>,
    /// Keys to drop (attributes / extras)
    pub exclude: Option<Vec<String>>,
    /// Repository path
    pub path: Option<String>,
    /// Export format for downloads
    pub format: Option<String>,
}

/// Output of a content dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContentValue {
    Json(Value),
    Bytes(Vec<u8>),
    Download(Download),
}

impl ContentValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Key selection for attributes and extras
///
/// Include and exclude lists are mutually exclusive; unknown keys are skipped.
pub fn select_keys(
    map: &Properties,
    include: Option<&[String]>,
    exclude: Option<&[String]>,
) -> RestResult<Properties> {
    match (include, exclude) {
        (Some(_), Some(_)) => Err(RestError::validation(
            "you cannot specify both an include list and an exclude list",
        )),
        (Some(keys), None) => Ok(map
            .iter()
            .filter(|(k, _)| keys.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        (None, Some(keys)) => Ok(map
            .iter()
            .filter(|(k, _)| !keys.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        (None, None) => Ok(map.clone()),
    }
}

fn to_json<T: Serialize>(value: T) -> RestResult<Value> {
    serde_json::to_value(value).map_err(|e| RestError::Storage(StorageError::from(e)))
}

fn repo_error(e: RepositoryError) -> RestError {
    match e {
        RepositoryError::IsADirectory(_) => RestError::validation("It is a directory. Please pass filename."),
        RepositoryError::NotFound(_) => RestError::validation("No such file is present"),
        other => RestError::validation(other.to_string()),
    }
}

/// Runs the enrichment routine a selector names
pub struct ContentDispatcher<'a> {
    registry: &'a SubtypeRegistry,
    store: &'a dyn GraphStore,
}

impl<'a> ContentDispatcher<'a> {
    pub fn new(registry: &'a SubtypeRegistry, store: &'a dyn GraphStore) -> Self {
        Self { registry, store }
    }

    pub fn dispatch(&self, selector: ContentSelector, args: &ContentArgs, node: &Node) -> RestResult<ContentValue> {
        debug!(node = %node.id, content = %selector, "dispatching content");
        let path = args.path.as_deref().unwrap_or_default();
        let handler = self.registry.handler_for(node);

        let value = match selector {
            ContentSelector::Default => {
                return Err(RestError::InvalidOperation(
                    "the default selector has no content to dispatch".into(),
                ))
            }
            ContentSelector::Attributes => Value::Object(select_keys(
                &node.attributes,
                args.include.as_deref(),
                args.exclude.as_deref(),
            )?),
            ContentSelector::Extras => Value::Object(select_keys(
                &node.extras,
                args.include.as_deref(),
                args.exclude.as_deref(),
            )?),
            ContentSelector::DerivedProperties => handler.derived_properties(node)?,
            ContentSelector::DownloadFormats => to_json(handler.download_formats(node)?)?,
            ContentSelector::Download => {
                return Ok(ContentValue::Download(handler.download(node, args.format.as_deref())?))
            }
            ContentSelector::Comments => to_json(self.store.comments(node.id)?)?,
            ContentSelector::RepoList => {
                let listing = node
                    .repository
                    .listing(path)
                    .map_err(|e| RestError::validation(e.to_string()))?;
                to_json(listing)?
            }
            ContentSelector::RepoContents => {
                if path.is_empty() {
                    return Err(RestError::validation("filename is not provided"));
                }
                let content = node.repository.get_object_content(path).map_err(repo_error)?;
                return Ok(ContentValue::Bytes(content));
            }
            ContentSelector::RetrievedInputs => {
                to_json(handler.retrieved_inputs(node, path)?)?
            }
            ContentSelector::RetrievedOutputs => {
                to_json(handler.retrieved_outputs(node, path, self.store)?)?
            }
        };
        Ok(ContentValue::Json(value))
    }
}
