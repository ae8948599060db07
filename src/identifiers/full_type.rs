//! Full types: `node_type|process_type` strings naming a node subtype
//!
//! Either side may end in a single `%`, which turns that side into a
//! prefix match.

use super::plugins::{parse_reference, EntryPoint, PluginRegistry};
use crate::error::{RestError, RestResult};
use crate::query::{escape_like, Filter, FilterSet};
use serde_json::Value;

pub const FULL_TYPE_CONCATENATOR: char = '|';
pub const LIKE_OPERATOR_CHARACTER: char = '%';

const DATA_PREFIX: &str = "data.";
const DATA_GROUP: &str = "aiida.data";

/// Check the concatenator and wildcard placement of a full type
pub fn validate(full_type: &str) -> RestResult<()> {
    split(full_type).map(|_| ())
}

/// Validate and split into `(node_type, process_type)`
pub fn split(full_type: &str) -> RestResult<(&str, &str)> {
    let concatenators = full_type.matches(FULL_TYPE_CONCATENATOR).count();
    if concatenators != 1 {
        return Err(RestError::invalid_full_type(
            full_type,
            format!(
                "expected exactly one concatenator `{}`, found {}",
                FULL_TYPE_CONCATENATOR, concatenators
            ),
        ));
    }
    let (node_type, process_type) = full_type
        .split_once(FULL_TYPE_CONCATENATOR)
        .ok_or_else(|| RestError::invalid_full_type(full_type, "missing concatenator"))?;

    for side in [node_type, process_type] {
        let wildcards = side.matches(LIKE_OPERATOR_CHARACTER).count();
        if wildcards > 1 {
            return Err(RestError::invalid_full_type(
                full_type,
                format!("component `{}` contains more than one like-operator character", side),
            ));
        }
        if wildcards == 1 && !side.ends_with(LIKE_OPERATOR_CHARACTER) {
            return Err(RestError::invalid_full_type(
                full_type,
                format!("like-operator character in component `{}` is not at the end", side),
            ));
        }
    }
    Ok((node_type, process_type))
}

/// Build the full type of a `(node_type, process_type)` pair
pub fn construct(node_type: Option<&str>, process_type: Option<&str>) -> String {
    format!(
        "{}{}{}",
        node_type.unwrap_or_default(),
        FULL_TYPE_CONCATENATOR,
        process_type.unwrap_or_default()
    )
}

/// Filters selecting every node the full type names
///
/// A side that is exactly `%` places no constraint, so nodes without a
/// process type still match `data.%|%`. An empty process type is omitted
/// and therefore matches any process type.
pub fn filters_for(full_type: &str) -> RestResult<FilterSet> {
    let (node_type, process_type) = split(full_type)?;
    let mut filters = FilterSet::new();
    if let Some(filter) = side_filter(node_type) {
        filters.push("node_type", filter);
    }
    if !process_type.is_empty() {
        if let Some(filter) = side_filter(process_type) {
            filters.push("process_type", filter);
        }
    }
    Ok(filters)
}

fn side_filter(side: &str) -> Option<Filter> {
    match side.strip_suffix(LIKE_OPERATOR_CHARACTER) {
        Some("") => None,
        Some(prefix) => Some(Filter::Like(format!("{}%", escape_like(prefix)))),
        None => Some(Filter::Eq(Value::String(side.to_string()))),
    }
}

/// Resolve the plugin a full type belongs to
///
/// Process nodes resolve through their entry-point reference. Data nodes
/// resolve by name in the data group. Module-path process types cannot be
/// resolved.
pub fn load_handler(full_type: &str, plugins: &dyn PluginRegistry) -> RestResult<EntryPoint> {
    let (node_type, process_type) = split(full_type)?;

    if parse_reference(process_type).is_some() {
        return plugins
            .resolve(process_type)
            .map_err(|_| RestError::HandlerNotFound(format!("could not load entry point `{}`", process_type)));
    }

    if let Some(base) = node_type.strip_prefix(DATA_PREFIX) {
        // Entry-point name: every segment but the class name and the trailing empty one
        let parts: Vec<&str> = base.split('.').collect();
        let name = parts[..parts.len().saturating_sub(2)].join(".");
        return plugins
            .resolve_named(DATA_GROUP, &name)
            .map_err(|_| RestError::HandlerNotFound(format!("could not load entry point `{}:{}`", DATA_GROUP, name)));
    }

    Err(RestError::HandlerNotFound(format!(
        "entry point of full type `{}` cannot be loaded",
        full_type
    )))
}
