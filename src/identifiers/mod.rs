//! Identifier scheme: full types, the subtype namespace tree, plugin
//! references and node identifiers used in requests

pub mod full_type;
mod namespace;
mod plugins;

pub use full_type::{construct, filters_for, load_handler, validate};
pub use namespace::{build_namespace_tree, Namespace};
pub use plugins::{parse_reference, EntryPoint, EntryPointRegistry, PluginRegistry, KNOWN_GROUPS};

use crate::error::{RestError, RestResult};
use crate::query::{escape_like, Filter, FilterSet};
use serde_json::json;

/// How a request names a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeIdentifier {
    Pk(i64),
    /// Matched against the start of the node UUID
    UuidPrefix(String),
    /// All-digit text: a primary key or a UUID prefix
    Digits(String),
}

impl NodeIdentifier {
    pub fn parse(s: &str) -> RestResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RestError::validation("node identifier cannot be empty"));
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Self::Digits(s.to_string()));
        }
        if s.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Ok(Self::UuidPrefix(s.to_ascii_lowercase()));
        }
        Err(RestError::validation(format!("`{}` is neither a primary key nor a UUID pattern", s)))
    }

    fn pk_filters(pk: i64) -> FilterSet {
        FilterSet::new().with("id", Filter::Eq(json!(pk)))
    }

    fn uuid_filters(prefix: &str) -> FilterSet {
        FilterSet::new().with("uuid", Filter::Like(format!("{}%", escape_like(prefix))))
    }

    /// One filter set per way of reading the identifier
    ///
    /// Digits too large for a primary key are only read as a UUID prefix.
    pub fn readings(&self) -> Vec<FilterSet> {
        match self {
            Self::Pk(pk) => vec![Self::pk_filters(*pk)],
            Self::UuidPrefix(prefix) => vec![Self::uuid_filters(prefix)],
            Self::Digits(digits) => {
                let mut readings = Vec::with_capacity(2);
                if let Ok(pk) = digits.parse() {
                    readings.push(Self::pk_filters(pk));
                }
                readings.push(Self::uuid_filters(digits));
                readings
            }
        }
    }

    /// Filters of the first reading
    ///
    /// Exact for `Pk` and `UuidPrefix`. Resolve `Digits` to a node first.
    pub fn filters(&self) -> FilterSet {
        self.readings().into_iter().next().unwrap_or_default()
    }
}

impl std::fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pk(pk) => write!(f, "{}", pk),
            Self::UuidPrefix(prefix) | Self::Digits(prefix) => f.write_str(prefix),
        }
    }
}
