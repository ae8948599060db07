//! Browsable tree of the node subtypes present in a store

use super::full_type::{construct, FULL_TYPE_CONCATENATOR, LIKE_OPERATOR_CHARACTER};
use super::plugins::{parse_reference, PluginRegistry};
use crate::error::{RestError, RestResult};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

pub const NAMESPACE_SEPARATOR: char = '.';

const ROOT_NAME: &str = "node";

/// One level of the subtype tree
///
/// Terminal namespaces (leaves) are the ones created for an inserted
/// path; intermediate stubs are branches. Children keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Namespace {
    namespace: String,
    path: String,
    label: Option<String>,
    full_type: Option<String>,
    #[serde(skip)]
    leaf: bool,
    subspaces: Vec<Namespace>,
}

impl Namespace {
    /// The `node` root, whose full type selects every node
    pub fn root() -> Self {
        Self {
            namespace: ROOT_NAME.to_string(),
            path: ROOT_NAME.to_string(),
            label: None,
            full_type: Some(format!(
                "{}{}{}",
                LIKE_OPERATOR_CHARACTER, FULL_TYPE_CONCATENATOR, LIKE_OPERATOR_CHARACTER
            )),
            leaf: false,
            subspaces: Vec::new(),
        }
    }

    fn child(name: &str, path: String, label: Option<&str>, full_type: Option<&str>, leaf: bool) -> Self {
        let full_type = full_type
            .map(str::to_string)
            .unwrap_or_else(|| infer_full_type(&path));
        Self {
            namespace: name.to_string(),
            path,
            label: label.map(str::to_string),
            full_type: Some(full_type),
            leaf,
            subspaces: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn full_type(&self) -> Option<&str> {
        self.full_type.as_deref()
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    pub fn subspaces(&self) -> &[Namespace] {
        &self.subspaces
    }

    /// Insert a dotted path below this namespace and return its terminal
    ///
    /// Missing intermediate levels are created as branches; `label` and
    /// `full_type` apply to the terminal only. Addressing an existing leaf
    /// as an intermediate level is a [`RestError::NamespaceConflict`]. An
    /// existing terminal is returned unchanged.
    pub fn create_namespace(
        &mut self,
        name: &str,
        label: Option<&str>,
        full_type: Option<&str>,
    ) -> RestResult<&mut Namespace> {
        let (head, rest) = match name.split_once(NAMESPACE_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        if head.is_empty() {
            return Err(RestError::validation(format!(
                "namespace `{}` has an empty segment",
                name
            )));
        }

        let index = match self.subspaces.iter().position(|s| s.namespace == head) {
            Some(i) => {
                if rest.is_some() && self.subspaces[i].leaf {
                    return Err(RestError::NamespaceConflict(format!(
                        "`{}` in `{}` is a leaf and cannot contain `{}`",
                        head,
                        self.path,
                        rest.unwrap_or_default()
                    )));
                }
                if rest.is_none() && self.subspaces[i].full_type.as_deref() != full_type {
                    debug!(path = %self.subspaces[i].path, "namespace already present, keeping first");
                }
                i
            }
            None => {
                let path = format!("{}{}{}", self.path, NAMESPACE_SEPARATOR, head);
                let child = match rest {
                    Some(_) => Self::child(head, path, None, None, false),
                    None => Self::child(head, path, label, full_type, true),
                };
                self.subspaces.push(child);
                self.subspaces.len() - 1
            }
        };

        let child = &mut self.subspaces[index];
        match rest {
            Some(rest) => child.create_namespace(rest, label, full_type),
            None => Ok(child),
        }
    }

    /// Find a namespace by dotted path relative to this one
    pub fn get(&self, name: &str) -> Option<&Namespace> {
        name.split(NAMESPACE_SEPARATOR).try_fold(self, |ns, part| {
            ns.subspaces.iter().find(|s| s.namespace == part)
        })
    }
}

/// Wildcard full type covering everything below a branch path
fn infer_full_type(path: &str) -> String {
    let stripped = path
        .strip_prefix(ROOT_NAME)
        .and_then(|p| p.strip_prefix(NAMESPACE_SEPARATOR))
        .unwrap_or(path);
    format!(
        "{}{}{}{}{}",
        stripped, NAMESPACE_SEPARATOR, LIKE_OPERATOR_CHARACTER, FULL_TYPE_CONCATENATOR, LIKE_OPERATOR_CHARACTER
    )
}

/// Node-type segments before the class name, e.g. `data.int` for `data.int.Int.`
fn type_prefix(node_type: &str) -> Option<&str> {
    let mut parts = node_type.rsplitn(3, NAMESPACE_SEPARATOR);
    parts.next();
    parts.next()?;
    Some(parts.next().unwrap_or_default())
}

fn join_path(prefix: &str, label: &str) -> String {
    if prefix.is_empty() {
        label.to_string()
    } else {
        format!("{}{}{}", prefix, NAMESPACE_SEPARATOR, label)
    }
}

/// Build the subtype tree from the `(node_type, process_type)` pairs in a store
///
/// Pairs are deduplicated and inserted in sorted order so the tree is
/// stable across calls.
pub fn build_namespace_tree<'a, I>(samples: I, plugins: &dyn PluginRegistry) -> RestResult<Namespace>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let unique: BTreeSet<(&str, &str)> = samples
        .into_iter()
        .map(|(node_type, process_type)| (node_type, process_type.unwrap_or_default()))
        .collect();

    let mut root = Namespace::root();
    for (node_type, process_type) in unique {
        let (path, label) = if !process_type.is_empty() {
            let label = match parse_reference(process_type) {
                Some((_, name)) => plugins
                    .resolve(process_type)
                    .map(|entry| entry.class_name)
                    .unwrap_or_else(|_| name.to_string()),
                None => process_type
                    .rsplit(NAMESPACE_SEPARATOR)
                    .next()
                    .unwrap_or(process_type)
                    .to_string(),
            };
            let prefix = type_prefix(node_type).unwrap_or_default();
            (join_path(prefix, &label), label)
        } else {
            let Some(prefix) = type_prefix(node_type) else {
                continue;
            };
            let label = crate::graph::class_name_of(node_type).to_string();
            (join_path(prefix, &label), label)
        };

        let full_type = construct(Some(node_type), Some(process_type));
        root.create_namespace(&path, Some(&label), Some(&full_type))?;
    }
    Ok(root)
}
