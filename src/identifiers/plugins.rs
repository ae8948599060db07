//! Entry-point registry
//!
//! An entry-point reference is `group:name` with a known group. Plugins
//! are registered statically at startup, from the built-in table plus any
//! declared in configuration.

use crate::error::{RestError, RestResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const KNOWN_GROUPS: [&str; 6] = [
    "aiida.calculations",
    "aiida.data",
    "aiida.workflows",
    "aiida.parsers",
    "aiida.schedulers",
    "aiida.transports",
];

const BUILTIN_ENTRY_POINTS: &[(&str, &str, &str)] = &[
    ("aiida.calculations", "arithmetic.add", "ArithmeticAddCalculation"),
    ("aiida.calculations", "templatereplacer", "TemplatereplacerCalculation"),
    ("aiida.data", "array", "ArrayData"),
    ("aiida.data", "array.kpoints", "KpointsData"),
    ("aiida.data", "bool", "Bool"),
    ("aiida.data", "cif", "CifData"),
    ("aiida.data", "code", "Code"),
    ("aiida.data", "dict", "Dict"),
    ("aiida.data", "float", "Float"),
    ("aiida.data", "folder", "FolderData"),
    ("aiida.data", "int", "Int"),
    ("aiida.data", "list", "List"),
    ("aiida.data", "remote", "RemoteData"),
    ("aiida.data", "singlefile", "SinglefileData"),
    ("aiida.data", "str", "Str"),
    ("aiida.data", "structure", "StructureData"),
    ("aiida.data", "upf", "UpfData"),
    ("aiida.workflows", "arithmetic.multiply_add", "MultiplyAddWorkChain"),
    ("aiida.parsers", "arithmetic.add", "ArithmeticAddParser"),
    ("aiida.schedulers", "direct", "DirectScheduler"),
    ("aiida.schedulers", "slurm", "SlurmScheduler"),
    ("aiida.transports", "local", "LocalTransport"),
    ("aiida.transports", "ssh", "SshTransport"),
];

/// A registered plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub group: String,
    pub name: String,
    /// Name of the class the entry point loads
    pub class_name: String,
}

impl EntryPoint {
    pub fn new(group: impl Into<String>, name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            class_name: class_name.into(),
        }
    }

    pub fn reference(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}

/// Split a `group:name` reference whose group is known
pub fn parse_reference(reference: &str) -> Option<(&str, &str)> {
    let (group, name) = reference.split_once(':')?;
    if KNOWN_GROUPS.contains(&group) && !name.is_empty() {
        Some((group, name))
    } else {
        None
    }
}

/// Lookup of plugins by reference
pub trait PluginRegistry: Send + Sync {
    fn is_valid_reference(&self, reference: &str) -> bool {
        parse_reference(reference).is_some()
    }

    /// Resolve a `group:name` reference
    fn resolve(&self, reference: &str) -> RestResult<EntryPoint> {
        let (group, name) = parse_reference(reference)
            .ok_or_else(|| RestError::HandlerNotFound(format!("`{}` is not an entry-point reference", reference)))?;
        self.resolve_named(group, name)
    }

    fn resolve_named(&self, group: &str, name: &str) -> RestResult<EntryPoint>;
}

/// Static table of entry points
#[derive(Debug, Clone, Default)]
pub struct EntryPointRegistry {
    entries: BTreeMap<(String, String), EntryPoint>,
}

impl EntryPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in entry points
    pub fn builtin() -> Self {
        let entries = BUILTIN_ENTRY_POINTS
            .iter()
            .map(|(group, name, class)| {
                (
                    (group.to_string(), name.to_string()),
                    EntryPoint::new(*group, *name, *class),
                )
            })
            .collect();
        Self { entries }
    }

    /// Built-in entry points plus `extra`; duplicates are rejected
    pub fn with_plugins(extra: &[EntryPoint]) -> RestResult<Self> {
        let mut registry = Self::builtin();
        for entry in extra {
            registry.register(entry.clone())?;
        }
        debug!(entries = registry.len(), "entry-point registry built");
        Ok(registry)
    }

    pub fn register(&mut self, entry: EntryPoint) -> RestResult<()> {
        if !KNOWN_GROUPS.contains(&entry.group.as_str()) {
            return Err(RestError::validation(format!("unknown entry-point group `{}`", entry.group)));
        }
        let key = (entry.group.clone(), entry.name.clone());
        if self.entries.contains_key(&key) {
            return Err(RestError::HandlerConflict(entry.reference()));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PluginRegistry for EntryPointRegistry {
    fn resolve_named(&self, group: &str, name: &str) -> RestResult<EntryPoint> {
        self.entries
            .get(&(group.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| RestError::HandlerNotFound(format!("{}:{}", group, name)))
    }
}
