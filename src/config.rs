//! Service configuration loaded from YAML

use crate::identifiers::EntryPoint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_prefix() -> String {
    "/api/v4".to_string()
}

fn default_perpage() -> usize {
    20
}

fn default_limit() -> usize {
    400
}

/// Request defaults and extra plugins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// URL prefix used when rendering page links
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Page size when a page is requested without `perpage`
    #[serde(default = "default_perpage")]
    pub perpage_default: usize,
    /// Upper bound for `limit` and `perpage`, and the limit of unpaged requests
    #[serde(default = "default_limit")]
    pub limit_default: usize,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Entry points registered next to the built-in ones
    #[serde(default)]
    pub plugins: Vec<EntryPoint>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            perpage_default: default_perpage(),
            limit_default: default_limit(),
            db_path: None,
            plugins: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // An empty document is a config with every default
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.perpage_default == 0 || self.limit_default == 0 {
            return Err(ConfigError::Invalid("page size and limit defaults must be positive".into()));
        }
        if self.perpage_default > self.limit_default {
            return Err(ConfigError::Invalid(format!(
                "perpage_default ({}) exceeds limit_default ({})",
                self.perpage_default, self.limit_default
            )));
        }
        Ok(())
    }
}

/// Default database location (`~/.local/share/wfquery/wfquery.db`)
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir().unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("wfquery").join("wfquery.db")
}
