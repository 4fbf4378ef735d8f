use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Engine settings, usually read from a `kgedit.toml`.
///
/// ```toml
/// database_path = "/var/lib/kgedit/actions.db"
/// page_size = 50
/// persist_published = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite file for the local action log. In memory when unset.
    pub database_path: Option<PathBuf>,
    /// Page size used by entity and row queries that do not set one.
    pub page_size: usize,
    /// Keep published actions in persistence instead of dropping them.
    pub persist_published: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            persist_published: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| EngineError::Config(e.to_string()))?;
        if config.page_size == 0 {
            return Err(EngineError::Config("page_size must be positive".to_string()));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}
