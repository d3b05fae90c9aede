// Store configuration: optional inventory.yaml in the data directory, with
// environment overrides on top.

use crate::error::{InventoryError, Result};
use crate::schema::DEFAULT_AUTHORITY;
use crate::validation::ValidationMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up inside a data directory.
pub const CONFIG_FILE: &str = "inventory.yaml";

/// Database file name used when the config does not name one.
pub const DEFAULT_DATABASE: &str = "inventory.db";

/// Special database value selecting a throwaway in-memory database.
pub const IN_MEMORY: &str = ":memory:";

pub const ENV_AUTHORITY: &str = "INVENTORY_AUTHORITY";
pub const ENV_DATABASE: &str = "INVENTORY_DB";
pub const ENV_VALIDATION: &str = "INVENTORY_VALIDATION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Authority every address must carry.
    pub authority: String,
    /// Database file, relative to the data directory, or `:memory:`.
    pub database: String,
    pub validation: ValidationMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            authority: DEFAULT_AUTHORITY.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            validation: ValidationMode::default(),
        }
    }
}

/// Where the backend should live once the config is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    InMemory,
}

impl StoreConfig {
    /// A config for a private in-memory store.
    pub fn in_memory() -> Self {
        StoreConfig {
            database: IN_MEMORY.to_string(),
            ..StoreConfig::default()
        }
    }

    /// Parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parse config YAML. An empty document yields the defaults.
    pub fn parse_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(StoreConfig::default());
        }
        let config: StoreConfig = serde_yaml::from_str(content)?;
        config.normalized()
    }

    /// Load `<data_dir>/inventory.yaml` if present, else the defaults, then
    /// apply environment overrides.
    pub fn for_data_dir(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let config = if path.exists() {
            Self::load(&path)?
        } else {
            StoreConfig::default()
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(authority) = lookup(ENV_AUTHORITY) {
            self.authority = authority;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = database;
        }
        if let Some(mode) = lookup(ENV_VALIDATION) {
            self.validation = mode.parse()?;
        }
        self.normalized()
    }

    /// Resolve the database setting against a data directory.
    pub fn database_location(&self, data_dir: &Path) -> DatabaseLocation {
        if self.database == IN_MEMORY {
            DatabaseLocation::InMemory
        } else {
            DatabaseLocation::File(data_dir.join(&self.database))
        }
    }

    /// Trim the authority (addresses are trimmed when parsed) and reject
    /// values no address could carry.
    fn normalized(mut self) -> Result<Self> {
        self.authority = self.authority.trim().to_string();
        if self.authority.is_empty() || self.authority.contains('/') {
            return Err(InventoryError::Config(format!(
                "authority '{}' must be non-empty and contain no '/'",
                self.authority
            )));
        }
        if self.database.trim().is_empty() {
            return Err(InventoryError::Config("database must not be empty".into()));
        }
        Ok(self)
    }
}
