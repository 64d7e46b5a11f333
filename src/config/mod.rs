//! Configuration loading and management
//!
//! Configuration is read once at startup: a YAML file (or string) first,
//! then the `BIZSTORE_*` environment variables on top of it.

use crate::storage::registry::{MEMORY, MONGODB, POSTGRES};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Environment variable selecting the database provider
pub const ENV_DATABASE_PROVIDER: &str = "BIZSTORE_DATABASE_PROVIDER";

/// Environment variable selecting the auth provider
pub const ENV_AUTH_PROVIDER: &str = "BIZSTORE_AUTH_PROVIDER";

pub const ENV_DATABASE_URL: &str = "BIZSTORE_DATABASE_URL";
pub const ENV_DATABASE_NAME: &str = "BIZSTORE_DATABASE_NAME";
pub const ENV_LOG: &str = "BIZSTORE_LOG";

/// Backend selected for every entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProvider {
    #[default]
    #[serde(alias = "mock")]
    Memory,
    Postgres,
    #[serde(alias = "mongo")]
    Mongodb,
}

impl DatabaseProvider {
    /// Name under which the backend registers its providers
    pub fn registry_name(&self) -> &'static str {
        match self {
            DatabaseProvider::Memory => MEMORY,
            DatabaseProvider::Postgres => POSTGRES,
            DatabaseProvider::Mongodb => MONGODB,
        }
    }
}

impl FromStr for DatabaseProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mock" => Ok(DatabaseProvider::Memory),
            "postgres" | "postgresql" => Ok(DatabaseProvider::Postgres),
            "mongodb" | "mongo" => Ok(DatabaseProvider::Mongodb),
            other => Err(anyhow!("Unknown database provider '{}'", other)),
        }
    }
}

impl fmt::Display for DatabaseProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.registry_name())
    }
}

/// Database connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub provider: DatabaseProvider,

    /// Connection URL; unused by the in-memory backend
    #[serde(default)]
    pub url: Option<String>,

    /// Database name (MongoDB)
    #[serde(default)]
    pub name: Option<String>,
}

/// Configuration for an entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity name used for provider lookup (e.g., "course")
    pub name: String,

    /// Table or collection name, defaults to the entity name
    #[serde(default)]
    pub table: Option<String>,
}

impl EntityConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Auth provider name, consumed by the surrounding service
    #[serde(default = "default_auth_provider")]
    pub auth_provider: String,

    /// `EnvFilter` directive for tracing
    #[serde(default = "default_log")]
    pub log: String,

    /// Page size used when a list request has no `limit`
    #[serde(default = "default_page_size")]
    pub default_page_size: i32,

    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

fn default_auth_provider() -> String {
    "none".to_string()
}

fn default_log() -> String {
    "info".to_string()
}

fn default_page_size() -> i32 {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            auth_provider: default_auth_provider(),
            log: default_log(),
            default_page_size: default_page_size(),
            entities: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the `BIZSTORE_*` environment variables
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get(ENV_DATABASE_PROVIDER) {
            self.database.provider = provider.parse()?;
        }
        if let Some(auth) = get(ENV_AUTH_PROVIDER) {
            self.auth_provider = auth;
        }
        if let Some(url) = get(ENV_DATABASE_URL) {
            self.database.url = Some(url);
        }
        if let Some(name) = get(ENV_DATABASE_NAME) {
            self.database.name = Some(name);
        }
        if let Some(log) = get(ENV_LOG) {
            self.log = log;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn with_entity(mut self, entity: EntityConfig) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_page_size < 1 {
            return Err(anyhow!(
                "default_page_size must be >= 1, got {}",
                self.default_page_size
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for entity in &self.entities {
            if entity.name.trim().is_empty() {
                return Err(anyhow!("Entity names must not be empty"));
            }
            if !seen.insert(entity.name.as_str()) {
                return Err(anyhow!("Entity '{}' is configured twice", entity.name));
            }
        }

        match self.database.provider {
            DatabaseProvider::Memory => Ok(()),
            DatabaseProvider::Postgres | DatabaseProvider::Mongodb
                if self.database.url.is_none() =>
            {
                Err(anyhow!(
                    "Database provider '{}' requires a url",
                    self.database.provider
                ))
            }
            _ => Ok(()),
        }
    }
}
