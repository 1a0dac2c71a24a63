//! CLI configuration
//!
//! Loaded from `marketkit.toml`. Resolution order:
//! 1. `MARKETKIT_CONFIG` environment variable
//! 2. `~/.config/marketkit/marketkit.toml`
//! 3. built-in defaults
//!
//! ```toml
//! log_level = "info"
//! registry_path = "~/.config/marketkit/fields.toml"
//!
//! [store]
//! db_path = "~/.config/marketkit/fields.db"
//! busy_timeout_ms = 5000
//!
//! [session]
//! source_tag = "cli"
//! ```

use marketkit_fields::FieldRegistry;
use marketkit_store::StoreConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CliConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Registry TOML file; the builtin registry is used when unset
    #[serde(default)]
    pub registry_path: Option<String>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Tag recorded on overrides written from the CLI
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source_tag: default_source_tag(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_source_tag() -> String {
    "cli".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            registry_path: None,
            store: StoreConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl CliConfig {
    pub const ENV_CONFIG_PATH: &'static str = "MARKETKIT_CONFIG";

    pub const DEFAULT_CONFIG_FILENAME: &'static str = "marketkit.toml";

    /// Load the config file, falling back to defaults when it does not exist
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: CliConfig =
            toml::from_str(contents).map_err(|source| ConfigError::Parse { source })?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("marketkit")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Warn about values that will behave badly at runtime. Called once
    /// logging is up.
    pub fn validate(&self) {
        if self.session.source_tag.trim().is_empty() {
            tracing::warn!("session.source_tag is empty; overrides will carry no provenance tag");
        }
        if let Some(path) = self.resolved_registry_path()
            && !path.exists()
        {
            tracing::warn!(path = %path.display(), "registry_path does not exist");
        }
        self.store.validate();
    }

    pub fn resolved_registry_path(&self) -> Option<PathBuf> {
        self.registry_path.as_deref().map(expand_home)
    }

    /// Builtin registry, or the file named by `registry_path`
    pub fn registry(&self) -> marketkit_fields::Result<FieldRegistry> {
        match self.resolved_registry_path() {
            Some(path) => FieldRegistry::load_from_path(&path),
            None => Ok(FieldRegistry::builtin()),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}
