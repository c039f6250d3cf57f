//! ---
//! pw_section: "01-core-functionality"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Shared primitives and utilities for the page runtime."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_history_limit() -> usize {
    10
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_true() -> bool {
    true
}

/// Primary configuration object for the page runtime and the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub routes: RouteDefaults,
    #[serde(default)]
    pub pages: IndexMap<String, PageConfig>,
    #[serde(default)]
    pub extensions: IndexMap<String, ExtensionConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "PAGEWRIGHT_CONFIG";

    /// Load configuration from disk, respecting the `PAGEWRIGHT_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Parse and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a page definition by name.
    pub fn page(&self, name: &str) -> Option<&PageConfig> {
        self.pages.get(name)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.state.validate()?;
        for (name, page) in &self.pages {
            page.validate(name)?;
            for extension in &page.extensions {
                if !self.extensions.contains_key(extension) {
                    return Err(anyhow!(
                        "page '{}' references undeclared extension '{}'",
                        name,
                        extension
                    ));
                }
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for the shared page state manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Number of committed states retained as history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

impl StateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(anyhow!("state.history_limit must be at least 1"));
        }
        Ok(())
    }
}

/// Default route options applied when a page does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefaults {
    #[serde(default)]
    pub only_update: bool,
    #[serde(default = "default_true")]
    pub auto_scroll: bool,
    #[serde(default = "default_true")]
    pub allow_spa: bool,
    #[serde(default)]
    pub document_view: Option<String>,
    #[serde(default)]
    pub managed_root_view: Option<String>,
}

impl Default for RouteDefaults {
    fn default() -> Self {
        Self {
            only_update: false,
            auto_scroll: true,
            allow_spa: true,
            document_view: None,
            managed_root_view: None,
        }
    }
}

/// Declarative page definition used by the CLI page table.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    pub controller: String,
    pub view: String,
    #[serde(default, rename = "load_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub load_delay: Duration,
    /// Resolve the controller and view lazily, as a code-split route would.
    #[serde(default)]
    pub lazy: bool,
    #[serde(default)]
    pub only_update: Option<bool>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub state: IndexMap<String, Value>,
}

impl PageConfig {
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.controller.trim().is_empty() {
            return Err(anyhow!("page '{}' must name a controller", name));
        }
        if self.view.trim().is_empty() {
            return Err(anyhow!("page '{}' must name a view", name));
        }
        Ok(())
    }
}

/// Declarative extension definition used by the CLI page table.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionConfig {
    #[serde(default)]
    pub allowed_keys: Vec<String>,
    #[serde(default, rename = "load_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub load_delay: Duration,
    #[serde(default)]
    pub state: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
