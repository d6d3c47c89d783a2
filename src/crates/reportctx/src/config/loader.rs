//! Configuration loader with layered sources
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.reportctx/reportctx.toml
//! 3. Project-level config: ./reportctx.toml
//! 4. An explicit file passed with `--config`
//!
//! Later layers override earlier ones key by key, so a project file that
//! only sets `[execution] workers` keeps every other user-level setting.

use crate::config::schema::ReportctxConfig;
use crate::error::{ReportctxError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration loader that merges every layer that exists
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: PathBuf,
    explicit_config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            user_config_path: Self::user_config_path(),
            project_config_path: PathBuf::from("reportctx.toml"),
            explicit_config_path: None,
        }
    }

    /// Add an explicit config file; unlike the other layers it must exist
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_config_path = Some(path.into());
        self
    }

    /// Override the discovered file locations
    pub fn with_paths(mut self, user: Option<PathBuf>, project: PathBuf) -> Self {
        self.user_config_path = user;
        self.project_config_path = project;
        self
    }

    /// Get user-level config path (~/.reportctx/reportctx.toml)
    fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".reportctx").join("reportctx.toml"))
    }

    /// Load configuration from every layer, later layers taking precedence
    pub async fn load(&self) -> Result<ReportctxConfig> {
        let mut merged = toml::Value::try_from(ReportctxConfig::default())
            .map_err(|e| ReportctxError::Config(format!("Failed to encode defaults: {}", e)))?;
        info!("Loading configuration with defaults");

        if let Some(user) = &self.user_config_path {
            if let Some(layer) = self.load_optional(user).await? {
                debug!(path = %user.display(), "Loaded user-level config");
                merge_values(&mut merged, layer);
            }
        }

        if let Some(layer) = self.load_optional(&self.project_config_path).await? {
            debug!(path = %self.project_config_path.display(), "Loaded project-level config");
            merge_values(&mut merged, layer);
        }

        if let Some(explicit) = &self.explicit_config_path {
            let layer = self.load_optional(explicit).await?.ok_or_else(|| {
                ReportctxError::Config(format!("Config file not found: {}", explicit.display()))
            })?;
            debug!(path = %explicit.display(), "Loaded explicit config");
            merge_values(&mut merged, layer);
        }

        let mut config: ReportctxConfig = merged
            .try_into()
            .map_err(|e| ReportctxError::Config(format!("Invalid configuration: {}", e)))?;

        // Resolve environment variables
        config.resolve_env_vars();
        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Read and parse one layer; `None` when the file does not exist
    async fn load_optional(&self, path: &Path) -> Result<Option<toml::Value>> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, skipping");
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            ReportctxError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let value = toml::from_str::<toml::Value>(&content).map_err(|e| {
            ReportctxError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;

        Ok(Some(value))
    }

    /// Get user config path
    pub fn get_user_config_path(&self) -> Option<&PathBuf> {
        self.user_config_path.as_ref()
    }

    /// Get project config path
    pub fn get_project_config_path(&self) -> &PathBuf {
        &self.project_config_path
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively overlay `layer` onto `base`; tables merge, everything else
/// is replaced.
fn merge_values(base: &mut toml::Value, layer: toml::Value) {
    match (base, layer) {
        (toml::Value::Table(base), toml::Value::Table(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}
