//! Configuration schema for reportctx

use batch_checkpoint::ExecutorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main reportctx configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ReportctxConfig {
    /// Source catalog configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Durable result store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Checkpointed execution configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Summarization service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Metabase lookup configuration
    #[serde(default)]
    pub metabase: MetabaseConfig,

    /// Catalog discovery configuration
    #[serde(default)]
    pub discover: DiscoverConfig,

    /// Positional key mapping configuration
    #[serde(default)]
    pub mapping: MappingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog CSV (overridden by `--catalog`)
    pub path: Option<PathBuf>,

    /// Id column that keys catalog rows; each job has its own default
    pub key_column: Option<String>,
}

/// Durable result store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding results, failures, summary, state and backups
    pub dir: PathBuf,

    /// File stem prefix; the job name is appended
    pub prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("checkpoints"),
            prefix: "reportctx".to_string(),
        }
    }
}

/// Checkpointed execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Flush after this many attempted items
    pub checkpoint_every: usize,

    /// Minimum milliseconds between external calls
    pub min_call_interval_ms: u64,

    /// Per-item timeout in seconds
    pub item_timeout_secs: u64,

    /// Concurrent workers (1 = sequential)
    pub workers: usize,

    /// Stop after this many attempts per run
    pub batch_limit: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let defaults = ExecutorConfig::default();
        Self {
            checkpoint_every: defaults.checkpoint_every,
            min_call_interval_ms: defaults.min_call_interval.as_millis() as u64,
            item_timeout_secs: defaults.item_timeout.as_secs(),
            workers: defaults.workers,
            batch_limit: defaults.batch_limit,
        }
    }
}

impl ExecutionConfig {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            checkpoint_every: self.checkpoint_every,
            min_call_interval: Duration::from_millis(self.min_call_interval_ms),
            item_timeout: Duration::from_secs(self.item_timeout_secs),
            workers: self.workers,
            batch_limit: self.batch_limit,
        }
    }
}

/// Summarization service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// API key (supports environment variable interpolation)
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retries for transient service errors
    pub max_retries: u32,

    /// Temperature for generation (0.0-1.0)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_output_tokens: u32,

    /// SQL longer than this is truncated in the prompt
    pub max_sql_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: Some("${GEMINI_API_KEY}".to_string()),
            model: llm::config::DEFAULT_MODEL.to_string(),
            api_base: None,
            timeout_secs: 120,
            max_retries: 2,
            temperature: 0.1,
            max_output_tokens: 2048,
            max_sql_chars: 2000,
        }
    }
}

/// Metabase lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetabaseConfig {
    /// Instance root URL (supports environment variable interpolation)
    pub base_url: Option<String>,

    /// API key (supports environment variable interpolation)
    pub api_key: Option<String>,

    /// Minimum milliseconds between Metabase requests
    pub api_delay_ms: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for MetabaseConfig {
    fn default() -> Self {
        Self {
            base_url: Some("${METABASE_BASE_URL}".to_string()),
            api_key: Some("${METABASE_API_KEY}".to_string()),
            api_delay_ms: 200,
            request_timeout_secs: 30,
        }
    }
}

/// Catalog discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverConfig {
    /// Keep recently used cards scoring at least this much
    pub min_activity_score: u32,

    /// CSV of already-analyzed reports; their ids are skipped
    pub exclude: Option<PathBuf>,

    /// Id column in the exclusion CSV
    pub exclude_column: String,

    /// Keep only native SQL questions
    pub native_only: bool,

    /// Where the discovered catalog is written
    pub output: PathBuf,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            min_activity_score: 1,
            exclude: None,
            exclude_column: "report_id".to_string(),
            native_only: true,
            output: PathBuf::from("discovered_reports.csv"),
        }
    }
}

/// Positional key mapping configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MappingConfig {
    /// Catalog column holding the Metabase card id
    pub id_column: String,

    /// Mapped output; defaults to `<store.dir>/<store.prefix>_summarize_mapped.csv`
    pub output: Option<PathBuf>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            id_column: "report_id".to_string(),
            output: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Log format: "compact", "pretty"
    pub format: String,

    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            file: None,
        }
    }
}

impl ReportctxConfig {
    /// Resolve environment variables in configuration values
    ///
    /// Supports ${VAR_NAME} syntax in string fields
    pub fn resolve_env_vars(&mut self) {
        for value in [
            &mut self.llm.api_key,
            &mut self.llm.api_base,
            &mut self.metabase.base_url,
            &mut self.metabase.api_key,
        ] {
            if let Some(raw) = value.as_deref() {
                *value = Self::expand_env_var(raw);
            }
        }
    }

    /// Expand a `${VAR_NAME}` value. An unset or empty variable yields
    /// `None`, so a placeholder never masquerades as a credential.
    fn expand_env_var(value: &str) -> Option<String> {
        match value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
            Some(var_name) => std::env::var(var_name).ok().filter(|v| !v.trim().is_empty()),
            None => Some(value.to_string()),
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |msg: String| Err(crate::ReportctxError::Config(msg));

        if !["compact", "pretty"].contains(&self.logging.format.as_str()) {
            return invalid(format!(
                "logging.format must be 'compact' or 'pretty', got '{}'",
                self.logging.format
            ));
        }
        if self.store.prefix.trim().is_empty() {
            return invalid("store.prefix must not be empty".to_string());
        }
        if self.discover.exclude_column.trim().is_empty() {
            return invalid("discover.exclude_column must not be empty".to_string());
        }
        if self.mapping.id_column.trim().is_empty() {
            return invalid("mapping.id_column must not be empty".to_string());
        }
        if self.llm.max_sql_chars == 0 {
            return invalid("llm.max_sql_chars must be greater than 0".to_string());
        }
        self.execution
            .executor_config()
            .validate()
            .map_err(|e| crate::ReportctxError::Config(e.to_string()))
    }
}
