//! Structured logging setup.
//!
//! Console output goes to stderr so it does not interleave with the
//! operator summary on stdout. The optional log file is written from a
//! background thread. `RUST_LOG` overrides the configured level.

use crate::config::LoggingConfig;
use crate::error::{ReportctxError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Build the filter: `RUST_LOG` when set, else the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| {
        ReportctxError::Config(format!("Invalid logging.level '{}': {}", config.level, e))
    })
}

/// Install the global subscriber. A second call is a no-op.
///
/// When a log file is configured the returned guard must be held until the
/// process exits; dropping it flushes and stops the file writer.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let console = match config.format.as_str() {
        "pretty" => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(config)?)
            .boxed(),
        _ => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter(config)?)
            .boxed(),
    };

    let (file, guard) = match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(name.to_string_lossy())
                .build(dir)
                .map_err(|e| {
                    ReportctxError::Config(format!(
                        "Cannot open log file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter(config)?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized");
    }

    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let name = path.file_name().ok_or_else(|| {
        ReportctxError::Config(format!("logging.file '{}' has no file name", path.display()))
    })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_config_error() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "reportctx=loudest".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(env_filter(&config), Err(ReportctxError::Config(_))));
    }

    #[test]
    fn test_init_with_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("reportctx.log");
        let config = LoggingConfig {
            file: Some(path.clone()),
            ..LoggingConfig::default()
        };

        let first = init_logging(&config).unwrap();
        let second = init_logging(&config).unwrap();
        assert!(first.is_some() && second.is_some());
        assert!(path.exists());
    }

    #[test]
    fn test_no_guard_without_log_file() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).unwrap().is_none());
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("logs/run.log")).unwrap();
        assert_eq!(dir, Path::new("logs"));
        assert_eq!(name, "run.log");

        let (dir, _) = split_log_path(Path::new("run.log")).unwrap();
        assert_eq!(dir, Path::new("."));

        assert!(split_log_path(Path::new("/")).is_err());
    }
}
