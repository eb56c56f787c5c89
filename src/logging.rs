//! Structured logging setup: env-filter console output plus an optional
//! daily-rolling file layer, with a module filter table sized for this
//! crate's dependency tree.

use std::path::PathBuf;

use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::error::{BlockSweepError, Result};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("blocksweep")
        .join("logs")
}

/// Module filters quieting the chattiest dependencies to `warn` while the
/// crate's own spans stay at the configured level.
fn default_module_filter(level: &str) -> String {
    format!("{level},sqlx=warn,reqwest=warn,hyper=warn,tower=warn")
}

/// Returned guard must be kept alive for the process lifetime so the
/// non-blocking file writer keeps flushing.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    if !config.console_output && !config.file_output {
        return Err(BlockSweepError::Config("no logging output configured".into()));
    }

    let filter_spec = default_module_filter(&config.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_spec));
    let registry = Registry::default().with(env_filter);

    let mut file_guard = None;

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir)
            .map_err(|e| BlockSweepError::Config(format!("failed to create log directory {}: {e}", config.log_dir.display())))?;
        let file_appender = rolling::daily(&config.log_dir, "blocksweep.log");
        let (file_writer, guard) = non_blocking(file_appender);
        file_guard = Some(guard);

        let file_layer = if config.json_format {
            fmt::Layer::new().json().with_writer(file_writer).with_target(true).boxed()
        } else {
            fmt::Layer::new().with_writer(file_writer).with_target(true).boxed()
        };

        if config.console_output {
            let console_layer = fmt::Layer::new().with_writer(std::io::stdout).with_target(false);
            registry.with(file_layer).with(console_layer).init();
        } else {
            registry.with(file_layer).init();
        }
    } else {
        let console_layer = fmt::Layer::new().with_writer(std::io::stdout).with_target(false);
        registry.with(console_layer).init();
    }

    tracing::info!(log_dir = %config.log_dir.display(), level = %config.level, "logging initialized");

    Ok(LoggingGuard { _file_guard: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_an_output() {
        let config = LoggingConfig::default();
        assert!(config.console_output || config.file_output);
    }

    #[test]
    fn module_filter_quiets_sqlx_and_reqwest() {
        let filter = default_module_filter("info");
        assert!(filter.contains("sqlx=warn"));
        assert!(filter.contains("reqwest=warn"));
    }
}
