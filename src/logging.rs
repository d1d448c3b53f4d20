//! Logging configuration with file rotation
//!
//! Output goes to stderr, a daily-rolling file, or both. The level comes
//! from the configuration file, `RUST_LOG` or the `--debug` flag.

use crate::config::LoggingConfig;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

const DEFAULT_LOG_FILE: &str = "owserver-poller.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,

    /// Log to a daily-rolling file
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    pub thread_ids: bool,

    /// JSON lines instead of text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            thread_ids: false,
            json: false,
        }
    }
}

fn level_from_str(value: &str) -> Option<Level> {
    // RUST_LOG may be a full directive list; take the first bare level in it
    value
        .split(',')
        .filter(|directive| !directive.contains('='))
        .find_map(|directive| Level::from_str(directive.trim()).ok())
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            if let Some(level) = level_from_str(&rust_log) {
                config.level = level;
            }
        }

        if let Ok(log_file) = std::env::var("OWSERVER_LOG_FILE") {
            config.file_path = Some(PathBuf::from(log_file));
        }

        if let Ok(log_stderr) = std::env::var("OWSERVER_LOG_STDERR") {
            config.stderr = log_stderr.to_lowercase() != "false";
        }

        config
    }

    /// Start from the configuration file section; environment variables still win
    pub fn from_config(logging: &LoggingConfig) -> Self {
        let mut config = Self {
            level: level_from_str(&logging.level).unwrap_or(Level::INFO),
            file_path: logging.file.clone(),
            json: logging.json_format,
            ..Self::default()
        };
        let env = Self::from_env();
        if std::env::var("RUST_LOG").is_ok() {
            config.level = env.level;
        }
        if env.file_path.is_some() {
            config.file_path = env.file_path;
        }
        config.stderr = env.stderr;
        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.stderr {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(config.thread_ids);
        layers.push(if config.json {
            layer.json().boxed()
        } else {
            layer.with_ansi(true).boxed()
        });
    }

    if let Some(file_path) = &config.file_path {
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file_appender = tracing_appender::rolling::daily(
            file_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new(".")),
            file_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new(DEFAULT_LOG_FILE)),
        );

        let layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_thread_ids(config.thread_ids);
        layers.push(if config.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
