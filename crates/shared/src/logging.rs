//! Logging setup shared by the catalog builder and its consumers.
//!
//! One `tracing` subscriber with an env filter, an optional console layer
//! and an optional daily-rotated file layer (plain text or JSON).

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    registry::Registry,
    util::SubscriberInitExt,
    Layer,
};

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log directory path
    pub log_dir: String,
    /// Component name, also the log file prefix
    pub component: String,
    pub default_level: Level,
    pub console: bool,
    pub file: bool,
    /// JSON lines instead of plain text in the log file
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "data/logs".to_string(),
            component: "catalog-builder".to_string(),
            default_level: Level::INFO,
            console: true,
            file: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Logging settings of `config` for one component
    pub fn from_config(config: &Config, component: &str) -> Self {
        Self {
            log_dir: config.log_dir().to_string_lossy().to_string(),
            component: component.to_string(),
            default_level: config.log_level(),
            console: config.logging.console,
            file: config.logging.file,
            json_format: config.logging.json_format,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Filter directives used when `RUST_LOG` is not set
    fn directives(&self) -> String {
        let level = self.default_level;
        format!(
            "{}={},shared={},catalog_builder={},hyper=warn,reqwest=warn,h2=warn",
            self.component.replace('-', "_"),
            level,
            level,
            level
        )
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.console {
        layers.push(console_layer());
    }
    if config.file {
        let log_dir = Path::new(&config.log_dir);
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", config.log_dir))?;
        layers.push(file_layer(log_dir, &config.component, config.json_format));
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        component = %config.component,
        log_dir = %config.log_dir,
        level = %config.default_level,
        "Logging initialized"
    );

    Ok(())
}

fn console_layer() -> BoxedLayer {
    fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stdout)
        .boxed()
}

fn file_layer(log_dir: &Path, component: &str, json: bool) -> BoxedLayer {
    let appender = tracing_appender::rolling::daily(log_dir, component);

    if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(appender)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(appender)
            .boxed()
    }
}
