//! Structured logging setup.
//!
//! The pool reports through `tracing` macros and never installs a subscriber
//! itself. Applications that want its output call [`LoggingBuilder::init`] once
//! at startup, or compose [`LoggingBuilder::build_layer`] into their own
//! registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{Error, Result};

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::Config(format!("unknown log level '{}'", other))),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line console output with colors
    Pretty,
    /// Single-line output
    Compact,
    /// JSON structured output
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when neither `RUST_LOG` nor `filter` is set
    pub level: LogLevel,

    /// Log format
    pub format: LogFormat,

    /// Emit span open/close events
    pub with_spans: bool,

    /// Include target in logs
    pub with_target: bool,

    /// Include file/line information
    pub with_file: bool,

    /// Include thread ids
    pub with_thread_ids: bool,

    /// Include ANSI colors (for console output)
    pub ansi_colors: bool,

    /// Filter directives (e.g., "sftp_pool=debug,warn")
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            with_spans: false,
            with_target: true,
            with_file: false,
            with_thread_ids: false,
            ansi_colors: true,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// JSON output without colors, for log shippers.
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            ansi_colors: false,
            filter: Some("sftp_pool=info,warn".to_string()),
            ..Self::default()
        }
    }

    /// Verbose pool tracing on the console.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            with_file: true,
            filter: Some("sftp_pool=trace,info".to_string()),
            ..Self::default()
        }
    }
}

/// Builder for constructing the logging layer.
#[derive(Debug, Default)]
pub struct LoggingBuilder {
    config: LoggingConfig,
}

impl LoggingBuilder {
    /// Create a new logging builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder from an existing configuration.
    pub fn from_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Set the log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.config.ansi_colors = enabled;
        self
    }

    /// Set filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// The configuration this builder will apply.
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Build and install the global subscriber.
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(self) -> Result<()> {
        let env_filter = self.build_filter();
        let layer = self.build_fmt_layer();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Build a filtered logging layer that can be composed with other layers.
    pub fn build_layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
    {
        let env_filter = self.build_filter();
        Box::new(self.build_fmt_layer().with_filter(env_filter))
    }

    /// `RUST_LOG` wins, then the configured directives, then the level.
    fn build_filter(&self) -> EnvFilter {
        let default_filter = self.config.level.as_str();

        if let Some(ref filter) = self.config.filter {
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(filter))
                .unwrap_or_else(|_| EnvFilter::new(default_filter))
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.config.with_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn build_fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
    {
        let config = &self.config;
        match config.format {
            LogFormat::Pretty => Box::new(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(config.ansi_colors)
                    .with_target(config.with_target)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_thread_ids(config.with_thread_ids)
                    .with_span_events(self.span_events()),
            ),
            LogFormat::Compact => Box::new(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(config.ansi_colors)
                    .with_target(config.with_target)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_thread_ids(config.with_thread_ids)
                    .with_span_events(self.span_events()),
            ),
            LogFormat::Json => Box::new(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(config.with_spans)
                    .with_span_list(config.with_spans)
                    .with_target(config.with_target)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_thread_ids(config.with_thread_ids)
                    .with_span_events(self.span_events()),
            ),
        }
    }
}

/// Install a default pretty subscriber at `level`.
pub fn init(level: LogLevel) -> Result<()> {
    LoggingBuilder::new().with_level(level).init()
}
