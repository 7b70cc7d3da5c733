//! Configuration management for sftp-pool.
//!
//! Settings are read from one file and then overridden from the environment.
//!
//! File lookup order (first existing file wins):
//! 1. The path passed to [`Settings::load`]
//! 2. `$SFTP_POOL_CONFIG`
//! 3. `./sftp-pool.toml`
//!
//! TOML, YAML and JSON are accepted, chosen by file extension. Durations are
//! humantime strings (`"500ms"`, `"2m 30s"`) and may carry a leading `-`:
//! a negative `max_wait_time` means "wait forever", a negative
//! `max_idle_time` is kept as is and makes every idle session evictable.
//!
//! Environment variables:
//! - `SFTP_POOL_INITIAL_SIZE`
//! - `SFTP_POOL_MAX_SIZE`
//! - `SFTP_POOL_MAX_WAIT_TIME`
//! - `SFTP_POOL_MAX_IDLE_TIME`
//! - `SFTP_POOL_LOG_LEVEL`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::logging::{LogLevel, LoggingConfig};
use crate::pool::{PoolConfig, PoolError, PoolResult, SessionPool};
use crate::session::{ConnectionParams, SessionFactory};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SFTP_POOL_CONFIG";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sftp-pool.toml";

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Session pool settings
    pub pool: PoolSettings,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Pool settings as written in a config file.
///
/// Unset fields keep the [`PoolConfig`] defaults. Sizes are signed here so a
/// negative value in a file is reported as a configuration error instead of a
/// parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Sessions created at startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_size: Option<i64>,

    /// Upper bound on live sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i64>,

    /// Wait limit on an exhausted pool
    #[serde(with = "signed_duration", skip_serializing_if = "Option::is_none")]
    pub max_wait_time: Option<chrono::Duration>,

    /// Idle time after which a session is evicted
    #[serde(with = "signed_duration", skip_serializing_if = "Option::is_none")]
    pub max_idle_time: Option<chrono::Duration>,

    /// Period of the background eviction task; unset disables it
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub maintenance_interval: Option<Duration>,
}

impl PoolSettings {
    /// Build a [`PoolConfig`], applying the builder's clamping rules.
    pub fn to_pool_config(&self) -> PoolResult<PoolConfig> {
        let mut builder = PoolConfig::builder();

        if let Some(initial_size) = self.initial_size {
            builder.initial_size(to_size("initial_size", initial_size)?)?;
        }
        if let Some(max_size) = self.max_size {
            builder.max_size(to_size("max_size", max_size)?)?;
        }
        if let Some(max_wait_time) = self.max_wait_time {
            builder.max_wait_time(max_wait_time);
        }
        if let Some(max_idle_time) = self.max_idle_time {
            builder.max_idle_time(max_idle_time);
        }

        Ok(builder.build())
    }

    /// Create a pool from these settings and start its maintenance task if
    /// `maintenance_interval` is set.
    pub async fn open<F: SessionFactory>(
        &self,
        factory: F,
        params: ConnectionParams,
    ) -> PoolResult<SessionPool<F>> {
        let pool = SessionPool::new(factory, params, self.to_pool_config()?).await;
        if let Some(period) = self.maintenance_interval {
            pool.start_maintenance(period);
        }
        Ok(pool)
    }
}

fn to_size(field: &str, value: i64) -> PoolResult<usize> {
    usize::try_from(value)
        .map_err(|_| PoolError::Configuration(format!("{} must not be negative, got {}", field, value)))
}

impl Settings {
    /// Load settings from the first config file found, then apply environment
    /// overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut settings = match Self::find_config_file(config_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    fn find_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            anyhow::ensure!(path.exists(), "Config file not found: {}", path.display());
            return Ok(Some(path.to_path_buf()));
        }

        let mut candidates = Vec::new();
        if let Ok(env_config) = std::env::var(CONFIG_ENV) {
            candidates.push(PathBuf::from(env_config));
        }
        candidates.push(PathBuf::from(DEFAULT_CONFIG_FILE));

        Ok(candidates.into_iter().find(|path| path.exists()))
    }

    /// Parse one config file, choosing the format by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let settings = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(anyhow::Error::from),
            "json" => serde_json::from_str(&content).map_err(anyhow::Error::from),
            "toml" => toml::from_str(&content).map_err(anyhow::Error::from),
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .map_err(anyhow::Error::from),
        };

        settings.with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        // SFTP_POOL_INITIAL_SIZE
        if let Some(n) = env_parsed("SFTP_POOL_INITIAL_SIZE", |v| v.trim().parse::<i64>().ok()) {
            self.pool.initial_size = Some(n);
        }

        // SFTP_POOL_MAX_SIZE
        if let Some(n) = env_parsed("SFTP_POOL_MAX_SIZE", |v| v.trim().parse::<i64>().ok()) {
            self.pool.max_size = Some(n);
        }

        // SFTP_POOL_MAX_WAIT_TIME
        if let Some(d) = env_parsed("SFTP_POOL_MAX_WAIT_TIME", |v| parse_signed_duration(v).ok()) {
            self.pool.max_wait_time = Some(d);
        }

        // SFTP_POOL_MAX_IDLE_TIME
        if let Some(d) = env_parsed("SFTP_POOL_MAX_IDLE_TIME", |v| parse_signed_duration(v).ok()) {
            self.pool.max_idle_time = Some(d);
        }

        // SFTP_POOL_LOG_LEVEL
        if let Some(level) = env_parsed("SFTP_POOL_LOG_LEVEL", |v| v.parse::<LogLevel>().ok()) {
            self.logging.level = level;
        }
    }
}

fn env_parsed<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(variable = name, value = %raw, "Ignoring unparseable environment override");
    }
    parsed
}

/// Parse a humantime duration with an optional leading `-`.
pub fn parse_signed_duration(s: &str) -> std::result::Result<chrono::Duration, String> {
    let s = s.trim();
    let (negative, magnitude) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };

    let std_duration = humantime::parse_duration(magnitude).map_err(|e| format!("'{}': {}", s, e))?;
    let duration = chrono::Duration::from_std(std_duration)
        .map_err(|_| format!("'{}': duration out of range", s))?;

    Ok(if negative { -duration } else { duration })
}

/// Render a duration the way [`parse_signed_duration`] reads it.
pub fn format_signed_duration(duration: chrono::Duration) -> String {
    let sign = if duration < chrono::Duration::zero() { "-" } else { "" };
    let magnitude = if sign.is_empty() { duration } else { -duration };
    match magnitude.to_std() {
        Ok(d) => format!("{}{}", sign, humantime::format_duration(d)),
        Err(_) => format!("{}{}s", sign, magnitude.num_seconds()),
    }
}

mod signed_duration {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<chrono::Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&super::format_signed_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<chrono::Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::parse_signed_duration(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
