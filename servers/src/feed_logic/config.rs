//! Layered configuration for the feed binaries.
//!
//! Each binary resolves its settings the same way: built-in defaults, then a
//! JSON config file (`--config-path`, else `<binary>.conf` in the working
//! directory; a missing file is fine), then environment variables and CLI
//! flags. The merged, all-`Option` struct is then validated into typed
//! settings.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use lib_feed::core::{Category, ConnectionConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Reads a JSON config file. `Ok(None)` when the file does not exist.
fn read_config_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))?;
    let parsed = serde_json::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some(parsed))
}

fn parse_level(level: &str) -> Result<log::LevelFilter> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(log::LevelFilter::Trace),
        "debug" => Ok(log::LevelFilter::Debug),
        "info" => Ok(log::LevelFilter::Info),
        "warn" => Ok(log::LevelFilter::Warn),
        "error" => Ok(log::LevelFilter::Error),
        other => bail!("unknown log level '{}'", other),
    }
}

// --- Dashboard ---

/// Raw dashboard configuration. Every field is optional so layers can be merged.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Live feed dashboard: ingests the event stream and reports the buffer.", version)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    #[clap(long, env = "FEED_URL", help = "Event source URL.")]
    pub url: Option<String>,

    #[clap(long, env = "FEED_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FEED_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FEED_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "FEED_RECONNECT_BASE_DELAY_MS", help = "First reconnect delay in milliseconds.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "FEED_RECONNECT_MAX_DELAY_MS", help = "Reconnect delay ceiling in milliseconds.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "FEED_RECONNECT_JITTER_RATIO", help = "Fraction of each reconnect delay that may be randomly shaved off (0-0.9).")]
    pub reconnect_jitter_ratio: Option<f64>,

    #[clap(long, env = "FEED_BUFFER_CAPACITY", help = "Number of events kept in the buffer.")]
    pub buffer_capacity: Option<usize>,

    #[clap(long, env = "FEED_REPORT_INTERVAL_SECONDS", help = "Seconds between dashboard reports.")]
    pub report_interval_seconds: Option<u64>,

    #[clap(long, env = "FEED_CATEGORY", help = "Category filter (all, news, market, price).")]
    pub category: Option<String>,

    #[clap(long, env = "FEED_SEARCH", help = "Case-insensitive search over title and body.")]
    pub search: Option<String>,

    #[clap(long, env = "FEED_REPORT_ROWS", help = "Number of filtered events shown per report.")]
    pub report_rows: Option<usize>,
}

impl DashboardConfig {
    // Merge two configs, where 'other' overrides 'self' for Some values
    fn merge(self, other: DashboardConfig) -> DashboardConfig {
        DashboardConfig {
            url: other.url.or(self.url),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            reconnect_jitter_ratio: other.reconnect_jitter_ratio.or(self.reconnect_jitter_ratio),
            buffer_capacity: other.buffer_capacity.or(self.buffer_capacity),
            report_interval_seconds: other.report_interval_seconds.or(self.report_interval_seconds),
            category: other.category.or(self.category),
            search: other.search.or(self.search),
            report_rows: other.report_rows.or(self.report_rows),
        }
    }

    fn defaults() -> DashboardConfig {
        DashboardConfig {
            url: Some(lib_feed::core::connection_manager::DEFAULT_FEED_URL.to_string()),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            reconnect_base_delay_ms: Some(1000),
            reconnect_max_delay_ms: Some(30000),
            reconnect_jitter_ratio: Some(0.0),
            buffer_capacity: Some(lib_feed::core::event_store::DEFAULT_CAPACITY),
            report_interval_seconds: Some(5),
            category: Some("all".to_string()),
            search: Some(String::new()),
            report_rows: Some(10),
            ..Default::default()
        }
    }

    /// Merges defaults, the config file named by (or defaulted from) `cli`, then `cli`.
    pub fn resolve(cli: DashboardConfig) -> Result<DashboardConfig> {
        let path = cli.config_path.clone().unwrap_or_else(|| PathBuf::from("feed_dashboard.conf"));
        let mut current = DashboardConfig::defaults();
        if let Some(file_config) = read_config_file::<DashboardConfig>(&path)? {
            current = current.merge(file_config);
        }
        Ok(current.merge(cli))
    }

    /// Validates the merged values into typed settings.
    pub fn settings(&self) -> Result<DashboardSettings> {
        let defaults = DashboardConfig::defaults();
        let pick = |value: &Option<u64>, fallback: &Option<u64>| value.or(*fallback).unwrap_or_default();

        let connection = ConnectionConfig {
            url: self.url.clone().or(defaults.url).unwrap_or_default(),
            initial_delay: Duration::from_millis(pick(&self.reconnect_base_delay_ms, &defaults.reconnect_base_delay_ms)),
            max_delay: Duration::from_millis(pick(&self.reconnect_max_delay_ms, &defaults.reconnect_max_delay_ms)),
            jitter_ratio: self.reconnect_jitter_ratio.or(defaults.reconnect_jitter_ratio).unwrap_or_default(),
        };
        connection.validate()?;

        let buffer_capacity = self.buffer_capacity.or(defaults.buffer_capacity).unwrap_or_default();
        if buffer_capacity == 0 {
            bail!("buffer capacity must be greater than zero");
        }

        let report_interval_seconds = pick(&self.report_interval_seconds, &defaults.report_interval_seconds);
        if report_interval_seconds == 0 {
            bail!("report interval must be greater than zero");
        }

        let category_name = self.category.clone().or(defaults.category).unwrap_or_default();
        let category: Category = category_name
            .parse()
            .with_context(|| format!("invalid category filter '{}'", category_name))?;

        let log_level = self.log_level.clone().or(defaults.log_level).unwrap_or_default();

        Ok(DashboardSettings {
            connection,
            buffer_capacity,
            report_interval: Duration::from_secs(report_interval_seconds),
            category,
            search: self.search.clone().unwrap_or_default(),
            report_rows: self.report_rows.or(defaults.report_rows).unwrap_or_default(),
            log_dir: self.log_dir.clone().or(defaults.log_dir).unwrap_or_default(),
            log_level: parse_level(&log_level)?,
        })
    }
}

/// Validated dashboard settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    pub connection: ConnectionConfig,
    pub buffer_capacity: usize,
    pub report_interval: Duration,
    pub category: Category,
    pub search: String,
    pub report_rows: usize,
    pub log_dir: PathBuf,
    pub log_level: log::LevelFilter,
}

/// Parses CLI/env, merges all layers and validates.
pub fn load_dashboard_config() -> Result<DashboardSettings> {
    DashboardConfig::resolve(DashboardConfig::parse())?.settings()
}

// --- Mock producer ---

/// Raw mock producer configuration.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Demo event producer for the live feed dashboard.", version)]
#[serde(rename_all = "camelCase")]
pub struct MockConfig {
    #[clap(long, env = "FEED_MOCK_PORT", help = "Port to listen on.")]
    pub port: Option<u16>,

    #[clap(long, env = "FEED_MOCK_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FEED_MOCK_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FEED_MOCK_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "FEED_MOCK_EMIT_INTERVAL_MS", help = "Milliseconds between emitted frames, per client.")]
    pub emit_interval_ms: Option<u64>,

    #[clap(long, env = "FEED_MOCK_MALFORMED_RATIO", help = "Probability (0-1) that a frame is malformed.")]
    pub malformed_ratio: Option<f64>,
}

impl MockConfig {
    fn merge(self, other: MockConfig) -> MockConfig {
        MockConfig {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            emit_interval_ms: other.emit_interval_ms.or(self.emit_interval_ms),
            malformed_ratio: other.malformed_ratio.or(self.malformed_ratio),
        }
    }

    fn defaults() -> MockConfig {
        MockConfig {
            port: Some(8080),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            emit_interval_ms: Some(1500),
            malformed_ratio: Some(0.1),
            ..Default::default()
        }
    }

    /// Merges defaults, the config file, then `cli`.
    pub fn resolve(cli: MockConfig) -> Result<MockConfig> {
        let path = cli.config_path.clone().unwrap_or_else(|| PathBuf::from("feed_mock.conf"));
        let mut current = MockConfig::defaults();
        if let Some(file_config) = read_config_file::<MockConfig>(&path)? {
            current = current.merge(file_config);
        }
        Ok(current.merge(cli))
    }

    /// Validates the merged values into typed settings.
    pub fn settings(&self) -> Result<MockSettings> {
        let defaults = MockConfig::defaults();

        let emit_interval_ms = self.emit_interval_ms.or(defaults.emit_interval_ms).unwrap_or_default();
        if emit_interval_ms == 0 {
            bail!("emit interval must be greater than zero");
        }
        let malformed_ratio = self.malformed_ratio.or(defaults.malformed_ratio).unwrap_or_default();
        if !(0.0..=1.0).contains(&malformed_ratio) {
            bail!("malformed ratio must be within [0, 1], got {}", malformed_ratio);
        }
        let log_level = self.log_level.clone().or(defaults.log_level).unwrap_or_default();

        Ok(MockSettings {
            port: self.port.or(defaults.port).unwrap_or_default(),
            emit_interval: Duration::from_millis(emit_interval_ms),
            malformed_ratio,
            log_dir: self.log_dir.clone().or(defaults.log_dir).unwrap_or_default(),
            log_level: parse_level(&log_level)?,
        })
    }
}

/// Validated mock producer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MockSettings {
    pub port: u16,
    pub emit_interval: Duration,
    pub malformed_ratio: f64,
    pub log_dir: PathBuf,
    pub log_level: log::LevelFilter,
}

/// Parses CLI/env, merges all layers and validates.
pub fn load_mock_config() -> Result<MockSettings> {
    MockConfig::resolve(MockConfig::parse())?.settings()
}
