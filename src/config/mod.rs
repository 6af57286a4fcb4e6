//! Typed configuration.
//!
//! Layers, lowest to highest: built-in defaults, a TOML file, environment
//! variables, then whatever the CLI sets on the loaded value.
//!
//! ```toml
//! database_file = "watchers.db"
//!
//! [log]
//! minimum_level = "info"
//!
//! [watcher]
//! timeout = 10          # minutes between sweeps
//! check_interval = 6.0  # hours before a watcher is due again
//!
//! [webserver]
//! address = "http://localhost:8080"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::scheduler::SchedulerConfig;

/// File looked up in `$HOME` when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = ".pricewatcher.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_file: PathBuf,
    pub log: LogConfig,
    pub watcher: WatcherConfig,
    pub webserver: WebserverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub minimum_level: String,
    pub otel_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    /// Minutes between sweeps.
    pub timeout: u64,
    /// Staleness threshold in hours.
    pub check_interval: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebserverConfig {
    /// Where the webserver listens and where the scheduler submits jobs.
    /// An `http://` or `https://` prefix is allowed.
    pub address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_file: PathBuf::from("watchers.db"),
            log: LogConfig::default(),
            watcher: WatcherConfig::default(),
            webserver: WebserverConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            minimum_level: "info".to_string(),
            otel_endpoint: None,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            timeout: 10,
            check_interval: 6.0,
        }
    }
}

impl Default for WebserverConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:8080".to_string(),
        }
    }
}

impl Config {
    /// Load configuration for this process.
    ///
    /// With `path`, that file must exist and parse. Without it,
    /// `$HOME/.pricewatcher.toml` is read if present. Environment overrides
    /// are applied last. In local dev, call `dotenvy::dotenv().ok()` first.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply environment-style overrides through `lookup`.
    ///
    /// Recognized: `PRICEWATCHER_DATABASE_FILE`, `LOG_LEVEL`, `OTEL_ENDPOINT`,
    /// `PRICEWATCHER_WEBSERVER_ADDRESS`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PRICEWATCHER_DATABASE_FILE") {
            self.database_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log.minimum_level = v;
        }
        if let Some(v) = lookup("OTEL_ENDPOINT") {
            self.log.otel_endpoint = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("PRICEWATCHER_WEBSERVER_ADDRESS") {
            self.webserver.address = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.watcher.timeout == 0 {
            return Err(Error::Config("watcher.timeout must be at least 1 minute".to_string()));
        }
        if self.watcher.timeout.checked_mul(60).is_none() {
            return Err(Error::Config(format!(
                "watcher.timeout of {} minutes is out of range",
                self.watcher.timeout
            )));
        }
        if !self.watcher.check_interval.is_finite() || self.watcher.check_interval < 0.0 {
            return Err(Error::Config(format!(
                "watcher.check_interval must be a non-negative number of hours, got {}",
                self.watcher.check_interval
            )));
        }
        if self.bind_address().is_empty() {
            return Err(Error::Config("webserver.address must not be empty".to_string()));
        }
        Ok(())
    }

    /// `host:port` to listen on: the configured address without its scheme.
    pub fn bind_address(&self) -> &str {
        let address = self.webserver.address.trim();
        address
            .strip_prefix("https://")
            .or_else(|| address.strip_prefix("http://"))
            .unwrap_or(address)
            .trim_end_matches('/')
    }

    /// Base URL the scheduler posts jobs to.
    pub fn submission_base_url(&self) -> String {
        let address = self.webserver.address.trim().trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.watcher.timeout.saturating_mul(60)),
            staleness_threshold_hours: self.watcher.check_interval,
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_FILE))
}
