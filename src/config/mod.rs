//! Configuration management for the OWServer poller

pub mod devices;

pub use devices::{build_store, DeviceDefinition};

use crate::discovery::network::DISCOVERY_PORT;
use crate::error::{OwServerError, Result};
use crate::services::unit_converter::UnitPreferences;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{env, fs, time::Duration};

/// Which devices go offline when one server cannot be fetched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailureScope {
    /// Only devices bound to the failing server
    #[default]
    Server,
    /// Every enabled device
    All,
}

/// Complete poller configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PollerConfig {
    pub servers: ServersConfig,
    pub polling: PollingConfig,
    pub discovery: DiscoveryConfig,
    pub units: UnitPreferences,
    pub logging: LoggingConfig,
    pub devices: Vec<DeviceDefinition>,
}

/// Where server addresses come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServersConfig {
    /// Probe the network each cycle instead of using `addresses`
    pub auto_detect: bool,

    /// Comma-delimited static server list
    pub addresses: String,
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            addresses: String::new(),
        }
    }
}

/// Poll loop timing and failure handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// Time between cycle starts
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Per-request HTTP timeout
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    pub failure_scope: FailureScope,

    /// Skip the per-cycle results summary in the log
    pub suppress_results_logging: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            fetch_timeout: Duration::from_secs(15),
            failure_scope: FailureScope::default(),
            suppress_results_logging: false,
        }
    }
}

/// UDP discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub broadcast_address: String,
    pub port: u16,

    /// How long to wait for the next reply before collection ends
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Probe datagram payload
    pub probe: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_address: "255.255.255.255".to_string(),
            port: DISCOVERY_PORT,
            read_timeout: Duration::from_millis(500),
            probe: "D".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,

    /// Emit JSON lines instead of text
    pub json_format: bool,

    /// Daily-rolling log file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file: None,
        }
    }
}

fn parse_duration(var: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| OwServerError::config(format!("Invalid {var}: {e}")))
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(OwServerError::config(format!("Invalid {var}: {other}"))),
    }
}

impl PollerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            OwServerError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: PollerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Load from an optional file, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OWSERVER_*` environment variables on top of this configuration
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(servers) = env::var("OWSERVER_SERVERS") {
            self.servers.addresses = servers;
            // An explicit list implies static mode unless auto-detect is also set
            self.servers.auto_detect = false;
        }

        if let Ok(auto) = env::var("OWSERVER_AUTO_DETECT") {
            self.servers.auto_detect = parse_bool("OWSERVER_AUTO_DETECT", &auto)?;
        }

        if let Ok(interval) = env::var("OWSERVER_POLL_INTERVAL") {
            self.polling.interval = parse_duration("OWSERVER_POLL_INTERVAL", &interval)?;
        }

        if let Ok(timeout) = env::var("OWSERVER_FETCH_TIMEOUT") {
            self.polling.fetch_timeout = parse_duration("OWSERVER_FETCH_TIMEOUT", &timeout)?;
        }

        if let Ok(unit) = env::var("OWSERVER_TEMPERATURE_UNIT") {
            self.units.temperature = unit.parse()?;
        }

        if let Ok(level) = env::var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval.is_zero() {
            return Err(OwServerError::config("Poll interval must be greater than zero"));
        }

        if self.polling.fetch_timeout.is_zero() {
            return Err(OwServerError::config("Fetch timeout must be greater than zero"));
        }

        if self.discovery.read_timeout.is_zero() {
            return Err(OwServerError::config(
                "Discovery read timeout must be greater than zero",
            ));
        }

        let mut ids = HashSet::new();
        let mut identities = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !ids.insert(device.id.trim()) {
                return Err(OwServerError::config(format!(
                    "Duplicate device id '{}'",
                    device.id
                )));
            }
            let server = device.server.as_deref().map(str::trim).unwrap_or_default();
            let rom = device.rom_id.as_deref().map(str::trim);
            if server.is_empty() || (rom.is_none() && !device.kind()?.is_server()) {
                continue;
            }
            if !identities.insert((server, rom)) {
                return Err(OwServerError::config(format!(
                    "Device '{}' duplicates another device on server {}",
                    device.id, server
                )));
            }
        }

        Ok(())
    }
}
