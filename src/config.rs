//! Configuration file loading and merging.
//!
//! Values are taken with precedence: command line → config file → defaults.

use crate::engine::MetricPolicy;
use crate::errors::{FailoverError, FailoverResult};
use crate::network::Backend;
use crate::FailoverConfig;
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub interfaces: Option<InterfaceSection>,
    pub monitoring: Option<MonitoringSection>,
    pub metrics: Option<MetricsSection>,
    pub logging: Option<LoggingSection>,
    pub notifications: Option<NotificationSection>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct InterfaceSection {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub backend: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct MonitoringSection {
    pub interval: Option<u64>,
    pub reference_hosts: Option<Vec<String>>,
    pub probe_timeout: Option<u64>,
    pub settle_delay: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    pub preferred: Option<u32>,
    pub primary_demoted: Option<u32>,
    pub secondary_demoted: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct NotificationSection {
    pub enabled: Option<bool>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub interval: Option<u64>,
    pub hosts: Vec<String>,
    pub backend: Option<String>,
    pub log_file: Option<PathBuf>,
    pub no_notify: bool,
}

/// Fully resolved settings for the process
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub failover: FailoverConfig,
    pub backend: Backend,
    pub log_file: Option<PathBuf>,
    pub notifications: bool,
}

/// Platform default location of the config file.
pub fn default_config_path() -> PathBuf {
    if cfg!(windows) {
        let base = std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"));
        base.join("uplink-failover").join("config.toml")
    } else {
        PathBuf::from("/etc/uplink-failover/config.toml")
    }
}

/// Read and parse a config file; a missing file yields `None`.
pub fn load(path: &Path) -> FailoverResult<Option<ConfigFile>> {
    if !path.exists() {
        debug!("Configuration file {:?} does not exist", path);
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    parse(&content)
        .map(Some)
        .map_err(|e| FailoverError::InvalidConfiguration(format!("{}: {}", path.display(), e)))
}

pub fn parse(content: &str) -> Result<ConfigFile, toml::de::Error> {
    toml::from_str(content)
}

impl AppConfig {
    /// Merge command line values over the file and defaults, then validate.
    pub fn resolve(overrides: &Overrides, file: Option<&ConfigFile>) -> FailoverResult<Self> {
        let interfaces = file.and_then(|c| c.interfaces.as_ref());
        let monitoring = file.and_then(|c| c.monitoring.as_ref());
        let metrics = file.and_then(|c| c.metrics.as_ref());
        let defaults = FailoverConfig::default();
        let default_metrics = MetricPolicy::default();

        let primary_interface = overrides
            .primary
            .clone()
            .or_else(|| interfaces.and_then(|i| i.primary.clone()))
            .ok_or_else(|| {
                FailoverError::InvalidConfiguration("primary interface is required".to_string())
            })?;

        let secondary_interface = overrides
            .secondary
            .clone()
            .or_else(|| interfaces.and_then(|i| i.secondary.clone()))
            .ok_or_else(|| {
                FailoverError::InvalidConfiguration("secondary interface is required".to_string())
            })?;

        let reference_hosts = if !overrides.hosts.is_empty() {
            overrides.hosts.clone()
        } else {
            monitoring
                .and_then(|m| m.reference_hosts.clone())
                .unwrap_or(defaults.reference_hosts)
        };

        let seconds = |cli: Option<u64>, file: Option<u64>, default: Duration| {
            cli.or(file).map(Duration::from_secs).unwrap_or(default)
        };

        let failover = FailoverConfig {
            primary_interface,
            secondary_interface,
            reference_hosts,
            check_interval: seconds(
                overrides.interval,
                monitoring.and_then(|m| m.interval),
                defaults.check_interval,
            ),
            probe_timeout: seconds(
                None,
                monitoring.and_then(|m| m.probe_timeout),
                defaults.probe_timeout,
            ),
            settle_delay: seconds(
                None,
                monitoring.and_then(|m| m.settle_delay),
                defaults.settle_delay,
            ),
            metrics: MetricPolicy {
                preferred: metrics
                    .and_then(|m| m.preferred)
                    .unwrap_or(default_metrics.preferred),
                primary_demoted: metrics
                    .and_then(|m| m.primary_demoted)
                    .unwrap_or(default_metrics.primary_demoted),
                secondary_demoted: metrics
                    .and_then(|m| m.secondary_demoted)
                    .unwrap_or(default_metrics.secondary_demoted),
            },
        };
        failover.validate()?;

        let backend = match overrides
            .backend
            .clone()
            .or_else(|| interfaces.and_then(|i| i.backend.clone()))
        {
            Some(name) => name.parse()?,
            None => Backend::Auto,
        };

        let log_file = overrides
            .log_file
            .clone()
            .or_else(|| file.and_then(|c| c.logging.as_ref()).and_then(|l| l.file.clone()));

        let notifications = !overrides.no_notify
            && file
                .and_then(|c| c.notifications.as_ref())
                .and_then(|n| n.enabled)
                .unwrap_or(true);

        Ok(AppConfig {
            failover,
            backend,
            log_file,
            notifications,
        })
    }
}
