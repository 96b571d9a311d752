//! # Uplink Failover
//!
//! Keeps a host reachable by failing over between a primary wired interface
//! and a secondary wireless interface. The primary is probed against a set of
//! reference hosts on every tick; when it cannot reach any of them its route
//! metric is demoted and the secondary is promoted, and the change is reversed
//! once the primary recovers.
//!
//! The OS is reached only through the [`network::InterfaceQuery`] port, so the
//! decision engine runs unchanged against `netsh`, `iproute2`, or the in-memory
//! [`network::fake::FakeNetwork`] used by the tests.

pub mod command;
pub mod config;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod monitor;
pub mod network;
pub mod notifier;
pub mod privilege;
pub mod probe;
pub mod resolver;
pub mod signal;
pub mod sleeper;

// Re-export commonly used types and functions
pub use engine::{FailoverEngine, FailoverEvent, MetricPolicy, TickReport};
pub use errors::{FailoverError, FailoverResult};
pub use monitor::{Monitor, RunSummary};
pub use network::{Backend, InterfaceQuery, InterfaceRow, LinkState};

use std::fmt;
use std::time::Duration;

/// Which interface currently carries the preferred route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveRoute {
    /// Primary interface holds the preferred metric
    Primary,

    /// Secondary interface holds the preferred metric
    Secondary,
}

impl fmt::Display for ActiveRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveRoute::Primary => write!(f, "primary"),
            ActiveRoute::Secondary => write!(f, "secondary"),
        }
    }
}

/// A managed interface, identified by its configured name.
///
/// `resolved_id` caches the OS index found by the resolver. It may go stale
/// and is refreshed whenever a name-based operation has to fall back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRef {
    pub display_name: String,
    pub resolved_id: Option<u32>,
}

impl InterfaceRef {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            resolved_id: None,
        }
    }
}

impl fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved_id {
            Some(id) => write!(f, "'{}' (index {})", self.display_name, id),
            None => write!(f, "'{}'", self.display_name),
        }
    }
}

/// Configuration for the failover engine
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverConfig {
    /// Primary network interface (e.g., Ethernet, enp3s0)
    pub primary_interface: String,

    /// Secondary network interface (e.g., WLAN, wlp2s0)
    pub secondary_interface: String,

    /// Hosts used only to test reachability, tried in order
    pub reference_hosts: Vec<String>,

    /// Pause between the end of one check and the start of the next
    pub check_interval: Duration,

    /// Timeout of a single echo request
    pub probe_timeout: Duration,

    /// Wait after enabling an interface before relying on it
    pub settle_delay: Duration,

    /// Route metrics applied on each switch
    pub metrics: MetricPolicy,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        FailoverConfig {
            primary_interface: String::new(),
            secondary_interface: String::new(),
            reference_hosts: vec!["www.google.com".to_string(), "www.github.com".to_string()],
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_secs(5),
            metrics: MetricPolicy::default(),
        }
    }
}

impl FailoverConfig {
    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> FailoverResult<()> {
        let primary = self.primary_interface.trim();
        let secondary = self.secondary_interface.trim();

        if primary.is_empty() {
            return Err(FailoverError::InvalidConfiguration(
                "primary interface name is empty".to_string(),
            ));
        }
        if secondary.is_empty() {
            return Err(FailoverError::InvalidConfiguration(
                "secondary interface name is empty".to_string(),
            ));
        }
        if primary.eq_ignore_ascii_case(secondary) {
            return Err(FailoverError::InvalidConfiguration(format!(
                "primary and secondary interface are both '{}'",
                primary
            )));
        }
        if self.reference_hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(FailoverError::InvalidConfiguration(
                "at least one reference host is required".to_string(),
            ));
        }
        if self.check_interval.is_zero() {
            return Err(FailoverError::InvalidConfiguration(
                "check interval must be greater than zero".to_string(),
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(FailoverError::InvalidConfiguration(
                "probe timeout must be greater than zero".to_string(),
            ));
        }
        self.metrics.validate()
    }
}
