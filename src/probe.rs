use crate::logging::TIMESTAMP_FORMAT;
use crate::network::InterfaceQuery;
use crate::InterfaceRef;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Outcome of a single echo request through one interface
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub interface: String,
    pub target_host: String,
    pub reachable: bool,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.reachable { "Reached" } else { "Could not reach" };
        write!(
            f,
            "{} {} through '{}' (checked {})",
            outcome,
            self.target_host,
            self.interface,
            self.timestamp.format(TIMESTAMP_FORMAT)
        )
    }
}

/// True when ping output contains a reply line (`TTL=` on Windows, `ttl=` on Linux).
pub fn reply_indicates_success(output: &str) -> bool {
    output.to_ascii_lowercase().contains("ttl=")
}

/// Checks whether an interface can reach reference hosts
pub struct ConnectivityProbe<'a> {
    port: &'a dyn InterfaceQuery,
    timeout: Duration,
}

impl<'a> ConnectivityProbe<'a> {
    pub fn new(port: &'a dyn InterfaceQuery, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Send one echo request to `host` sourced from the interface's address.
    ///
    /// Fails closed: a missing address or a failed command counts as
    /// unreachable.
    pub fn probe(&self, iface: &InterfaceRef, host: &str) -> ProbeResult {
        let result = ProbeResult {
            interface: iface.display_name.clone(),
            target_host: host.to_string(),
            reachable: self.reachable(iface, host),
            timestamp: Local::now(),
        };
        info!("{}", result);
        result
    }

    /// True on the first host that answers; later hosts are not tried.
    pub fn probe_any(&self, iface: &InterfaceRef, hosts: &[String]) -> bool {
        hosts.iter().any(|host| self.probe(iface, host).reachable)
    }

    fn reachable(&self, iface: &InterfaceRef, host: &str) -> bool {
        let source = match self.port.ipv4_address(&iface.display_name) {
            Ok(Some(address)) => address,
            Ok(None) => {
                warn!("No IPv4 address bound to {}", iface);
                return false;
            }
            Err(e) => {
                warn!("Failed to read the address of {}: {}", iface, e);
                return false;
            }
        };

        debug!("Pinging {} from {} ({})", host, source, iface);
        match self.port.ping(source, host, self.timeout) {
            Ok(output) => reply_indicates_success(&output),
            Err(e) => {
                warn!("Ping to {} failed: {}", host, e);
                false
            }
        }
    }
}
