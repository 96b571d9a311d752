//! Access to the OS network stack.
//!
//! [`InterfaceQuery`] is the only way the core touches the system. Backends
//! turn command output into [`InterfaceRow`] values so that name matching can
//! work on structured data.

pub mod fake;
pub mod iproute;
pub mod netsh;

use crate::command::CommandRunner;
use crate::errors::{FailoverError, FailoverResult};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

/// Administrative or link state reported for an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
    Unknown,
}

/// One entry of the OS interface listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRow {
    /// OS interface index
    pub index: u32,

    /// State column of the listing
    pub state: LinkState,

    /// Everything after the index column
    pub description: String,

    /// The unparsed line
    pub raw: String,
}

impl InterfaceRow {
    /// Split a listing line into index and description.
    ///
    /// Returns `None` for headers, separators and anything else whose first
    /// column is not numeric. A trailing `:` on the index is accepted.
    pub fn parse(raw: &str, state: LinkState) -> Option<Self> {
        let mut tokens = raw.split_whitespace();
        let index = tokens.next()?.trim_end_matches(':').parse::<u32>().ok()?;
        let description = tokens.collect::<Vec<_>>().join(" ");

        Some(InterfaceRow {
            index,
            state,
            description,
            raw: raw.to_string(),
        })
    }
}

/// One entry of the administrative state listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRow {
    /// Name the OS tools accept for this interface
    pub name: String,

    /// Administrative state (enabled or disabled), not the connect state
    pub state: LinkState,

    /// The unparsed line
    pub raw: String,
}

/// How an operation addresses an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceTarget<'a> {
    Name(&'a str),
    Index(u32),
}

impl fmt::Display for InterfaceTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceTarget::Name(name) => write!(f, "'{}'", name),
            InterfaceTarget::Index(index) => write!(f, "index {}", index),
        }
    }
}

/// Port to the OS interface configuration tools.
pub trait InterfaceQuery {
    /// Full interface listing.
    fn list_interfaces(&self) -> FailoverResult<Vec<InterfaceRow>>;

    /// Administrative state of every interface, disabled ones included.
    fn admin_listing(&self) -> FailoverResult<Vec<AdminRow>>;

    /// State of a single interface, queried by name.
    fn link_state(&self, name: &str) -> FailoverResult<LinkState>;

    /// Administratively enable an interface.
    fn enable(&self, target: InterfaceTarget<'_>) -> FailoverResult<()>;

    /// Set the route metric of an interface.
    fn set_metric(&self, target: InterfaceTarget<'_>, metric: u32) -> FailoverResult<()>;

    /// First IPv4 address bound to the interface, if any.
    fn ipv4_address(&self, name: &str) -> FailoverResult<Option<Ipv4Addr>>;

    /// Send one echo request from `source` and return the tool's raw output.
    fn ping(&self, source: Ipv4Addr, host: &str, timeout: Duration) -> FailoverResult<String>;
}

/// Which set of OS tools to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Pick from the running platform
    #[default]
    Auto,

    /// Windows `netsh`
    Netsh,

    /// Linux `ip` (iproute2)
    Iproute,
}

impl FromStr for Backend {
    type Err = FailoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "netsh" => Ok(Backend::Netsh),
            "iproute" | "iproute2" | "ip" => Ok(Backend::Iproute),
            other => Err(FailoverError::InvalidConfiguration(format!(
                "unknown backend '{}' (expected auto, netsh or iproute)",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Auto => write!(f, "auto"),
            Backend::Netsh => write!(f, "netsh"),
            Backend::Iproute => write!(f, "iproute"),
        }
    }
}

impl Backend {
    /// Resolve `Auto` to the backend for the running platform.
    pub fn concrete(self) -> FailoverResult<Backend> {
        match self {
            Backend::Auto if cfg!(windows) => Ok(Backend::Netsh),
            Backend::Auto if cfg!(target_os = "linux") => Ok(Backend::Iproute),
            Backend::Auto => Err(FailoverError::UnsupportedOS),
            other => Ok(other),
        }
    }
}

/// Build the port for `backend` on top of `runner`.
pub fn connect<R>(backend: Backend, runner: R) -> FailoverResult<Box<dyn InterfaceQuery>>
where
    R: CommandRunner + 'static,
{
    match backend.concrete()? {
        Backend::Netsh => Ok(Box::new(netsh::NetshBackend::new(runner))),
        Backend::Iproute => Ok(Box::new(iproute::IprouteBackend::new(runner))),
        Backend::Auto => Err(FailoverError::UnsupportedOS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_row_with_numeric_index() {
        let row = InterfaceRow::parse(" 11          25        1500  connected     Ethernet", LinkState::Up)
            .unwrap();
        assert_eq!(row.index, 11);
        assert_eq!(row.description, "25 1500 connected Ethernet");
        assert_eq!(row.state, LinkState::Up);
    }

    #[test]
    fn test_parse_row_with_colon_index() {
        let row = InterfaceRow::parse("2: enp3s0: <BROADCAST,UP> mtu 1500", LinkState::Up).unwrap();
        assert_eq!(row.index, 2);
        assert!(row.description.starts_with("enp3s0:"));
    }

    #[test]
    fn test_parse_row_rejects_headers() {
        assert!(InterfaceRow::parse("Idx     Met         MTU", LinkState::Unknown).is_none());
        assert!(InterfaceRow::parse("---  ----------", LinkState::Unknown).is_none());
        assert!(InterfaceRow::parse("", LinkState::Unknown).is_none());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("auto".parse::<Backend>().unwrap(), Backend::Auto);
        assert_eq!("NETSH".parse::<Backend>().unwrap(), Backend::Netsh);
        assert_eq!("iproute2".parse::<Backend>().unwrap(), Backend::Iproute);
        assert!("ifconfig".parse::<Backend>().is_err());
    }

    #[test]
    fn test_explicit_backend_is_concrete() {
        assert_eq!(Backend::Netsh.concrete().unwrap(), Backend::Netsh);
        assert_eq!(Backend::Iproute.concrete().unwrap(), Backend::Iproute);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_auto_backend_on_linux() {
        assert_eq!(Backend::Auto.concrete().unwrap(), Backend::Iproute);
    }
}
