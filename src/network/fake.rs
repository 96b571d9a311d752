//! In-memory network used to drive the engine without touching the OS.
//!
//! Clones share state, so a test can keep a handle while the engine owns
//! another one as its port.

use super::{AdminRow, InterfaceQuery, InterfaceRow, InterfaceTarget, LinkState};
use crate::errors::{FailoverError, FailoverResult};
use std::cell::RefCell;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

/// A simulated interface
#[derive(Debug, Clone)]
pub struct FakeInterface {
    pub name: String,
    pub index: u32,
    pub description: String,
    pub state: LinkState,
    pub address: Option<Ipv4Addr>,
    pub online: bool,
    pub metric: Option<u32>,
    /// Name-based commands fail, forcing the index fallback
    pub reject_name: bool,
    /// Enabling by any route fails
    pub refuse_enable: bool,
    /// Metric writes by any route fail
    pub refuse_metric: bool,
}

impl FakeInterface {
    pub fn new(name: &str, index: u32) -> Self {
        Self {
            name: name.to_string(),
            index,
            description: name.to_string(),
            state: LinkState::Up,
            address: Some(Ipv4Addr::new(192, 168, 1, index.min(254) as u8)),
            online: true,
            metric: None,
            reject_name: false,
            refuse_enable: false,
            refuse_metric: false,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn state(mut self, state: LinkState) -> Self {
        self.state = state;
        self
    }

    pub fn address(mut self, address: Option<Ipv4Addr>) -> Self {
        self.address = address;
        self
    }

    pub fn reject_name(mut self) -> Self {
        self.reject_name = true;
        self
    }

    fn row(&self) -> InterfaceRow {
        let state = match self.state {
            LinkState::Up => "connected",
            LinkState::Down => "disconnected",
            LinkState::Unknown => "unknown",
        };
        let raw = format!(
            "{:>3}  {:>10}  {:>10}  {:<12}  {}",
            self.index, 25, 1500, state, self.description
        );
        InterfaceRow {
            index: self.index,
            state: self.state,
            description: raw.split_whitespace().skip(1).collect::<Vec<_>>().join(" "),
            raw,
        }
    }
}

/// One recorded metric write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricCall {
    pub interface: String,
    pub metric: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    interfaces: Vec<FakeInterface>,
    blocked_hosts: HashSet<String>,
    metric_calls: Vec<MetricCall>,
    enable_calls: usize,
    list_calls: usize,
    pinged: Vec<String>,
    panic_on_query: bool,
}

#[derive(Debug, Default, Clone)]
pub struct FakeNetwork {
    state: Rc<RefCell<FakeState>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interface(&self, iface: FakeInterface) {
        self.state.borrow_mut().interfaces.push(iface);
    }

    /// Mutate a simulated interface by name.
    pub fn update<F: FnOnce(&mut FakeInterface)>(&self, name: &str, f: F) {
        let mut state = self.state.borrow_mut();
        if let Some(iface) = state.interfaces.iter_mut().find(|i| i.name == name) {
            f(iface);
        }
    }

    /// Whether echo requests sourced from `name` get replies.
    pub fn set_online(&self, name: &str, online: bool) {
        self.update(name, |i| i.online = online);
    }

    /// Drop every echo request addressed to `host`.
    pub fn block_host(&self, host: &str) {
        self.state.borrow_mut().blocked_hosts.insert(host.to_string());
    }

    /// Make the next state query panic.
    pub fn arm_panic(&self) {
        self.state.borrow_mut().panic_on_query = true;
    }

    pub fn metric_calls(&self) -> Vec<MetricCall> {
        self.state.borrow().metric_calls.clone()
    }

    pub fn metric_call_count(&self) -> usize {
        self.state.borrow().metric_calls.len()
    }

    pub fn metric(&self, name: &str) -> Option<u32> {
        self.interface(name).and_then(|i| i.metric)
    }

    pub fn interface(&self, name: &str) -> Option<FakeInterface> {
        self.state.borrow().interfaces.iter().find(|i| i.name == name).cloned()
    }

    pub fn enable_calls(&self) -> usize {
        self.state.borrow().enable_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.borrow().list_calls
    }

    pub fn pinged_hosts(&self) -> Vec<String> {
        self.state.borrow().pinged.clone()
    }

    fn position(state: &FakeState, target: InterfaceTarget<'_>) -> FailoverResult<usize> {
        state
            .interfaces
            .iter()
            .position(|i| match target {
                InterfaceTarget::Name(name) => i.name == name && !i.reject_name,
                InterfaceTarget::Index(index) => i.index == index,
            })
            .ok_or_else(|| FailoverError::CommandExecution(format!("no interface {}", target)))
    }
}

impl InterfaceQuery for FakeNetwork {
    fn list_interfaces(&self) -> FailoverResult<Vec<InterfaceRow>> {
        let mut state = self.state.borrow_mut();
        state.list_calls += 1;
        Ok(state.interfaces.iter().map(FakeInterface::row).collect())
    }

    fn admin_listing(&self) -> FailoverResult<Vec<AdminRow>> {
        let state = self.state.borrow();
        Ok(state
            .interfaces
            .iter()
            .map(|i| {
                let admin = if i.state == LinkState::Down { "Disabled" } else { "Enabled" };
                AdminRow {
                    name: i.name.clone(),
                    state: i.state,
                    raw: format!("{:<14} {:<14} {:<16} {}", admin, "Connected", "Dedicated", i.name),
                }
            })
            .collect())
    }

    fn link_state(&self, name: &str) -> FailoverResult<LinkState> {
        let state = self.state.borrow();
        if state.panic_on_query {
            drop(state);
            self.state.borrow_mut().panic_on_query = false;
            panic!("simulated fault while querying {}", name);
        }
        let pos = Self::position(&state, InterfaceTarget::Name(name))?;
        Ok(state.interfaces[pos].state)
    }

    fn enable(&self, target: InterfaceTarget<'_>) -> FailoverResult<()> {
        let mut state = self.state.borrow_mut();
        state.enable_calls += 1;
        let pos = Self::position(&state, target)?;
        let iface = &mut state.interfaces[pos];
        if iface.refuse_enable {
            return Err(FailoverError::EnableFailed(iface.name.clone()));
        }
        iface.state = LinkState::Up;
        Ok(())
    }

    fn set_metric(&self, target: InterfaceTarget<'_>, metric: u32) -> FailoverResult<()> {
        let mut state = self.state.borrow_mut();
        let pos = Self::position(&state, target)?;
        if state.interfaces[pos].refuse_metric {
            return Err(FailoverError::RouteModificationFailed(
                state.interfaces[pos].name.clone(),
            ));
        }
        state.interfaces[pos].metric = Some(metric);
        let interface = state.interfaces[pos].name.clone();
        state.metric_calls.push(MetricCall { interface, metric });
        Ok(())
    }

    fn ipv4_address(&self, name: &str) -> FailoverResult<Option<Ipv4Addr>> {
        let state = self.state.borrow();
        let pos = Self::position(&state, InterfaceTarget::Name(name))?;
        let iface = &state.interfaces[pos];
        Ok(if iface.state == LinkState::Up { iface.address } else { None })
    }

    fn ping(&self, source: Ipv4Addr, host: &str, _timeout: Duration) -> FailoverResult<String> {
        let mut state = self.state.borrow_mut();
        state.pinged.push(host.to_string());

        let online = state
            .interfaces
            .iter()
            .any(|i| i.address == Some(source) && i.online && i.state == LinkState::Up);
        if online && !state.blocked_hosts.contains(host) {
            Ok(format!(
                "Pinging {host} [203.0.113.10] from {source} with 32 bytes of data:\n\
                 Reply from 203.0.113.10: bytes=32 time=12ms TTL=117\n"
            ))
        } else {
            Ok(format!(
                "Pinging {host} [203.0.113.10] from {source} with 32 bytes of data:\n\
                 Request timed out.\n"
            ))
        }
    }
}
