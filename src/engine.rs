//! Failover state machine.
//!
//! Each tick enables both interfaces, probes the primary and switches the
//! preferred route only when the outcome disagrees with the current state.
//! Repeating an unchanged outcome never touches the routing table, unless an
//! earlier switch was only half applied; then the metric pair of the current
//! route is written again until it sticks.

use crate::controller::InterfaceController;
use crate::errors::{FailoverError, FailoverResult};
use crate::network::InterfaceQuery;
use crate::probe::ConnectivityProbe;
use crate::resolver::InterfaceResolver;
use crate::sleeper::Sleeper;
use crate::{ActiveRoute, FailoverConfig, InterfaceRef};
use log::{error, info, warn};
use std::time::Duration;

/// Route metrics applied on a switch; lower is preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricPolicy {
    pub preferred: u32,
    pub primary_demoted: u32,
    pub secondary_demoted: u32,
}

impl Default for MetricPolicy {
    fn default() -> Self {
        Self {
            preferred: 1,
            primary_demoted: 100,
            secondary_demoted: 10,
        }
    }
}

impl MetricPolicy {
    pub fn validate(&self) -> FailoverResult<()> {
        if self.preferred == 0 {
            return Err(FailoverError::InvalidConfiguration(
                "preferred metric must be positive".to_string(),
            ));
        }
        if self.primary_demoted <= self.preferred || self.secondary_demoted <= self.preferred {
            return Err(FailoverError::InvalidConfiguration(format!(
                "demoted metrics ({}, {}) must be greater than the preferred metric ({})",
                self.primary_demoted, self.secondary_demoted, self.preferred
            )));
        }
        Ok(())
    }
}

/// Raised when the preferred route changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverEvent {
    SwitchedToPrimary,
    SwitchedToSecondary,
}

impl FailoverEvent {
    pub fn title(&self) -> &'static str {
        "Network failover"
    }

    pub fn message(&self, primary: &str, secondary: &str) -> String {
        match self {
            FailoverEvent::SwitchedToPrimary => format!(
                "Connection through {} restored, routing switched back to {}",
                primary, primary
            ),
            FailoverEvent::SwitchedToSecondary => format!(
                "Connection through {} lost, routing switched to {}",
                primary, secondary
            ),
        }
    }
}

/// What a single tick observed and did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub route_before: ActiveRoute,
    pub route_after: ActiveRoute,
    pub primary_enabled: bool,
    pub secondary_enabled: bool,
    pub primary_reachable: bool,
    pub event: Option<FailoverEvent>,
    /// A switch was due but its metric writes failed; retried next tick
    pub switch_failed: bool,
}

pub struct FailoverEngine {
    port: Box<dyn InterfaceQuery>,
    sleeper: Box<dyn Sleeper>,
    primary: InterfaceRef,
    secondary: InterfaceRef,
    reference_hosts: Vec<String>,
    probe_timeout: Duration,
    settle_delay: Duration,
    metrics: MetricPolicy,
    active: ActiveRoute,
    /// Metrics may disagree with `active` after a failed write
    out_of_sync: bool,
}

impl FailoverEngine {
    /// Validate the configuration and resolve both interfaces.
    ///
    /// Fails with `InterfaceNotFound` if either name does not resolve; the
    /// engine is never constructed in that case.
    pub fn start(
        config: &FailoverConfig,
        port: Box<dyn InterfaceQuery>,
        sleeper: Box<dyn Sleeper>,
    ) -> FailoverResult<Self> {
        config.validate()?;

        let mut primary = InterfaceRef::new(config.primary_interface.trim());
        let mut secondary = InterfaceRef::new(config.secondary_interface.trim());
        {
            let resolver = InterfaceResolver::new(port.as_ref());
            for iface in [&mut primary, &mut secondary] {
                match resolver.resolve(&iface.display_name) {
                    Ok(index) => {
                        iface.resolved_id = Some(index);
                        info!("Found interface {}", iface);
                    }
                    Err(e) => {
                        error!("Interface '{}' does not exist", iface.display_name);
                        return Err(e);
                    }
                }
            }
        }

        info!("Primary interface: {}", primary);
        info!("Secondary interface: {}", secondary);
        info!("Reference hosts: {}", config.reference_hosts.join(", "));

        Ok(Self {
            port,
            sleeper,
            primary,
            secondary,
            reference_hosts: config
                .reference_hosts
                .iter()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            probe_timeout: config.probe_timeout,
            settle_delay: config.settle_delay,
            metrics: config.metrics,
            active: ActiveRoute::Primary,
            out_of_sync: false,
        })
    }

    pub fn active_route(&self) -> ActiveRoute {
        self.active
    }

    pub fn primary(&self) -> &InterfaceRef {
        &self.primary
    }

    pub fn secondary(&self) -> &InterfaceRef {
        &self.secondary
    }

    /// Whether a failed metric write left the routing table out of step
    pub fn out_of_sync(&self) -> bool {
        self.out_of_sync
    }

    /// Run one decision cycle.
    pub fn tick(&mut self) -> TickReport {
        let route_before = self.active;

        let controller = InterfaceController::new(self.port.as_ref(), self.sleeper.as_ref(), self.settle_delay);
        let primary_enabled = controller.ensure_enabled(&mut self.primary);
        let secondary_enabled = controller.ensure_enabled(&mut self.secondary);

        let primary_reachable = if primary_enabled {
            ConnectivityProbe::new(self.port.as_ref(), self.probe_timeout)
                .probe_any(&self.primary, &self.reference_hosts)
        } else {
            info!("Primary interface {} is not enabled, skipping probe", self.primary);
            false
        };

        let target = if primary_reachable {
            ActiveRoute::Primary
        } else {
            ActiveRoute::Secondary
        };

        let mut event = None;
        let mut switch_failed = false;
        if target == self.active {
            match target {
                ActiveRoute::Primary => info!("Primary connection is working, keeping primary route"),
                ActiveRoute::Secondary => info!("Primary connection still down, keeping secondary route"),
            }
            if self.out_of_sync {
                warn!("Metrics may not match the {} route, writing them again", target);
                if self.apply_route(target) {
                    info!("Metrics restored for the {} route", target);
                    self.out_of_sync = false;
                } else {
                    error!("Restoring metrics for the {} route failed, retrying next check", target);
                }
            }
        } else if self.apply_route(target) {
            self.active = target;
            self.out_of_sync = false;
            let switched = match target {
                ActiveRoute::Primary => FailoverEvent::SwitchedToPrimary,
                ActiveRoute::Secondary => FailoverEvent::SwitchedToSecondary,
            };
            info!(
                "{}",
                switched.message(&self.primary.display_name, &self.secondary.display_name)
            );
            event = Some(switched);
        } else {
            error!("Switch to the {} route failed, retrying next check", target);
            // the promotion may have landed without the demotion
            self.out_of_sync = true;
            switch_failed = true;
        }

        TickReport {
            route_before,
            route_after: self.active,
            primary_enabled,
            secondary_enabled,
            primary_reachable,
            event,
            switch_failed,
        }
    }

    /// Promote `route` first, then demote the other one.
    fn apply_route(&mut self, route: ActiveRoute) -> bool {
        let controller = InterfaceController::new(self.port.as_ref(), self.sleeper.as_ref(), self.settle_delay);
        let (promoted, demoted, demoted_metric) = match route {
            ActiveRoute::Primary => (&mut self.primary, &mut self.secondary, self.metrics.secondary_demoted),
            ActiveRoute::Secondary => (&mut self.secondary, &mut self.primary, self.metrics.primary_demoted),
        };

        if let Err(e) = controller.set_metric(promoted, self.metrics.preferred) {
            error!("{}", e);
            return false;
        }
        if let Err(e) = controller.set_metric(demoted, demoted_metric) {
            error!("{}", e);
            return false;
        }
        true
    }
}
