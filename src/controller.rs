//! Interface enabling and route metric control.
//!
//! Every command is tried by name first and retried by index, since the OS
//! tools do not always accept the configured name.

use crate::errors::{FailoverError, FailoverResult};
use crate::network::{InterfaceQuery, InterfaceTarget, LinkState};
use crate::resolver::{find_admin_row, InterfaceResolver};
use crate::sleeper::Sleeper;
use crate::InterfaceRef;
use log::{error, info, warn};
use std::time::Duration;

pub struct InterfaceController<'a> {
    port: &'a dyn InterfaceQuery,
    sleeper: &'a dyn Sleeper,
    settle_delay: Duration,
}

impl<'a> InterfaceController<'a> {
    pub fn new(port: &'a dyn InterfaceQuery, sleeper: &'a dyn Sleeper, settle_delay: Duration) -> Self {
        Self {
            port,
            sleeper,
            settle_delay,
        }
    }

    /// Set the route metric of `iface`, falling back to its index.
    pub fn set_metric(&self, iface: &mut InterfaceRef, metric: u32) -> FailoverResult<()> {
        let by_name = match self.port.set_metric(InterfaceTarget::Name(&iface.display_name), metric) {
            Ok(()) => {
                info!("Set metric of {} to {}", iface, metric);
                return Ok(());
            }
            Err(e) => e,
        };
        warn!("Setting metric of {} by name failed: {}", iface, by_name);

        let index = self.index_of(iface)?;
        self.port
            .set_metric(InterfaceTarget::Index(index), metric)
            .map(|()| info!("Set metric of interface index {} to {}", index, metric))
            .map_err(|e| {
                error!("Setting metric of interface index {} failed: {}", index, e);
                FailoverError::RouteModificationFailed(format!(
                    "{} metric {}: by name ({}), by index ({})",
                    iface.display_name, metric, by_name, e
                ))
            })
    }

    /// Make sure `iface` is administratively up.
    ///
    /// Returns false when the interface cannot be found or enabled.
    pub fn ensure_enabled(&self, iface: &mut InterfaceRef) -> bool {
        let state = match self.port.link_state(&iface.display_name) {
            Ok(state) => state,
            Err(e) => {
                warn!("Querying {} by name failed ({}), scanning the admin state list", iface, e);
                match self.state_from_listing(iface) {
                    Some(state) => state,
                    None => return false,
                }
            }
        };

        match state {
            LinkState::Up => true,
            LinkState::Down => {
                info!("Enabling interface {}", iface);
                match self.enable(iface) {
                    Ok(()) => {
                        self.sleeper.sleep(self.settle_delay);
                        info!("Interface {} enabled", iface);
                        true
                    }
                    Err(e) => {
                        error!("Failed to enable {}: {}", iface, e);
                        false
                    }
                }
            }
            LinkState::Unknown => {
                warn!("Could not determine the state of {}", iface);
                false
            }
        }
    }

    fn enable(&self, iface: &mut InterfaceRef) -> FailoverResult<()> {
        if let Err(e) = self.port.enable(InterfaceTarget::Name(&iface.display_name)) {
            warn!("Enabling {} by name failed: {}", iface, e);
            let index = self.index_of(iface)?;
            info!("Enabling interface by index {}", index);
            self.port.enable(InterfaceTarget::Index(index))?;
        }
        Ok(())
    }

    fn state_from_listing(&self, iface: &InterfaceRef) -> Option<LinkState> {
        let rows = match self.port.admin_listing() {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to list interface admin states: {}", e);
                return None;
            }
        };

        match find_admin_row(&rows, &iface.display_name) {
            Some(row) => Some(row.state),
            None => {
                error!("Interface {} not present in the interface list", iface);
                None
            }
        }
    }

    /// Re-resolve the index, keeping a stale cached one if lookup fails.
    fn index_of(&self, iface: &mut InterfaceRef) -> FailoverResult<u32> {
        match InterfaceResolver::new(self.port).resolve(&iface.display_name) {
            Ok(index) => {
                iface.resolved_id = Some(index);
                Ok(index)
            }
            Err(e) => match iface.resolved_id {
                Some(cached) => {
                    warn!("Re-resolving {} failed ({}), using cached index", iface, e);
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }
}
