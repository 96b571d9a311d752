//! Linux backend driving `ip` and `ping`.
//!
//! Linux has no per-interface metric, so the metric of an interface is the
//! metric of its default route. Index targets are mapped back to kernel names
//! through `ip -o link show`.

use super::{AdminRow, InterfaceQuery, InterfaceRow, InterfaceTarget, LinkState};
use crate::command::{args, CommandOutput, CommandRunner};
use crate::errors::{FailoverError, FailoverResult};
use log::{debug, warn};
use std::net::Ipv4Addr;
use std::time::Duration;

/// iproute2 backend
pub struct IprouteBackend<R> {
    runner: R,
}

impl<R: CommandRunner> IprouteBackend<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn exec(&self, program: &str, parts: &[&str]) -> FailoverResult<CommandOutput> {
        self.runner.run(program, &args(parts)).map_err(|e| {
            FailoverError::CommandExecution(format!("{} {}: {}", program, parts.join(" "), e))
        })
    }

    fn ip(&self, parts: &[&str]) -> FailoverResult<CommandOutput> {
        let output = self.exec("ip", parts)?;
        if !output.success {
            return Err(FailoverError::CommandExecution(format!(
                "ip {} failed: {}",
                parts.join(" "),
                output.stderr.trim()
            )));
        }
        Ok(output)
    }

    /// Kernel name for a target; indices are mapped through the link listing.
    fn kernel_name(&self, target: InterfaceTarget<'_>) -> FailoverResult<String> {
        match target {
            InterfaceTarget::Name(name) => Ok(name.to_string()),
            InterfaceTarget::Index(index) => self
                .list_interfaces()?
                .iter()
                .find(|row| row.index == index)
                .and_then(link_name)
                .ok_or_else(|| FailoverError::InterfaceNotFound(format!("index {}", index))),
        }
    }

    /// Retrieve the default gateway for a specific interface
    fn gateway_for(&self, iface: &str) -> FailoverResult<Option<DefaultRoute>> {
        let output = self.ip(&["route", "show", "default"])?;
        Ok(parse_default_route(&output.stdout, iface))
    }
}

impl<R: CommandRunner> InterfaceQuery for IprouteBackend<R> {
    fn list_interfaces(&self) -> FailoverResult<Vec<InterfaceRow>> {
        let output = self.ip(&["-o", "link", "show"])?;
        Ok(parse_link_listing(&output.stdout))
    }

    fn admin_listing(&self) -> FailoverResult<Vec<AdminRow>> {
        let output = self.ip(&["-o", "link", "show"])?;
        Ok(parse_admin_listing(&output.stdout))
    }

    fn link_state(&self, name: &str) -> FailoverResult<LinkState> {
        let output = self.ip(&["-o", "link", "show", "dev", name])?;
        Ok(output
            .stdout
            .lines()
            .next()
            .map(parse_link_flags)
            .unwrap_or(LinkState::Unknown))
    }

    fn enable(&self, target: InterfaceTarget<'_>) -> FailoverResult<()> {
        let name = self.kernel_name(target)?;
        self.ip(&["link", "set", "dev", &name, "up"])
            .map(|_| ())
            .map_err(|e| FailoverError::EnableFailed(format!("{}: {}", target, e)))
    }

    fn set_metric(&self, target: InterfaceTarget<'_>, metric: u32) -> FailoverResult<()> {
        let name = self.kernel_name(target)?;
        let route = match self.gateway_for(&name)? {
            Some(route) => route,
            None => {
                // no default route to re-prioritise; the link is down or unconfigured
                warn!("No default route via {}, metric {} not applied", name, metric);
                return Ok(());
            }
        };

        if route.metric == Some(metric) {
            debug!("Default route via {} already has metric {}", name, metric);
            return Ok(());
        }

        debug!(
            "Replacing default route via {} (gw {}) with metric {}",
            name, route.gateway, metric
        );

        // the metric is part of the route key: add the new route, then drop the old one
        let new_metric = metric.to_string();
        let old_metric = route.metric.unwrap_or(0).to_string();
        let route_cmd = |verb: &str, metric: &str| {
            self.ip(&["route", verb, "default", "via", &route.gateway, "dev", &name, "metric", metric])
        };

        route_cmd("add", &new_metric)
            .map_err(|e| FailoverError::RouteModificationFailed(format!("{}: {}", target, e)))?;

        if let Err(e) = route_cmd("del", &old_metric) {
            // put the table back the way it was
            if let Err(undo) = route_cmd("del", &new_metric) {
                warn!("Could not remove route with metric {} via {}: {}", metric, name, undo);
            }
            return Err(FailoverError::RouteModificationFailed(format!("{}: {}", target, e)));
        }
        Ok(())
    }

    fn ipv4_address(&self, name: &str) -> FailoverResult<Option<Ipv4Addr>> {
        let output = self.ip(&["-4", "-o", "addr", "show", "dev", name])?;
        Ok(parse_inet_address(&output.stdout))
    }

    fn ping(&self, source: Ipv4Addr, host: &str, timeout: Duration) -> FailoverResult<String> {
        let wait = timeout.as_secs().max(1).to_string();
        let source = source.to_string();
        let output = self.exec("ping", &["-c", "1", "-W", &wait, "-I", &source, host])?;
        Ok(output.stdout)
    }
}

/// Default route entry for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoute {
    pub gateway: String,
    pub metric: Option<u32>,
}

/// Parse `ip -o link show`, one interface per line.
///
/// ```text
/// 2: enp3s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP ...
/// ```
pub fn parse_link_listing(stdout: &str) -> Vec<InterfaceRow> {
    stdout
        .lines()
        .filter_map(|line| InterfaceRow::parse(line, parse_link_flags(line)))
        .collect()
}

/// Link listing keyed by kernel name; the `UP` flag is the admin state.
pub fn parse_admin_listing(stdout: &str) -> Vec<AdminRow> {
    parse_link_listing(stdout)
        .into_iter()
        .filter_map(|row| {
            Some(AdminRow {
                name: link_name(&row)?,
                state: row.state,
                raw: row.raw,
            })
        })
        .collect()
}

/// Administrative state from the `<...>` flag set of a link line.
pub fn parse_link_flags(line: &str) -> LinkState {
    let flags = line
        .split_whitespace()
        .find(|token| token.starts_with('<') && token.ends_with('>'));

    match flags {
        Some(flags) => {
            let up = flags
                .trim_matches(|c| c == '<' || c == '>')
                .split(',')
                .any(|flag| flag == "UP");
            if up {
                LinkState::Up
            } else {
                LinkState::Down
            }
        }
        None => LinkState::Unknown,
    }
}

/// Kernel name from a link row, without the `@peer` suffix.
fn link_name(row: &InterfaceRow) -> Option<String> {
    row.description
        .split_whitespace()
        .next()
        .map(|name| name.trim_end_matches(':'))
        .map(|name| name.split('@').next().unwrap_or(name).to_string())
        .filter(|name| !name.is_empty())
}

/// Find the default route through `iface` in `ip route show default`.
pub fn parse_default_route(stdout: &str, iface: &str) -> Option<DefaultRoute> {
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let value_after = |key: &str| {
            parts
                .iter()
                .position(|&x| x == key)
                .and_then(|i| parts.get(i + 1).copied())
        };

        if value_after("dev") != Some(iface) {
            continue;
        }
        if let Some(gateway) = value_after("via") {
            return Some(DefaultRoute {
                gateway: gateway.to_string(),
                metric: value_after("metric").and_then(|m| m.parse().ok()),
            });
        }
    }
    None
}

/// First `inet` address in `ip -4 -o addr show`.
pub fn parse_inet_address(stdout: &str) -> Option<Ipv4Addr> {
    stdout.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        tokens.find(|&t| t == "inet")?;
        tokens.next()?.split('/').next()?.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandRunner;

    const LINKS: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000\\    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
2: enp3s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP mode DEFAULT group default qlen 1000\\    link/ether 3c:7c:3f:aa:bb:cc brd ff:ff:ff:ff:ff:ff\\    altname enx3c7c3faabbcc
3: wlp2s0: <BROADCAST,MULTICAST> mtu 1500 qdisc noqueue state DOWN mode DORMANT group default qlen 1000\\    link/ether 10:02:b5:11:22:33 brd ff:ff:ff:ff:ff:ff
4: veth0@if5: <BROADCAST,MULTICAST,UP> mtu 1500 qdisc noqueue state UP mode DEFAULT group default qlen 1000
";

    const ROUTES: &str = "\
default via 192.168.1.1 dev enp3s0 proto dhcp src 192.168.1.23 metric 100
default via 10.0.0.1 dev wlp2s0 proto dhcp src 10.0.0.7 metric 600
";

    #[test]
    fn test_parse_link_listing() {
        let rows = parse_link_listing(LINKS);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1].index, 2);
        assert_eq!(rows[1].state, LinkState::Up);
        assert_eq!(rows[2].state, LinkState::Down);
        assert_eq!(link_name(&rows[2]).as_deref(), Some("wlp2s0"));
        assert_eq!(link_name(&rows[3]).as_deref(), Some("veth0"));
    }

    #[test]
    fn test_parse_admin_listing_includes_down_links() {
        let rows = parse_admin_listing(LINKS);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["lo", "enp3s0", "wlp2s0", "veth0"]);
        assert_eq!(rows[2].state, LinkState::Down);
        assert_eq!(rows[1].state, LinkState::Up);
    }

    #[test]
    fn test_parse_default_route_matches_device_exactly() {
        let route = parse_default_route(ROUTES, "wlp2s0").unwrap();
        assert_eq!(route.gateway, "10.0.0.1");
        assert_eq!(route.metric, Some(600));
        assert!(parse_default_route(ROUTES, "wlp2").is_none());
        assert!(parse_default_route(ROUTES, "eth0").is_none());
    }

    #[test]
    fn test_parse_inet_address() {
        let out = "2: enp3s0    inet 192.168.1.23/24 brd 192.168.1.255 scope global dynamic enp3s0\\       valid_lft 85000sec preferred_lft 85000sec\n";
        assert_eq!(parse_inet_address(out), Some(Ipv4Addr::new(192, 168, 1, 23)));
        assert_eq!(parse_inet_address(""), None);
    }

    fn route_args(verb: &str, metric: &str) -> Vec<String> {
        args(&[
            "route", verb, "default", "via", "192.168.1.1", "dev", "enp3s0", "metric", metric,
        ])
    }

    #[test]
    fn test_set_metric_adds_new_route_before_deleting_old() {
        let mut runner = MockCommandRunner::new();
        let mut seq = mockall::Sequence::new();
        runner
            .expect_run()
            .withf(|p, a| p == "ip" && a == args(&["route", "show", "default"]).as_slice())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandOutput::ok(ROUTES)));
        runner
            .expect_run()
            .withf(|_, a| a == route_args("add", "1").as_slice())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandOutput::ok("")));
        runner
            .expect_run()
            .withf(|_, a| a == route_args("del", "100").as_slice())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let backend = IprouteBackend::new(runner);
        assert!(backend.set_metric(InterfaceTarget::Name("enp3s0"), 1).is_ok());
    }

    #[test]
    fn test_set_metric_keeps_old_route_when_add_fails() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, a| a == args(&["route", "show", "default"]).as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok(ROUTES)));
        runner
            .expect_run()
            .withf(|_, a| a == route_args("add", "1").as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::failed("RTNETLINK answers: Network is unreachable")));

        // no `route del` expectation: deleting here would fail the test
        let backend = IprouteBackend::new(runner);
        assert!(matches!(
            backend.set_metric(InterfaceTarget::Name("enp3s0"), 1),
            Err(FailoverError::RouteModificationFailed(_))
        ));
    }

    #[test]
    fn test_set_metric_removes_new_route_when_delete_fails() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, a| a == args(&["route", "show", "default"]).as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok(ROUTES)));
        runner
            .expect_run()
            .withf(|_, a| a == route_args("add", "1").as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));
        runner
            .expect_run()
            .withf(|_, a| a == route_args("del", "100").as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::failed("RTNETLINK answers: Operation not permitted")));
        runner
            .expect_run()
            .withf(|_, a| a == route_args("del", "1").as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let backend = IprouteBackend::new(runner);
        assert!(matches!(
            backend.set_metric(InterfaceTarget::Name("enp3s0"), 1),
            Err(FailoverError::RouteModificationFailed(_))
        ));
    }

    #[test]
    fn test_set_metric_deletes_route_without_metric_as_zero() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, a| a == args(&["route", "show", "default"]).as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("default via 192.168.1.1 dev enp3s0 proto static\n")));
        runner
            .expect_run()
            .withf(|_, a| a == route_args("add", "100").as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));
        runner
            .expect_run()
            .withf(|_, a| a == route_args("del", "0").as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let backend = IprouteBackend::new(runner);
        assert!(backend.set_metric(InterfaceTarget::Name("enp3s0"), 100).is_ok());
    }

    #[test]
    fn test_set_metric_skips_identical_metric() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok(ROUTES)));

        let backend = IprouteBackend::new(runner);
        assert!(backend.set_metric(InterfaceTarget::Name("wlp2s0"), 600).is_ok());
    }

    #[test]
    fn test_enable_by_index_maps_to_kernel_name() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, a| a == args(&["-o", "link", "show"]).as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok(LINKS)));
        runner
            .expect_run()
            .withf(|_, a| a == args(&["link", "set", "dev", "wlp2s0", "up"]).as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let backend = IprouteBackend::new(runner);
        assert!(backend.enable(InterfaceTarget::Index(3)).is_ok());
    }

    #[test]
    fn test_enable_unknown_index_fails() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::ok(LINKS)));

        let backend = IprouteBackend::new(runner);
        assert!(matches!(
            backend.enable(InterfaceTarget::Index(42)),
            Err(FailoverError::InterfaceNotFound(_))
        ));
    }

    #[test]
    fn test_link_state_unknown_device() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _| {
            Ok(CommandOutput::failed("Device \"eth9\" does not exist."))
        });

        let backend = IprouteBackend::new(runner);
        assert!(backend.link_state("eth9").is_err());
    }
}
