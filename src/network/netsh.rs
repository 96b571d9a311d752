//! Windows backend driving `netsh` and `ping`.
//!
//! Output is matched against both English and zh-CN markers since `netsh`
//! localizes its labels.

use super::{AdminRow, InterfaceQuery, InterfaceRow, InterfaceTarget, LinkState};
use crate::command::{args, CommandOutput, CommandRunner};
use crate::errors::{FailoverError, FailoverResult};
use log::debug;
use std::net::Ipv4Addr;
use std::time::Duration;

const ENABLED_MARKERS: [&str; 2] = ["Enabled", "已启用"];
const DISABLED_MARKERS: [&str; 2] = ["Disabled", "已禁用"];
const ADDRESS_LABELS: [&str; 2] = ["IP Address", "IP 地址"];

pub struct NetshBackend<R> {
    runner: R,
}

impl<R: CommandRunner> NetshBackend<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn netsh(&self, parts: &[&str]) -> FailoverResult<CommandOutput> {
        self.runner
            .run("netsh", &args(parts))
            .map_err(|e| FailoverError::CommandExecution(format!("netsh {}: {}", parts.join(" "), e)))
    }

    fn netsh_checked(&self, parts: &[&str]) -> FailoverResult<CommandOutput> {
        let output = self.netsh(parts)?;
        if !output.success {
            return Err(FailoverError::CommandExecution(format!(
                "netsh {} failed: {}",
                parts.join(" "),
                failure_text(&output)
            )));
        }
        Ok(output)
    }
}

impl<R: CommandRunner> InterfaceQuery for NetshBackend<R> {
    fn list_interfaces(&self) -> FailoverResult<Vec<InterfaceRow>> {
        let output = self.netsh_checked(&["interface", "ipv4", "show", "interfaces"])?;
        Ok(parse_interface_listing(&output.stdout))
    }

    fn admin_listing(&self) -> FailoverResult<Vec<AdminRow>> {
        let output = self.netsh_checked(&["interface", "show", "interface"])?;
        Ok(parse_admin_listing(&output.stdout))
    }

    fn link_state(&self, name: &str) -> FailoverResult<LinkState> {
        let output = self.netsh_checked(&["interface", "show", "interface", name])?;
        Ok(parse_admin_state(&output.stdout))
    }

    fn enable(&self, target: InterfaceTarget<'_>) -> FailoverResult<()> {
        let selector = selector(target);
        self.netsh_checked(&["interface", "set", "interface", &selector, "admin=enabled"])
            .map(|_| ())
            .map_err(|e| FailoverError::EnableFailed(format!("{}: {}", target, e)))
    }

    fn set_metric(&self, target: InterfaceTarget<'_>, metric: u32) -> FailoverResult<()> {
        let selector = selector(target);
        let metric_arg = format!("metric={}", metric);
        self.netsh_checked(&["interface", "ipv4", "set", "interface", &selector, &metric_arg])
            .map(|_| ())
            .map_err(|e| FailoverError::RouteModificationFailed(format!("{}: {}", target, e)))
    }

    fn ipv4_address(&self, name: &str) -> FailoverResult<Option<Ipv4Addr>> {
        let output = self.netsh_checked(&["interface", "ipv4", "show", "addresses", name])?;
        Ok(parse_address(&output.stdout))
    }

    fn ping(&self, source: Ipv4Addr, host: &str, timeout: Duration) -> FailoverResult<String> {
        let ping_args = args(&[
            "-n",
            "1",
            "-w",
            &timeout.as_millis().to_string(),
            "-S",
            &source.to_string(),
            host,
        ]);
        let output = self
            .runner
            .run("ping", &ping_args)
            .map_err(|e| FailoverError::CommandExecution(format!("ping {}: {}", host, e)))?;
        // ping exits non-zero on timeout; the text still decides the outcome
        Ok(output.stdout)
    }
}

fn selector(target: InterfaceTarget<'_>) -> String {
    match target {
        InterfaceTarget::Name(name) => name.to_string(),
        InterfaceTarget::Index(index) => format!("interface={}", index),
    }
}

fn failure_text(output: &CommandOutput) -> String {
    let text = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    text.to_string()
}

/// Parse `netsh interface ipv4 show interfaces`.
///
/// ```text
/// Idx     Met         MTU          State                Name
/// ---  ----------  ----------  ------------  ---------------------------
///  11          25        1500  connected     Ethernet
/// ```
pub fn parse_interface_listing(stdout: &str) -> Vec<InterfaceRow> {
    stdout
        .lines()
        .filter_map(|line| {
            let state = match line.split_whitespace().nth(3) {
                Some(s) if s.eq_ignore_ascii_case("connected") || s == "已连接" => LinkState::Up,
                Some(s) if s.eq_ignore_ascii_case("disconnected") || s == "已断开连接" => {
                    LinkState::Down
                }
                _ => LinkState::Unknown,
            };
            InterfaceRow::parse(line, state)
        })
        .collect()
}

/// Parse `netsh interface show interface`.
///
/// Unlike the ipv4 listing this one includes disabled adapters.
///
/// ```text
/// Admin State    State          Type             Interface Name
/// -------------------------------------------------------------------------
/// Enabled        Connected      Dedicated        Ethernet
/// Disabled       Disconnected   Dedicated        WLAN
/// ```
pub fn parse_admin_listing(stdout: &str) -> Vec<AdminRow> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let state = match tokens.next()? {
                t if ENABLED_MARKERS.contains(&t) => LinkState::Up,
                t if DISABLED_MARKERS.contains(&t) => LinkState::Down,
                _ => return None,
            };
            let name = tokens.skip(2).collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return None;
            }
            Some(AdminRow {
                name,
                state,
                raw: line.to_string(),
            })
        })
        .collect()
}

/// Parse the `Administrative state` of `netsh interface show interface <name>`.
pub fn parse_admin_state(stdout: &str) -> LinkState {
    if DISABLED_MARKERS.iter().any(|m| stdout.contains(m)) {
        LinkState::Down
    } else if ENABLED_MARKERS.iter().any(|m| stdout.contains(m)) {
        LinkState::Up
    } else {
        debug!("No administrative state marker in netsh output");
        LinkState::Unknown
    }
}

/// First IPv4 address in `netsh interface ipv4 show addresses <name>`.
pub fn parse_address(stdout: &str) -> Option<Ipv4Addr> {
    stdout
        .lines()
        .filter(|line| ADDRESS_LABELS.iter().any(|label| line.contains(label)))
        .filter_map(|line| line.split_once(':').map(|(_, value)| value.trim()))
        .find_map(|value| value.parse::<Ipv4Addr>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandRunner;

    const LISTING: &str = "
Idx     Met         MTU          State                Name
---  ----------  ----------  ------------  ---------------------------
  1          75  4294967295  connected     Loopback Pseudo-Interface 1
 11          25        1500  connected     以太网
 14          35        1500  disconnected  WLAN
";

    const SHOW_ENABLED: &str = "
以太网
   Type:                 Dedicated
   Administrative state: Enabled
   Connect state:        Connected
";

    const SHOW_DISABLED: &str = "
WLAN
   Type:                 Dedicated
   Administrative state: Disabled
   Connect state:        Disconnected
";

    const ADMIN_LISTING: &str = "
Admin State    State          Type             Interface Name
-------------------------------------------------------------------------
Enabled        Connected      Dedicated        Ethernet
Disabled       Disconnected   Dedicated        WLAN
Enabled        Disconnected   Dedicated        Bluetooth Network Connection
";

    const ADDRESSES: &str = "
Configuration for interface \"Ethernet\"
    DHCP enabled:                         Yes
    IP Address:                           192.168.1.23
    Subnet Prefix:                        192.168.1.0/24 (mask 255.255.255.0)
    Default Gateway:                      192.168.1.1
";

    #[test]
    fn test_parse_interface_listing() {
        let rows = parse_interface_listing(LISTING);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].index, 11);
        assert_eq!(rows[1].state, LinkState::Up);
        assert!(rows[1].raw.contains("以太网"));
        assert_eq!(rows[2].index, 14);
        assert_eq!(rows[2].state, LinkState::Down);
    }

    #[test]
    fn test_parse_admin_state() {
        assert_eq!(parse_admin_state(SHOW_ENABLED), LinkState::Up);
        assert_eq!(parse_admin_state(SHOW_DISABLED), LinkState::Down);
        assert_eq!(parse_admin_state("   管理状态: 已禁用"), LinkState::Down);
        assert_eq!(parse_admin_state("   管理状态: 已启用"), LinkState::Up);
        assert_eq!(parse_admin_state("garbage"), LinkState::Unknown);
    }

    #[test]
    fn test_parse_admin_listing_includes_disabled_adapters() {
        let rows = parse_admin_listing(ADMIN_LISTING);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "Ethernet");
        assert_eq!(rows[0].state, LinkState::Up);
        assert_eq!(rows[1].name, "WLAN");
        assert_eq!(rows[1].state, LinkState::Down);
        assert_eq!(rows[2].name, "Bluetooth Network Connection");
    }

    #[test]
    fn test_parse_admin_listing_localized() {
        let listing = "
管理员状态     状态           类型             接口名称
-------------------------------------------------------------------------
已禁用         已断开连接     专用             以太网
已启用         已连接         专用             WLAN
";
        let rows = parse_admin_listing(listing);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "以太网");
        assert_eq!(rows[0].state, LinkState::Down);
        assert_eq!(rows[1].state, LinkState::Up);
    }

    #[test]
    fn test_admin_listing_command() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, a| program == "netsh" && a == args(&["interface", "show", "interface"]).as_slice())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok(ADMIN_LISTING)));

        let backend = NetshBackend::new(runner);
        let rows = backend.admin_listing().unwrap();
        assert!(rows.iter().any(|r| r.name == "WLAN" && r.state == LinkState::Down));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address(ADDRESSES), Some(Ipv4Addr::new(192, 168, 1, 23)));
        assert_eq!(
            parse_address("    IP 地址:                           10.0.0.7"),
            Some(Ipv4Addr::new(10, 0, 0, 7))
        );
        assert_eq!(parse_address("    DHCP enabled: Yes"), None);
    }

    #[test]
    fn test_set_metric_by_name_and_index() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, a| {
                program == "netsh" && a.last().map(String::as_str) == Some("metric=1") && a[4] == "WLAN"
            })
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("Ok.")));
        runner
            .expect_run()
            .withf(|_, a| a[4] == "interface=11" && a[5] == "metric=100")
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("Ok.")));

        let backend = NetshBackend::new(runner);
        assert!(backend.set_metric(InterfaceTarget::Name("WLAN"), 1).is_ok());
        assert!(backend.set_metric(InterfaceTarget::Index(11), 100).is_ok());
    }

    #[test]
    fn test_set_metric_failure_is_route_error() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::failed("Element not found.")));

        let backend = NetshBackend::new(runner);
        let err = backend.set_metric(InterfaceTarget::Name("Ethernet"), 1).unwrap_err();
        assert!(matches!(err, FailoverError::RouteModificationFailed(_)));
    }

    #[test]
    fn test_enable_uses_admin_enabled() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, a| a[..3] == ["interface", "set", "interface"] && a[4] == "admin=enabled")
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let backend = NetshBackend::new(runner);
        assert!(backend.enable(InterfaceTarget::Name("WLAN")).is_ok());
    }

    #[test]
    fn test_link_state_query_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::failed("An interface with this name is not registered")));

        let backend = NetshBackend::new(runner);
        assert!(matches!(
            backend.link_state("Ethernet"),
            Err(FailoverError::CommandExecution(_))
        ));
    }

    #[test]
    fn test_ping_arguments_and_timeout_output() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, a| {
                program == "ping"
                    && a == args(&["-n", "1", "-w", "3000", "-S", "192.168.1.23", "www.github.com"]).as_slice()
            })
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: false,
                    stdout: "Request timed out.".to_string(),
                    stderr: String::new(),
                })
            });

        let backend = NetshBackend::new(runner);
        let out = backend
            .ping(Ipv4Addr::new(192, 168, 1, 23), "www.github.com", Duration::from_secs(3))
            .unwrap();
        assert_eq!(out, "Request timed out.");
    }
}
