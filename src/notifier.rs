//! Best-effort user notifications.
//!
//! A [`LayeredNotifier`] walks an ordered list of delivery strategies and
//! stops at the first one that succeeds. Nothing here ever returns an error
//! to the caller.

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::errors::{FailoverError, FailoverResult};
use log::{info, warn};
use std::rc::Rc;

pub trait Notifier {
    fn notify(&self, title: &str, message: &str);
}

/// One way of putting a message in front of the user
#[cfg_attr(test, mockall::automock)]
pub trait DeliveryStrategy {
    fn name(&self) -> String;
    fn deliver(&self, title: &str, message: &str) -> FailoverResult<()>;
}

pub struct LayeredNotifier {
    strategies: Vec<Box<dyn DeliveryStrategy>>,
}

impl LayeredNotifier {
    pub fn new(strategies: Vec<Box<dyn DeliveryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Desktop strategies for the running platform.
    pub fn for_platform() -> Self {
        let runner: Rc<dyn CommandRunner> = Rc::new(SystemCommandRunner);
        let strategies: Vec<Box<dyn DeliveryStrategy>> = if cfg!(windows) {
            vec![
                Box::new(CommandStrategy::new("message box", runner.clone(), Launch::Detached, message_box_args)),
                Box::new(CommandStrategy::new("msg", runner, Launch::Wait, msg_args)),
            ]
        } else {
            vec![Box::new(CommandStrategy::new("notify-send", runner, Launch::Wait, notify_send_args))]
        };
        Self::new(strategies)
    }
}

impl Notifier for LayeredNotifier {
    fn notify(&self, title: &str, message: &str) {
        for strategy in &self.strategies {
            match strategy.deliver(title, message) {
                Ok(()) => {
                    info!("Notification shown via {}: {} - {}", strategy.name(), title, message);
                    return;
                }
                Err(e) => warn!("Notification via {} failed: {}", strategy.name(), e),
            }
        }
        warn!("No notification method succeeded for: {} - {}", title, message);
    }
}

/// Used when desktop notifications are switched off
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!("{}: {}", title, message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// Wait for exit and require a zero status
    Wait,
    /// Start and return; for tools that block until dismissed
    Detached,
}

type ArgsBuilder = fn(&str, &str) -> (String, Vec<String>);

/// Delivers by running an external tool
pub struct CommandStrategy {
    label: String,
    runner: Rc<dyn CommandRunner>,
    launch: Launch,
    build: ArgsBuilder,
}

impl CommandStrategy {
    pub fn new(label: &str, runner: Rc<dyn CommandRunner>, launch: Launch, build: ArgsBuilder) -> Self {
        Self {
            label: label.to_string(),
            runner,
            launch,
            build,
        }
    }
}

impl DeliveryStrategy for CommandStrategy {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn deliver(&self, title: &str, message: &str) -> FailoverResult<()> {
        let (program, args) = (self.build)(title, message);
        match self.launch {
            Launch::Detached => self.runner.spawn(&program, &args)?,
            Launch::Wait => {
                let output = self.runner.run(&program, &args)?;
                if !output.success {
                    return Err(FailoverError::CommandExecution(format!(
                        "{} exited with failure: {}",
                        program,
                        output.stderr.trim()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn powershell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Windows Forms message box through PowerShell.
pub fn message_box_args(title: &str, message: &str) -> (String, Vec<String>) {
    let script = format!(
        "[System.Reflection.Assembly]::LoadWithPartialName('System.Windows.Forms') | Out-Null; \
         [System.Windows.Forms.MessageBox]::Show({}, {}, 'OK', 'Information') | Out-Null",
        powershell_quote(message),
        powershell_quote(title)
    );
    (
        "powershell".to_string(),
        vec!["-NoProfile".to_string(), "-Command".to_string(), script],
    )
}

/// Session message through `msg *`.
pub fn msg_args(title: &str, message: &str) -> (String, Vec<String>) {
    (
        "msg".to_string(),
        vec!["*".to_string(), format!("{}: {}", title, message)],
    )
}

pub fn notify_send_args(title: &str, message: &str) -> (String, Vec<String>) {
    (
        "notify-send".to_string(),
        vec![
            "--app-name=uplink-failover".to_string(),
            title.to_string(),
            message.to_string(),
        ],
    )
}
