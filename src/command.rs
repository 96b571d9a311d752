//! External command execution.
//!
//! Every OS query and configuration change goes through [`CommandRunner`],
//! so the text parsing in the backends can be tested against canned output.

use log::debug;
use std::io;
use std::process::{Command, Stdio};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a command that exited with status 0.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Output of a command that exited with a non-zero status.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external programs.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run `program` to completion and capture its output.
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;

    /// Start `program` without waiting for it to exit.
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<()>;
}

/// Runner backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        debug!("Executing command: {} {}", program, args.join(" "));

        let output = Command::new(program).args(args).output()?;
        let result = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!("Command exited with status: {}", output.status);
        if !result.stdout.is_empty() {
            debug!("Command stdout: {}", result.stdout.trim_end());
        }
        if !result.stderr.is_empty() {
            debug!("Command stderr: {}", result.stderr.trim_end());
        }
        Ok(result)
    }

    fn spawn(&self, program: &str, args: &[String]) -> io::Result<()> {
        debug!("Spawning command: {} {}", program, args.join(" "));
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

/// Build an owned argument vector from string slices.
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_constructors() {
        let ok = CommandOutput::ok("hello");
        assert!(ok.success);
        assert_eq!(ok.stdout, "hello");

        let failed = CommandOutput::failed("boom");
        assert!(!failed.success);
        assert_eq!(failed.stderr, "boom");
    }

    #[test]
    fn test_args_helper() {
        assert_eq!(args(&["ip", "link"]), vec!["ip".to_string(), "link".to_string()]);
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let runner = SystemCommandRunner;
        assert!(runner.run("definitely-not-a-real-binary-1234", &[]).is_err());
    }
}
