//! Administrator privilege check and self-relaunch.
//!
//! Runs once from `main` before the engine starts. The engine itself assumes
//! it has the rights it needs and reports denials as command failures.

use crate::errors::{FailoverError, FailoverResult};
use log::{info, warn};
use std::path::Path;
use std::process::Command;

/// Flag appended to the relaunched command line so it does not relaunch again
pub const NO_ELEVATE_FLAG: &str = "--no-elevate";

/// Result of the privilege check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// This process may modify routes
    Elevated,
    /// An elevated copy ran (or was started); exit with this status
    Relaunched(i32),
}

/// Whether the current process can change routing tables.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Whether the current process can change routing tables.
#[cfg(windows)]
pub fn is_elevated() -> bool {
    // `net session` is refused for non-administrators
    Command::new("net")
        .arg("session")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
pub fn is_elevated() -> bool {
    false
}

/// Command line that restarts `exe` with elevated rights.
pub fn relaunch_command(exe: &Path, args: &[String]) -> (String, Vec<String>) {
    let mut forwarded: Vec<String> = args.to_vec();
    if !forwarded.iter().any(|a| a == NO_ELEVATE_FLAG) {
        forwarded.push(NO_ELEVATE_FLAG.to_string());
    }

    if cfg!(windows) {
        let quote = |s: &str| format!("'{}'", s.replace('\'', "''"));
        let list = forwarded.iter().map(|a| quote(a.as_str())).collect::<Vec<_>>().join(",");
        let script = format!(
            "Start-Process -FilePath {} -ArgumentList {} -Verb RunAs",
            quote(exe.to_string_lossy().as_ref()),
            list
        );
        (
            "powershell".to_string(),
            vec!["-NoProfile".to_string(), "-Command".to_string(), script],
        )
    } else {
        let mut sudo_args = vec!["--".to_string(), exe.to_string_lossy().into_owned()];
        sudo_args.extend(forwarded);
        ("sudo".to_string(), sudo_args)
    }
}

/// Map the outcome of `sudo -v` to an instructional error.
pub fn check_sudo_credentials(authorized: bool) -> FailoverResult<()> {
    if authorized {
        Ok(())
    } else {
        Err(FailoverError::InsufficientPermissions(
            "sudo did not grant administrator rights; run as root or via sudo".to_string(),
        ))
    }
}

/// Make sure the process is elevated, relaunching itself if it is not.
pub fn ensure_elevated(args: &[String]) -> FailoverResult<Elevation> {
    if is_elevated() {
        return Ok(Elevation::Elevated);
    }

    warn!("Administrator privileges are required to change route metrics, relaunching elevated");
    if !cfg!(windows) {
        // authenticate first; the relaunch below only reports the child's status
        let authorized = Command::new("sudo")
            .arg("-v")
            .status()
            .map(|status| status.success())
            .map_err(|e| {
                FailoverError::InsufficientPermissions(format!(
                    "could not run sudo ({}); run as root or via sudo",
                    e
                ))
            })?;
        check_sudo_credentials(authorized)?;
    }

    let exe = std::env::current_exe()?;
    let (program, relaunch_args) = relaunch_command(&exe, args);

    let status = Command::new(&program).args(&relaunch_args).status().map_err(|e| {
        FailoverError::InsufficientPermissions(format!(
            "could not run {} to elevate ({}); run this program as administrator/root",
            program, e
        ))
    })?;

    if !status.success() && cfg!(windows) {
        return Err(FailoverError::InsufficientPermissions(
            "elevation was refused; right-click the program and choose 'Run as administrator'"
                .to_string(),
        ));
    }

    if cfg!(windows) {
        // the elevated copy runs in its own console
        info!("Elevated instance started, exiting");
        Ok(Elevation::Relaunched(0))
    } else {
        Ok(Elevation::Relaunched(status.code().unwrap_or(1)))
    }
}
