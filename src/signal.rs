//! Interrupt handling for a clean shutdown between ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait ShutdownCheck {
    /// Returns true once shutdown has been requested.
    fn should_stop(&self) -> bool;
}

/// Flag set by Ctrl+C (SIGINT, SIGTERM with `ctrlc`'s defaults).
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Create a flag and register the interrupt handler.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let shutdown = Self::manual();
        let flag = shutdown.flag.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })?;
        Ok(shutdown)
    }

    /// Create a flag without a handler; only `trigger` sets it.
    pub fn manual() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl ShutdownCheck for ShutdownFlag {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
