//! Tick scheduler.
//!
//! Runs the engine one tick at a time with a fixed pause between the end of
//! one tick and the start of the next. Interrupts are honoured only between
//! ticks, and a panic inside a tick is logged and reported without stopping
//! the loop.

use crate::engine::{FailoverEngine, TickReport};
use crate::notifier::Notifier;
use crate::signal::ShutdownCheck;
use crate::sleeper::Sleeper;
use log::{debug, error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Longest single sleep while waiting, bounding interrupt latency
const WAIT_SLICE: Duration = Duration::from_secs(1);

const ERROR_TITLE: &str = "Network monitor error";

/// Totals for one `run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub switches: u64,
    pub faults: u64,
}

pub struct Monitor {
    engine: FailoverEngine,
    notifier: Box<dyn Notifier>,
    shutdown: Box<dyn ShutdownCheck>,
    sleeper: Box<dyn Sleeper>,
    interval: Duration,
}

impl Monitor {
    pub fn new(
        engine: FailoverEngine,
        notifier: Box<dyn Notifier>,
        shutdown: Box<dyn ShutdownCheck>,
        sleeper: Box<dyn Sleeper>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            notifier,
            shutdown,
            sleeper,
            interval,
        }
    }

    pub fn engine(&self) -> &FailoverEngine {
        &self.engine
    }

    /// Tick until shutdown is requested.
    pub fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary::default();
        info!("Monitoring started, checking every {:?}", self.interval);

        while !self.shutdown.should_stop() {
            summary.ticks += 1;
            match self.run_once() {
                Some(report) if report.event.is_some() => summary.switches += 1,
                Some(_) => {}
                None => summary.faults += 1,
            }

            if !self.wait_for_next_tick() {
                break;
            }
        }

        info!(
            "Interrupted by user, monitoring stopped after {} checks ({} switches)",
            summary.ticks, summary.switches
        );
        summary
    }

    /// Run a single tick, notifying on switches.
    ///
    /// Returns `None` if the tick panicked.
    pub fn run_once(&mut self) -> Option<TickReport> {
        let engine = &mut self.engine;
        match panic::catch_unwind(AssertUnwindSafe(|| engine.tick())) {
            Ok(report) => {
                if let Some(event) = report.event {
                    let message = event.message(
                        &self.engine.primary().display_name,
                        &self.engine.secondary().display_name,
                    );
                    self.notifier.notify(event.title(), &message);
                }
                Some(report)
            }
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                error!("Unexpected error during check: {}", reason);
                self.notifier
                    .notify(ERROR_TITLE, &format!("The monitor hit an error: {}", reason));
                None
            }
        }
    }

    /// Sleep out the interval in slices; false if shutdown was requested.
    fn wait_for_next_tick(&self) -> bool {
        info!("Waiting {:?} before the next check", self.interval);
        let mut remaining = self.interval;
        while !remaining.is_zero() {
            if self.shutdown.should_stop() {
                return false;
            }
            let slice = remaining.min(WAIT_SLICE);
            self.sleeper.sleep(slice);
            remaining -= slice;
        }
        debug!("Wait finished");
        !self.shutdown.should_stop()
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_reason_variants() {
        let payload: Box<dyn Any + Send> = Box::new("static reason");
        assert_eq!(panic_reason(payload.as_ref()), "static reason");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned reason"));
        assert_eq!(panic_reason(payload.as_ref()), "owned reason");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_reason(payload.as_ref()), "unknown panic");
    }
}
