//! Sleep abstraction so the monitor loop and the enable settle delay can be
//! tested without real waits.

use std::cell::RefCell;
use std::time::Duration;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Returns immediately and remembers every requested duration.
#[derive(Debug, Default)]
pub struct MockSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> Duration {
        self.slept.borrow().iter().sum()
    }

    pub fn calls(&self) -> usize {
        self.slept.borrow().len()
    }
}

impl Sleeper for MockSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for std::rc::Rc<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_mock_sleeper_returns_immediately() {
        let sleeper = MockSleeper::new();
        let start = Instant::now();
        sleeper.sleep(Duration::from_secs(100));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(sleeper.calls(), 1);
        assert_eq!(sleeper.total(), Duration::from_secs(100));
    }

    #[test]
    fn test_real_sleeper_short_sleep() {
        let start = Instant::now();
        RealSleeper.sleep(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_shared_sleeper_records_through_rc() {
        let sleeper = std::rc::Rc::new(MockSleeper::new());
        let boxed: Box<dyn Sleeper> = Box::new(sleeper.clone());
        boxed.sleep(Duration::from_secs(5));
        assert_eq!(sleeper.total(), Duration::from_secs(5));
    }
}
