use chrono::Datelike;
use std::sync::atomic::{AtomicI32, Ordering};

/// Source of the calendar year used to scope new identifiers.
pub trait Clock: Send + Sync {
    fn current_year(&self) -> i32;
}

/// Local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_year(&self) -> i32 {
        chrono::Local::now().year()
    }
}

/// Settable clock for tests and back-filling.
#[derive(Debug)]
pub struct FixedClock {
    year: AtomicI32,
}

impl FixedClock {
    pub fn new(year: i32) -> Self {
        Self {
            year: AtomicI32::new(year),
        }
    }

    pub fn set_year(&self, year: i32) {
        self.year.store(year, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn current_year(&self) -> i32 {
        self.year.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_rolls_over() {
        let clock = FixedClock::new(2024);
        assert_eq!(clock.current_year(), 2024);
        clock.set_year(2025);
        assert_eq!(clock.current_year(), 2025);
    }

    #[test]
    fn test_system_clock_is_plausible() {
        assert!(SystemClock.current_year() >= 2024);
    }
}
