//! Time sources
//!
//! The outage sensor decides freshness against a [`Clock`] rather than the
//! wall clock directly, so tests can move time forward without sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A controllable time source for testing
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<RwLock<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create a new mock clock starting at a specific time
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(RwLock::new(time)),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        if let Ok(mut current) = self.current.write() {
            *current = time;
        }
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut current) = self.current.write() {
            *current += duration;
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        match self.current.read() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
