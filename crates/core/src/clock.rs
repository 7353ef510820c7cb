// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so time-dependent logic is testable.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Source of time for the run lifecycle.
pub trait Clock: Send + Sync {
    /// Monotonic instant for deadlines and back-off.
    fn now(&self) -> Instant;
    /// Wall-clock milliseconds since the UNIX epoch.
    fn epoch_ms(&self) -> u64;
    /// Wall-clock UTC time for persisted timestamps.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually-advanced clock for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct FakeClock {
    base: Instant,
    offset_ms: std::sync::Arc<parking_lot::Mutex<u64>>,
    epoch_base_ms: u64,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    /// Start the fake clock at the given epoch time.
    pub fn at_epoch_ms(epoch_base_ms: u64) -> Self {
        Self {
            base: Instant::now(),
            offset_ms: std::sync::Arc::new(parking_lot::Mutex::new(0)),
            epoch_base_ms,
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        *self.offset_ms.lock() += ms;
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeClock {
    fn default() -> Self {
        // 2026-01-01T00:00:00Z
        Self::at_epoch_ms(1_767_225_600_000)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + std::time::Duration::from_millis(*self.offset_ms.lock())
    }

    fn epoch_ms(&self) -> u64 {
        self.epoch_base_ms + *self.offset_ms.lock()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.epoch_ms() as i64).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
