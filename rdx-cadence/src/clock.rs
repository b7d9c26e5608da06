//! The single source of "now" for every trigger algorithm.
//!
//! Trigger strategies never read the wall clock directly. They ask the
//! [`Clock`] handed to their [`Task`](crate::task::Task), which makes every
//! time-dependent decision reproducible in tests:
//!
//! - [`SystemClock`] reads the local wall clock on every call, so suspends,
//!   NTP adjustments and DST changes show up in calendar filters at once.
//! - [`SimulatedClock`] reports whatever instant the test driver last assigned.

use crate::error::{CadenceError, Result};
use chrono::{Local, NaiveDateTime, TimeDelta};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A point in local calendar time, as reported by a [`Clock`].
///
/// Calendar filters read weekday, day-of-month, hour, minute and second
/// straight from this value. No timezone conversion is ever applied.
pub type Instant = NaiveDateTime;

/// A capability that reports the current instant.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Result<Instant>;
}

/// The production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<Instant> {
        Ok(Local::now().naive_local())
    }
}

/// A clock whose instant is assigned explicitly by a test driver.
///
/// Clones share the same stored instant, so a driver can keep one handle and
/// give another to any number of tasks. Reading the clock before
/// [`set_now`](Self::set_now) is a precondition violation reported as
/// [`CadenceError::ClockNotSet`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    current: Arc<RwLock<Option<Instant>>>,
}

impl SimulatedClock {
    /// Creates a clock with no instant assigned yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock already set to `instant`.
    pub fn starting_at(instant: Instant) -> Self {
        let clock = Self::new();
        clock.set_now(instant);
        clock
    }

    /// Assigns the instant every subsequent `now()` returns.
    pub fn set_now(&self, instant: Instant) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(instant);
    }

    /// Moves the stored instant forward by `delta`.
    pub fn advance(&self, delta: Duration) -> Result<Instant> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let base = current.ok_or(CadenceError::ClockNotSet)?;
        let next = offset(base, delta)?;
        *current = Some(next);
        Ok(next)
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Result<Instant> {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        current.ok_or(CadenceError::ClockNotSet)
    }
}

/// Returns `instant + delta`, failing instead of panicking on overflow.
pub(crate) fn offset(instant: Instant, delta: Duration) -> Result<Instant> {
    let delta = TimeDelta::from_std(delta).map_err(|_| CadenceError::InstantOutOfRange)?;
    instant
        .checked_add_signed(delta)
        .ok_or(CadenceError::InstantOutOfRange)
}

/// Signed distance `to - from` in seconds.
pub(crate) fn seconds_between(from: Instant, to: Instant) -> f64 {
    let delta = to.signed_duration_since(from);
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_seconds() as f64,
    }
}

/// Non-negative std duration from `from` until `to`; zero if `to` has passed.
pub(crate) fn duration_until(from: Instant, to: Instant) -> Duration {
    to.signed_duration_since(from)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
