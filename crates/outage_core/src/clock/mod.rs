use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::error::AppError;

pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Source of "now" for everything that compares against outage windows.
pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        unix_now()
    }
}

/// Manually driven clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Blocking pause used by the wait loop. Returning an error aborts the loop.
pub trait Sleeper {
    fn sleep(&mut self, seconds: i64) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, seconds: i64) -> Result<(), AppError> {
        if seconds > 0 {
            std::thread::sleep(Duration::from_secs(seconds.unsigned_abs()));
        }
        Ok(())
    }
}

/// Advances a [`FixedClock`] instead of blocking and records every request.
#[derive(Debug, Clone)]
pub struct ClockSleeper {
    clock: FixedClock,
    pub calls: Vec<i64>,
}

impl ClockSleeper {
    pub fn new(clock: FixedClock) -> Self {
        Self {
            clock,
            calls: Vec::new(),
        }
    }
}

impl Sleeper for ClockSleeper {
    fn sleep(&mut self, seconds: i64) -> Result<(), AppError> {
        self.calls.push(seconds);
        self.clock.advance(seconds);
        Ok(())
    }
}
