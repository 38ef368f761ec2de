//! Time sources for the session
//!
//! The session never calls `Instant::now()` directly. Hosts use
//! [`SystemClock`]; tests and event-log replay use [`ManualClock`], whose
//! time only moves when told to.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic time used for interval arithmetic
    fn now(&self) -> Instant;

    /// Wall-clock time used for titles and file names
    fn wall_now(&self) -> DateTime<Local>;
}

/// Real time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only advances when [`ManualClock::advance`] or
/// [`ManualClock::set`] is called
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    wall_base: DateTime<Local>,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock whose wall time starts at the current local time
    pub fn new() -> Self {
        Self::starting_at(Local::now())
    }

    /// Create a clock whose wall time starts at `wall_base`
    pub fn starting_at(wall_base: DateTime<Local>) -> Self {
        Self {
            base: Instant::now(),
            wall_base,
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Move time forward by `by`
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Jump to an absolute offset from the clock's creation
    ///
    /// Moving backwards is allowed; it is how replayed logs with clock
    /// skew are reproduced.
    pub fn set(&self, offset: Duration) {
        let nanos = u64::try_from(offset.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.store(nanos, Ordering::SeqCst);
    }

    /// Current offset from the clock's creation
    pub fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }

    fn wall_now(&self) -> DateTime<Local> {
        let delta = chrono::Duration::from_std(self.offset()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_base
            .checked_add_signed(delta)
            .unwrap_or(self.wall_base)
    }
}
