//! Clock sources for the timeline
//!
//! All scheduling is expressed in seconds on one [`Clock`]. Tests and the CLI
//! use [`VirtualClock`] and move time by hand; live playback uses
//! [`SystemClock`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

pub trait Clock {
    /// Seconds since the clock's origin
    fn now(&self) -> f64;
}

/// Monotonic wall clock starting at zero when created
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    time: Rc<Cell<f64>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move forward by `seconds`. Negative or non-finite steps are ignored.
    pub fn advance(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.time.set(self.time.get() + seconds);
        }
    }

    /// Jump to `time`. Never moves backwards.
    pub fn set(&self, time: f64) {
        if time > self.time.get() {
            self.time.set(time);
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> f64 {
        self.time.get()
    }
}
