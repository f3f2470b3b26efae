//! Clock abstraction for frame-driven sessions.
//!
//! The live binary uses `SystemClock` (real time).
//! Tests and headless scripts use `TestClock` with manual time advancement.
//! `FrameClock` turns either into per-frame `(now, dt)` pairs.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Trait abstracting time sources for testability.
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time as milliseconds
    /// since UNIX epoch.
    fn unix_millis(&self) -> i64;
}

/// A clock a scripted session can step forward one frame at a time.
pub trait SteppedClock: Clock {
    fn step(&self, dt: Duration);
}

fn system_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        system_unix_millis()
    }
}

/// Stepping real time means waiting out the frame.
impl SteppedClock for SystemClock {
    fn step(&self, dt: Duration) {
        std::thread::sleep(dt);
    }
}

/// Test clock with manually controlled time.
#[derive(Debug)]
pub struct TestClock {
    instant: Mutex<Instant>,
    unix_ms: Mutex<i64>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    /// Create a test clock starting at the current real time.
    pub fn new() -> Self {
        Self {
            instant: Mutex::new(Instant::now()),
            unix_ms: Mutex::new(system_unix_millis()),
        }
    }

    /// Advance time by the given duration.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut inst) = self.instant.lock() {
            *inst += duration;
        }
        if let Ok(mut ms) = self.unix_ms.lock() {
            *ms += duration.as_millis() as i64;
        }
    }

    /// Set the UNIX millisecond timestamp explicitly.
    pub fn set_unix_millis(&self, ms: i64) {
        if let Ok(mut v) = self.unix_ms.lock() {
            *v = ms;
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        match self.instant.lock() {
            Ok(inst) => *inst,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn unix_millis(&self) -> i64 {
        match self.unix_ms.lock() {
            Ok(ms) => *ms,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl SteppedClock for TestClock {
    fn step(&self, dt: Duration) {
        self.advance(dt);
    }
}

// ── Frame clock ─────────────────────────────────────────────

/// Time delta between successive frames of a shared clock.
pub struct FrameClock {
    clock: Arc<dyn Clock>,
    last: Instant,
    frames: u64,
}

impl FrameClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let last = clock.now();
        Self {
            clock,
            last,
            frames: 0,
        }
    }

    /// Start a new frame: returns the frame timestamp and the time since
    /// the previous frame (or since construction for the first one).
    pub fn tick(&mut self) -> (Instant, Duration) {
        let now = self.clock.now();
        let dt = now.saturating_duration_since(self.last);
        self.last = now;
        self.frames += 1;
        (now, dt)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
