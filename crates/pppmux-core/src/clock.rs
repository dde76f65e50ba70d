use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic clock for activity accounting.
///
/// Captured once at multiplexer construction; activity stamps are
/// stored as millisecond offsets in atomics so the data path never
/// takes a lock to record them.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock was created.
    pub fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A lock-free activity timestamp (milliseconds on a [`Clock`]).
#[derive(Debug, Default)]
pub struct ActivityStamp(AtomicU64);

impl ActivityStamp {
    pub fn new(millis: u64) -> Self {
        Self(AtomicU64::new(millis))
    }

    pub fn touch(&self, clock: &Clock) {
        self.0.store(clock.now_millis(), Ordering::Relaxed);
    }

    /// Time elapsed since the stamp was last touched.
    pub fn idle(&self, clock: &Clock) -> Duration {
        let last = self.0.load(Ordering::Relaxed);
        Duration::from_millis(clock.now_millis().saturating_sub(last))
    }
}
