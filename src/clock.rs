//! Monotonic Clock Abstraction
//!
//! The engine and the stat counter never read wall time directly; they take
//! a [`Clock`] so tests can freeze or step time and timing-derived stats
//! stay deterministic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic time source. Readings are durations since the clock was
/// created; later readings are never smaller than earlier ones.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Shared clock handle passed to the engine, trials and counters
pub type SharedClock = Arc<dyn Clock>;

// =============================================================================
// Real Clock
// =============================================================================

/// Instant-backed clock; the default for real runs
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Create a shared real clock
pub fn shared_clock() -> SharedClock {
    Arc::new(MonotonicClock::new())
}

// =============================================================================
// Manual Clock
// =============================================================================

/// A frozen clock that only moves when stepped. Used by tests that assert
/// on measured durations and derived stats.
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            micros: AtomicU64::new(0),
        }
    }

    /// Advance the clock by `delta`
    pub fn advance(&self, delta: Duration) {
        self.micros
            .fetch_add(delta.as_micros() as u64, Ordering::Relaxed);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Relaxed))
    }
}

// =============================================================================
// Tests
// =============================================================================
