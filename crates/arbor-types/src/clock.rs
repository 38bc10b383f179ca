//! Timestamp authority: the source of commit timestamps.
//!
//! Commit ordering relies on every timestamp handed out being strictly
//! greater than all previous ones, across threads. Explicitly supplied
//! timestamps (imports, replays) are folded back in with
//! [`TimestampAuthority::observe`] so later ticks stay ahead of them.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::timestamp::Timestamp;

/// Issues monotonically increasing logical timestamps.
pub trait TimestampAuthority: Send + Sync {
    /// Return a timestamp strictly greater than any previously issued or
    /// observed value.
    fn tick(&self) -> Timestamp;

    /// Fold an externally supplied timestamp into the authority.
    fn observe(&self, timestamp: Timestamp);

    /// The most recently issued or observed timestamp.
    fn last(&self) -> Timestamp;
}

/// Wall-clock backed authority.
///
/// - **Tick**: `next = max(wall_clock_ms, last + 1)`.
/// - **Observe**: `last = max(last, observed)`.
///
/// When many ticks land in the same millisecond the value runs ahead of the
/// wall clock until real time catches up.
pub struct WallClock {
    last: Mutex<i64>,
}

impl WallClock {
    /// Create a clock that starts from the current wall-clock time.
    pub fn new() -> Self {
        Self { last: Mutex::new(0) }
    }

    /// Current wall-clock time in milliseconds since the UNIX epoch.
    fn wall_clock_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampAuthority for WallClock {
    fn tick(&self) -> Timestamp {
        let wall = Self::wall_clock_ms();
        let mut last = self.last.lock().expect("clock mutex poisoned");
        let next = wall.max(last.saturating_add(1));
        *last = next;
        Timestamp::new(next)
    }

    fn observe(&self, timestamp: Timestamp) {
        let mut last = self.last.lock().expect("clock mutex poisoned");
        *last = (*last).max(timestamp.value());
    }

    fn last(&self) -> Timestamp {
        Timestamp::new(*self.last.lock().expect("clock mutex poisoned"))
    }
}

/// Deterministic counter-backed authority, mainly for tests and scenario
/// replays. The first tick returns `start + 1`.
pub struct LogicalClock {
    last: Mutex<i64>,
}

impl LogicalClock {
    /// Create a clock whose last issued value is `start`.
    pub fn starting_at(start: i64) -> Self {
        Self {
            last: Mutex::new(start),
        }
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl TimestampAuthority for LogicalClock {
    fn tick(&self) -> Timestamp {
        let mut last = self.last.lock().expect("clock mutex poisoned");
        *last = last.saturating_add(1);
        Timestamp::new(*last)
    }

    fn observe(&self, timestamp: Timestamp) {
        let mut last = self.last.lock().expect("clock mutex poisoned");
        *last = (*last).max(timestamp.value());
    }

    fn last(&self) -> Timestamp {
        Timestamp::new(*self.last.lock().expect("clock mutex poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wall_clock_monotonic_across_rapid_calls() {
        let clock = WallClock::new();
        let mut prev = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > prev, "clock must be strictly monotonic: {prev:?} >= {next:?}");
            prev = next;
        }
    }

    #[test]
    fn wall_clock_tracks_real_time() {
        let clock = WallClock::new();
        // 2020-01-01 in epoch millis.
        assert!(clock.tick().value() > 1_577_836_800_000);
    }

    #[test]
    fn observe_pushes_future_ticks_past_the_observed_value() {
        let clock = WallClock::new();
        let far_future = Timestamp::new(i64::MAX - 10);
        clock.observe(far_future);
        assert!(clock.tick() > far_future);
    }

    #[test]
    fn observe_never_moves_backwards() {
        let clock = LogicalClock::starting_at(100);
        clock.observe(Timestamp::new(50));
        assert_eq!(clock.last(), Timestamp::new(100));
        assert_eq!(clock.tick(), Timestamp::new(101));
    }

    #[test]
    fn logical_clock_is_deterministic() {
        let clock = LogicalClock::starting_at(100);
        assert_eq!(clock.tick(), Timestamp::new(101));
        assert_eq!(clock.tick(), Timestamp::new(102));
        clock.observe(Timestamp::new(110));
        assert_eq!(clock.tick(), Timestamp::new(111));
    }

    #[test]
    fn concurrent_ticks_are_unique() {
        use std::sync::Arc;
        use std::thread;

        let clock = Arc::new(WallClock::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let clock = Arc::clone(&clock);
            handles.push(thread::spawn(move || {
                (0..100).map(|_| clock.tick()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<Timestamp> = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }

        let len = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), len, "all timestamps must be unique across threads");
    }

    proptest! {
        #[test]
        fn ticks_exceed_every_observation(observed in proptest::collection::vec(0i64..1_000_000, 1..20)) {
            let clock = LogicalClock::default();
            let mut max = 0;
            for value in observed {
                clock.observe(Timestamp::new(value));
                max = max.max(value);
                let tick = clock.tick();
                prop_assert!(tick.value() > max);
                max = tick.value();
            }
        }
    }
}
