use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};

use crate::record::ContextKey;

/// Contexts silent for longer than this lose their reference point.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(600);

/// Per-context gap between consecutive records, measured on the monotonic clock.
///
/// A context that stays idle for longer than the idle ttl (its thread most
/// likely exited) is evicted the next time an unseen context shows up, and
/// starts over at 0 if it ever logs again.
#[derive(Debug)]
pub struct TimingTracker {
    last_seen: DashMap<ContextKey, Instant>,
    idle_ttl: Duration,
}

impl Default for TimingTracker {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            last_seen: DashMap::new(),
            idle_ttl,
        }
    }

    /// Microseconds since the previous call for `key`; 0 on the first call.
    pub fn elapsed_since_last(&self, key: ContextKey) -> i64 {
        self.elapsed_since_last_at(key, Instant::now())
    }

    /// Same as [`elapsed_since_last`](Self::elapsed_since_last) with an explicit clock reading.
    pub fn elapsed_since_last_at(&self, key: ContextKey, now: Instant) -> i64 {
        // must not hold an entry guard while sweeping
        if !self.last_seen.contains_key(&key) {
            self.evict_idle(now);
        }
        match self.last_seen.entry(key) {
            Entry::Occupied(mut entry) => {
                let previous = std::mem::replace(entry.get_mut(), now);
                let elapsed = now.saturating_duration_since(previous).as_micros();
                i64::try_from(elapsed).unwrap_or(i64::MAX)
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                0
            }
        }
    }

    /// Drop the reference points of contexts idle for longer than the ttl.
    pub fn evict_idle(&self, now: Instant) {
        self.last_seen
            .retain(|_, last| now.saturating_duration_since(*last) <= self.idle_ttl);
    }

    /// Drop the reference point of a context that went away.
    pub fn forget(&self, key: ContextKey) {
        self.last_seen.remove(&key);
    }

    pub fn clear(&self) {
        self.last_seen.clear();
    }

    /// Number of contexts with a reference point.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_call_is_zero() {
        let timing = TimingTracker::new();
        assert_eq!(timing.elapsed_since_last(ContextKey::from_raw(1)), 0);
    }

    #[test]
    fn test_read_and_reset() {
        let timing = TimingTracker::new();
        let key = ContextKey::from_raw(1);
        let t0 = Instant::now();

        assert_eq!(timing.elapsed_since_last_at(key, t0), 0);
        assert_eq!(timing.elapsed_since_last_at(key, t0 + Duration::from_millis(5)), 5_000);
        assert_eq!(timing.elapsed_since_last_at(key, t0 + Duration::from_millis(7)), 2_000);
    }

    #[test]
    fn test_contexts_are_independent() {
        let timing = TimingTracker::new();
        let t0 = Instant::now();
        let a = ContextKey::from_raw(1);
        let b = ContextKey::from_raw(2);

        timing.elapsed_since_last_at(a, t0);
        assert_eq!(timing.elapsed_since_last_at(b, t0 + Duration::from_millis(3)), 0);
        assert_eq!(timing.elapsed_since_last_at(a, t0 + Duration::from_millis(4)), 4_000);
    }

    #[test]
    fn test_clock_going_backwards_is_zero() {
        let timing = TimingTracker::new();
        let key = ContextKey::from_raw(1);
        let t0 = Instant::now() + Duration::from_secs(1);
        timing.elapsed_since_last_at(key, t0);
        assert_eq!(timing.elapsed_since_last_at(key, t0 - Duration::from_millis(10)), 0);

        timing.forget(key);
        assert_eq!(timing.elapsed_since_last_at(key, t0), 0);
    }

    #[test]
    fn test_idle_contexts_are_evicted() {
        let timing = TimingTracker::with_idle_ttl(Duration::from_secs(60));
        let t0 = Instant::now();
        let idle = ContextKey::from_raw(1);
        let busy = ContextKey::from_raw(2);

        timing.elapsed_since_last_at(idle, t0);
        timing.elapsed_since_last_at(busy, t0);
        assert_eq!(timing.elapsed_since_last_at(busy, t0 + Duration::from_secs(50)), 50_000_000);

        // a new context sweeps the map; only `busy` was seen within the ttl
        timing.elapsed_since_last_at(ContextKey::from_raw(3), t0 + Duration::from_secs(90));
        assert_eq!(timing.len(), 2);
        assert_eq!(timing.elapsed_since_last_at(idle, t0 + Duration::from_secs(91)), 0);
        assert_eq!(
            timing.elapsed_since_last_at(busy, t0 + Duration::from_secs(92)),
            42_000_000
        );
    }

    #[test]
    fn test_concurrent_contexts() {
        let timing = Arc::new(TimingTracker::new());
        let t0 = Instant::now();

        let handles: Vec<_> = (1..=8u64)
            .map(|raw| {
                let timing = Arc::clone(&timing);
                thread::spawn(move || {
                    let key = ContextKey::from_raw(raw);
                    let step = Duration::from_millis(raw);
                    assert_eq!(timing.elapsed_since_last_at(key, t0), 0);
                    for i in 1..=100u32 {
                        let elapsed = timing.elapsed_since_last_at(key, t0 + step * i);
                        assert_eq!(elapsed, raw as i64 * 1_000);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(timing.len(), 8);
    }
}
