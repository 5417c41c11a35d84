//! Per-key sliding window rate limiter
//!
//! Two-bucket approximation: the count for the current window plus the
//! previous window's count weighted by how much of it still overlaps the
//! sliding window. Windows are aligned to multiples of the window length.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hub_core::config::RateLimitConfig;
use hub_core::effects::{PhysicalTimeEffects, RateLimiterEffects};
use hub_core::{HubError, HubResult};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default)]
struct WindowCounter {
    /// Index of the current window (`now / window`)
    window: u64,
    current: u64,
    previous: u64,
}

impl WindowCounter {
    fn roll(&mut self, window: u64) {
        if window == self.window {
            return;
        }
        self.previous = if window == self.window + 1 {
            self.current
        } else {
            0
        };
        self.current = 0;
        self.window = window;
    }

    fn estimate(&self, elapsed_ms: u64, window_ms: u64) -> u64 {
        let remaining = window_ms.saturating_sub(elapsed_ms) as u128;
        let weighted = (self.previous as u128 * remaining) / window_ms as u128;
        self.current + weighted as u64
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterStatistics {
    pub consumed: u64,
    pub rejected: u64,
}

pub struct SlidingWindowRateLimiter {
    window_ms: u64,
    time: Arc<dyn PhysicalTimeEffects>,
    counters: Mutex<HashMap<String, WindowCounter>>,
    stats: Mutex<RateLimiterStatistics>,
}

impl SlidingWindowRateLimiter {
    pub fn new(window: Duration, time: Arc<dyn PhysicalTimeEffects>) -> Self {
        Self {
            window_ms: (window.as_millis() as u64).max(1),
            time,
            counters: Mutex::new(HashMap::new()),
            stats: Mutex::new(RateLimiterStatistics::default()),
        }
    }

    /// Limiter over the configured `rate_limit.window_secs`
    pub fn from_config(config: &RateLimitConfig, time: Arc<dyn PhysicalTimeEffects>) -> Self {
        Self::new(config.window(), time)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Consume one admission for `key` if the sliding count is below `ceiling`
    pub fn try_consume(&self, key: &str, ceiling: u64) -> HubResult<()> {
        let now = self.time.now_ms();
        let window = now / self.window_ms;
        let elapsed = now % self.window_ms;

        let mut counters = self.counters.lock();
        let counter = counters.entry(key.to_string()).or_default();
        counter.roll(window);

        if counter.estimate(elapsed, self.window_ms) >= ceiling {
            self.stats.lock().rejected += 1;
            tracing::debug!(key, ceiling, "rate limit reached");
            return Err(HubError::rate_limited(format!(
                "too many messages for {key}: limit is {ceiling} per window"
            )));
        }

        counter.current += 1;
        self.stats.lock().consumed += 1;
        Ok(())
    }

    /// Admissions counted against `key` in the current sliding window
    pub fn current_usage(&self, key: &str) -> u64 {
        let now = self.time.now_ms();
        let window = now / self.window_ms;
        let elapsed = now % self.window_ms;

        let counters = self.counters.lock();
        match counters.get(key) {
            Some(counter) => {
                let mut counter = *counter;
                counter.roll(window);
                counter.estimate(elapsed, self.window_ms)
            }
            None => 0,
        }
    }

    pub fn statistics(&self) -> RateLimiterStatistics {
        *self.stats.lock()
    }

    pub fn tracked_keys(&self) -> usize {
        self.counters.lock().len()
    }

    /// Drop counters that no longer contribute to any sliding window
    pub fn evict_idle(&self) -> usize {
        let window = self.time.now_ms() / self.window_ms;
        let mut counters = self.counters.lock();
        let before = counters.len();
        counters.retain(|_, counter| counter.window + 1 >= window);
        before - counters.len()
    }

    pub fn reset(&self) {
        self.counters.lock().clear();
        *self.stats.lock() = RateLimiterStatistics::default();
    }
}

#[async_trait]
impl RateLimiterEffects for SlidingWindowRateLimiter {
    async fn consume(&self, key: &str, ceiling: u64) -> HubResult<()> {
        self.try_consume(key, ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::HubErrorCode;
    use hub_testkit::MockTime;

    const HOUR: u64 = 60 * 60 * 1000;

    fn limiter(time: &Arc<MockTime>) -> SlidingWindowRateLimiter {
        SlidingWindowRateLimiter::new(Duration::from_millis(HOUR), time.clone())
    }

    #[test]
    fn rejects_at_ceiling() {
        let time = Arc::new(MockTime::new(10 * HOUR));
        let limiter = limiter(&time);
        for _ in 0..3 {
            limiter.try_consume("7", 3).unwrap();
        }
        let err = limiter.try_consume("7", 3).unwrap_err();
        assert_eq!(err.code, HubErrorCode::RateLimited);
        assert_eq!(
            limiter.statistics(),
            RateLimiterStatistics {
                consumed: 3,
                rejected: 1
            }
        );
    }

    #[test]
    fn keys_are_independent() {
        let time = Arc::new(MockTime::new(10 * HOUR));
        let limiter = limiter(&time);
        limiter.try_consume("1", 1).unwrap();
        assert!(limiter.try_consume("1", 1).is_err());
        assert!(limiter.try_consume("2", 1).is_ok());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn zero_ceiling_always_rejects() {
        let time = Arc::new(MockTime::new(0));
        assert!(limiter(&time).try_consume("1", 0).is_err());
    }

    #[test]
    fn previous_window_decays() {
        let time = Arc::new(MockTime::new(10 * HOUR));
        let limiter = limiter(&time);
        for _ in 0..4 {
            limiter.try_consume("k", 4).unwrap();
        }

        // Half way through the next window half of the previous count remains
        time.advance(HOUR + HOUR / 2);
        assert_eq!(limiter.current_usage("k"), 2);
        limiter.try_consume("k", 4).unwrap();
        limiter.try_consume("k", 4).unwrap();
        assert!(limiter.try_consume("k", 4).is_err());

        // Two windows later nothing is left
        time.advance(2 * HOUR);
        assert_eq!(limiter.current_usage("k"), 0);
    }

    #[test]
    fn window_comes_from_config() {
        let time = Arc::new(MockTime::new(0));
        let config = RateLimitConfig {
            enabled: true,
            window_secs: 90,
        };
        let limiter = SlidingWindowRateLimiter::from_config(&config, time.clone());
        assert_eq!(limiter.window(), Duration::from_secs(90));

        limiter.try_consume("k", 1).unwrap();
        time.advance(90_000);
        assert_eq!(limiter.current_usage("k"), 1);
        time.advance(90_000);
        assert_eq!(limiter.evict_idle(), 1);
    }

    #[test]
    fn idle_counters_are_evicted() {
        let time = Arc::new(MockTime::new(10 * HOUR));
        let limiter = limiter(&time);
        limiter.try_consume("k", 5).unwrap();
        time.advance(3 * HOUR);
        assert_eq!(limiter.evict_idle(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
