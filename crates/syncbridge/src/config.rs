//! Commit queue configuration.

use std::time::Duration;

use rand::Rng;

/// A flush stops after this many failed deliveries.
pub const MAX_FLUSH_FAILURES: usize = 10;

/// Backoff schedule for failed commit deliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Growth factor per further failure.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Add up to a quarter of the delay at random.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3600),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately on the next flush.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the next attempt, given the failures so far (1-indexed).
    ///
    /// `base_delay * multiplier^(failures - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = if secs.is_finite() {
            secs.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };
        let delay = Duration::from_secs_f64(capped.max(0.0));

        if self.jitter && !delay.is_zero() {
            let spread = (delay.as_millis() / 4) as u64;
            delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
        } else {
            delay
        }
    }

    /// Absolute retry time after `failures` failures, from `now_ms`.
    pub fn next_retry_at(&self, now_ms: i64, failures: u32) -> i64 {
        let delay = i64::try_from(self.delay_for(failures).as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_add(delay)
    }
}

/// Commit queue settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub retry: RetryPolicy,
    /// Failures after which a flush stops.
    pub max_flush_failures: usize,
    /// Whether the host calls [`flush`](crate::CommitQueue::flush) at the end
    /// of each request. Deferred mode needs it.
    pub flush_hook: bool,
    /// Expiry of the queue blob on cache backends.
    pub queue_ttl: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_flush_failures: MAX_FLUSH_FAILURES,
            flush_hook: true,
            queue_ttl: None,
        }
    }
}

impl QueueConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_flush_hook(mut self, available: bool) -> Self {
        self.flush_hook = available;
        self
    }

    pub fn with_queue_ttl(mut self, ttl: Duration) -> Self {
        self.queue_ttl = Some(ttl);
        self
    }
}
