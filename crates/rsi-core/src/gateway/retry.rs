//! Retry policy and request pacing for model calls

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Bounded retry schedule for a single gateway call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    /// Wait after a failed attempt before the next one
    pub retry_delay: Duration,
    /// Extra wait added to every backoff to stay under the provider rate limit
    pub rate_limit_delay: Duration,
    /// Minimum spacing between the starts of two consecutive calls
    pub min_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Provider rate limit: one request per second, 60 per minute.
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(10),
            rate_limit_delay: Duration::from_secs(2),
            min_interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy without any waiting, for scripted models
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            retry_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            min_interval: Duration::ZERO,
        }
    }

    /// Total pause between a failed attempt and its retry
    pub fn backoff(&self) -> Duration {
        self.retry_delay + self.rate_limit_delay
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }
}

/// Sleeps between retries
#[async_trait::async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Pause backed by the tokio timer
pub struct TokioPause;

#[async_trait::async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Shared gate enforcing a minimum interval between call starts.
///
/// Callers queue on the lock, so the spacing holds under concurrent fan-out too.
pub struct RateGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until the next call is allowed to start
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let next = previous + self.min_interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff(), Duration::from_secs(12));
        assert_eq!(policy.min_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_max_attempts_override_keeps_delays() {
        let policy = RetryPolicy::default().with_max_attempts(2);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.backoff(), Duration::from_secs(12));
    }

    #[test]
    fn test_immediate_policy_has_no_backoff() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.backoff().is_zero());
    }

    #[tokio::test]
    async fn test_rate_gate_spaces_calls() {
        let gate = RateGate::new(Duration::from_millis(50));
        let start = Instant::now();
        gate.wait().await;
        gate.wait().await;
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_rate_gate_disabled() {
        let gate = RateGate::new(Duration::ZERO);
        let start = Instant::now();
        tokio_test::block_on(async {
            for _ in 0..10 {
                gate.wait().await;
            }
        });
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
