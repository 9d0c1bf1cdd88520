//! Bounded retry budget with backoff and jitter.
//!
//! Status writes use optimistic concurrency: a write that loses a race with
//! another writer is rejected and must be recomputed from fresh state. The
//! budget here bounds how many times that happens before the error is handed
//! back to the reconciliation scheduler.
//!
//! The defaults mirror the Kubernetes client default retry for conflicts:
//! five attempts, 10ms apart, with 10% jitter.

use std::time::Duration;

use rand::Rng;

/// Configuration for retrying an operation that may lose optimistic-concurrency races.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt
    pub backoff_multiplier: f64,
    /// Relative jitter: each delay is scaled by a random factor in `1 ± jitter`
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts and default timing
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Config with no delay between attempts
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Number of attempts this config allows; never less than one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Start a fresh backoff sequence
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_delay,
            config: self.clone(),
        }
    }
}

/// Delay sequence produced by a [`RetryConfig`]
#[derive(Debug)]
pub struct Backoff {
    next: Duration,
    config: RetryConfig,
}

impl Backoff {
    /// Return the next delay (jittered) and advance the sequence
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next.min(self.config.max_delay);

        let jittered = if self.config.jitter > 0.0 && !base.is_zero() {
            let spread = self.config.jitter.min(1.0);
            let mut rng = rand::thread_rng();
            let factor = rng.gen_range((1.0 - spread)..=(1.0 + spread));
            Duration::from_secs_f64(base.as_secs_f64() * factor)
        } else {
            base
        };

        self.next = Duration::from_secs_f64(
            (self.next.as_secs_f64() * self.config.backoff_multiplier)
                .min(self.config.max_delay.as_secs_f64()),
        );

        jittered
    }

    /// Sleep for the next delay
    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
