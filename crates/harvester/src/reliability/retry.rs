//! Retry policy implementation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::extractor::ErrorKind;

/// Additive jitter range
///
/// A uniformly random duration in `[min, max]` is added to every delay
/// before the cap is applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Jitter {
    #[serde(with = "duration_millis")]
    pub min: Duration,

    #[serde(with = "duration_millis")]
    pub max: Duration,
}

impl Jitter {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let mut rng = rand::thread_rng();
        Duration::from_secs_f64(rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64()))
    }
}

/// Configuration for extraction retries
///
/// Every extraction attempt that fails with a retryable error kind is retried
/// until `max_attempts` is reached, sleeping an exponentially growing delay
/// in between.
///
/// # Example
///
/// ```
/// use crawlmark_harvester::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(3)
///     .with_initial_interval(Duration::from_secs(2))
///     .with_max_interval(Duration::from_secs(10))
///     .without_jitter();
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial)
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Maximum delay between retries
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (2.0 doubles the delay every retry)
    pub backoff_coefficient: f64,

    /// Random duration added to every delay
    #[serde(default)]
    pub jitter: Option<Jitter>,

    /// Error kinds that fail the item without further attempts
    #[serde(default)]
    pub non_retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Create the exponential policy used by the page extractors
    ///
    /// - 3 max attempts
    /// - 2 second initial interval
    /// - 10 second max interval
    /// - 2x backoff coefficient
    /// - 1 to 3 seconds of additive jitter
    /// - configuration and parse failures are not retried
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(10),
            backoff_coefficient: 2.0,
            jitter: Some(Jitter::new(Duration::from_secs(1), Duration::from_secs(3))),
            non_retryable: vec![ErrorKind::InvalidConfiguration, ErrorKind::Parse],
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            jitter: None,
            non_retryable: vec![],
        }
    }

    /// Create a policy with fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: None,
            non_retryable: vec![],
        }
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the initial retry interval
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum retry interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the backoff coefficient
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    /// Set the additive jitter range
    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter = Some(Jitter::new(min, max));
        self
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.jitter = None;
        self
    }

    /// Add a non-retryable error kind
    pub fn with_non_retryable(mut self, kind: ErrorKind) -> Self {
        if !self.non_retryable.contains(&kind) {
            self.non_retryable.push(kind);
        }
        self
    }

    /// Retry every error kind up to the attempt ceiling
    pub fn retry_all(mut self) -> Self {
        self.non_retryable.clear();
        self
    }

    /// Calculate delay for a given attempt number (1-based)
    ///
    /// Returns the duration to wait before that attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let retry_num = attempt - 1; // First retry is after attempt 1
        let base = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(retry_num as i32 - 1);
        let jittered = match self.jitter {
            Some(jitter) => base + jitter.sample().as_secs_f64(),
            None => base,
        };
        let capped = jittered.min(self.max_interval.as_secs_f64()).max(0.0);

        Duration::from_secs_f64(capped)
    }

    /// Check if an error kind should be retried
    pub fn should_retry(&self, kind: ErrorKind) -> bool {
        !self.non_retryable.contains(&kind)
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    /// Upper bound on the total time spent sleeping between attempts
    pub fn max_total_delay(&self) -> Duration {
        (2..=self.max_attempts)
            .map(|attempt| {
                let base = self.initial_interval.as_secs_f64()
                    * self.backoff_coefficient.powi(attempt as i32 - 2);
                let jitter = self.jitter.map(|j| j.max.as_secs_f64()).unwrap_or(0.0);
                Duration::from_secs_f64((base + jitter).min(self.max_interval.as_secs_f64()))
            })
            .sum()
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
