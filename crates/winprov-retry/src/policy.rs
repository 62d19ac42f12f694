//! Retry policy: attempt budget and backoff scale

use crate::backoff::{backoff_ceiling, backoff_delay};
use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempts made when no explicit budget is given
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Backoff scale used when no explicit base delay is given
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Bounded retry policy.
///
/// `max_attempts` counts every execution of the action, including the first,
/// and is never zero. A policy with one attempt runs the action once and never
/// sleeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Create a policy, rejecting an empty attempt budget
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }

        Ok(Self {
            max_attempts,
            base_delay,
            max_delay: None,
        })
    }

    /// Policy that runs the action exactly once
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: None,
        }
    }

    /// Cap any single backoff delay at `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Whether another attempt is allowed after `attempt` attempts have been made
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to sleep after the 1-based `attempt` failed, given a uniform sample in `[0, 1]`
    pub fn delay_for(&self, attempt: u32, sample: f64) -> Duration {
        let delay = backoff_delay(self.base_delay, attempt, sample);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Largest delay [`RetryPolicy::delay_for`] can return for `attempt`
    pub fn delay_ceiling(&self, attempt: u32) -> Duration {
        let ceiling = backoff_ceiling(self.base_delay, attempt);
        match self.max_delay {
            Some(cap) => ceiling.min(cap),
            None => ceiling,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
        }
    }
}

/// On-disk shape of a policy.
///
/// Delays are whole milliseconds; a delay with a sub-millisecond part is
/// also written in microseconds, which take precedence when read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RawRetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_delay_us: Option<u64>,
    max_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_delay_us: Option<u64>,
}

impl Default for RawRetryPolicy {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

fn raw_delay(ms: u64, us: Option<u64>) -> Duration {
    us.map(Duration::from_micros)
        .unwrap_or_else(|| Duration::from_millis(ms))
}

/// Whole milliseconds, plus microseconds when the millisecond value is lossy
fn split_delay(delay: Duration) -> (u64, Option<u64>) {
    let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    let us = if delay.subsec_micros() % 1_000 != 0 {
        u64::try_from(delay.as_micros()).ok()
    } else {
        None
    };
    (ms, us)
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawRetryPolicy) -> Result<Self, Self::Error> {
        let base_delay = raw_delay(raw.base_delay_ms, raw.base_delay_us);
        let policy = RetryPolicy::new(raw.max_attempts, base_delay)?;
        let max_delay = match (raw.max_delay_ms, raw.max_delay_us) {
            (None, None) => None,
            (ms, us) => Some(raw_delay(ms.unwrap_or(0), us)),
        };
        Ok(match max_delay {
            Some(cap) => policy.with_max_delay(cap),
            None => policy,
        })
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        let (base_delay_ms, base_delay_us) = split_delay(policy.base_delay);
        let (max_delay_ms, max_delay_us) = match policy.max_delay.map(split_delay) {
            Some((ms, us)) => (Some(ms), us),
            None => (None, None),
        };
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms,
            base_delay_us,
            max_delay_ms,
            max_delay_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.base_delay(), Duration::from_millis(100));
        assert!(policy.max_delay().is_none());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = RetryPolicy::new(0, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, PolicyError::ZeroAttempts));
    }

    #[test]
    fn test_single_attempt_has_no_retries() {
        let policy = RetryPolicy::single_attempt();
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.has_attempts_left(1));
    }

    #[test]
    fn test_max_delay_caps_delay() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .unwrap()
            .with_max_delay(Duration::from_millis(250));

        assert_eq!(policy.delay_for(5, 1.0), Duration::from_millis(250));
        assert_eq!(policy.delay_ceiling(5), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1, 1.0), Duration::from_millis(100));
    }

    #[test]
    fn test_late_attempt_delay_stays_within_bound() {
        let policy = RetryPolicy::new(40, Duration::from_millis(1)).unwrap();

        let ceiling = policy.delay_ceiling(33);
        assert_eq!(ceiling, Duration::from_millis(8_589_934_591));
        assert!(policy.delay_for(33, 0.5) <= ceiling);
        assert!(policy.delay_for(33, 0.5) >= Duration::from_secs(4_294_967));
    }

    #[test]
    fn test_sub_millisecond_delays_survive_yaml() {
        let policy = RetryPolicy::new(4, Duration::from_micros(500))
            .unwrap()
            .with_max_delay(Duration::from_micros(2_250));

        let yaml = serde_yaml::to_string(&policy).unwrap();
        assert!(yaml.contains("base_delay_us: 500"));
        let restored: RetryPolicy = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(restored, policy);
    }

    #[test]
    fn test_whole_millisecond_delays_stay_in_milliseconds() {
        let policy = RetryPolicy::new(4, Duration::from_millis(250)).unwrap();

        let yaml = serde_yaml::to_string(&policy).unwrap();

        assert!(!yaml.contains("_us"));
        assert_eq!(serde_yaml::from_str::<RetryPolicy>(&yaml).unwrap(), policy);
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let policy: RetryPolicy =
            serde_yaml::from_str("max_attempts: 3\nbase_delay_ms: 250\n").unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay(), Duration::from_millis(250));

        let defaulted: RetryPolicy = serde_yaml::from_str("{}").unwrap();
        assert_eq!(defaulted, RetryPolicy::default());
    }

    #[test]
    fn test_deserialize_rejects_zero_attempts() {
        let result: Result<RetryPolicy, _> = serde_yaml::from_str("max_attempts: 0\n");
        assert!(result.is_err());
    }
}
