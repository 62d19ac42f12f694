//! Retry loop
//!
//! The executor has two states, attempting and done. It leaves the attempting
//! state on the first success or once the attempt budget is spent after a
//! failure. Intermediate failures are logged and dropped; only the final one
//! reaches the caller.

use crate::error::ActionFailed;
use crate::policy::RetryPolicy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Blocking pause between attempts
pub trait Sleeper {
    fn sleep(&mut self, delay: Duration);
}

/// Sleeps on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &mut S {
    fn sleep(&mut self, delay: Duration) {
        (**self).sleep(delay);
    }
}

/// Where a retry loop stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Running the given 1-based attempt
    Attempting { attempt: u32 },
    /// An attempt succeeded
    Succeeded,
    /// The attempt budget ran out after a failure
    Exhausted,
}

/// What a single run of the executor did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    pub attempts: u32,
    pub delays: Vec<Duration>,
    pub state: RetryState,
}

impl RetryReport {
    fn new() -> Self {
        Self {
            attempts: 0,
            delays: Vec::new(),
            state: RetryState::Attempting { attempt: 0 },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == RetryState::Succeeded
    }

    pub fn sleeps(&self) -> usize {
        self.delays.len()
    }

    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }

    fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.state = RetryState::Attempting {
            attempt: self.attempts,
        };
    }
}

/// Runs actions under a [`RetryPolicy`].
///
/// Each call to [`Executor::run`] starts from a fresh attempt counter, so one
/// executor can be reused for many independent actions.
pub struct Executor<S = ThreadSleeper, R = StdRng> {
    policy: RetryPolicy,
    sleeper: S,
    rng: R,
    operation: String,
    on_exhausted: Option<String>,
}

impl Executor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: ThreadSleeper,
            rng: StdRng::from_entropy(),
            operation: "action".to_string(),
            on_exhausted: None,
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<S, R> Executor<S, R> {
    /// Replace the blocking sleeper
    pub fn with_sleeper<S2>(self, sleeper: S2) -> Executor<S2, R> {
        Executor {
            policy: self.policy,
            sleeper,
            rng: self.rng,
            operation: self.operation,
            on_exhausted: self.on_exhausted,
        }
    }

    /// Replace the jitter source
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Executor<S, R2> {
        Executor {
            policy: self.policy,
            sleeper: self.sleeper,
            rng,
            operation: self.operation,
            on_exhausted: self.on_exhausted,
        }
    }

    /// Name used in log lines and in [`ActionFailed`]
    pub fn named(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Message logged once when every attempt has failed
    pub fn on_exhausted(mut self, message: impl Into<String>) -> Self {
        self.on_exhausted = Some(message.into());
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl<S, R: Rng> Executor<S, R> {
    fn record_success(&self, report: &mut RetryReport) {
        report.state = RetryState::Succeeded;
        if report.attempts > 1 {
            info!(
                operation = %self.operation,
                attempts = report.attempts,
                "Succeeded after retrying"
            );
        }
    }

    /// Log a failed attempt and pick the delay before the next one.
    ///
    /// Returns `None` once the budget is spent.
    fn record_failure<E: Display>(
        &mut self,
        report: &mut RetryReport,
        failure: &E,
    ) -> Option<Duration> {
        let attempt = report.attempts;
        warn!(
            operation = %self.operation,
            attempt,
            max_attempts = self.policy.max_attempts(),
            error = %failure,
            "Attempt failed"
        );

        if !self.policy.has_attempts_left(attempt) {
            report.state = RetryState::Exhausted;
            match &self.on_exhausted {
                Some(message) => error!(operation = %self.operation, attempts = attempt, "{message}"),
                None => error!(
                    operation = %self.operation,
                    attempts = attempt,
                    "All retry attempts exhausted"
                ),
            }
            return None;
        }

        let delay = self.policy.delay_for(attempt, self.rng.gen::<f64>());
        report.delays.push(delay);
        debug!(
            operation = %self.operation,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "Backing off before next attempt"
        );
        Some(delay)
    }

    fn exhausted<E>(&self, report: &RetryReport, failure: E) -> ActionFailed<E> {
        ActionFailed::new(self.operation.clone(), report.attempts, failure)
    }

    /// Async retry loop; sleeps on the tokio timer between attempts
    pub async fn run_async<T, E, F, Fut>(&mut self, action: F) -> Result<T, ActionFailed<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_async_with_report(action).await.0
    }

    pub async fn run_async_with_report<T, E, F, Fut>(
        &mut self,
        mut action: F,
    ) -> (Result<T, ActionFailed<E>>, RetryReport)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut report = RetryReport::new();
        loop {
            report.begin_attempt();
            match action().await {
                Ok(value) => {
                    self.record_success(&mut report);
                    return (Ok(value), report);
                }
                Err(failure) => match self.record_failure(&mut report, &failure) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => {
                        let failed = self.exhausted(&report, failure);
                        return (Err(failed), report);
                    }
                },
            }
        }
    }
}

impl<S: Sleeper, R: Rng> Executor<S, R> {
    /// Blocking retry loop
    pub fn run<T, E, F>(&mut self, action: F) -> Result<T, ActionFailed<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Display,
    {
        self.run_with_report(action).0
    }

    pub fn run_with_report<T, E, F>(
        &mut self,
        mut action: F,
    ) -> (Result<T, ActionFailed<E>>, RetryReport)
    where
        F: FnMut() -> Result<T, E>,
        E: Display,
    {
        let mut report = RetryReport::new();
        loop {
            report.begin_attempt();
            match action() {
                Ok(value) => {
                    self.record_success(&mut report);
                    return (Ok(value), report);
                }
                Err(failure) => match self.record_failure(&mut report, &failure) {
                    Some(delay) => self.sleeper.sleep(delay),
                    None => {
                        let failed = self.exhausted(&report, failure);
                        return (Err(failed), report);
                    }
                },
            }
        }
    }
}
