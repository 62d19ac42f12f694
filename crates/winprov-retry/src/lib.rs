//! Resilient action execution for winprov
//!
//! Runs a caller-supplied fallible action up to a bounded number of times,
//! sleeping a randomized, exponentially growing delay between failed attempts.
//! The first success is returned as-is; when every attempt fails the error
//! from the last attempt is surfaced unchanged inside [`ActionFailed`].
//!
//! # Components
//!
//! - [`policy`]: [`RetryPolicy`], the attempt budget and backoff scale
//! - [`backoff`]: the pure delay formula `base * U(0,1) * (2^attempt - 1)`
//! - [`executor`]: the blocking [`Executor::run`] loop and its async twin
//! - [`error`]: [`ActionFailed`] and [`PolicyError`]
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use winprov_retry::{retry, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(1)).unwrap();
//! let mut calls = 0;
//! let value = retry(&policy, || {
//!     calls += 1;
//!     if calls < 2 { Err("not yet") } else { Ok(calls) }
//! })
//! .unwrap();
//! assert_eq!(value, 2);
//! ```

pub mod backoff;
pub mod error;
pub mod executor;
pub mod policy;

pub use backoff::{backoff_ceiling, backoff_delay};
pub use error::{ActionFailed, PolicyError};
pub use executor::{Executor, RetryReport, RetryState, Sleeper, ThreadSleeper};
pub use policy::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

use std::future::Future;

/// Run `action` under `policy`, blocking the current thread between attempts.
pub fn retry<T, E, F>(policy: &RetryPolicy, action: F) -> Result<T, ActionFailed<E>>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    Executor::new(policy.clone()).run(action)
}

/// Run an async `action` under `policy`, sleeping on the tokio timer between attempts.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    action: F,
) -> Result<T, ActionFailed<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    Executor::new(policy.clone()).run_async(action).await
}
