// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff.
//!
//! Two schedules are provided:
//!
//! - [`API_RETRY`] for transient Kubernetes API errors (429, 5xx) while
//!   reading or writing the allocation table
//! - [`CONFLICT_RETRY`] for compare-and-swap conflicts on the allocation table,
//!   which resolve quickly once the competing writer is done

use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Shape of an exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// First delay
    pub initial: Duration,
    /// Upper bound of a single delay
    pub max_interval: Duration,
    /// Give up once this much time has passed, `None` to let the caller bound attempts
    pub max_elapsed: Option<Duration>,
    /// Growth factor between delays
    pub multiplier: f64,
    /// Relative jitter, 0.1 is ±10%
    pub jitter: f64,
}

/// Kubernetes API retries: 100ms doubling to 10s, for at most 2 minutes, ±10%.
pub const API_RETRY: BackoffPolicy = BackoffPolicy {
    initial: Duration::from_millis(100),
    max_interval: Duration::from_secs(10),
    max_elapsed: Some(Duration::from_secs(120)),
    multiplier: 2.0,
    jitter: 0.1,
};

/// Allocation table conflicts: 20ms doubling to 1s, ±50% so competing writers spread out.
///
/// Attempts are bounded by the allocator.
pub const CONFLICT_RETRY: BackoffPolicy = BackoffPolicy {
    initial: Duration::from_millis(20),
    max_interval: Duration::from_secs(1),
    max_elapsed: None,
    multiplier: 2.0,
    jitter: 0.5,
};

impl BackoffPolicy {
    /// Start a schedule following this policy.
    #[must_use]
    pub fn start(self) -> ExponentialBackoff {
        ExponentialBackoff {
            policy: self,
            next: self.initial,
            started: Instant::now(),
        }
    }
}

/// A running backoff schedule.
#[derive(Debug)]
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    next: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    /// Policy this schedule follows.
    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Nominal (un-jittered) delay returned by the next call to [`Self::next_backoff`].
    #[must_use]
    pub fn current_interval(&self) -> Duration {
        self.next
    }

    /// The next delay, or `None` once the elapsed-time limit is reached.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self
            .policy
            .max_elapsed
            .is_some_and(|limit| self.started.elapsed() >= limit)
        {
            return None;
        }

        let nominal = self.next;
        self.next = nominal
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max_interval);
        Some(jittered(nominal, self.policy.jitter))
    }

    /// Restart the schedule from the initial delay.
    pub fn reset(&mut self) {
        self.next = self.policy.initial;
        self.started = Instant::now();
    }
}

fn jittered(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return interval;
    }
    let secs = interval.as_secs_f64();
    let spread = secs * factor;
    let secs = rand::thread_rng().gen_range((secs - spread)..=(secs + spread));
    Duration::from_secs_f64(secs.max(0.0))
}

/// Schedule for Kubernetes API retries.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    API_RETRY.start()
}

/// Schedule for allocation table conflicts.
#[must_use]
pub fn conflict_backoff() -> ExponentialBackoff {
    CONFLICT_RETRY.start()
}

/// Run a Kubernetes API call, retrying transient failures on [`API_RETRY`].
///
/// 404 and 409 are returned at once; callers handle them.
///
/// # Errors
///
/// Returns the last Kubernetes error when it is not retryable or when the
/// schedule runs out.
pub async fn retry_api_call<T, F, Fut>(mut call: F, what: &str) -> Result<T, kube::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let mut attempt: u32 = 1;

    loop {
        let err = match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = what, attempt, "API call succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) if !is_retryable_error(&e) => return Err(e),
            Err(e) => e,
        };

        let Some(delay) = backoff.next_backoff() else {
            error!(operation = what, attempt, error = %err, "Giving up on API call");
            return Err(err);
        };
        warn!(operation = what, attempt, retry_after = ?delay, error = %err, "Transient API error");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Rate limiting (429), server errors (5xx) and transport errors are transient.
pub(crate) fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(status) => status.code == 429 || (500..600).contains(&status.code),
        kube::Error::Service(_) => true,
        _ => false,
    }
}

/// Returns true if the error is an API response with the given status code.
pub(crate) fn is_api_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(status) if status.code == code)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
