//! Retry with exponential backoff.
//!
//! A failed attempt `n` (counting from 1) is retried after
//! `base_delay * 2^n`, until `max_attempts` consecutive failures. With the
//! default policy that is 2s, 4s, 8s, 16s and then the operation is
//! abandoned after the fifth failure.
//!
//! Whether a failure may be retried at all is decided by a [`RetryGate`].
//! Summary fetches use [`PeriodicRefreshGate`]: while the periodic refresh
//! timer runs, the next scheduled refresh replaces the retry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use trainscope_api::ApiError;

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Largest exponent used when computing delays.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Errors that report whether a retry could help.
pub trait Retryable {
    /// Whether the same request may succeed if repeated.
    fn is_transient(&self) -> bool;
}

impl Retryable for ApiError {
    fn is_transient(&self) -> bool {
        ApiError::is_transient(self)
    }
}

/// Backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay unit; the wait after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and a one second unit.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor)
    }

    /// Delays waited when every attempt fails and retries are allowed.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .collect()
    }
}

/// Decides, at failure time, whether a retry may be scheduled.
pub trait RetryGate: Send + Sync {
    /// Whether a retry is currently allowed.
    fn allows_retry(&self) -> bool;
}

/// Gate that always allows retries. Used for image downloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl RetryGate for AlwaysRetry {
    fn allows_retry(&self) -> bool {
        true
    }
}

/// Gate that allows retries only while no periodic refresh timer runs.
///
/// The refresh controller flips the shared flag when it starts or clears
/// its timer; fetch tasks hold clones.
#[derive(Debug, Clone, Default)]
pub struct PeriodicRefreshGate {
    active: Arc<AtomicBool>,
}

impl PeriodicRefreshGate {
    /// Create a gate with no active timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record whether the periodic refresh timer is running.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Whether the periodic refresh timer is running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl RetryGate for PeriodicRefreshGate {
    fn allows_retry(&self) -> bool {
        !self.is_active()
    }
}

/// Why a polled operation was abandoned.
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        #[source]
        source: E,
    },

    /// A retry was not allowed because a periodic refresh is scheduled.
    #[error("retry suppressed after attempt {attempts}: {source}")]
    Suppressed {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        #[source]
        source: E,
    },

    /// The error cannot be fixed by retrying.
    #[error("permanent failure on attempt {attempts}: {source}")]
    Permanent {
        /// Attempts made.
        attempts: u32,
        /// The error.
        #[source]
        source: E,
    },
}

impl<E> PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            PollError::Exhausted { attempts, .. }
            | PollError::Suppressed { attempts, .. }
            | PollError::Permanent { attempts, .. } => *attempts,
        }
    }

    /// The last error observed.
    pub fn source_error(&self) -> &E {
        match self {
            PollError::Exhausted { source, .. }
            | PollError::Suppressed { source, .. }
            | PollError::Permanent { source, .. } => source,
        }
    }
}

/// Run `op` until it succeeds or the policy, the gate, or the error kind
/// says to stop.
///
/// `op` receives the 1-based attempt number. Each call is an independent
/// request; the caller is responsible for discarding stale results.
pub async fn poll_with_backoff<T, E, G, F, Fut>(
    policy: &RetryPolicy,
    gate: &G,
    label: &str,
    mut op: F,
) -> Result<T, PollError<E>>
where
    E: std::error::Error + Retryable + 'static,
    G: RetryGate + ?Sized,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            error!(target: "trainscope::poller", label, attempt, error = %err, "Request failed permanently");
            return Err(PollError::Permanent {
                attempts: attempt,
                source: err,
            });
        }

        if attempt >= policy.max_attempts {
            error!(target: "trainscope::poller", label, attempts = attempt, error = %err, "Unable to complete request, giving up");
            return Err(PollError::Exhausted {
                attempts: attempt,
                source: err,
            });
        }

        if !gate.allows_retry() {
            info!(target: "trainscope::poller", label, attempt, error = %err, "Not retrying; periodic refresh will fetch again");
            return Err(PollError::Suppressed {
                attempts: attempt,
                source: err,
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(target: "trainscope::poller", label, attempt, delay = ?delay, error = %err, "Will retry");
        tokio::time::sleep(delay).await;
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts, base delay {:?}",
            self.max_attempts, self.base_delay
        )
    }
}
