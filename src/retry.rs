//! Retry with exponential backoff for read-only actions
//!
//! TR-064 makes no idempotency promise, so only query actions are ever
//! retried, and only for transport failures. Device faults are answers,
//! not transient conditions.

use std::time::Duration;

use rand::Rng;

use crate::Error;

/// Retry policy for read-only action calls
///
/// Controls how many times a failed request is retried and how
/// long to wait between attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Whether an action name denotes a read-only query
///
/// Standard query actions start with `Get`; vendor extensions use the
/// `X_<vendor>_Get...` form (e.g. `X_AVM-DE_GetHostListPath`).
#[must_use]
pub fn is_read_only_action(action: &str) -> bool {
    if action.starts_with("Get") {
        return true;
    }

    action
        .strip_prefix("X_")
        .and_then(|rest| rest.split_once('_'))
        .is_some_and(|(_, name)| name.starts_with("Get"))
}

/// Whether a failed call is worth another attempt
#[must_use]
pub const fn is_recoverable(error: &Error) -> bool {
    matches!(error, Error::Network(_) | Error::Http(_))
}

/// Upper bound of the random jitter, as a share of the backoff
const JITTER_SHARE: f64 = 0.25;

/// Wait before retry number `attempt` (0-based)
///
/// `base_delay` doubles per attempt, then gains up to 25% random jitter.
/// Never exceeds `max_delay`.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let backoff = policy
        .base_delay
        .checked_mul(1 << attempt.min(16))
        .map_or(policy.max_delay, |delay| delay.min(policy.max_delay));
    let jitter = backoff.mul_f64(rand::thread_rng().gen_range(0.0..=JITTER_SHARE));

    (backoff + jitter).min(policy.max_delay)
}
