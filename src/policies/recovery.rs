use std::time::Duration;

use super::backoff::BackoffPolicy;

/// Bounds for [`Orchestrator::recover`](crate::Orchestrator::recover).
///
/// A `max_attempts` of `0` is treated as `1`: recovery always tries once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoveryPolicy {
    /// Start attempts before giving up.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl RecoveryPolicy {
    /// Single attempt, no delay.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffPolicy::constant(Duration::ZERO),
        }
    }

    /// Attempts clamped to at least one.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RecoveryPolicy {
    /// Three attempts with [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}
