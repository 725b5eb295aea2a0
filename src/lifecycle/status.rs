//! Lifecycle statuses and the transition table.
//!
//! ```text
//!              ┌──────────────────────────────────────────────┐
//!              │                                              ▼
//! REGISTERED ──┼──► STARTING ──► HEALTHY ◄──► DEGRADED      SKIPPED ──► STOPPED
//!              │        │           │            │
//!              │        ▼           ▼            ▼
//!              │      FAILED ◄──────┴────────────┘
//!              │        │  ▲
//!              │        │  └── (recovery) STARTING
//!              │        ▼
//!              │     STOPPING ◄── HEALTHY / DEGRADED
//!              │        │
//!              └────────┴──────────────────────────────► STOPPED (terminal)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current lifecycle status of one service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Known to the orchestrator, not yet started.
    Registered,
    /// Start routine in progress.
    Starting,
    /// Up and passing checks.
    Healthy,
    /// Up with reduced functionality.
    Degraded,
    /// Start, health check or watchdog failed.
    Failed,
    /// Stop routine in progress.
    Stopping,
    /// Terminal.
    Stopped,
    /// Never started because a prerequisite did not come up.
    Skipped,
}

/// Returns `true` if `from -> to` is in the transition table.
pub const fn is_valid_transition(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Registered, Starting | Skipped | Stopped)
            | (Starting, Healthy | Degraded | Failed)
            | (Healthy, Degraded | Failed | Stopping)
            | (Degraded, Healthy | Failed | Stopping)
            | (Failed, Starting | Stopping | Stopped)
            | (Stopping, Stopped)
            | (Skipped, Stopped)
    )
}

impl Status {
    /// All statuses, in declaration order.
    pub const ALL: [Status; 8] = [
        Status::Registered,
        Status::Starting,
        Status::Healthy,
        Status::Degraded,
        Status::Failed,
        Status::Stopping,
        Status::Stopped,
        Status::Skipped,
    ];

    /// Stable upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Registered => "REGISTERED",
            Status::Starting => "STARTING",
            Status::Healthy => "HEALTHY",
            Status::Degraded => "DEGRADED",
            Status::Failed => "FAILED",
            Status::Stopping => "STOPPING",
            Status::Stopped => "STOPPED",
            Status::Skipped => "SKIPPED",
        }
    }

    /// `HEALTHY` or `DEGRADED`.
    #[inline]
    pub fn is_up(&self) -> bool {
        matches!(self, Status::Healthy | Status::Degraded)
    }

    /// `STOPPED` has no outgoing transitions.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Stopped)
    }

    /// See [`is_valid_transition`].
    #[inline]
    pub fn can_transition_to(&self, to: Status) -> bool {
        is_valid_transition(*self, to)
    }

    /// Every status reachable from `self` in one step.
    pub fn valid_transitions(&self) -> Vec<Status> {
        Status::ALL
            .into_iter()
            .filter(|to| is_valid_transition(*self, *to))
            .collect()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
