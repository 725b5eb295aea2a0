//! # Lifecycle events emitted on every committed status change.
//!
//! [`EventKind`] is derived from the `(from, to)` pair of a transition:
//!
//! | to         | from       | kind          |
//! |------------|------------|---------------|
//! | STARTING   | any        | `Starting`    |
//! | HEALTHY    | STARTING   | `Started`     |
//! | HEALTHY    | DEGRADED   | `Recovered`   |
//! | DEGRADED   | any        | `Degraded`    |
//! | FAILED     | any        | `Failed`      |
//! | STOPPING   | any        | `PreShutdown` |
//! | STOPPED    | any        | `Stopped`     |
//! | SKIPPED    | any        | `Skipped`     |
//!
//! ## Ordering
//! Each event carries a process-wide `seq` that increases monotonically.
//! Events for the same service are created under the state machine's gate,
//! so their `seq` order matches commit order.
//!
//! ## Example
//! ```rust
//! use rvisor::{EventKind, LifecycleEvent, SafetyClassification, Status};
//!
//! let ev = LifecycleEvent::transition("leveling", SafetyClassification::PositionCritical, Status::Healthy, Status::Failed)
//!     .with_reason("jack pressure lost")
//!     .with_meta("jack", "rear_left");
//!
//! assert_eq!(ev.kind, EventKind::Failed);
//! assert_eq!(ev.meta("jack"), Some("rear_left"));
//! assert!(!ev.is_blocking());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::lifecycle::Status;
use crate::safety::SafetyClassification;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Kind of lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Start routine invoked.
    Starting,
    /// Start routine succeeded and the service is HEALTHY.
    Started,
    /// Service entered DEGRADED.
    Degraded,
    /// Service returned from DEGRADED to HEALTHY.
    Recovered,
    /// Stop routine about to be invoked.
    PreShutdown,
    /// Service entered FAILED.
    Failed,
    /// Service reached STOPPED.
    Stopped,
    /// Service was skipped during startup.
    Skipped,
}

impl EventKind {
    /// Derives the kind for a transition. See the module table.
    pub fn for_transition(from: Status, to: Status) -> Self {
        match to {
            Status::Starting | Status::Registered => EventKind::Starting,
            Status::Healthy if from == Status::Degraded => EventKind::Recovered,
            Status::Healthy => EventKind::Started,
            Status::Degraded => EventKind::Degraded,
            Status::Failed => EventKind::Failed,
            Status::Stopping => EventKind::PreShutdown,
            Status::Stopped => EventKind::Stopped,
            Status::Skipped => EventKind::Skipped,
        }
    }

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Starting => "starting",
            EventKind::Started => "started",
            EventKind::Degraded => "degraded",
            EventKind::Recovered => "recovered",
            EventKind::PreShutdown => "pre_shutdown",
            EventKind::Failed => "failed",
            EventKind::Stopped => "stopped",
            EventKind::Skipped => "skipped",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one committed transition.
///
/// Ownership passes to the [`EventBus`](crate::EventBus) on publish; listeners
/// receive shared references.
#[derive(Clone, Debug)]
pub struct LifecycleEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Kind of change.
    pub kind: EventKind,
    /// Service that changed.
    pub service: Arc<str>,
    /// Its safety classification.
    pub classification: SafetyClassification,
    /// Status before the transition.
    pub from: Status,
    /// Status after the transition.
    pub to: Status,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Free-form key/value details (stage index, dependency names, timings).
    pub metadata: BTreeMap<String, String>,
    /// Monotonic timestamp.
    pub at: Instant,
    /// Wall-clock timestamp.
    pub wall: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Creates an event for `from -> to` with the next sequence number.
    pub fn transition(
        service: impl Into<Arc<str>>,
        classification: SafetyClassification,
        from: Status,
        to: Status,
    ) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            kind: EventKind::for_transition(from, to),
            service: service.into(),
            classification,
            from,
            to,
            reason: None,
            metadata: BTreeMap::new(),
            at: Instant::now(),
            wall: Utc::now(),
        }
    }

    /// Attaches a reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Adds one metadata entry.
    #[inline]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// Merges a metadata map.
    #[inline]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Metadata value by key.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// `true` for FAILED events of CRITICAL or SAFETY_RELATED services.
    ///
    /// These are dispatched synchronously, in priority order, before the
    /// transition is committed.
    #[inline]
    pub fn is_blocking(&self) -> bool {
        self.kind == EventKind::Failed && self.classification.requires_blocking_dispatch()
    }

    /// Reason or an empty string.
    #[inline]
    pub fn reason_str(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_transition() {
        use Status::*;
        assert_eq!(EventKind::for_transition(Registered, Starting), EventKind::Starting);
        assert_eq!(EventKind::for_transition(Starting, Healthy), EventKind::Started);
        assert_eq!(EventKind::for_transition(Degraded, Healthy), EventKind::Recovered);
        assert_eq!(EventKind::for_transition(Healthy, Stopping), EventKind::PreShutdown);
        assert_eq!(EventKind::for_transition(Registered, Skipped), EventKind::Skipped);
    }

    #[test]
    fn sequence_is_monotonic() {
        let op = SafetyClassification::Operational;
        let a = LifecycleEvent::transition("a", op, Status::Registered, Status::Starting);
        let b = LifecycleEvent::transition("a", op, Status::Starting, Status::Healthy);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn only_safety_failures_block() {
        use SafetyClassification::{Critical, PositionCritical, SafetyRelated};
        use Status::{Degraded, Failed, Healthy, Starting};

        let critical = LifecycleEvent::transition("brakes", Critical, Healthy, Failed);
        let related = LifecycleEvent::transition("lpg", SafetyRelated, Starting, Failed);
        let degraded = LifecycleEvent::transition("brakes", Critical, Healthy, Degraded);
        let position = LifecycleEvent::transition("slide", PositionCritical, Healthy, Failed);
        assert!(critical.is_blocking());
        assert!(related.is_blocking());
        assert!(!degraded.is_blocking());
        assert!(!position.is_blocking());
    }
}
