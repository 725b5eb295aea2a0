use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::safety::SafetyClassification;

use super::Status;

/// Runtime record of one service, owned by the state machine.
///
/// Callers only ever see clones; mutation goes through
/// [`LifecycleStateMachine::transition`](crate::LifecycleStateMachine::transition).
#[derive(Clone, Debug)]
pub struct ServiceRecord {
    /// Service name.
    pub name: String,
    /// Safety classification copied from the descriptor.
    pub classification: SafetyClassification,
    /// Current status.
    pub status: Status,
    /// When the record was created.
    pub registered_at: DateTime<Utc>,
    /// Last successful start (STARTING -> HEALTHY/DEGRADED).
    pub started_at: Option<DateTime<Utc>>,
    /// When STOPPED was reached.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Time of the last committed transition.
    pub changed_at: DateTime<Utc>,
    /// Reason attached to the last transition.
    pub last_reason: Option<String>,
    /// Reason of the last transition into FAILED.
    pub last_failure: Option<String>,
    /// Last completed health check.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Consecutive failed health checks.
    pub consecutive_failures: u32,
    /// Monotonic time of the last heartbeat (or of the last successful start).
    pub last_heartbeat: Option<Instant>,
    /// Duration of the last successful start routine.
    pub start_duration: Option<Duration>,
    /// Number of times the service entered STARTING.
    pub start_attempts: u32,
    pub(crate) starting_since: Option<Instant>,
}

impl ServiceRecord {
    pub(crate) fn new(name: impl Into<String>, classification: SafetyClassification) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            classification,
            status: Status::Registered,
            registered_at: now,
            started_at: None,
            stopped_at: None,
            changed_at: now,
            last_reason: None,
            last_failure: None,
            last_health_check: None,
            consecutive_failures: 0,
            last_heartbeat: None,
            start_duration: None,
            start_attempts: 0,
            starting_since: None,
        }
    }

    /// `true` once a start routine has succeeded at least once.
    #[inline]
    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Applies a validated transition.
    pub(crate) fn apply(&mut self, to: Status, reason: &str) {
        let from = self.status;
        let now = Utc::now();
        match to {
            Status::Starting => {
                self.starting_since = Some(Instant::now());
                self.start_attempts += 1;
                self.consecutive_failures = 0;
            }
            Status::Healthy | Status::Degraded if from == Status::Starting => {
                let mono = Instant::now();
                self.started_at = Some(now);
                self.start_duration = self.starting_since.take().map(|t| mono - t);
                self.last_heartbeat = Some(mono);
                self.consecutive_failures = 0;
            }
            Status::Healthy => {
                self.consecutive_failures = 0;
            }
            Status::Failed => {
                self.starting_since = None;
                self.last_failure = Some(reason.to_string());
            }
            Status::Stopped => {
                self.stopped_at = Some(now);
            }
            _ => {}
        }
        self.status = to;
        self.changed_at = now;
        if !reason.is_empty() {
            self.last_reason = Some(reason.to_string());
        }
    }
}
