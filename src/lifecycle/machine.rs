//! # The single mutation path for service status.
//!
//! [`LifecycleStateMachine::transition`] validates the requested edge against the
//! transition table, builds a [`LifecycleEvent`], hands it to the
//! [`EventBus`] and commits the new status. All transitions, for all services,
//! pass through one async gate, so concurrent callers (startup stages, the
//! health monitor, containment, external code) are serialized.
//!
//! ```text
//! transition(svc, to, reason)
//!   ├─ acquire gate (tokio::Mutex)
//!   ├─ read current status (RwLock, short)
//!   ├─ illegal edge? ──► Err(IllegalTransition), nothing changes
//!   ├─ build LifecycleEvent
//!   ├─ blocking event?  ──► bus.publish().await  (safety coordinator runs first)
//!   │                       then commit
//!   └─ otherwise        ──► commit, then bus.publish() (enqueue only)
//! ```
//!
//! Readers (`status_of`, `snapshot_all`) take the record lock briefly and never
//! wait for the gate, so they always see the last committed state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{IllegalTransitionError, TransitionError};
use crate::events::{EventBus, LifecycleEvent};
use crate::safety::SafetyClassification;

use super::{ServiceRecord, Status};

/// Owner of every [`ServiceRecord`].
pub struct LifecycleStateMachine {
    records: RwLock<HashMap<String, ServiceRecord>>,
    gate: Mutex<()>,
    bus: Arc<EventBus>,
}

impl LifecycleStateMachine {
    /// Creates an empty machine publishing to `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            gate: Mutex::new(()),
            bus,
        }
    }

    /// Adds a record in REGISTERED. Returns `false` if the name is taken.
    pub fn register(&self, name: &str, classification: SafetyClassification) -> bool {
        let mut records = self.records.write();
        if records.contains_key(name) {
            return false;
        }
        records.insert(name.to_string(), ServiceRecord::new(name, classification));
        true
    }

    /// Moves `service` to `to`. Returns the previous status.
    ///
    /// # Errors
    /// - [`TransitionError::UnknownService`] if no record exists.
    /// - [`TransitionError::Illegal`] if the edge is not in the table; the
    ///   record is left untouched and no event is emitted.
    pub async fn transition(
        &self,
        service: &str,
        to: Status,
        reason: impl Into<String>,
    ) -> Result<Status, TransitionError> {
        self.transition_with(service, to, reason, BTreeMap::new())
            .await
    }

    /// Like [`transition`](Self::transition), attaching `metadata` to the event.
    pub async fn transition_with(
        &self,
        service: &str,
        to: Status,
        reason: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Status, TransitionError> {
        let reason = reason.into();
        let _gate = self.gate.lock().await;

        let (from, classification) = {
            let records = self.records.read();
            let rec = records
                .get(service)
                .ok_or_else(|| TransitionError::UnknownService {
                    name: service.to_string(),
                })?;
            (rec.status, rec.classification)
        };

        if !from.can_transition_to(to) {
            warn!(service, %from, %to, "illegal transition rejected");
            return Err(IllegalTransitionError {
                service: service.to_string(),
                from,
                to,
            }
            .into());
        }

        let mut event = LifecycleEvent::transition(service, classification, from, to)
            .with_metadata(metadata);
        if !reason.is_empty() {
            event = event.with_reason(reason.as_str());
        }

        if event.is_blocking() {
            self.bus.publish(event).await;
            self.commit(service, to, &reason);
        } else {
            self.commit(service, to, &reason);
            self.bus.publish(event).await;
        }
        debug!(service, %from, %to, reason = %reason, "transition committed");
        Ok(from)
    }

    fn commit(&self, service: &str, to: Status, reason: &str) {
        if let Some(rec) = self.records.write().get_mut(service) {
            rec.apply(to, reason);
        }
    }

    /// Current status, or `None` for an unknown name.
    pub fn status_of(&self, service: &str) -> Option<Status> {
        self.records.read().get(service).map(|r| r.status)
    }

    /// Clone of one record.
    pub fn record(&self, service: &str) -> Option<ServiceRecord> {
        self.records.read().get(service).cloned()
    }

    /// Clone of every record, keyed by name.
    pub fn snapshot_all(&self) -> BTreeMap<String, ServiceRecord> {
        self.records
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Stores a heartbeat timestamp. Returns `false` for an unknown name.
    pub fn record_heartbeat(&self, service: &str) -> bool {
        match self.records.write().get_mut(service) {
            Some(rec) => {
                rec.last_heartbeat = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Stores a health-check outcome and returns the consecutive failure count.
    pub(crate) fn record_check(&self, service: &str, passed: bool) -> u32 {
        let mut records = self.records.write();
        let Some(rec) = records.get_mut(service) else {
            return 0;
        };
        rec.last_health_check = Some(chrono::Utc::now());
        if passed {
            rec.consecutive_failures = 0;
        } else {
            rec.consecutive_failures = rec.consecutive_failures.saturating_add(1);
        }
        rec.consecutive_failures
    }

    /// Bus this machine publishes to.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Listener;
    use async_trait::async_trait;
    use std::sync::Weak;

    /// Captures the status visible to readers while the event is being delivered.
    struct Peek {
        machine: parking_lot::Mutex<Weak<LifecycleStateMachine>>,
        seen: parking_lot::Mutex<Vec<(String, Option<Status>)>>,
    }

    #[async_trait]
    impl Listener for Peek {
        async fn on_event(&self, ev: &LifecycleEvent) {
            let m = self.machine.lock().upgrade();
            let status = m.and_then(|m| m.status_of(&ev.service));
            self.seen.lock().push((ev.kind.to_string(), status));
        }
        fn priority(&self) -> i32 {
            0
        }
    }

    async fn setup() -> (Arc<LifecycleStateMachine>, Arc<Peek>) {
        let peek = Arc::new(Peek {
            machine: parking_lot::Mutex::new(Weak::new()),
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let bus = Arc::new(EventBus::new(vec![peek.clone() as Arc<dyn Listener>], 16));
        let machine = Arc::new(LifecycleStateMachine::new(bus));
        *peek.machine.lock() = Arc::downgrade(&machine);
        machine.register("brakes", SafetyClassification::Critical);
        machine.register("radio", SafetyClassification::Operational);
        (machine, peek)
    }

    #[tokio::test]
    async fn legal_path_commits_and_returns_previous() {
        let (m, _) = setup().await;
        assert_eq!(m.transition("radio", Status::Starting, "").await, Ok(Status::Registered));
        assert_eq!(m.transition("radio", Status::Healthy, "up").await, Ok(Status::Starting));
        let rec = m.record("radio").unwrap();
        assert_eq!(rec.status, Status::Healthy);
        assert!(rec.has_started());
        assert!(rec.last_heartbeat.is_some());
        assert_eq!(rec.start_attempts, 1);
    }

    #[tokio::test]
    async fn illegal_transition_changes_nothing() {
        let (m, peek) = setup().await;
        let err = m.transition("radio", Status::Healthy, "skip ahead").await.unwrap_err();
        assert!(matches!(err, TransitionError::Illegal(ref e) if e.from == Status::Registered));
        assert_eq!(m.status_of("radio"), Some(Status::Registered));
        m.bus().flush().await;
        assert!(peek.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_service_is_reported() {
        let (m, _) = setup().await;
        let err = m.transition("ghost", Status::Starting, "").await.unwrap_err();
        assert_eq!(err, TransitionError::UnknownService { name: "ghost".into() });
    }

    #[tokio::test]
    async fn blocking_event_is_seen_before_commit() {
        let (m, peek) = setup().await;
        m.transition("brakes", Status::Starting, "").await.unwrap();
        m.transition("brakes", Status::Healthy, "").await.unwrap();
        m.bus().flush().await;
        peek.seen.lock().clear();

        m.transition("brakes", Status::Failed, "pressure lost").await.unwrap();
        // Delivered synchronously: the listener observed the pre-commit status.
        assert_eq!(
            peek.seen.lock().clone(),
            vec![("failed".to_string(), Some(Status::Healthy))]
        );
        assert_eq!(m.status_of("brakes"), Some(Status::Failed));
        assert_eq!(m.record("brakes").unwrap().last_failure.as_deref(), Some("pressure lost"));
    }

    #[tokio::test]
    async fn non_blocking_event_is_seen_after_commit() {
        let (m, peek) = setup().await;
        m.transition("radio", Status::Starting, "").await.unwrap();
        m.bus().flush().await;
        assert_eq!(
            peek.seen.lock().clone(),
            vec![("starting".to_string(), Some(Status::Starting))]
        );
    }

    #[tokio::test]
    async fn concurrent_transitions_are_serialized() {
        let (m, _) = setup().await;
        m.transition("radio", Status::Starting, "").await.unwrap();
        m.transition("radio", Status::Healthy, "").await.unwrap();

        let a = {
            let m = m.clone();
            tokio::spawn(async move { m.transition("radio", Status::Stopping, "a").await })
        };
        let b = {
            let m = m.clone();
            tokio::spawn(async move { m.transition("radio", Status::Stopping, "b").await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(m.status_of("radio"), Some(Status::Stopping));
    }

    #[tokio::test]
    async fn check_failures_accumulate_and_reset() {
        let (m, _) = setup().await;
        assert_eq!(m.record_check("radio", false), 1);
        assert_eq!(m.record_check("radio", false), 2);
        assert_eq!(m.record_check("radio", true), 0);
        assert_eq!(m.record_check("ghost", false), 0);
    }
}
