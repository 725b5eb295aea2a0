//! # Safety coordinator
//!
//! Highest-priority [`Listener`]. It reacts to FAILED events according to the
//! failed service's classification and guards every actuation command.
//!
//! ```text
//! FAILED event
//!   ├─ CRITICAL          ──► enter SAFE_SHUTDOWN, disable all transitive dependents
//!   ├─ SAFETY_RELATED    ──► disable direct dependents
//!   ├─ POSITION_CRITICAL ──► freeze that service's actuation path
//!   └─ OPERATIONAL / MAINTENANCE ──► log only
//!
//! disabled services ──► ContainmentRequest ──► orchestrator stops them
//!
//! check_actuation(service)
//!   emergency stop latched?            ──► EmergencyStopActive
//!   path frozen?                       ──► PathFrozen
//!   disabled by a failed dependency?   ──► FeatureDisabled
//!   SAFE_SHUTDOWN and position-critical ──► SafeModeActive
//! ```
//!
//! CRITICAL and SAFETY_RELATED failures arrive through blocking dispatch, so the
//! state above is in place before the FAILED status is committed. All state
//! lives behind one lock; trips, resets and checks are serialized by it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{EmergencyStopActive, SafetyError};
use crate::events::{EventKind, LifecycleEvent, Listener, SAFETY_PRIORITY};
use crate::graph::StagePlan;
use crate::services::DependencyKind;

use super::{Authorizer, ResetToken, SafetyClassification};

const CONTAINMENT_EDGES: &[DependencyKind] = &[DependencyKind::Required, DependencyKind::Runtime];

/// System-wide safety mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    /// Normal operation.
    Normal,
    /// A CRITICAL service failed; position-critical operations are refused.
    SafeShutdown,
}

/// Request to stop a service whose prerequisite failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainmentRequest {
    /// Service to stop.
    pub service: String,
    /// Failed prerequisite.
    pub dependency: String,
}

/// Serializable view of the coordinator state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SafetySnapshot {
    /// Current mode.
    pub mode: SafetyMode,
    /// What caused SAFE_SHUTDOWN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_shutdown_cause: Option<String>,
    /// When SAFE_SHUTDOWN was entered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_shutdown_since: Option<DateTime<Utc>>,
    /// Emergency-stop latch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_stop: Option<EmergencyStopView>,
    /// Frozen actuation paths, service → cause.
    pub frozen: BTreeMap<String, String>,
    /// Disabled services, service → failed prerequisite.
    pub disabled: BTreeMap<String, String>,
}

/// Serializable emergency-stop latch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmergencyStopView {
    /// Trip reason.
    pub reason: String,
    /// Trip time.
    pub since: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    safe_shutdown: Option<(String, DateTime<Utc>)>,
    estop: Option<EmergencyStopActive>,
    frozen: BTreeMap<String, String>,
    disabled: BTreeMap<String, String>,
}

/// Applies classification-driven responses to failures and guards actuation.
pub struct SafetyCoordinator {
    plan: Arc<StagePlan>,
    classes: HashMap<String, SafetyClassification>,
    state: RwLock<State>,
    authorizer: Arc<dyn Authorizer>,
    containment: Option<mpsc::UnboundedSender<ContainmentRequest>>,
}

impl SafetyCoordinator {
    /// Creates a coordinator.
    ///
    /// `containment` receives one request per newly disabled service; pass
    /// `None` to only record the disabled set.
    pub fn new(
        plan: Arc<StagePlan>,
        classes: HashMap<String, SafetyClassification>,
        authorizer: Arc<dyn Authorizer>,
        containment: Option<mpsc::UnboundedSender<ContainmentRequest>>,
    ) -> Self {
        Self {
            plan,
            classes,
            state: RwLock::new(State::default()),
            authorizer,
            containment,
        }
    }

    /// Applies the response for a FAILED event.
    pub fn handle_failure(&self, event: &LifecycleEvent) {
        let service = event.service.as_ref();
        let reason = event.reason_str();

        match event.classification {
            SafetyClassification::Critical => {
                {
                    let mut st = self.state.write();
                    if st.safe_shutdown.is_none() {
                        st.safe_shutdown = Some((
                            format!("critical service '{service}' failed: {reason}"),
                            Utc::now(),
                        ));
                    }
                }
                error!(service, reason, "critical service failed; entering safe shutdown");
                let dependents = self.plan.transitive_dependents(service, CONTAINMENT_EDGES);
                self.disable(service, dependents);
            }
            SafetyClassification::SafetyRelated => {
                warn!(
                    service,
                    reason,
                    "safety-related service failed; disabling dependent features"
                );
                let dependents = self.plan.direct_dependents(service, CONTAINMENT_EDGES);
                self.disable(service, dependents);
            }
            SafetyClassification::PositionCritical => {
                self.state
                    .write()
                    .frozen
                    .insert(service.to_string(), reason.to_string());
                warn!(service, reason, "position-critical service failed; actuation path frozen");
            }
            SafetyClassification::Operational | SafetyClassification::Maintenance => {
                info!(service, reason, classification = %event.classification, "service failed");
            }
        }
    }

    fn disable(&self, failed: &str, dependents: Vec<String>) {
        let newly: Vec<String> = {
            let mut st = self.state.write();
            dependents
                .into_iter()
                .filter(|d| {
                    if st.disabled.contains_key(d) {
                        false
                    } else {
                        st.disabled.insert(d.clone(), failed.to_string());
                        true
                    }
                })
                .collect()
        };

        for service in newly {
            warn!(service = %service, dependency = failed, "feature disabled");
            if let Some(tx) = &self.containment {
                let _ = tx.send(ContainmentRequest {
                    service,
                    dependency: failed.to_string(),
                });
            }
        }
    }

    /// Sets the emergency-stop latch. Idempotent: a second trip keeps the first reason.
    pub fn trip_emergency_stop(&self, reason: impl Into<String>) -> EmergencyStopActive {
        let mut st = self.state.write();
        if let Some(active) = &st.estop {
            return active.clone();
        }
        let latch = EmergencyStopActive {
            reason: reason.into(),
            since: Utc::now(),
        };
        error!(reason = %latch.reason, "emergency stop tripped");
        st.estop = Some(latch.clone());
        latch
    }

    /// Clears the emergency-stop latch. Clearing an unset latch is a no-op.
    ///
    /// # Errors
    /// [`SafetyError::Unauthorized`] if `token` is rejected; the latch stays set.
    pub fn reset_emergency_stop(&self, token: &ResetToken) -> Result<(), SafetyError> {
        if !self.authorizer.authorize(token) {
            warn!("emergency stop reset rejected: unauthorized");
            return Err(SafetyError::Unauthorized);
        }
        if let Some(cleared) = self.state.write().estop.take() {
            info!(reason = %cleared.reason, "emergency stop reset");
        }
        Ok(())
    }

    /// Leaves SAFE_SHUTDOWN and clears frozen paths and disabled features.
    ///
    /// Services already stopped by containment stay stopped.
    ///
    /// # Errors
    /// [`SafetyError::Unauthorized`] if `token` is rejected.
    pub fn reset_safe_state(&self, token: &ResetToken) -> Result<(), SafetyError> {
        if !self.authorizer.authorize(token) {
            warn!("safe state reset rejected: unauthorized");
            return Err(SafetyError::Unauthorized);
        }
        let mut st = self.state.write();
        st.safe_shutdown = None;
        st.frozen.clear();
        st.disabled.clear();
        info!("safe state reset");
        Ok(())
    }

    /// Refuses control commands while the emergency stop is latched.
    pub fn check_control(&self) -> Result<(), SafetyError> {
        match &self.state.read().estop {
            Some(active) => Err(active.clone().into()),
            None => Ok(()),
        }
    }

    /// Refuses an actuation command on `service` if any safety state forbids it.
    pub fn check_actuation(&self, service: &str) -> Result<(), SafetyError> {
        let st = self.state.read();
        if let Some(active) = &st.estop {
            return Err(active.clone().into());
        }
        if let Some(cause) = st.frozen.get(service) {
            return Err(SafetyError::PathFrozen {
                service: service.to_string(),
                cause: cause.clone(),
            });
        }
        if let Some(dependency) = st.disabled.get(service) {
            return Err(SafetyError::FeatureDisabled {
                service: service.to_string(),
                dependency: dependency.clone(),
            });
        }
        if let Some((cause, _)) = &st.safe_shutdown {
            let position = self
                .classes
                .get(service)
                .is_some_and(SafetyClassification::is_position_critical);
            if position {
                return Err(SafetyError::SafeModeActive {
                    service: service.to_string(),
                    cause: cause.clone(),
                });
            }
        }
        Ok(())
    }

    /// Failed prerequisite that disabled `service`, if any.
    pub fn disabled_by(&self, service: &str) -> Option<String> {
        self.state.read().disabled.get(service).cloned()
    }

    /// `true` if the actuation path of `service` is frozen.
    pub fn is_frozen(&self, service: &str) -> bool {
        self.state.read().frozen.contains_key(service)
    }

    /// Current mode.
    pub fn mode(&self) -> SafetyMode {
        if self.state.read().safe_shutdown.is_some() {
            SafetyMode::SafeShutdown
        } else {
            SafetyMode::Normal
        }
    }

    /// Active latch, if any.
    pub fn emergency_stop(&self) -> Option<EmergencyStopActive> {
        self.state.read().estop.clone()
    }

    /// Serializable copy of the state.
    pub fn snapshot(&self) -> SafetySnapshot {
        let st = self.state.read();
        SafetySnapshot {
            mode: if st.safe_shutdown.is_some() {
                SafetyMode::SafeShutdown
            } else {
                SafetyMode::Normal
            },
            safe_shutdown_cause: st.safe_shutdown.as_ref().map(|(c, _)| c.clone()),
            safe_shutdown_since: st.safe_shutdown.as_ref().map(|(_, t)| *t),
            emergency_stop: st.estop.as_ref().map(|e| EmergencyStopView {
                reason: e.reason.clone(),
                since: e.since,
            }),
            frozen: st.frozen.clone(),
            disabled: st.disabled.clone(),
        }
    }
}

#[async_trait]
impl Listener for SafetyCoordinator {
    async fn on_event(&self, event: &LifecycleEvent) {
        if event.kind == EventKind::Failed {
            self.handle_failure(event);
        }
    }

    fn name(&self) -> &'static str {
        "safety"
    }

    fn priority(&self) -> i32 {
        SAFETY_PRIORITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::resolve;
    use crate::lifecycle::Status;
    use crate::safety::StaticTokenAuthorizer;
    use crate::services::{ServiceDescriptor, ServiceFn};

    fn d(name: &str, class: SafetyClassification) -> crate::services::ServiceDescriptorBuilder {
        ServiceDescriptor::builder(name.to_string(), ServiceFn::noop().arc()).classification(class)
    }

    fn coordinator() -> (SafetyCoordinator, mpsc::UnboundedReceiver<ContainmentRequest>) {
        use SafetyClassification::*;
        let descs = vec![
            d("can_bus", Critical).build(),
            d("lpg_detector", SafetyRelated).requires("can_bus").build(),
            d("furnace", Operational).requires("lpg_detector").build(),
            d("thermostat_ui", Operational).runtime("furnace").build(),
            d("slides", PositionCritical).requires("can_bus").build(),
            d("radio", Operational).optional("can_bus").build(),
        ];
        let plan = Arc::new(resolve(&descs).unwrap());
        let classes = descs
            .iter()
            .map(|d| (d.name().to_string(), d.classification()))
            .collect();
        let (tx, rx) = mpsc::unbounded_channel();
        let c = SafetyCoordinator::new(
            plan,
            classes,
            Arc::new(StaticTokenAuthorizer::new("op-key")),
            Some(tx),
        );
        (c, rx)
    }

    fn failed(service: &str, class: SafetyClassification) -> LifecycleEvent {
        LifecycleEvent::transition(service, class, Status::Healthy, Status::Failed)
            .with_reason("boom")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ContainmentRequest>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(r) = rx.try_recv() {
            out.push(r.service);
        }
        out
    }

    #[test]
    fn critical_failure_enters_safe_shutdown_and_disables_chain() {
        let (c, mut rx) = coordinator();
        c.handle_failure(&failed("can_bus", SafetyClassification::Critical));

        assert_eq!(c.mode(), SafetyMode::SafeShutdown);
        let mut stopped = drain(&mut rx);
        stopped.sort();
        assert_eq!(stopped, vec!["furnace", "lpg_detector", "slides", "thermostat_ui"]);
        // Optional dependents are not disabled.
        assert_eq!(c.disabled_by("radio"), None);
        assert!(matches!(
            c.check_actuation("slides"),
            Err(SafetyError::FeatureDisabled { .. })
        ));
    }

    #[test]
    fn safety_related_failure_disables_direct_dependents_only() {
        let (c, mut rx) = coordinator();
        c.handle_failure(&failed("lpg_detector", SafetyClassification::SafetyRelated));

        assert_eq!(c.mode(), SafetyMode::Normal);
        assert_eq!(drain(&mut rx), vec!["furnace"]);
        assert_eq!(c.disabled_by("furnace").as_deref(), Some("lpg_detector"));
        assert_eq!(c.disabled_by("thermostat_ui"), None);
        assert!(c.check_actuation("slides").is_ok());
    }

    #[test]
    fn repeated_failures_do_not_resend_containment() {
        let (c, mut rx) = coordinator();
        c.handle_failure(&failed("lpg_detector", SafetyClassification::SafetyRelated));
        drain(&mut rx);
        c.handle_failure(&failed("lpg_detector", SafetyClassification::SafetyRelated));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn position_critical_failure_freezes_path() {
        let (c, _rx) = coordinator();
        c.handle_failure(&failed("slides", SafetyClassification::PositionCritical));
        assert!(c.is_frozen("slides"));
        assert!(matches!(
            c.check_actuation("slides"),
            Err(SafetyError::PathFrozen { ref cause, .. }) if cause == "boom"
        ));
    }

    #[test]
    fn emergency_stop_latch_requires_authorization() {
        let (c, _rx) = coordinator();
        let first = c.trip_emergency_stop("operator");
        let again = c.trip_emergency_stop("second press");
        assert_eq!(first, again);

        assert!(matches!(c.check_actuation("radio"), Err(SafetyError::EmergencyStopActive(_))));
        assert!(c.check_control().is_err());

        assert_eq!(
            c.reset_emergency_stop(&ResetToken::from("wrong")),
            Err(SafetyError::Unauthorized)
        );
        assert!(c.emergency_stop().is_some());

        c.reset_emergency_stop(&ResetToken::from("op-key")).unwrap();
        assert!(c.check_actuation("radio").is_ok());
        // Resetting an unset latch is fine.
        c.reset_emergency_stop(&ResetToken::from("op-key")).unwrap();
    }

    #[test]
    fn safe_state_reset_clears_everything() {
        let (c, _rx) = coordinator();
        c.handle_failure(&failed("can_bus", SafetyClassification::Critical));
        c.handle_failure(&failed("slides", SafetyClassification::PositionCritical));

        assert_eq!(c.reset_safe_state(&ResetToken::from("nope")), Err(SafetyError::Unauthorized));
        c.reset_safe_state(&ResetToken::from("op-key")).unwrap();

        let snap = c.snapshot();
        assert_eq!(snap.mode, SafetyMode::Normal);
        assert!(snap.frozen.is_empty());
        assert!(snap.disabled.is_empty());
    }

    #[test]
    fn snapshot_serializes() {
        let (c, _rx) = coordinator();
        c.trip_emergency_stop("test");
        let json = serde_json::to_value(c.snapshot()).unwrap();
        assert_eq!(json["mode"], "normal");
        assert_eq!(json["emergency_stop"]["reason"], "test");
    }
}
