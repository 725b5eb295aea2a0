//! # Health document
//!
//! [`HealthReport`] follows the `application/health+json` draft layout: a
//! top-level `status` of `pass` / `warn` / `fail`, plus a `checks` map keyed by
//! `"<service>:lifecycle"`. It is built from committed records only, so it shows
//! the last known state even while a transition is in flight.
//!
//! Overall status:
//! - `fail`: emergency stop latched, safe shutdown active, or a CRITICAL /
//!   SAFETY_RELATED service failing
//! - `warn`: any other check not passing
//! - `pass`: otherwise

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lifecycle::{ServiceRecord, Status};
use crate::safety::{SafetyClassification, SafetyMode, SafetySnapshot};

/// Media type of the serialized report.
pub const HEALTH_CONTENT_TYPE: &str = "application/health+json";

/// `pass` / `warn` / `fail`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    /// Working.
    Pass,
    /// Working with caveats, or not running.
    Warn,
    /// Not working.
    Fail,
}

/// One entry of the `checks` map.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCheck {
    /// Service name.
    pub component_id: String,
    /// Always `"service"`.
    pub component_type: &'static str,
    /// Check outcome.
    pub status: CheckState,
    /// Lifecycle status.
    pub observed_value: Status,
    /// Safety classification.
    pub classification: SafetyClassification,
    /// Failure or disable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failed prerequisite, when the service was disabled by the safety coordinator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<String>,
    /// Consecutive failed health checks.
    pub consecutive_failures: u32,
    /// Last successful start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Last completed health check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
    /// Time of the last status change.
    pub time: DateTime<Utc>,
}

/// Duration of one startup stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    /// Zero-based stage index.
    pub index: usize,
    /// Services in the stage.
    pub services: Vec<String>,
    /// Wall time from first start call to the last service settling.
    pub duration_ms: u64,
}

/// Startup timing summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupTiming {
    /// When `start_all` began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Total startup duration, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ms: Option<u64>,
    /// Per-stage durations, in stage order.
    pub stages: Vec<StageTiming>,
}

/// Aggregate health document.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall outcome.
    pub status: CheckState,
    /// Document version.
    pub version: &'static str,
    /// Crate version.
    pub release_id: &'static str,
    /// Fixed description.
    pub description: &'static str,
    /// Orchestrator phase.
    pub phase: &'static str,
    /// Human-readable notes on anything not passing.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Per-service checks.
    pub checks: BTreeMap<String, Vec<ComponentCheck>>,
    /// Safety coordinator state.
    pub safety: SafetySnapshot,
    /// Startup timings.
    pub startup: StartupTiming,
    /// When the report was built.
    pub time: DateTime<Utc>,
}

fn check_state(status: Status) -> CheckState {
    match status {
        Status::Healthy => CheckState::Pass,
        Status::Failed | Status::Skipped => CheckState::Fail,
        Status::Registered
        | Status::Starting
        | Status::Degraded
        | Status::Stopping
        | Status::Stopped => CheckState::Warn,
    }
}

impl HealthReport {
    /// Builds the document from record snapshots and safety state.
    pub fn build(
        records: &BTreeMap<String, ServiceRecord>,
        safety: SafetySnapshot,
        startup: StartupTiming,
        phase: &'static str,
    ) -> Self {
        let mut notes = Vec::new();
        let mut overall = CheckState::Pass;

        if let Some(estop) = &safety.emergency_stop {
            overall = CheckState::Fail;
            notes.push(format!("emergency stop active: {}", estop.reason));
        }
        if safety.mode == SafetyMode::SafeShutdown {
            overall = CheckState::Fail;
            if let Some(cause) = &safety.safe_shutdown_cause {
                notes.push(format!("safe shutdown: {cause}"));
            }
        }

        let mut checks = BTreeMap::new();
        for (name, rec) in records {
            let disabled_by = safety.disabled.get(name).cloned();
            let mut status = check_state(rec.status);
            let output = match (&disabled_by, rec.status) {
                (Some(dep), _) => {
                    status = CheckState::Fail;
                    Some(format!("disabled: dependency '{dep}' failed"))
                }
                (None, Status::Failed) => rec.last_failure.clone(),
                (None, Status::Skipped | Status::Degraded) => rec.last_reason.clone(),
                _ => None,
            };

            if status != CheckState::Pass {
                let severe = status == CheckState::Fail
                    && rec.classification.requires_blocking_dispatch();
                overall = overall.max(if severe { CheckState::Fail } else { CheckState::Warn });
            }

            checks.insert(
                format!("{name}:lifecycle"),
                vec![ComponentCheck {
                    component_id: name.clone(),
                    component_type: "service",
                    status,
                    observed_value: rec.status,
                    classification: rec.classification,
                    output,
                    disabled_by,
                    consecutive_failures: rec.consecutive_failures,
                    started_at: rec.started_at,
                    last_health_check: rec.last_health_check,
                    time: rec.changed_at,
                }],
            );
        }

        Self {
            status: overall,
            version: "1",
            release_id: env!("CARGO_PKG_VERSION"),
            description: "rvisor service orchestration",
            phase,
            notes,
            checks,
            safety,
            startup,
            time: Utc::now(),
        }
    }

    /// Check entry for one service.
    pub fn check(&self, service: &str) -> Option<&ComponentCheck> {
        self.checks
            .get(&format!("{service}:lifecycle"))
            .and_then(|v| v.first())
    }

    /// Serializes to `application/health+json`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
