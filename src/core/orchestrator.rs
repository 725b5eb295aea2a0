//! # Orchestrator: staged startup, ordered shutdown and the control surface.
//!
//! The [`Orchestrator`] owns the resolved [`StagePlan`], the lifecycle state
//! machine, the event bus (through the machine), the safety coordinator and
//! the health monitor. Control commands are serialized by one async lock.
//!
//! ## Startup
//! ```text
//! for stage in plan.stages():
//!   per service (pre-check):
//!     disabled by safety, or a REQUIRED dependency not HEALTHY ──► SKIPPED (root cause cited)
//!     an OPTIONAL dependency not HEALTHY                       ──► start, end DEGRADED
//!   spawn starts into a JoinSet, all bounded by one stage deadline
//!   after stage 0: health monitor starts
//!   any start timed out        ──► abort: StartupTimeout
//!   failed service with REQUIRED dependents, or CRITICAL / SAFETY_RELATED
//!                              ──► abort: StartupFailed
//!   other failures             ──► logged, startup continues
//!
//! abort:
//!   remaining REGISTERED ──► SKIPPED
//!   monitor stopped, containment finished,
//!   started services stopped most-recent-first (emergency cleanup)
//!   phase = Aborted
//! ```
//!
//! ## Shutdown
//! ```text
//! monitor stop ──► containment finishes its current stop
//!              ──► plan.shutdown_order(start log) ──► stop each (errors collected)
//!              ──► cancel runtime token ──► flush deferred events ──► phase = Stopped
//! ```
//!
//! ## Emergency stop
//! While latched, `start_all`, `recover` and `actuate` are refused with
//! `EmergencyStopActive`. `stop_all`, status reads and the reset itself stay available.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::core::OrchestratorConfig;
use crate::core::builder::Containment;
use crate::core::runner::{Deadline, ServiceRunner, StartOutcome};
use crate::core::shutdown;
use crate::error::{
    EmergencyStopActive, OrchestratorError, SafetyError, ServiceError, ServiceFailure,
    SkippedService, StartupTimeoutError,
};
use crate::events::BusStats;
use crate::graph::StagePlan;
use crate::health::{HealthMonitor, HealthReport, StageTiming, StartupTiming};
use crate::lifecycle::{LifecycleStateMachine, ServiceRecord, Status};
use crate::listeners::{MetricsRecorder, MetricsSnapshot};
use crate::safety::{ResetToken, SafetyCoordinator};
use crate::services::DependencyKind;

/// Where the orchestrator is in its own lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Built, nothing started.
    Idle,
    /// `start_all` in progress.
    Starting,
    /// Startup finished.
    Running,
    /// Startup failed and was cleaned up; only `stop_all` is accepted.
    Aborted,
    /// `stop_all` in progress.
    Stopping,
    /// Shutdown finished.
    Stopped,
}

impl Phase {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Aborted => "aborted",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        }
    }
}

/// Metrics view combining listener counters, bus counters and startup timings.
#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorMetrics {
    /// Orchestrator phase.
    pub phase: Phase,
    /// Event and per-service counters.
    pub events: MetricsSnapshot,
    /// Event bus delivery counters.
    pub bus: BusStats,
    /// Startup timings.
    pub startup: StartupTiming,
}

enum Precheck {
    Start { degraded: Option<String> },
    Skip(SkippedService),
}

struct StageResult {
    failed: Vec<ServiceFailure>,
    timed_out: Vec<String>,
    skipped: Vec<SkippedService>,
}

/// Dependency-aware service orchestrator.
///
/// Built by [`OrchestratorBuilder`](crate::OrchestratorBuilder); shared as `Arc<Orchestrator>`.
pub struct Orchestrator {
    cfg: OrchestratorConfig,
    plan: Arc<StagePlan>,
    runner: ServiceRunner,
    machine: Arc<LifecycleStateMachine>,
    safety: Arc<SafetyCoordinator>,
    monitor: HealthMonitor,
    metrics: Arc<MetricsRecorder>,
    phase: Mutex<Phase>,
    control: tokio::sync::Mutex<()>,
    timing: Mutex<StartupTiming>,
    containment: Mutex<Option<Containment>>,
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new_internal(
        cfg: OrchestratorConfig,
        plan: Arc<StagePlan>,
        runner: ServiceRunner,
        safety: Arc<SafetyCoordinator>,
        monitor: HealthMonitor,
        metrics: Arc<MetricsRecorder>,
        containment: Containment,
    ) -> Self {
        Self {
            cfg,
            plan,
            machine: Arc::clone(&runner.machine),
            runner,
            safety,
            monitor,
            metrics,
            phase: Mutex::new(Phase::Idle),
            control: tokio::sync::Mutex::new(()),
            timing: Mutex::new(StartupTiming::default()),
            containment: Mutex::new(Some(containment)),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: Phase) {
        let mut current = self.phase.lock();
        if *current != phase {
            debug!(from = current.as_str(), to = phase.as_str(), "orchestrator phase");
            *current = phase;
        }
    }

    /// Starts every service stage by stage.
    ///
    /// A second call after success returns `Ok(())` without doing anything.
    ///
    /// # Errors
    /// - `Safety(EmergencyStopActive)` while the latch is set.
    /// - `StartupTimeout` when a stage exceeds `stage_timeout`.
    /// - `StartupFailed` when a blocking failure aborts startup.
    /// - `InvalidPhase` after an aborted startup.
    pub async fn start_all(&self) -> Result<(), OrchestratorError> {
        self.safety.check_control()?;
        let _control = self.control.lock().await;

        match self.phase() {
            Phase::Idle => {}
            Phase::Running => {
                debug!("start_all: already running");
                return Ok(());
            }
            Phase::Stopped => {
                warn!("start_all after stop_all has no effect");
                return Ok(());
            }
            phase @ (Phase::Aborted | Phase::Starting | Phase::Stopping) => {
                return Err(OrchestratorError::InvalidPhase {
                    operation: "start_all",
                    phase: phase.as_str(),
                });
            }
        }

        self.set_phase(Phase::Starting);
        let begun = Instant::now();
        *self.timing.lock() = StartupTiming {
            started_at: Some(Utc::now()),
            total_ms: None,
            stages: Vec::new(),
        };
        info!(
            services = self.plan.len(),
            stages = self.plan.stage_count(),
            "startup begins"
        );

        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        for (index, stage) in self.plan.stages().iter().enumerate() {
            let stage_began = Instant::now();
            let result = self.run_stage(index, stage).await;
            self.timing.lock().stages.push(StageTiming {
                index,
                services: stage.clone(),
                duration_ms: millis(stage_began.elapsed()),
            });
            if index == 0 {
                self.monitor.start();
            }
            skipped.extend(result.skipped);

            if !result.timed_out.is_empty() {
                error!(
                    stage = index,
                    services = ?result.timed_out,
                    "stage timed out; aborting startup"
                );
                self.skip_remaining().await;
                self.abort(begun).await;
                return Err(StartupTimeoutError {
                    stage: index,
                    services: result.timed_out,
                    timeout: self.cfg.stage_timeout,
                }
                .into());
            }

            let blocking = result.failed.iter().any(|f| {
                f.classification.aborts_startup() || self.plan.has_required_dependents(&f.service)
            });
            failed.extend(result.failed);
            if blocking {
                let names: Vec<&str> = failed.iter().map(|f| f.service.as_str()).collect();
                error!(stage = index, failed = ?names, "blocking failure; aborting startup");
                skipped.extend(self.skip_remaining().await);
                self.abort(begun).await;
                return Err(OrchestratorError::StartupFailed { failed, skipped });
            }
        }

        self.timing.lock().total_ms = Some(millis(begun.elapsed()));
        self.set_phase(Phase::Running);
        if failed.is_empty() && skipped.is_empty() {
            info!(elapsed = ?begun.elapsed(), "startup complete");
        } else {
            warn!(
                elapsed = ?begun.elapsed(),
                failed = failed.len(),
                skipped = skipped.len(),
                "startup complete with non-blocking failures"
            );
        }
        Ok(())
    }

    async fn run_stage(&self, index: usize, stage: &[String]) -> StageResult {
        let deadline: Deadline = self
            .cfg
            .stage_deadline()
            .map(|limit| (Instant::now() + limit, limit));
        let mut result = StageResult {
            failed: Vec::new(),
            timed_out: Vec::new(),
            skipped: Vec::new(),
        };

        let mut set = JoinSet::new();
        for name in stage {
            match self.precheck(name) {
                Precheck::Skip(skip) => {
                    self.mark_skipped(&skip).await;
                    result.skipped.push(skip);
                }
                Precheck::Start { degraded } => {
                    if let Some(reason) = &degraded {
                        warn!(
                            service = %name,
                            reason = %reason,
                            "starting without optional dependency"
                        );
                    }
                    set.spawn(self.runner.clone().start(name.clone(), deadline, degraded));
                }
            }
        }
        debug!(stage = index, launched = set.len(), "stage launched");

        while let Some(joined) = set.join_next().await {
            let (name, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(stage = index, error = %e, "start task did not complete");
                    continue;
                }
            };
            match outcome {
                StartOutcome::Up(_) => {
                    if let Some(dependency) = self.safety.disabled_by(&name) {
                        warn!(
                            service = %name,
                            dependency = %dependency,
                            "disabled while starting; stopping"
                        );
                        let stopped = self.runner.stop(&name, "disabled by safety coordinator").await;
                        if let Err(f) = stopped {
                            warn!(service = %name, error = %f, "stop after disable failed");
                        }
                    }
                }
                StartOutcome::Failed(ServiceError::Timeout { .. }) => result.timed_out.push(name),
                StartOutcome::Failed(err) => result.failed.push(self.failure(&name, err)),
            }
        }
        result.timed_out.sort();
        result.failed.sort_by(|a, b| a.service.cmp(&b.service));
        result
    }

    fn failure(&self, name: &str, err: ServiceError) -> ServiceFailure {
        let rec = self.machine.record(name);
        ServiceFailure {
            service: name.to_string(),
            classification: rec
                .as_ref()
                .map(|r| r.classification)
                .unwrap_or_default(),
            reason: rec
                .and_then(|r| r.last_failure)
                .unwrap_or_else(|| err.to_string()),
        }
    }

    fn precheck(&self, name: &str) -> Precheck {
        if let Some(dependency) = self.safety.disabled_by(name) {
            let root_cause = self.trace_root(&dependency);
            return Precheck::Skip(SkippedService {
                service: name.to_string(),
                dependency: Some(dependency),
                root_cause,
            });
        }
        if let Some(dependency) = self.unready_dependency(name, DependencyKind::Required) {
            let root_cause = self.trace_root(&dependency);
            return Precheck::Skip(SkippedService {
                service: name.to_string(),
                dependency: Some(dependency),
                root_cause,
            });
        }
        let degraded = self
            .unready_dependency(name, DependencyKind::Optional)
            .map(|dep| {
                let status = self
                    .machine
                    .status_of(&dep)
                    .map_or("unknown", |s| s.as_str());
                format!("optional dependency '{dep}' unavailable ({status})")
            });
        Precheck::Start { degraded }
    }

    /// First dependency of `kind` that is not HEALTHY.
    fn unready_dependency(&self, name: &str, kind: DependencyKind) -> Option<String> {
        self.plan
            .dependencies_of_kind(name, kind)
            .find(|dep| self.machine.status_of(dep) != Some(Status::Healthy))
            .map(str::to_string)
    }

    /// Follows SKIPPED services down their REQUIRED edges to the service that caused the skip.
    fn trace_root(&self, service: &str) -> String {
        let mut current = service.to_string();
        while self.machine.status_of(&current) == Some(Status::Skipped) {
            match self.unready_dependency(&current, DependencyKind::Required) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    async fn mark_skipped(&self, skip: &SkippedService) {
        let reason = match &skip.dependency {
            Some(dep) if *dep == skip.root_cause => format!("dependency '{dep}' failed"),
            Some(dep) => format!(
                "dependency '{dep}' unavailable (root cause: '{}')",
                skip.root_cause
            ),
            None => format!("startup aborted ({})", skip.root_cause),
        };
        let mut meta = BTreeMap::from([("root_cause".to_string(), skip.root_cause.clone())]);
        if let Some(dep) = &skip.dependency {
            meta.insert("dependency".to_string(), dep.clone());
        }
        warn!(service = %skip.service, reason = %reason, "service skipped");
        if let Err(e) = self
            .machine
            .transition_with(&skip.service, Status::Skipped, reason, meta)
            .await
        {
            debug!(service = %skip.service, error = %e, "skip transition rejected");
        }
    }

    /// Marks every still REGISTERED service SKIPPED, in stage order.
    async fn skip_remaining(&self) -> Vec<SkippedService> {
        let mut out = Vec::new();
        for name in self.plan.stages().iter().flatten() {
            if self.machine.status_of(name) != Some(Status::Registered) {
                continue;
            }
            let skip = match self.precheck(name) {
                Precheck::Skip(skip) => skip,
                Precheck::Start { .. } => SkippedService {
                    service: name.clone(),
                    dependency: None,
                    root_cause: "blocking failure in an earlier stage".to_string(),
                },
            };
            self.mark_skipped(&skip).await;
            out.push(skip);
        }
        out
    }

    /// Ends containment so no disabled service is still stopping when the
    /// ordered shutdown walk begins.
    async fn finish_containment(&self) {
        let containment = self.containment.lock().take();
        if let Some(containment) = containment {
            containment.finish().await;
        }
    }

    /// Emergency cleanup after a failed startup.
    async fn abort(&self, begun: Instant) {
        self.monitor.stop().await;
        self.finish_containment().await;
        for name in self.runner.started_lifo() {
            if let Err(f) = self.runner.stop(&name, "emergency cleanup").await {
                warn!(service = %name, error = %f, "emergency cleanup stop failed");
            }
        }
        self.timing.lock().total_ms = Some(millis(begun.elapsed()));
        self.set_phase(Phase::Aborted);
    }

    /// Stops every registered service, stages in reverse and most recent start first within a stage.
    ///
    /// A second call returns `Ok(())`. Allowed while emergency stop is latched.
    ///
    /// # Errors
    /// `ShutdownIncomplete` listing the stop routines that failed; all services still end STOPPED.
    pub async fn stop_all(&self) -> Result<(), OrchestratorError> {
        let _control = self.control.lock().await;
        if self.phase() == Phase::Stopped {
            debug!("stop_all: already stopped");
            return Ok(());
        }
        self.set_phase(Phase::Stopping);
        self.monitor.stop().await;
        self.finish_containment().await;

        let order = self.plan.shutdown_order(&self.runner.start_log());
        info!(services = order.len(), "shutdown begins");
        let mut errors = Vec::new();
        for name in &order {
            if let Err(failure) = self.runner.stop(name, "shutdown").await {
                errors.push(failure);
            }
        }

        self.runner.cancel_all();
        self.machine.bus().flush().await;
        self.set_phase(Phase::Stopped);

        if errors.is_empty() {
            info!("shutdown complete");
            Ok(())
        } else {
            warn!(failed = errors.len(), "shutdown finished with errors");
            Err(OrchestratorError::ShutdownIncomplete { errors })
        }
    }

    /// Restarts a FAILED service using the configured [`RecoveryPolicy`](crate::RecoveryPolicy).
    ///
    /// Returns the status reached (HEALTHY or DEGRADED).
    ///
    /// # Errors
    /// - `Safety(..)` when emergency stop is latched or the service is disabled.
    /// - `NotRecoverable` when the service is not FAILED.
    /// - `InvalidPhase` outside [`Phase::Running`].
    /// - `DependencyUnavailable` when a REQUIRED dependency is not HEALTHY.
    /// - `RecoveryFailed` once every attempt failed.
    pub async fn recover(&self, name: &str) -> Result<Status, OrchestratorError> {
        self.safety.check_control()?;
        let _control = self.control.lock().await;

        let rec = self.record_or_unknown(name)?;
        if let Some(dependency) = self.safety.disabled_by(name) {
            return Err(SafetyError::FeatureDisabled {
                service: name.to_string(),
                dependency,
            }
            .into());
        }
        if rec.status != Status::Failed {
            return Err(OrchestratorError::NotRecoverable {
                service: name.to_string(),
                status: rec.status,
            });
        }
        let phase = self.phase();
        if phase != Phase::Running {
            return Err(OrchestratorError::InvalidPhase {
                operation: "recover",
                phase: phase.as_str(),
            });
        }
        if let Some(dependency) = self.unready_dependency(name, DependencyKind::Required) {
            let status = self.machine.status_of(&dependency).map_or("unknown", |s| s.as_str());
            return Err(OrchestratorError::DependencyUnavailable {
                service: name.to_string(),
                dependency,
                detail: format!("status {status}"),
            });
        }

        let degraded = match self.precheck(name) {
            Precheck::Start { degraded } => degraded,
            Precheck::Skip(_) => None,
        };
        let policy = self.cfg.recovery;
        let mut attempts = 0;
        let mut last = String::new();
        for attempt in 1..=policy.attempts() {
            if attempt > 1 {
                let delay = policy.backoff.next(attempt - 2);
                debug!(service = name, attempt, ?delay, "recovery backoff");
                tokio::time::sleep(delay).await;
            }
            attempts = attempt;
            info!(service = name, attempt, "recovery attempt");
            let deadline: Deadline = self
                .cfg
                .stage_deadline()
                .map(|limit| (Instant::now() + limit, limit));
            match self.runner.start_one(name, deadline, degraded.clone()).await {
                StartOutcome::Up(status) => {
                    info!(service = name, attempt, %status, "service recovered");
                    return Ok(status);
                }
                StartOutcome::Failed(err) => {
                    last = err.to_string();
                    if !err.is_retryable() {
                        warn!(service = name, error = %err, "fatal error; recovery abandoned");
                        break;
                    }
                }
            }
        }
        Err(OrchestratorError::RecoveryFailed {
            service: name.to_string(),
            attempts,
            reason: last,
        })
    }

    /// Runs an actuation command on `service` once every safety check passes.
    ///
    /// # Errors
    /// `UnknownService`, `Safety(..)` (emergency stop, frozen path, disabled
    /// feature, safe mode) or `ServiceUnavailable` when the service is not up.
    pub async fn actuate<F, Fut, T>(
        &self,
        service: &str,
        command: F,
    ) -> Result<T, OrchestratorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.check_actuation(service)?;
        Ok(command().await)
    }

    /// The checks [`actuate`](Self::actuate) performs, without running anything.
    pub fn check_actuation(&self, service: &str) -> Result<(), OrchestratorError> {
        let rec = self.record_or_unknown(service)?;
        self.safety.check_actuation(service)?;
        if !rec.status.is_up() {
            return Err(OrchestratorError::ServiceUnavailable {
                service: service.to_string(),
                status: rec.status,
            });
        }
        Ok(())
    }

    /// Lazily checks a RUNTIME (or any) dependency before `service` uses it.
    ///
    /// # Errors
    /// `DependencyUnavailable` when `dependency` is unknown, not up, or disabled.
    pub fn require_runtime(
        &self,
        service: &str,
        dependency: &str,
    ) -> Result<(), OrchestratorError> {
        let unavailable = |detail: String| OrchestratorError::DependencyUnavailable {
            service: service.to_string(),
            dependency: dependency.to_string(),
            detail,
        };
        let Some(status) = self.machine.status_of(dependency) else {
            return Err(unavailable("not registered".to_string()));
        };
        if let Some(root) = self.safety.disabled_by(dependency) {
            return Err(unavailable(format!("disabled because '{root}' failed")));
        }
        if !status.is_up() {
            return Err(unavailable(format!("status {status}")));
        }
        Ok(())
    }

    /// Records for one service (`Some(name)`) or for all of them.
    ///
    /// # Errors
    /// `UnknownService` when `service` names nothing.
    pub fn get_status(
        &self,
        service: Option<&str>,
    ) -> Result<BTreeMap<String, ServiceRecord>, OrchestratorError> {
        match service {
            None => Ok(self.machine.snapshot_all()),
            Some(name) => {
                let rec = self.record_or_unknown(name)?;
                Ok(BTreeMap::from([(name.to_string(), rec)]))
            }
        }
    }

    /// Current status of one service.
    pub fn status_of(&self, service: &str) -> Option<Status> {
        self.machine.status_of(service)
    }

    /// Records a heartbeat on behalf of `service`.
    pub fn heartbeat(&self, service: &str) -> Result<(), OrchestratorError> {
        if self.machine.record_heartbeat(service) {
            Ok(())
        } else {
            Err(OrchestratorError::UnknownService {
                name: service.to_string(),
            })
        }
    }

    fn record_or_unknown(&self, name: &str) -> Result<ServiceRecord, OrchestratorError> {
        self.machine
            .record(name)
            .ok_or_else(|| OrchestratorError::UnknownService {
                name: name.to_string(),
            })
    }

    /// Latches emergency stop. Idempotent; the first reason is kept.
    pub fn trip_emergency_stop(&self, reason: impl Into<String>) -> EmergencyStopActive {
        self.safety.trip_emergency_stop(reason)
    }

    /// Clears emergency stop if `token` is accepted.
    pub fn reset_emergency_stop(&self, token: &ResetToken) -> Result<(), OrchestratorError> {
        Ok(self.safety.reset_emergency_stop(token)?)
    }

    /// Leaves safe shutdown and clears frozen paths and disabled features.
    ///
    /// Services already stopped by containment stay stopped.
    pub fn reset_safe_state(&self, token: &ResetToken) -> Result<(), OrchestratorError> {
        Ok(self.safety.reset_safe_state(token)?)
    }

    /// Aggregate `application/health+json` document.
    pub fn health_report(&self) -> HealthReport {
        HealthReport::build(
            &self.machine.snapshot_all(),
            self.safety.snapshot(),
            self.timing.lock().clone(),
            self.phase().as_str(),
        )
    }

    /// Counters and timings.
    pub fn metrics(&self) -> OrchestratorMetrics {
        OrchestratorMetrics {
            phase: self.phase(),
            events: self.metrics.snapshot(),
            bus: self.machine.bus().stats(),
            startup: self.timing.lock().clone(),
        }
    }

    /// Waits until every deferred event queued so far has been delivered.
    pub async fn flush_events(&self) {
        self.machine.bus().flush().await;
    }

    /// The resolved plan.
    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// The lifecycle state machine.
    pub fn lifecycle(&self) -> &Arc<LifecycleStateMachine> {
        &self.machine
    }

    /// The safety coordinator.
    pub fn safety(&self) -> &Arc<SafetyCoordinator> {
        &self.safety
    }

    /// Health monitor handle.
    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Starts everything, waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then stops.
    ///
    /// On a startup failure the remaining services are stopped and the
    /// startup error is returned.
    pub async fn run_until_signal(&self) -> Result<(), OrchestratorError> {
        if let Err(err) = self.start_all().await {
            if let Err(stop_err) = self.stop_all().await {
                warn!(error = %stop_err, "stop after failed startup reported errors");
            }
            return Err(err);
        }

        let waited = shutdown::wait_for_shutdown_signal().await;
        match &waited {
            Ok(signal) => info!(signal = *signal, "shutdown signal received"),
            Err(e) => error!(error = %e, "signal handling failed; shutting down"),
        }
        self.stop_all().await?;
        waited
            .map(|_| ())
            .map_err(|e| OrchestratorError::Signal(e.to_string()))
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.runner.cancel_all();
        if let Some(containment) = self.containment.get_mut().take() {
            containment.stop.cancel();
            containment.task.abort();
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase())
            .field("services", &self.plan.len())
            .field("stages", &self.plan.stage_count())
            .finish_non_exhaustive()
    }
}
