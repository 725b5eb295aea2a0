//! # Start or stop one service.
//!
//! [`ServiceRunner`] owns everything needed to drive a single service through
//! its lifecycle and is cheap to clone into spawned stage tasks.
//!
//! ## Start
//! ```text
//! REGISTERED/FAILED ──► STARTING
//!   child token of runtime token, ServiceContext { token, heartbeat }
//!   svc.start(ctx) bounded by the stage deadline, panics caught
//!     Ok         ──► HEALTHY (or DEGRADED when an optional dependency is down)
//!     Err / panic ──► cancel token ──► FAILED (reason = error)
//!     deadline   ──► cancel token ──► FAILED ("StartupTimeout: ...")
//! ```
//!
//! ## Stop
//! ```text
//! HEALTHY/DEGRADED/FAILED(started) ──► STOPPING ──► svc.stop() bounded ──► cancel token ──► STOPPED
//! REGISTERED/SKIPPED/FAILED(never started) ──────────────────────────────────────────────► STOPPED
//! ```
//! A failing stop routine still ends in STOPPED; the error is returned to the caller.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ServiceError, ServiceFailure};
use crate::events::panic_message;
use crate::lifecycle::{LifecycleStateMachine, Status};
use crate::services::{Heartbeat, ServiceContext, ServiceDescriptor};

/// Stage deadline: absolute instant plus the configured length for error messages.
pub(super) type Deadline = Option<(Instant, Duration)>;

/// Result of one start attempt.
#[derive(Debug)]
pub(super) enum StartOutcome {
    Up(Status),
    Failed(ServiceError),
}

#[derive(Clone)]
pub(super) struct ServiceRunner {
    pub(super) machine: Arc<LifecycleStateMachine>,
    descriptors: Arc<HashMap<String, ServiceDescriptor>>,
    runtime_token: CancellationToken,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    start_log: Arc<Mutex<Vec<String>>>,
    stop_timeout: Option<Duration>,
}

impl ServiceRunner {
    pub(super) fn new(
        machine: Arc<LifecycleStateMachine>,
        descriptors: HashMap<String, ServiceDescriptor>,
        stop_timeout: Option<Duration>,
    ) -> Self {
        Self {
            machine,
            descriptors: Arc::new(descriptors),
            runtime_token: CancellationToken::new(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
            start_log: Arc::new(Mutex::new(Vec::new())),
            stop_timeout,
        }
    }

    /// Names in the order their start routines succeeded (repeats on recovery).
    pub(super) fn start_log(&self) -> Vec<String> {
        self.start_log.lock().clone()
    }

    /// Distinct started services, most recent start first.
    pub(super) fn started_lifo(&self) -> Vec<String> {
        let log = self.start_log.lock();
        let mut seen = Vec::with_capacity(log.len());
        for name in log.iter().rev() {
            if !seen.contains(name) {
                seen.push(name.clone());
            }
        }
        seen
    }

    pub(super) fn cancel_all(&self) {
        self.runtime_token.cancel();
    }

    /// Owned variant for `JoinSet::spawn`.
    pub(super) async fn start(
        self,
        name: String,
        deadline: Deadline,
        degraded: Option<String>,
    ) -> (String, StartOutcome) {
        let outcome = self.start_one(&name, deadline, degraded).await;
        (name, outcome)
    }

    pub(super) async fn start_one(
        &self,
        name: &str,
        deadline: Deadline,
        degraded: Option<String>,
    ) -> StartOutcome {
        let Some(desc) = self.descriptors.get(name) else {
            return StartOutcome::Failed(ServiceError::fatal(format!("unknown service '{name}'")));
        };
        if let Err(e) = self
            .machine
            .transition(name, Status::Starting, "start requested")
            .await
        {
            warn!(service = name, error = %e, "cannot enter STARTING");
            return StartOutcome::Failed(ServiceError::fatal(e));
        }

        let token = self.runtime_token.child_token();
        let previous = self.tokens.lock().insert(name.to_string(), token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        let ctx = ServiceContext::new(
            desc.name_arc(),
            token.clone(),
            Heartbeat::new(desc.name_arc(), &self.machine),
        );

        let began = Instant::now();
        let run = AssertUnwindSafe(desc.service().start(ctx)).catch_unwind();
        let caught = match deadline {
            Some((at, limit)) => match time::timeout_at(at, run).await {
                Ok(caught) => caught,
                Err(_elapsed) => Ok(Err(ServiceError::Timeout { timeout: limit })),
            },
            None => run.await,
        };
        let result = caught.unwrap_or_else(|panic| {
            Err(ServiceError::fatal(format!(
                "start panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

        match result {
            Ok(()) => {
                let (to, reason) = match degraded {
                    Some(reason) => (Status::Degraded, reason),
                    None => (Status::Healthy, "started".to_string()),
                };
                match self.machine.transition(name, to, reason).await {
                    Ok(_) => {
                        self.start_log.lock().push(name.to_string());
                        info!(
                            service = name,
                            status = %to,
                            elapsed = ?began.elapsed(),
                            "service started"
                        );
                        StartOutcome::Up(to)
                    }
                    Err(e) => {
                        token.cancel();
                        warn!(
                            service = name,
                            error = %e,
                            "start finished but transition was rejected"
                        );
                        StartOutcome::Failed(ServiceError::fatal(e))
                    }
                }
            }
            Err(err) => {
                token.cancel();
                let reason = match &err {
                    ServiceError::Timeout { timeout } => {
                        format!("StartupTimeout: start did not complete within {timeout:?}")
                    }
                    other => other.to_string(),
                };
                error!(service = name, error = %err, "service failed to start");
                let meta = BTreeMap::from([("cause".to_string(), err.as_label().to_string())]);
                if let Err(e) = self
                    .machine
                    .transition_with(name, Status::Failed, reason, meta)
                    .await
                {
                    debug!(service = name, error = %e, "failed transition skipped");
                }
                StartOutcome::Failed(err)
            }
        }
    }

    /// Stops one service. See the module docs for the transitions taken.
    pub(super) async fn stop(&self, name: &str, reason: &str) -> Result<(), ServiceFailure> {
        let Some(rec) = self.machine.record(name) else {
            return Ok(());
        };
        let Some(desc) = self.descriptors.get(name) else {
            return Ok(());
        };

        match rec.status {
            Status::Stopped | Status::Stopping => return Ok(()),
            Status::Registered | Status::Skipped => {
                self.finish(name, "never started").await;
                return Ok(());
            }
            Status::Failed if !rec.has_started() => {
                self.cancel_token(name);
                self.finish(name, "never started").await;
                return Ok(());
            }
            Status::Starting => {
                self.cancel_token(name);
                let _ = self
                    .machine
                    .transition(name, Status::Failed, "stopped while starting")
                    .await;
                self.finish(name, reason).await;
                return Ok(());
            }
            Status::Healthy | Status::Degraded | Status::Failed => {}
        }

        if let Err(e) = self.machine.transition(name, Status::Stopping, reason).await {
            debug!(service = name, error = %e, "already being stopped");
            return Ok(());
        }

        let limit = desc.stop_timeout().or(self.stop_timeout);
        let run = AssertUnwindSafe(desc.service().stop()).catch_unwind();
        let caught = match limit {
            Some(limit) => match time::timeout(limit, run).await {
                Ok(caught) => caught,
                Err(_elapsed) => Ok(Err(ServiceError::Timeout { timeout: limit })),
            },
            None => run.await,
        };
        let result = caught.unwrap_or_else(|panic| {
            Err(ServiceError::fatal(format!(
                "stop panicked: {}",
                panic_message(panic.as_ref())
            )))
        });
        self.cancel_token(name);

        match result {
            Ok(()) => {
                self.finish(name, reason).await;
                Ok(())
            }
            Err(err) => {
                warn!(service = name, error = %err, "stop routine failed");
                self.finish(name, &format!("stop failed: {err}")).await;
                Err(ServiceFailure {
                    service: name.to_string(),
                    classification: desc.classification(),
                    reason: err.to_string(),
                })
            }
        }
    }

    fn cancel_token(&self, name: &str) {
        let token = self.tokens.lock().remove(name);
        if let Some(token) = token {
            token.cancel();
        }
    }

    async fn finish(&self, name: &str, reason: &str) {
        if let Err(e) = self.machine.transition(name, Status::Stopped, reason).await {
            debug!(service = name, error = %e, "stopped transition skipped");
        }
    }
}
