//! # Health monitor and heartbeat watchdog
//!
//! One background task evaluates every up (HEALTHY / DEGRADED) service once per tick.
//!
//! ```text
//! every tick:
//!   watchdog pass (services with heartbeat_timeout)
//!     now - last_heartbeat > timeout ──► FAILED "WatchdogTimeout"
//!   health-check pass (concurrently, each bounded by check timeout)
//!     Healthy    ──► reset counter; DEGRADED → HEALTHY
//!     Degraded   ──► reset counter; HEALTHY → DEGRADED
//!     Unhealthy  ─┐
//!     timed out  ─┴► counter += 1; counter >= threshold ──► FAILED
//!     None       ──► not checked
//! ```
//!
//! Ticks never overlap: stopping the monitor waits for the tick in progress.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lifecycle::{LifecycleStateMachine, Status};
use crate::services::{ServiceDescriptor, ServiceRef};

use super::HealthStatus;

/// Timing knobs for the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Evaluation period.
    pub tick: Duration,
    /// Bound on one health-check call (`None` = unbounded).
    pub check_timeout: Option<Duration>,
    /// Consecutive failures before FAILED (min 1).
    pub failure_threshold: u32,
}

/// What one evaluation pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Services whose health check was invoked and returned a result.
    pub checked: Vec<String>,
    /// Services moved to FAILED by the health check.
    pub failed: Vec<String>,
    /// Services moved to FAILED by the watchdog.
    pub watchdog_expired: Vec<String>,
}

struct Monitored {
    name: Arc<str>,
    service: ServiceRef,
    heartbeat_timeout: Option<Duration>,
}

enum Probe {
    Reported(HealthStatus),
    TimedOut(Duration),
}

struct Inner {
    machine: Arc<LifecycleStateMachine>,
    services: Vec<Monitored>,
    settings: MonitorSettings,
}

/// Periodic health evaluation of running services.
pub struct HealthMonitor {
    inner: Arc<Inner>,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl HealthMonitor {
    /// Creates a stopped monitor for `descriptors`.
    pub fn new(
        machine: Arc<LifecycleStateMachine>,
        descriptors: &[ServiceDescriptor],
        settings: MonitorSettings,
    ) -> Self {
        let services = descriptors
            .iter()
            .map(|d| Monitored {
                name: d.name_arc(),
                service: Arc::clone(d.service()),
                heartbeat_timeout: d.heartbeat_timeout(),
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                machine,
                services,
                settings,
            }),
            running: Mutex::new(None),
        }
    }

    /// Spawns the monitor loop. Returns `false` if it is already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }
        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let loop_token = token.clone();
        let period = self.inner.settings.tick.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = interval.tick() => {
                        inner.tick().await;
                    }
                }
            }
            debug!("health monitor stopped");
        });

        info!(tick = ?period, services = self.inner.services.len(), "health monitor started");
        *running = Some((token, handle));
        true
    }

    /// Stops the loop and waits for the current tick to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some((token, handle)) = running {
            token.cancel();
            let _ = handle.await;
        }
    }

    /// `true` while the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Runs one evaluation pass immediately.
    pub async fn run_once(&self) -> TickSummary {
        self.inner.tick().await
    }
}

impl Inner {
    async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();
        let now = Instant::now();

        for m in &self.services {
            let Some(limit) = m.heartbeat_timeout else {
                continue;
            };
            let Some(rec) = self.machine.record(&m.name) else {
                continue;
            };
            let Some(last) = rec.last_heartbeat else {
                continue;
            };
            if !rec.status.is_up() {
                continue;
            }
            let silent = now.saturating_duration_since(last);
            if silent <= limit {
                continue;
            }
            let reason = format!("WatchdogTimeout: no heartbeat for {silent:?} (limit {limit:?})");
            let meta = BTreeMap::from([
                ("cause".to_string(), "watchdog_timeout".to_string()),
                ("silent_ms".to_string(), silent.as_millis().to_string()),
                ("limit_ms".to_string(), limit.as_millis().to_string()),
            ]);
            warn!(service = %m.name, ?silent, ?limit, "heartbeat watchdog expired");
            match self
                .machine
                .transition_with(&m.name, Status::Failed, reason, meta)
                .await
            {
                Ok(_) => summary.watchdog_expired.push(m.name.to_string()),
                Err(e) => debug!(service = %m.name, error = %e, "watchdog transition skipped"),
            }
        }

        let probes = self
            .services
            .iter()
            .filter(|m| {
                self.machine
                    .status_of(&m.name)
                    .is_some_and(|s| s.is_up())
            })
            .map(|m| async move { (m, self.probe(m).await) });

        for (m, probe) in join_all(probes).await {
            let Some(probe) = probe else { continue };
            summary.checked.push(m.name.to_string());
            if self.apply(m, probe).await {
                summary.failed.push(m.name.to_string());
            }
        }
        summary
    }

    async fn probe(&self, m: &Monitored) -> Option<Probe> {
        let fut = m.service.health_check();
        match self.settings.check_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(reported) => reported.map(Probe::Reported),
                Err(_) => Some(Probe::TimedOut(limit)),
            },
            None => fut.await.map(Probe::Reported),
        }
    }

    /// Returns `true` when the service was moved to FAILED.
    async fn apply(&self, m: &Monitored, probe: Probe) -> bool {
        let name = m.name.as_ref();
        let Some(current) = self.machine.status_of(name) else {
            return false;
        };
        if !current.is_up() {
            return false;
        }

        let problem = match probe {
            Probe::Reported(HealthStatus::Healthy) => {
                self.machine.record_check(name, true);
                if current == Status::Degraded {
                    self.try_transition(name, Status::Healthy, "health check passed".to_string())
                        .await;
                }
                return false;
            }
            Probe::Reported(HealthStatus::Degraded(reason)) => {
                self.machine.record_check(name, true);
                if current == Status::Healthy {
                    self.try_transition(name, Status::Degraded, reason).await;
                }
                return false;
            }
            Probe::Reported(HealthStatus::Unhealthy(reason)) => reason,
            Probe::TimedOut(limit) => format!("health check timed out after {limit:?}"),
        };

        let failures = self.machine.record_check(name, false);
        let threshold = self.settings.failure_threshold.max(1);
        if failures < threshold {
            warn!(service = name, failures, threshold, problem = %problem, "health check failed");
            return false;
        }
        self.try_transition(
            name,
            Status::Failed,
            format!("health check failed {failures} time(s): {problem}"),
        )
        .await
    }

    async fn try_transition(&self, name: &str, to: Status, reason: String) -> bool {
        match self.machine.transition(name, to, reason).await {
            Ok(_) => true,
            Err(e) => {
                debug!(service = name, %to, error = %e, "health transition skipped");
                false
            }
        }
    }
}
