use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::OrchestratorConfig;
use crate::core::orchestrator::Orchestrator;
use crate::core::runner::ServiceRunner;
use crate::error::RegistrationError;
use crate::events::{EventBus, Listener, SAFETY_PRIORITY};
use crate::graph::resolve;
use crate::health::{HealthMonitor, MonitorSettings};
use crate::lifecycle::LifecycleStateMachine;
use crate::listeners::{LogWriter, MetricsRecorder};
use crate::safety::{Authorizer, ContainmentRequest, DenyAll, SafetyCoordinator};
use crate::services::ServiceDescriptor;

/// Collects descriptors, listeners and the reset authorizer, then builds an [`Orchestrator`].
///
/// Registration is closed once [`build`](Self::build) runs.
pub struct OrchestratorBuilder {
    cfg: OrchestratorConfig,
    descriptors: Vec<ServiceDescriptor>,
    listeners: Vec<Arc<dyn Listener>>,
    authorizer: Arc<dyn Authorizer>,
}

impl OrchestratorBuilder {
    /// Empty builder. Resets are denied until [`with_authorizer`](Self::with_authorizer) is called.
    pub fn new(cfg: OrchestratorConfig) -> Self {
        Self {
            cfg,
            descriptors: Vec::new(),
            listeners: Vec::new(),
            authorizer: Arc::new(DenyAll),
        }
    }

    /// Adds one service.
    pub fn register(mut self, descriptor: ServiceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Adds several services.
    pub fn with_services(
        mut self,
        descriptors: impl IntoIterator<Item = ServiceDescriptor>,
    ) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Adds a listener. Ordering among listeners follows [`Listener::priority`].
    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Authorizer consulted by emergency-stop and safe-state resets.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Resolves the dependency graph and wires every component.
    ///
    /// Must be called inside a tokio runtime (the event bus worker and the
    /// containment task are spawned here). Nothing is started.
    ///
    /// # Errors
    /// Any [`RegistrationError`]: duplicate names, cycles, missing REQUIRED targets.
    pub fn build(self) -> Result<Arc<Orchestrator>, RegistrationError> {
        let plan = match resolve(&self.descriptors) {
            Ok(plan) => Arc::new(plan),
            Err(e) => {
                error!(error = %e, label = e.as_label(), "registration rejected");
                return Err(e);
            }
        };

        let classes = self
            .descriptors
            .iter()
            .map(|d| (d.name().to_string(), d.classification()))
            .collect();
        let (contain_tx, contain_rx) = mpsc::unbounded_channel();
        let safety = Arc::new(SafetyCoordinator::new(
            Arc::clone(&plan),
            classes,
            self.authorizer,
            Some(contain_tx),
        ));
        let metrics = Arc::new(MetricsRecorder::new());

        let mut listeners: Vec<Arc<dyn Listener>> = Vec::with_capacity(self.listeners.len() + 3);
        // Safety first: the bus sort is stable and nothing sorts below SAFETY_PRIORITY.
        listeners.push(Arc::clone(&safety) as Arc<dyn Listener>);
        for l in self.listeners {
            if l.priority() == SAFETY_PRIORITY {
                warn!(
                    listener = l.name(),
                    "listener shares the safety priority; it runs after the safety coordinator"
                );
            }
            listeners.push(l);
        }
        listeners.push(Arc::clone(&metrics) as Arc<dyn Listener>);
        if self.cfg.log_events {
            listeners.push(Arc::new(LogWriter));
        }
        let bus = Arc::new(EventBus::new(listeners, self.cfg.event_queue_capacity_clamped()));
        debug!(listeners = ?bus.listener_names(), "event bus ready");

        let machine = Arc::new(LifecycleStateMachine::new(bus));
        for d in &self.descriptors {
            machine.register(d.name(), d.classification());
        }

        let monitor = HealthMonitor::new(
            Arc::clone(&machine),
            &self.descriptors,
            MonitorSettings {
                tick: self.cfg.health_tick_clamped(),
                check_timeout: self.cfg.health_check_deadline(),
                failure_threshold: self.cfg.failure_threshold_clamped(),
            },
        );

        let descriptors: HashMap<String, ServiceDescriptor> = self
            .descriptors
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect();
        let runner = ServiceRunner::new(machine, descriptors, self.cfg.stop_deadline());
        let stop = CancellationToken::new();
        let containment = Containment {
            task: tokio::spawn(contain(runner.clone(), contain_rx, stop.clone())),
            stop,
        };

        info!(
            services = plan.len(),
            stages = plan.stage_count(),
            "orchestrator built"
        );
        Ok(Arc::new(Orchestrator::new_internal(
            self.cfg,
            plan,
            runner,
            safety,
            monitor,
            metrics,
            containment,
        )))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

/// Handle to the containment task.
pub(super) struct Containment {
    pub(super) task: JoinHandle<()>,
    pub(super) stop: CancellationToken,
}

impl Containment {
    /// Lets an in-flight containment stop reach STOPPED, then ends the task.
    pub(super) async fn finish(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "containment task did not complete");
        }
    }
}

/// Stops services the safety coordinator disabled while they were up.
///
/// Services not yet started are left to the startup pre-check, which skips them.
/// `stop` is only observed between requests.
async fn contain(
    runner: ServiceRunner,
    mut rx: mpsc::UnboundedReceiver<ContainmentRequest>,
    stop: CancellationToken,
) {
    loop {
        let req = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };
        let up = runner
            .machine
            .status_of(&req.service)
            .is_some_and(|s| s.is_up());
        if !up {
            debug!(service = %req.service, "containment: not running");
            continue;
        }
        warn!(
            service = %req.service,
            dependency = %req.dependency,
            "containment: stopping disabled service"
        );
        let reason = format!("disabled: dependency '{}' failed", req.dependency);
        if let Err(f) = runner.stop(&req.service, &reason).await {
            error!(service = %req.service, error = %f, "containment stop failed");
        }
    }
    debug!("containment finished");
}
