use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

use crate::lifecycle::LifecycleStateMachine;

/// Handle a running service uses to prove it is alive.
///
/// Cheap to clone; move it into the service's background tasks.
#[derive(Clone, Debug)]
pub struct Heartbeat {
    service: Arc<str>,
    machine: Weak<LifecycleStateMachine>,
}

impl Heartbeat {
    pub(crate) fn new(service: Arc<str>, machine: &Arc<LifecycleStateMachine>) -> Self {
        Self {
            service,
            machine: Arc::downgrade(machine),
        }
    }

    /// Records a heartbeat. Returns `false` once the orchestrator is gone.
    pub fn beat(&self) -> bool {
        match self.machine.upgrade() {
            Some(m) => m.record_heartbeat(&self.service),
            None => false,
        }
    }
}

/// Passed to [`Service::start`](crate::Service::start).
///
/// The token is cancelled after the service's stop routine returns, when its
/// start times out, or when the orchestrator shuts down.
#[derive(Clone, Debug)]
pub struct ServiceContext {
    name: Arc<str>,
    token: CancellationToken,
    heartbeat: Heartbeat,
}

impl ServiceContext {
    pub(crate) fn new(name: Arc<str>, token: CancellationToken, heartbeat: Heartbeat) -> Self {
        Self {
            name,
            token,
            heartbeat,
        }
    }

    /// Name the service was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancellation token scoped to this run of the service.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Heartbeat handle for the watchdog.
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    /// Shorthand for `heartbeat().beat()`.
    pub fn beat(&self) -> bool {
        self.heartbeat.beat()
    }

    /// `true` once the token is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
