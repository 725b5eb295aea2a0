//! Error types used by the orchestrator, the state machine, the safety layer
//! and the services themselves.
//!
//! - [`RegistrationError`] / [`DependencyMissingError`]: raised while resolving
//!   descriptors, before any service runs. Never retried.
//! - [`TransitionError`] / [`IllegalTransitionError`]: rejected lifecycle mutations.
//! - [`SafetyError`] / [`EmergencyStopActive`]: commands refused by the safety coordinator.
//! - [`ServiceError`]: results reported by service collaborators.
//! - [`OrchestratorError`]: umbrella returned by the control surface.
//!
//! Every enum exposes `as_label()` (stable snake_case, for logs/metrics).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::lifecycle::Status;
use crate::safety::SafetyClassification;

fn join_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|c| format!("[{}]", c.join(" -> ")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A REQUIRED dependency names a service that was never registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("service '{service}' requires unknown service '{dependency}' (known: {})", known.join(", "))]
pub struct DependencyMissingError {
    /// Service declaring the edge.
    pub service: String,
    /// Unresolved target.
    pub dependency: String,
    /// Every registered name, sorted, for diagnostics.
    pub known: Vec<String>,
}

/// # Errors produced while validating the descriptor set.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Two descriptors share a name.
    #[error("duplicate service name '{name}'")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },

    /// The startup-ordering graph contains one or more cycles.
    ///
    /// Each entry is a closed walk along dependency edges, e.g. `[a, b, c, a]`
    /// means `a` depends on `b`, `b` on `c` and `c` on `a`.
    #[error("dependency cycle(s) detected: {}", join_cycles(.cycles))]
    Cycle {
        /// All distinct cycles found.
        cycles: Vec<Vec<String>>,
    },

    /// A REQUIRED edge points at an unregistered service.
    #[error(transparent)]
    DependencyMissing(#[from] DependencyMissingError),
}

impl RegistrationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistrationError::DuplicateName { .. } => "registration_duplicate_name",
            RegistrationError::Cycle { .. } => "registration_cycle",
            RegistrationError::DependencyMissing(_) => "registration_dependency_missing",
        }
    }
}

/// A lifecycle transition that the state table does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal transition for '{service}': {from} -> {to}")]
pub struct IllegalTransitionError {
    /// Service whose transition was rejected.
    pub service: String,
    /// Status at the time of the attempt (left unchanged).
    pub from: Status,
    /// Requested status.
    pub to: Status,
}

/// # Errors returned by [`LifecycleStateMachine::transition`](crate::LifecycleStateMachine::transition).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The requested edge is not in the transition table.
    #[error(transparent)]
    Illegal(#[from] IllegalTransitionError),

    /// No record exists for the service.
    #[error("unknown service '{name}'")]
    UnknownService {
        /// Name that was looked up.
        name: String,
    },
}

impl TransitionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransitionError::Illegal(_) => "transition_illegal",
            TransitionError::UnknownService { .. } => "transition_unknown_service",
        }
    }
}

/// The emergency-stop latch is set; actuation and control commands are refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("emergency stop active since {since}: {reason}")]
pub struct EmergencyStopActive {
    /// Reason given when the latch was tripped.
    pub reason: String,
    /// When the latch was tripped.
    pub since: DateTime<Utc>,
}

/// # Commands refused by the safety coordinator.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyError {
    /// Emergency stop is latched.
    #[error(transparent)]
    EmergencyStopActive(#[from] EmergencyStopActive),

    /// The system is in SAFE_SHUTDOWN and the target is position-critical.
    #[error("safe shutdown active ({cause}); position-critical operation on '{service}' rejected")]
    SafeModeActive {
        /// Target of the rejected operation.
        service: String,
        /// Failure that put the system into safe shutdown.
        cause: String,
    },

    /// The actuation path of a failed position-critical service is frozen.
    #[error("actuation path '{service}' is frozen: {cause}")]
    PathFrozen {
        /// Frozen service.
        service: String,
        /// Why the path was frozen.
        cause: String,
    },

    /// The feature was disabled because a prerequisite failed.
    #[error("'{service}' is disabled: dependency '{dependency}' failed")]
    FeatureDisabled {
        /// Disabled service.
        service: String,
        /// Failed prerequisite.
        dependency: String,
    },

    /// The presented reset authorization was rejected.
    #[error("reset authorization rejected")]
    Unauthorized,
}

impl SafetyError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SafetyError::EmergencyStopActive(_) => "safety_emergency_stop_active",
            SafetyError::SafeModeActive { .. } => "safety_safe_mode_active",
            SafetyError::PathFrozen { .. } => "safety_path_frozen",
            SafetyError::FeatureDisabled { .. } => "safety_feature_disabled",
            SafetyError::Unauthorized => "safety_unauthorized",
        }
    }
}

/// # Errors reported by service collaborators.
///
/// Returned from [`Service::start`](crate::Service::start) and
/// [`Service::stop`](crate::Service::stop). The orchestrator also produces
/// `Timeout` and `Canceled` itself when it bounds or cancels a call.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The call exceeded its deadline.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Non-recoverable failure; recovery attempts stop immediately.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Failure that may succeed on a later recovery attempt.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The call was cancelled by shutdown.
    #[error("context cancelled")]
    Canceled,
}

impl ServiceError {
    /// Shorthand for [`ServiceError::Fail`].
    pub fn fail(error: impl fmt::Display) -> Self {
        ServiceError::Fail {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`ServiceError::Fatal`].
    pub fn fatal(error: impl fmt::Display) -> Self {
        ServiceError::Fatal {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Timeout { .. } => "service_timeout",
            ServiceError::Fatal { .. } => "service_fatal",
            ServiceError::Fail { .. } => "service_failed",
            ServiceError::Canceled => "service_canceled",
        }
    }

    /// `true` for [`ServiceError::Fail`] and [`ServiceError::Timeout`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Fail { .. } | ServiceError::Timeout { .. })
    }
}

/// A service that failed at runtime, during startup or during shutdown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("service '{service}' ({classification}) failed: {reason}")]
pub struct ServiceFailure {
    /// Failed service.
    pub service: String,
    /// Its safety classification.
    pub classification: SafetyClassification,
    /// Failure reason.
    pub reason: String,
}

/// A stage did not settle within its timeout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("stage {stage} did not settle within {timeout:?}; stuck: {services:?}")]
pub struct StartupTimeoutError {
    /// Zero-based stage index.
    pub stage: usize,
    /// Services still starting when the deadline passed.
    pub services: Vec<String>,
    /// The configured stage timeout.
    pub timeout: Duration,
}

/// A service that was never started because a prerequisite did not come up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedService {
    /// Skipped service.
    pub service: String,
    /// Direct REQUIRED dependency that was not healthy, if any.
    pub dependency: Option<String>,
    /// Failed service at the root of the chain.
    pub root_cause: String,
}

fn join_failures(failed: &[ServiceFailure]) -> String {
    failed
        .iter()
        .map(|f| format!("{} ({})", f.service, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// # Errors returned by the orchestrator control surface.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Descriptor validation failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// A stage exceeded its timeout; started services were cleaned up.
    #[error(transparent)]
    StartupTimeout(#[from] StartupTimeoutError),

    /// Startup aborted after a blocking failure; started services were cleaned up.
    #[error("startup aborted: {}", join_failures(.failed))]
    StartupFailed {
        /// Services that failed to start.
        failed: Vec<ServiceFailure>,
        /// Services that were never started.
        skipped: Vec<SkippedService>,
    },

    /// Shutdown visited every service but some stop routines failed.
    #[error("shutdown incomplete: {}", join_failures(.errors))]
    ShutdownIncomplete {
        /// Individual stop failures.
        errors: Vec<ServiceFailure>,
    },

    /// A lifecycle transition was rejected.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The safety coordinator refused the command.
    #[error(transparent)]
    Safety(#[from] SafetyError),

    /// No service is registered under this name.
    #[error("unknown service '{name}'")]
    UnknownService {
        /// Name that was looked up.
        name: String,
    },

    /// The service exists but is not up.
    #[error("service '{service}' is not available (status: {status})")]
    ServiceUnavailable {
        /// Target service.
        service: String,
        /// Its current status.
        status: Status,
    },

    /// A RUNTIME (or REQUIRED) dependency was not usable when checked.
    #[error("dependency '{dependency}' of '{service}' is unavailable: {detail}")]
    DependencyUnavailable {
        /// Dependent service.
        service: String,
        /// Unusable dependency.
        dependency: String,
        /// What was wrong with it.
        detail: String,
    },

    /// Recovery was requested for a service that is not FAILED.
    #[error("service '{service}' cannot be recovered from status {status}")]
    NotRecoverable {
        /// Target service.
        service: String,
        /// Its current status.
        status: Status,
    },

    /// Every recovery attempt failed.
    #[error("recovery of '{service}' failed after {attempts} attempt(s): {reason}")]
    RecoveryFailed {
        /// Target service.
        service: String,
        /// Attempts made.
        attempts: u32,
        /// Last failure reason.
        reason: String,
    },

    /// The command is not valid in the orchestrator's current phase.
    #[error("operation '{operation}' not allowed in phase {phase}")]
    InvalidPhase {
        /// Requested operation.
        operation: &'static str,
        /// Current phase name.
        phase: &'static str,
    },

    /// OS signal handlers could not be installed.
    #[error("signal handling failed: {0}")]
    Signal(String),
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::Registration(e) => e.as_label(),
            OrchestratorError::StartupTimeout(_) => "startup_timeout",
            OrchestratorError::StartupFailed { .. } => "startup_failed",
            OrchestratorError::ShutdownIncomplete { .. } => "shutdown_incomplete",
            OrchestratorError::Transition(e) => e.as_label(),
            OrchestratorError::Safety(e) => e.as_label(),
            OrchestratorError::UnknownService { .. } => "unknown_service",
            OrchestratorError::ServiceUnavailable { .. } => "service_unavailable",
            OrchestratorError::DependencyUnavailable { .. } => "dependency_unavailable",
            OrchestratorError::NotRecoverable { .. } => "not_recoverable",
            OrchestratorError::RecoveryFailed { .. } => "recovery_failed",
            OrchestratorError::InvalidPhase { .. } => "invalid_phase",
            OrchestratorError::Signal(_) => "signal_failed",
        }
    }

    /// `true` when the command was refused because emergency stop is latched.
    pub fn is_emergency_stop(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Safety(SafetyError::EmergencyStopActive(_))
        )
    }
}
