//! # rvisor
//!
//! **rvisor** is the orchestration and safety core of an RV control system:
//! it starts interdependent services in dependency order, watches them while
//! they run, stops them in reverse, and drives the vehicle into a safe state
//! when a safety-classified service fails.
//!
//! ## Architecture
//! ```text
//!  ServiceDescriptor  ServiceDescriptor  ServiceDescriptor
//!  (name, deps, class, health, heartbeat)        │
//!          └──────────────┬──────────────────────┘
//!                         ▼
//!               OrchestratorBuilder::build
//!                         │ resolve(): duplicates, missing deps, every cycle
//!                         ▼
//!                     StagePlan  [[A], [B, C], [D], [E]]
//!                         │
//! ┌───────────────────────▼───────────────────────────────────────────┐
//! │ Orchestrator                                                      │
//! │  start_all: stage by stage, JoinSet per stage, stage deadline     │
//! │  stop_all:  stages reversed, LIFO within a stage                  │
//! │  recover / actuate / trip & reset emergency stop / health_report  │
//! └───────┬──────────────────────────────────────────────┬────────────┘
//!         │ transition(service, to, reason)              │
//!         ▼                                              │
//! ┌──────────────────────────┐      HealthMonitor ───────┘
//! │ LifecycleStateMachine    │◄──── (checks + heartbeat watchdog, per tick)
//! │  only writer of records  │
//! └───────────┬──────────────┘
//!             │ publish(LifecycleEvent)
//!             ▼
//! ┌────────────────────────────────────────────────────────────────────┐
//! │ EventBus (listeners sorted by priority)                            │
//! │  FAILED of CRITICAL / SAFETY_RELATED: awaited inline, then commit  │
//! │  everything else: commit, then bounded queue ► worker              │
//! └──────┬──────────────────────┬────────────────────┬─────────────────┘
//!        ▼ always first         ▼ prio 500           ▼ prio 1000
//!  SafetyCoordinator      MetricsRecorder         LogWriter
//!   safe shutdown / disable dependents / freeze path / emergency stop
//!        │
//!        └─► ContainmentRequest ─► orchestrator stops disabled services
//! ```
//!
//! ## Lifecycle
//! ```text
//! REGISTERED ─► STARTING ─► HEALTHY ◄─► DEGRADED
//!     │             │          │            │
//!     │             └──────► FAILED ◄───────┘
//!     ▼                        │  ▲ (recover: FAILED ─► STARTING)
//!  SKIPPED                     ▼
//!     └──────────────► STOPPING ─► STOPPED
//! ```
//!
//! ## Features
//! | Area            | Description                                                  | Key types                                         |
//! |-----------------|--------------------------------------------------------------|---------------------------------------------------|
//! | **Services**    | What the orchestrator drives                                 | [`Service`], [`ServiceFn`], [`ServiceDescriptor`] |
//! | **Graph**       | Validation, cycle reporting, stages                          | [`resolve`], [`StagePlan`]                        |
//! | **Lifecycle**   | Legal transitions and per-service records                    | [`Status`], [`LifecycleStateMachine`]             |
//! | **Events**      | Priority fan-out with a blocking safety path                 | [`EventBus`], [`Listener`], [`LifecycleEvent`]    |
//! | **Safety**      | Classification responses, emergency stop, authorized resets  | [`SafetyCoordinator`], [`Authorizer`]             |
//! | **Health**      | Periodic checks, watchdog, health+json report                | [`HealthMonitor`], [`HealthReport`]               |
//! | **Errors**      | Typed errors with stable labels                              | [`OrchestratorError`], [`ServiceError`]           |
//! | **Config**      | Timeouts, thresholds, queue capacity, recovery               | [`OrchestratorConfig`], [`RecoveryPolicy`]        |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use rvisor::{
//!     OrchestratorBuilder, OrchestratorConfig, SafetyClassification, ServiceDescriptor, ServiceFn,
//!     Status,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = OrchestratorConfig::default();
//!     cfg.stage_timeout = Duration::from_secs(5);
//!
//!     let orch = OrchestratorBuilder::new(cfg)
//!         .register(
//!             ServiceDescriptor::builder("can_bus", ServiceFn::noop().arc())
//!                 .classification(SafetyClassification::Critical)
//!                 .build(),
//!         )
//!         .register(
//!             ServiceDescriptor::builder("slides", ServiceFn::noop().arc())
//!                 .requires("can_bus")
//!                 .classification(SafetyClassification::PositionCritical)
//!                 .build(),
//!         )
//!         .build()?;
//!
//!     orch.start_all().await?;
//!     assert_eq!(orch.status_of("slides"), Some(Status::Healthy));
//!     orch.stop_all().await?;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod graph;
mod health;
mod lifecycle;
mod listeners;
mod policies;
mod safety;
mod services;

// ---- Public re-exports ----

pub use core::{Orchestrator, OrchestratorBuilder, OrchestratorConfig, OrchestratorMetrics, Phase};
pub use error::{
    DependencyMissingError, EmergencyStopActive, IllegalTransitionError, OrchestratorError,
    RegistrationError, SafetyError, ServiceError, ServiceFailure, SkippedService,
    StartupTimeoutError, TransitionError,
};
pub use events::{
    BusStats, DEFAULT_PRIORITY, EventBus, EventKind, LifecycleEvent, Listener, SAFETY_PRIORITY,
};
pub use graph::{StagePlan, resolve};
pub use health::{
    CheckState, ComponentCheck, HEALTH_CONTENT_TYPE, HealthMonitor, HealthReport, HealthStatus,
    MonitorSettings, StageTiming, StartupTiming, TickSummary,
};
pub use lifecycle::{LifecycleStateMachine, ServiceRecord, Status, is_valid_transition};
pub use listeners::{LogWriter, MetricsRecorder, MetricsSnapshot};
pub use policies::{BackoffPolicy, JitterPolicy, RecoveryPolicy};
pub use safety::{
    Authorizer, ContainmentRequest, DenyAll, EmergencyStopView, ResetToken, SafetyClassification,
    SafetyCoordinator, SafetyMode, SafetySnapshot, StaticTokenAuthorizer,
};
pub use services::{
    DependencyEdge, DependencyKind, Heartbeat, Service, ServiceContext, ServiceDescriptor,
    ServiceDescriptorBuilder, ServiceFn, ServiceRef,
};
