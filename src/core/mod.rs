//! Runtime core: configuration, wiring and the orchestrator itself.
//!
//! Internal modules:
//! - `builder`: resolves the graph and wires bus, state machine, safety and monitor
//! - `orchestrator`: staged startup, ordered shutdown, recovery and control commands
//! - `runner`: starts or stops one service with deadlines and cancellation
//! - `shutdown`: OS signal wait used by `run_until_signal`

mod builder;
mod config;
mod orchestrator;
mod runner;
mod shutdown;

pub use builder::OrchestratorBuilder;
pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, OrchestratorMetrics, Phase};
