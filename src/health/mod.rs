//! Runtime health: probe results, the periodic monitor and the aggregate report.
//!
//! - [`HealthStatus`] what a service's health check returns
//! - [`HealthMonitor`] periodic checks plus the heartbeat watchdog
//! - [`HealthReport`] `application/health+json` view of all services

mod monitor;
mod report;
mod status;

pub use monitor::{HealthMonitor, MonitorSettings, TickSummary};
pub use report::{
    CheckState, ComponentCheck, HEALTH_CONTENT_TYPE, HealthReport, StageTiming, StartupTiming,
};
pub use status::HealthStatus;
