//! # Orchestrator configuration.
//!
//! [`OrchestratorConfig`] centralizes the timing and capacity knobs of the
//! runtime. It is consumed once, by [`OrchestratorBuilder::build`](crate::OrchestratorBuilder::build).
//!
//! ## Sentinel values
//! - `stage_timeout = 0s` → a stage waits for its services indefinitely
//! - `stop_timeout = 0s` → stop routines are not bounded
//! - `health_check_timeout = 0s` → health checks are not bounded
//!
//! Per-service overrides (`ServiceDescriptor::stop_timeout`,
//! `ServiceDescriptor::heartbeat_timeout`) take precedence where they exist.

use std::time::Duration;

use crate::policies::RecoveryPolicy;

/// Runtime configuration for the orchestrator.
///
/// ## Field semantics
/// - `stage_timeout`: bound on one startup stage (all of its services together)
/// - `stop_timeout`: default bound on one service's stop routine
/// - `health_tick`: health monitor period (clamped to at least 1ms)
/// - `health_check_timeout`: bound on one health-check call
/// - `failure_threshold`: consecutive failed checks before a service is FAILED (min 1)
/// - `event_queue_capacity`: deferred event queue size (min 1)
/// - `recovery`: attempts and backoff used by `recover`
/// - `log_events`: register the built-in [`LogWriter`](crate::LogWriter)
///
/// All fields are public. Prefer the accessors over checking sentinels inline.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Maximum time a single startup stage may take.
    pub stage_timeout: Duration,
    /// Default maximum time for one service's stop routine.
    pub stop_timeout: Duration,
    /// Period of the health monitor loop.
    pub health_tick: Duration,
    /// Maximum time one health-check call may take; exceeding it counts as a failure.
    pub health_check_timeout: Duration,
    /// Consecutive health-check failures before the service transitions to FAILED.
    pub failure_threshold: u32,
    /// Capacity of the deferred event queue. Events beyond it are dropped and counted,
    /// except FAILED events, which wait for room.
    pub event_queue_capacity: usize,
    /// Policy for manual recovery of FAILED services.
    pub recovery: RecoveryPolicy,
    /// Whether the tracing-backed [`LogWriter`](crate::LogWriter) listener is installed.
    pub log_events: bool,
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() { None } else { Some(d) }
}

impl OrchestratorConfig {
    /// Stage timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn stage_deadline(&self) -> Option<Duration> {
        non_zero(self.stage_timeout)
    }

    /// Default stop timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn stop_deadline(&self) -> Option<Duration> {
        non_zero(self.stop_timeout)
    }

    /// Health-check timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn health_check_deadline(&self) -> Option<Duration> {
        non_zero(self.health_check_timeout)
    }

    /// Health tick clamped to at least 1ms.
    #[inline]
    pub fn health_tick_clamped(&self) -> Duration {
        self.health_tick.max(Duration::from_millis(1))
    }

    /// Failure threshold clamped to at least 1.
    #[inline]
    pub fn failure_threshold_clamped(&self) -> u32 {
        self.failure_threshold.max(1)
    }

    /// Deferred queue capacity clamped to at least 1.
    #[inline]
    pub fn event_queue_capacity_clamped(&self) -> usize {
        self.event_queue_capacity.max(1)
    }
}

impl Default for OrchestratorConfig {
    /// Default configuration:
    ///
    /// - `stage_timeout = 30s`
    /// - `stop_timeout = 10s`
    /// - `health_tick = 1s`
    /// - `health_check_timeout = 2s`
    /// - `failure_threshold = 1` (a single failed check fails the service)
    /// - `event_queue_capacity = 1024`
    /// - `recovery = RecoveryPolicy::default()`
    /// - `log_events = true`
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(10),
            health_tick: Duration::from_secs(1),
            health_check_timeout: Duration::from_secs(2),
            failure_threshold: 1,
            event_queue_capacity: 1024,
            recovery: RecoveryPolicy::default(),
            log_events: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_durations_mean_unbounded() {
        let cfg = OrchestratorConfig {
            stage_timeout: Duration::ZERO,
            stop_timeout: Duration::ZERO,
            health_check_timeout: Duration::ZERO,
            ..OrchestratorConfig::default()
        };
        assert_eq!(cfg.stage_deadline(), None);
        assert_eq!(cfg.stop_deadline(), None);
        assert_eq!(cfg.health_check_deadline(), None);
    }

    #[test]
    fn clamps_apply() {
        let cfg = OrchestratorConfig {
            health_tick: Duration::ZERO,
            failure_threshold: 0,
            event_queue_capacity: 0,
            ..OrchestratorConfig::default()
        };
        assert_eq!(cfg.health_tick_clamped(), Duration::from_millis(1));
        assert_eq!(cfg.failure_threshold_clamped(), 1);
        assert_eq!(cfg.event_queue_capacity_clamped(), 1);
    }
}
