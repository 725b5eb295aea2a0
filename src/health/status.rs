use std::fmt;

use serde::Serialize;

/// Outcome of one [`Service::health_check`](crate::Service::health_check) call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Working with reduced functionality.
    Degraded(String),
    /// Not working; counts toward the failure threshold.
    Unhealthy(String),
}

impl HealthStatus {
    /// Shorthand for [`HealthStatus::Degraded`].
    pub fn degraded(reason: impl Into<String>) -> Self {
        HealthStatus::Degraded(reason.into())
    }

    /// Shorthand for [`HealthStatus::Unhealthy`].
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        HealthStatus::Unhealthy(reason.into())
    }

    /// `true` unless [`HealthStatus::Unhealthy`].
    pub fn is_passing(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Degraded(r) => write!(f, "degraded: {r}"),
            HealthStatus::Unhealthy(r) => write!(f, "unhealthy: {r}"),
        }
    }
}
