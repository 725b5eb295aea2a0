use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a service's failure for the rest of the vehicle.
///
/// `Ord` sorts most severe first: `Critical < SafetyRelated < ... < Maintenance`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyClassification {
    /// Failure puts the whole system into safe shutdown.
    Critical,
    /// Failure disables the features that depend on it.
    SafetyRelated,
    /// Controls physical position (slides, jacks, awnings); failure freezes the path.
    PositionCritical,
    /// Ordinary functionality; failure is logged.
    #[default]
    Operational,
    /// Diagnostics and housekeeping.
    Maintenance,
}

impl SafetyClassification {
    /// Stable upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyClassification::Critical => "CRITICAL",
            SafetyClassification::SafetyRelated => "SAFETY_RELATED",
            SafetyClassification::PositionCritical => "POSITION_CRITICAL",
            SafetyClassification::Operational => "OPERATIONAL",
            SafetyClassification::Maintenance => "MAINTENANCE",
        }
    }

    /// `true` when a FAILED event must reach the safety coordinator before the
    /// state change is committed.
    #[inline]
    pub fn requires_blocking_dispatch(&self) -> bool {
        matches!(
            self,
            SafetyClassification::Critical | SafetyClassification::SafetyRelated
        )
    }

    /// `true` when a failure of this service aborts a startup sequence.
    #[inline]
    pub fn aborts_startup(&self) -> bool {
        self.requires_blocking_dispatch()
    }

    /// `true` for services whose commands move physical equipment.
    #[inline]
    pub fn is_position_critical(&self) -> bool {
        matches!(self, SafetyClassification::PositionCritical)
    }
}

impl fmt::Display for SafetyClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
