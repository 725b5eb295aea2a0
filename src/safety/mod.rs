//! Safety layer: classifications, the coordinator and operator authorization.
//!
//! ## Contents
//! - [`SafetyClassification`] how much a service's failure matters
//! - [`SafetyCoordinator`] reacts to failures, holds the emergency-stop latch, guards actuation
//! - [`Authorizer`], [`StaticTokenAuthorizer`], [`ResetToken`] who may clear safety state

mod authorize;
mod classification;
mod coordinator;

pub use authorize::{Authorizer, DenyAll, ResetToken, StaticTokenAuthorizer};
pub use classification::SafetyClassification;
pub use coordinator::{
    ContainmentRequest, EmergencyStopView, SafetyCoordinator, SafetyMode, SafetySnapshot,
};
