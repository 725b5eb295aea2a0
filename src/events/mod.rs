//! Lifecycle events: data model, listener contract and the dispatching bus.
//!
//! ## Contents
//! - [`EventKind`], [`LifecycleEvent`] what changed, for whom, and why
//! - [`Listener`] extension point for observers (safety, logging, metrics, user code)
//! - [`EventBus`] priority-ordered fan-out with a blocking path for safety-relevant failures
//!
//! ## Quick reference
//! - **Publisher**: only `LifecycleStateMachine::transition`.
//! - **Built-in listeners**: `SafetyCoordinator` (always first), `MetricsRecorder`, `LogWriter`.

mod bus;
mod event;
mod listener;

pub use bus::{BusStats, EventBus};
pub(crate) use bus::panic_message;
pub use event::{EventKind, LifecycleEvent};
pub use listener::{DEFAULT_PRIORITY, Listener, SAFETY_PRIORITY};
