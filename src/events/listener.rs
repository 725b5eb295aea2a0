//! # Listener contract
//!
//! A [`Listener`] observes every [`LifecycleEvent`]. Listeners are registered
//! once, at build time, and are sorted by [`Listener::priority`] (lower runs
//! first; ties keep registration order).
//!
//! ## Delivery
//! - Blocking events (FAILED of CRITICAL / SAFETY_RELATED services) are awaited
//!   listener by listener before the transition commits. Keep these handlers short.
//! - Everything else goes through one bounded queue drained by a single worker,
//!   which also calls listeners in priority order.
//!
//! Panics are caught and logged; the next listener still runs.
//!
//! Listeners must not call back into `LifecycleStateMachine::transition` from
//! `on_event`: blocking dispatch runs while the transition gate is held.

use async_trait::async_trait;

use super::LifecycleEvent;

/// Priority of the safety coordinator: the lowest value there is.
///
/// The builder registers the coordinator ahead of every user listener, so a
/// listener that also returns this value still runs after it.
pub const SAFETY_PRIORITY: i32 = i32::MIN;
/// Priority used when a listener does not override [`Listener::priority`].
pub const DEFAULT_PRIORITY: i32 = 100;

/// Contract for lifecycle event listeners.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &LifecycleEvent);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Dispatch priority; lower runs first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }
}
