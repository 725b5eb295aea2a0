//! Service lifecycle: statuses, records and the state machine that owns them.
//!
//! - [`Status`] and [`is_valid_transition`] define the legal graph.
//! - [`ServiceRecord`] is the per-service runtime record.
//! - [`LifecycleStateMachine`] is the only writer of records and the only
//!   publisher of lifecycle events.

mod machine;
mod record;
mod status;

pub use machine::LifecycleStateMachine;
pub use record::ServiceRecord;
pub use status::{Status, is_valid_transition};
