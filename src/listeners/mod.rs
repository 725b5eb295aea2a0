//! Built-in listeners.
//!
//! - [`LogWriter`] emits one `tracing` record per event
//! - [`MetricsRecorder`] keeps per-kind and per-service counters

mod log;
mod metrics;

pub use log::LogWriter;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
