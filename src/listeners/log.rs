//! # Tracing listener for lifecycle events.
//!
//! [`LogWriter`] turns every delivered [`LifecycleEvent`] into one `tracing`
//! record. The level follows the event kind:
//!
//! ```text
//! starting / started / recovered / pre_shutdown / stopped   info
//! degraded / skipped                                        warn
//! failed                                                    error
//! ```
//!
//! Registered last (priority 1000) so it observes the outcome of the safety
//! and metrics listeners.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{EventKind, LifecycleEvent, Listener};

/// Writes lifecycle events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

#[async_trait]
impl Listener for LogWriter {
    async fn on_event(&self, e: &LifecycleEvent) {
        let service = &*e.service;
        let reason = e.reason_str();
        match e.kind {
            EventKind::Failed => error!(
                seq = e.seq,
                service,
                class = e.classification.as_str(),
                from = e.from.as_str(),
                reason,
                "[failed]"
            ),
            EventKind::Degraded => {
                warn!(seq = e.seq, service, from = e.from.as_str(), reason, "[degraded]")
            }
            EventKind::Skipped => warn!(seq = e.seq, service, reason, "[skipped]"),
            kind => info!(
                seq = e.seq,
                service,
                from = e.from.as_str(),
                to = e.to.as_str(),
                "[{}]",
                kind.as_str()
            ),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }

    fn priority(&self) -> i32 {
        1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Status;
    use crate::safety::SafetyClassification;

    #[tokio::test]
    async fn handles_every_kind_without_panicking() {
        let w = LogWriter;
        let pairs = [
            (Status::Registered, Status::Starting),
            (Status::Starting, Status::Healthy),
            (Status::Healthy, Status::Degraded),
            (Status::Degraded, Status::Healthy),
            (Status::Healthy, Status::Stopping),
            (Status::Healthy, Status::Failed),
            (Status::Stopping, Status::Stopped),
            (Status::Registered, Status::Skipped),
        ];
        for (from, to) in pairs {
            let ev = LifecycleEvent::transition("svc", SafetyClassification::Critical, from, to)
                .with_reason("because");
            w.on_event(&ev).await;
        }
        assert_eq!(w.priority(), 1000);
    }
}
