//! In-process counters fed by lifecycle events.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::events::{EventKind, LifecycleEvent, Listener};
use crate::lifecycle::Status;

/// Counter snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Events seen, by kind.
    pub events: BTreeMap<&'static str, u64>,
    /// Transitions into FAILED, by service.
    pub failures: BTreeMap<String, u64>,
    /// Successful starts (including recoveries), by service.
    pub starts: BTreeMap<String, u64>,
    /// Services currently HEALTHY or DEGRADED, as last reported.
    pub up: usize,
}

#[derive(Default)]
struct Counters {
    events: HashMap<EventKind, u64>,
    failures: HashMap<String, u64>,
    starts: HashMap<String, u64>,
    up: HashMap<String, bool>,
}

/// Counts events per kind and failures per service.
#[derive(Default)]
pub struct MetricsRecorder {
    inner: Mutex<Counters>,
}

impl MetricsRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = self.inner.lock();
        MetricsSnapshot {
            events: c.events.iter().map(|(k, v)| (k.as_str(), *v)).collect(),
            failures: c.failures.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            starts: c.starts.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            up: c.up.values().filter(|u| **u).count(),
        }
    }
}

#[async_trait]
impl Listener for MetricsRecorder {
    async fn on_event(&self, e: &LifecycleEvent) {
        let mut c = self.inner.lock();
        *c.events.entry(e.kind).or_default() += 1;
        match e.kind {
            EventKind::Failed => {
                *c.failures.entry(e.service.to_string()).or_default() += 1;
            }
            EventKind::Started | EventKind::Degraded if e.from == Status::Starting => {
                *c.starts.entry(e.service.to_string()).or_default() += 1;
            }
            _ => {}
        }
        c.up.insert(e.service.to_string(), e.to.is_up());
    }

    fn name(&self) -> &'static str {
        "metrics"
    }

    fn priority(&self) -> i32 {
        500
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::SafetyClassification;

    fn ev(svc: &str, from: Status, to: Status) -> LifecycleEvent {
        LifecycleEvent::transition(svc, SafetyClassification::Operational, from, to)
    }

    #[tokio::test]
    async fn counts_kinds_failures_and_up_gauge() {
        let m = MetricsRecorder::new();
        m.on_event(&ev("a", Status::Registered, Status::Starting)).await;
        m.on_event(&ev("a", Status::Starting, Status::Healthy)).await;
        m.on_event(&ev("b", Status::Registered, Status::Starting)).await;
        m.on_event(&ev("b", Status::Starting, Status::Degraded)).await;
        m.on_event(&ev("b", Status::Degraded, Status::Failed)).await;

        let s = m.snapshot();
        assert_eq!(s.events["starting"], 2);
        assert_eq!(s.events["failed"], 1);
        assert_eq!(s.failures["b"], 1);
        assert_eq!(s.starts["a"], 1);
        assert_eq!(s.starts["b"], 1);
        assert_eq!(s.up, 1);
    }
}
