//! # Service descriptors
//!
//! A [`ServiceDescriptor`] is the registration-time description of one service:
//! its name, implementation, dependency edges, tags and safety classification.
//! Descriptors are immutable once handed to the orchestrator builder.
//!
//! ## Dependency kinds
//! | kind       | startup ordering | on target failure                          |
//! |------------|------------------|--------------------------------------------|
//! | `Required` | yes              | dependent is skipped / startup aborts      |
//! | `Optional` | yes              | dependent starts DEGRADED                  |
//! | `Runtime`  | no               | checked lazily by `require_runtime`        |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use rvisor::{DependencyKind, SafetyClassification, ServiceDescriptor, ServiceFn};
//!
//! let desc = ServiceDescriptor::builder("leveling", ServiceFn::noop().arc())
//!     .requires("can_bus")
//!     .optional("persistence")
//!     .runtime("notifications")
//!     .classification(SafetyClassification::PositionCritical)
//!     .tag("chassis")
//!     .heartbeat_timeout(Duration::from_secs(2))
//!     .build();
//!
//! assert_eq!(desc.name(), "leveling");
//! assert_eq!(desc.dependencies().len(), 3);
//! assert_eq!(desc.dependencies()[1].kind, DependencyKind::Optional);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::safety::SafetyClassification;

use super::ServiceRef;

/// How a dependency constrains its dependent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Target must be HEALTHY before the dependent starts.
    Required,
    /// Target is started first when present; its absence degrades the dependent.
    Optional,
    /// Not used for ordering; validated when first needed.
    Runtime,
}

impl DependencyKind {
    /// `true` for kinds that influence stage assignment.
    #[inline]
    pub fn orders_startup(&self) -> bool {
        matches!(self, DependencyKind::Required | DependencyKind::Optional)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Required => "required",
            DependencyKind::Optional => "optional",
            DependencyKind::Runtime => "runtime",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing dependency edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyEdge {
    /// Name of the service depended upon.
    pub target: String,
    /// Edge kind.
    pub kind: DependencyKind,
}

/// Registration-time description of a service.
#[derive(Clone)]
pub struct ServiceDescriptor {
    name: Arc<str>,
    service: ServiceRef,
    dependencies: Vec<DependencyEdge>,
    tags: BTreeSet<String>,
    classification: SafetyClassification,
    heartbeat_timeout: Option<Duration>,
    stop_timeout: Option<Duration>,
    description: Option<String>,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("tags", &self.tags)
            .field("classification", &self.classification)
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("stop_timeout", &self.stop_timeout)
            .finish_non_exhaustive()
    }
}

impl ServiceDescriptor {
    /// Descriptor with no dependencies and OPERATIONAL classification.
    pub fn new(name: impl Into<Arc<str>>, service: ServiceRef) -> Self {
        Self {
            name: name.into(),
            service,
            dependencies: Vec::new(),
            tags: BTreeSet::new(),
            classification: SafetyClassification::default(),
            heartbeat_timeout: None,
            stop_timeout: None,
            description: None,
        }
    }

    /// Starts a fluent builder.
    pub fn builder(name: impl Into<Arc<str>>, service: ServiceRef) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            inner: Self::new(name, service),
        }
    }

    /// Unique name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Implementation handle.
    #[inline]
    pub fn service(&self) -> &ServiceRef {
        &self.service
    }

    /// Outgoing edges in declaration order (one per target).
    #[inline]
    pub fn dependencies(&self) -> &[DependencyEdge] {
        &self.dependencies
    }

    /// Targets of edges of the given kind.
    pub fn dependencies_of_kind(&self, kind: DependencyKind) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| e.target.as_str())
    }

    /// Free-form tags.
    #[inline]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// `true` if the descriptor carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Safety classification.
    #[inline]
    pub fn classification(&self) -> SafetyClassification {
        self.classification
    }

    /// Watchdog deadline; `None` disables heartbeat supervision.
    #[inline]
    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout
    }

    /// Per-service stop timeout override.
    #[inline]
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout
    }

    /// Human-readable description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Adds an edge; a repeated target keeps its position and takes the new kind.
    pub(crate) fn push_edge(&mut self, target: String, kind: DependencyKind) {
        match self.dependencies.iter_mut().find(|e| e.target == target) {
            Some(existing) => existing.kind = kind,
            None => self.dependencies.push(DependencyEdge { target, kind }),
        }
    }
}

/// Fluent builder for [`ServiceDescriptor`].
pub struct ServiceDescriptorBuilder {
    inner: ServiceDescriptor,
}

impl ServiceDescriptorBuilder {
    /// Adds a REQUIRED edge.
    pub fn requires(mut self, target: impl Into<String>) -> Self {
        self.inner.push_edge(target.into(), DependencyKind::Required);
        self
    }

    /// Adds an OPTIONAL edge.
    pub fn optional(mut self, target: impl Into<String>) -> Self {
        self.inner.push_edge(target.into(), DependencyKind::Optional);
        self
    }

    /// Adds a RUNTIME edge.
    pub fn runtime(mut self, target: impl Into<String>) -> Self {
        self.inner.push_edge(target.into(), DependencyKind::Runtime);
        self
    }

    /// Adds an edge of any kind.
    pub fn depends_on(mut self, target: impl Into<String>, kind: DependencyKind) -> Self {
        self.inner.push_edge(target.into(), kind);
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.inner.tags.insert(tag.into());
        self
    }

    /// Sets the safety classification.
    pub fn classification(mut self, classification: SafetyClassification) -> Self {
        self.inner.classification = classification;
        self
    }

    /// Enables heartbeat supervision with this deadline.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.inner.heartbeat_timeout = Some(timeout);
        self
    }

    /// Overrides the stop timeout.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.inner.stop_timeout = Some(timeout);
        self
    }

    /// Sets a description.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.inner.description = Some(text.into());
        self
    }

    /// Finishes the descriptor.
    pub fn build(self) -> ServiceDescriptor {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceFn;

    #[test]
    fn repeated_target_is_not_duplicated() {
        let d = ServiceDescriptor::builder("awning", ServiceFn::noop().arc())
            .optional("wind_sensor")
            .requires("wind_sensor")
            .requires("can_bus")
            .build();
        assert_eq!(
            d.dependencies(),
            &[
                DependencyEdge { target: "wind_sensor".into(), kind: DependencyKind::Required },
                DependencyEdge { target: "can_bus".into(), kind: DependencyKind::Required },
            ]
        );
    }

    #[test]
    fn filters_by_kind() {
        let d = ServiceDescriptor::builder("hvac", ServiceFn::noop().arc())
            .requires("can_bus")
            .runtime("notifications")
            .tag("climate")
            .build();
        assert_eq!(
            d.dependencies_of_kind(DependencyKind::Runtime)
                .collect::<Vec<_>>(),
            vec!["notifications"]
        );
        assert!(d.has_tag("climate"));
        assert_eq!(d.classification(), SafetyClassification::Operational);
        assert!(!DependencyKind::Runtime.orders_startup());
    }
}
