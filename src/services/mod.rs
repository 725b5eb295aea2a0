//! Service definitions: the capability trait, closure-backed services and descriptors.
//!
//! ## Contents
//! - [`Service`], [`ServiceRef`] what the orchestrator drives
//! - [`ServiceFn`] closure-backed implementation
//! - [`ServiceContext`], [`Heartbeat`] handed to `start`
//! - [`ServiceDescriptor`], [`DependencyEdge`], [`DependencyKind`] registration metadata

mod context;
mod descriptor;
mod service;
mod service_fn;

pub use context::{Heartbeat, ServiceContext};
pub use descriptor::{DependencyEdge, DependencyKind, ServiceDescriptor, ServiceDescriptorBuilder};
pub use service::{Service, ServiceRef};
pub use service_fn::ServiceFn;
