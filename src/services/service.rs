//! # Service contract
//!
//! A [`Service`] is anything the orchestrator can start, stop and probe: a
//! CAN interface, a protocol decoder, a persistence layer, a feature module.
//!
//! ## Contract
//! - `start` brings the service up and **returns** once it is ready. Long-running
//!   work belongs in tasks spawned from `start`, watching [`ServiceContext::token`].
//! - `stop` releases what `start` acquired. It is bounded by the stop timeout.
//! - `health_check` is optional: the default returns `None` and the service is
//!   only supervised through its heartbeat (if configured).
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use rvisor::{HealthStatus, Service, ServiceContext, ServiceError};
//!
//! struct CanInterface;
//!
//! #[async_trait]
//! impl Service for CanInterface {
//!     async fn start(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
//!         let token = ctx.token().clone();
//!         tokio::spawn(async move { token.cancelled().await });
//!         Ok(())
//!     }
//!
//!     async fn health_check(&self) -> Option<HealthStatus> {
//!         Some(HealthStatus::Healthy)
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::health::HealthStatus;

use super::ServiceContext;

/// Capability interface every registered service implements.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Brings the service up. Returning `Err` marks it FAILED.
    async fn start(&self, ctx: ServiceContext) -> Result<(), ServiceError>;

    /// Shuts the service down.
    async fn stop(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Probes the service. `None` means "no health check".
    async fn health_check(&self) -> Option<HealthStatus> {
        None
    }
}

/// Shared handle to a service.
pub type ServiceRef = Arc<dyn Service>;
