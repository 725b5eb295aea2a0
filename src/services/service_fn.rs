//! # Closure-backed service (`ServiceFn`)
//!
//! [`ServiceFn`] builds a [`Service`] from closures. Each call produces a fresh
//! future; shared state goes in an `Arc` captured by the closures.
//!
//! ## Example
//! ```rust
//! use rvisor::{HealthStatus, ServiceError, ServiceFn, ServiceRef};
//!
//! let svc: ServiceRef = ServiceFn::new(|ctx| async move {
//!     ctx.beat();
//!     Ok::<_, ServiceError>(())
//! })
//! .on_stop(|| async { Ok(()) })
//! .with_health(|| async { HealthStatus::Healthy })
//! .arc();
//! # let _ = svc;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::ServiceError;
use crate::health::HealthStatus;

use super::{Service, ServiceContext};

type StartFn =
    Box<dyn Fn(ServiceContext) -> BoxFuture<'static, Result<(), ServiceError>> + Send + Sync>;
type StopFn = Box<dyn Fn() -> BoxFuture<'static, Result<(), ServiceError>> + Send + Sync>;
type HealthFn = Box<dyn Fn() -> BoxFuture<'static, HealthStatus> + Send + Sync>;

/// Function-backed service implementation.
pub struct ServiceFn {
    start: StartFn,
    stop: Option<StopFn>,
    health: Option<HealthFn>,
}

impl ServiceFn {
    /// Creates a service whose start routine is `f`.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        Self {
            start: Box::new(move |ctx| Box::pin(f(ctx))),
            stop: None,
            health: None,
        }
    }

    /// A service whose start always succeeds and which does nothing else.
    pub fn noop() -> Self {
        Self::new(|_ctx| async { Ok(()) })
    }

    /// Sets the stop routine.
    pub fn on_stop<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        self.stop = Some(Box::new(move || Box::pin(f())));
        self
    }

    /// Sets the health check.
    pub fn with_health<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HealthStatus> + Send + 'static,
    {
        self.health = Some(Box::new(move || Box::pin(f())));
        self
    }

    /// Wraps the service in an `Arc`.
    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Service for ServiceFn {
    async fn start(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        (self.start)(ctx).await
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        match &self.stop {
            Some(f) => f().await,
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> Option<HealthStatus> {
        match &self.health {
            Some(f) => Some(f().await),
            None => None,
        }
    }
}
