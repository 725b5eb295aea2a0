//! # Example: rv_startup
//!
//! Brings up a small RV service graph, prints the health document, exercises
//! the emergency-stop latch and shuts everything down.
//!
//! ## Graph
//! ```text
//! can_bus (CRITICAL, heartbeat 500ms)
//!   ├─► lpg_detector (SAFETY_RELATED) ─► furnace
//!   ├─► slides (POSITION_CRITICAL)
//!   └─┄► radio (optional)
//! thermostat_ui ┄runtime┄► furnace
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example rv_startup
//! ```

use std::sync::Arc;
use std::time::Duration;

use rvisor::{
    HealthStatus, OrchestratorBuilder, OrchestratorConfig, ResetToken, SafetyClassification,
    ServiceDescriptor, ServiceFn, ServiceRef, StaticTokenAuthorizer,
};
use tracing_subscriber::EnvFilter;

/// CAN bus reader: beats every 100ms until cancelled.
fn can_bus() -> ServiceRef {
    ServiceFn::new(|ctx| async move {
        let token = ctx.token().clone();
        let heartbeat = ctx.heartbeat().clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(100));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => { heartbeat.beat(); }
                }
            }
        });
        Ok(())
    })
    .with_health(|| async { HealthStatus::Healthy })
    .arc()
}

fn quiet() -> ServiceRef {
    ServiceFn::noop().arc()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cfg = OrchestratorConfig::default();
    cfg.stage_timeout = Duration::from_secs(5);
    cfg.health_tick = Duration::from_millis(250);

    use SafetyClassification::*;
    let orch = OrchestratorBuilder::new(cfg)
        .with_authorizer(Arc::new(StaticTokenAuthorizer::new("operator-key")))
        .register(
            ServiceDescriptor::builder("can_bus", can_bus())
                .classification(Critical)
                .heartbeat_timeout(Duration::from_millis(500))
                .tag("network")
                .build(),
        )
        .register(
            ServiceDescriptor::builder("lpg_detector", quiet())
                .requires("can_bus")
                .classification(SafetyRelated)
                .build(),
        )
        .register(
            ServiceDescriptor::builder("furnace", quiet())
                .requires("lpg_detector")
                .build(),
        )
        .register(
            ServiceDescriptor::builder("slides", quiet())
                .requires("can_bus")
                .classification(PositionCritical)
                .build(),
        )
        .register(
            ServiceDescriptor::builder("radio", quiet())
                .optional("can_bus")
                .classification(Maintenance)
                .build(),
        )
        .register(
            ServiceDescriptor::builder("thermostat_ui", quiet())
                .runtime("furnace")
                .build(),
        )
        .build()?;

    println!("stages: {:?}", orch.plan().stages());
    orch.start_all().await?;
    println!("{}", orch.health_report().to_json()?);

    let extended = orch.actuate("slides", || async { "slides extended" }).await?;
    println!("{extended}");

    orch.trip_emergency_stop("operator pressed e-stop");
    match orch.actuate("slides", || async { "slides retracted" }).await {
        Ok(_) => println!("unexpected: actuation accepted"),
        Err(e) => println!("rejected: {e}"),
    }

    orch.reset_emergency_stop(&ResetToken::from("operator-key"))?;
    let retracted = orch.actuate("slides", || async { "slides retracted" }).await?;
    println!("{retracted}");

    orch.stop_all().await?;
    println!("{}", serde_json::to_string_pretty(&orch.metrics())?);
    Ok(())
}
