use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rvisor::{
    CheckState, EventKind, HealthStatus, LifecycleEvent, Listener, Orchestrator,
    OrchestratorBuilder, OrchestratorConfig, OrchestratorError, Phase, RecoveryPolicy,
    RegistrationError, ResetToken, SafetyClassification, SafetyCoordinator, SafetyError,
    SafetyMode, ServiceDescriptor, ServiceError, ServiceFn, ServiceRef, StaticTokenAuthorizer,
    Status, resolve,
};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Starts after `delay`, records its name in `stops` when stopped.
fn tracked(name: &'static str, delay: Duration, stops: &Log) -> ServiceRef {
    let stops = Arc::clone(stops);
    ServiceFn::new(move |_ctx| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    })
    .on_stop(move || {
        let stops = Arc::clone(&stops);
        async move {
            stops.lock().push(name.to_string());
            Ok(())
        }
    })
    .arc()
}

fn failing(msg: &'static str) -> ServiceRef {
    ServiceFn::new(move |_ctx| async move { Err(ServiceError::fail(msg)) }).arc()
}

fn quiet_config() -> OrchestratorConfig {
    OrchestratorConfig {
        stage_timeout: Duration::from_secs(5),
        health_tick: Duration::from_secs(3600),
        log_events: false,
        ..OrchestratorConfig::default()
    }
}

fn abcde(stops: &Log) -> Vec<ServiceDescriptor> {
    vec![
        ServiceDescriptor::new("A", tracked("A", Duration::ZERO, stops)),
        ServiceDescriptor::builder("B", tracked("B", Duration::from_millis(20), stops))
            .requires("A")
            .build(),
        ServiceDescriptor::builder("C", tracked("C", Duration::ZERO, stops))
            .optional("A")
            .build(),
        ServiceDescriptor::builder("D", tracked("D", Duration::ZERO, stops))
            .requires("B")
            .requires("C")
            .build(),
        ServiceDescriptor::builder("E", tracked("E", Duration::ZERO, stops))
            .requires("D")
            .build(),
    ]
}

#[tokio::test(start_paused = true)]
async fn staged_startup_and_lifo_shutdown() {
    let stops = log();
    let orch = OrchestratorBuilder::new(quiet_config())
        .with_services(abcde(&stops))
        .build()
        .unwrap();

    assert_eq!(
        orch.plan().stages(),
        &[
            vec!["A".to_string()],
            vec!["B".to_string(), "C".to_string()],
            vec!["D".to_string()],
            vec!["E".to_string()],
        ]
    );

    orch.start_all().await.unwrap();
    for name in ["A", "B", "C", "D", "E"] {
        assert_eq!(orch.status_of(name), Some(Status::Healthy), "{name}");
    }
    assert_eq!(orch.phase(), Phase::Running);
    // Second call is a no-op.
    orch.start_all().await.unwrap();

    orch.stop_all().await.unwrap();
    // C finished starting before B (B sleeps), so B stops first within the stage.
    assert_eq!(*stops.lock(), vec!["E", "D", "B", "C", "A"]);
    for name in ["A", "B", "C", "D", "E"] {
        assert_eq!(orch.status_of(name), Some(Status::Stopped), "{name}");
    }
    orch.stop_all().await.unwrap();
    assert_eq!(stops.lock().len(), 5);

    let timing = orch.health_report().startup;
    assert_eq!(timing.stages.len(), 4);
    assert!(timing.total_ms.is_some());
}

#[test]
fn required_cycle_is_reported_as_closed_walk() {
    let descs = vec![
        ServiceDescriptor::builder("A", ServiceFn::noop().arc()).requires("B").build(),
        ServiceDescriptor::builder("B", ServiceFn::noop().arc()).requires("C").build(),
        ServiceDescriptor::builder("C", ServiceFn::noop().arc()).requires("A").build(),
    ];
    let err = resolve(&descs).unwrap_err();
    assert_eq!(
        err,
        RegistrationError::Cycle {
            cycles: vec![vec!["A".into(), "B".into(), "C".into(), "A".into()]],
        }
    );
}

#[tokio::test]
async fn build_rejects_missing_required_dependency() {
    let err = OrchestratorBuilder::new(quiet_config())
        .register(
            ServiceDescriptor::builder("furnace", ServiceFn::noop().arc())
                .requires("lpg_detector")
                .build(),
        )
        .build()
        .unwrap_err();
    match err {
        RegistrationError::DependencyMissing(e) => {
            assert_eq!(e.dependency, "lpg_detector");
            assert_eq!(e.known, vec!["furnace".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failed_required_dependency_skips_dependents_and_cleans_up() {
    let stops = log();
    let descs = vec![
        ServiceDescriptor::new("A", tracked("A", Duration::ZERO, &stops)),
        ServiceDescriptor::builder("B", failing("bus init refused"))
            .requires("A")
            .build(),
        ServiceDescriptor::builder("C", tracked("C", Duration::ZERO, &stops))
            .requires("A")
            .build(),
        ServiceDescriptor::builder("D", tracked("D", Duration::ZERO, &stops))
            .requires("B")
            .build(),
        ServiceDescriptor::builder("E", tracked("E", Duration::ZERO, &stops))
            .requires("B")
            .build(),
    ];
    let orch = OrchestratorBuilder::new(quiet_config())
        .with_services(descs)
        .build()
        .unwrap();
    assert_eq!(orch.plan().stage_count(), 3);

    let err = orch.start_all().await.unwrap_err();
    let OrchestratorError::StartupFailed { failed, skipped } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].service, "B");
    assert!(failed[0].reason.contains("bus init refused"));
    assert!(err.to_string().contains('B'));

    let skipped_names: Vec<&str> = skipped.iter().map(|s| s.service.as_str()).collect();
    assert_eq!(skipped_names, vec!["D", "E"]);
    for s in skipped {
        assert_eq!(s.root_cause, "B");
        assert_eq!(s.dependency.as_deref(), Some("B"));
    }
    for name in ["D", "E"] {
        let rec = orch.get_status(Some(name)).unwrap().remove(name).unwrap();
        assert_eq!(rec.status, Status::Skipped);
        assert!(rec.last_reason.unwrap().contains("'B'"));
    }

    // Emergency cleanup stopped what had started, most recent first.
    assert_eq!(*stops.lock(), vec!["C", "A"]);
    assert_eq!(orch.status_of("A"), Some(Status::Stopped));
    assert_eq!(orch.phase(), Phase::Aborted);
    assert!(matches!(
        orch.start_all().await,
        Err(OrchestratorError::InvalidPhase { .. })
    ));

    orch.stop_all().await.unwrap();
    for name in ["A", "B", "C", "D", "E"] {
        assert_eq!(orch.status_of(name), Some(Status::Stopped), "{name}");
    }
}

#[tokio::test(start_paused = true)]
async fn stage_timeout_aborts_and_names_stuck_service() {
    let stops = log();
    let hang = ServiceFn::new(|_ctx| async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    })
    .arc();
    let mut cfg = quiet_config();
    cfg.stage_timeout = Duration::from_millis(100);
    let orch = OrchestratorBuilder::new(cfg)
        .register(ServiceDescriptor::new("can_bus", tracked("can_bus", Duration::ZERO, &stops)))
        .register(ServiceDescriptor::builder("gps", hang).requires("can_bus").build())
        .register(
            ServiceDescriptor::builder("nav_ui", ServiceFn::noop().arc())
                .requires("gps")
                .build(),
        )
        .build()
        .unwrap();

    match orch.start_all().await {
        Err(OrchestratorError::StartupTimeout(e)) => {
            assert_eq!(e.stage, 1);
            assert_eq!(e.services, vec!["gps".to_string()]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    let gps = orch.get_status(Some("gps")).unwrap().remove("gps").unwrap();
    assert_eq!(gps.status, Status::Failed);
    assert!(gps.last_failure.unwrap().starts_with("StartupTimeout"));
    assert_eq!(orch.status_of("can_bus"), Some(Status::Stopped));
    assert_eq!(*stops.lock(), vec!["can_bus"]);

    // Later stages are skipped, as on the failure path.
    let nav = orch.lifecycle().record("nav_ui").unwrap();
    assert_eq!(nav.status, Status::Skipped);
    assert_eq!(nav.last_reason.as_deref(), Some("dependency 'gps' failed"));
}

#[tokio::test]
async fn optional_dependency_failure_degrades_dependent() {
    let orch = OrchestratorBuilder::new(quiet_config())
        .register(ServiceDescriptor::new("awning_sensor", failing("no response")))
        .register(
            ServiceDescriptor::builder("weather_ui", ServiceFn::noop().arc())
                .optional("awning_sensor")
                .build(),
        )
        .build()
        .unwrap();

    orch.start_all().await.unwrap();
    assert_eq!(orch.status_of("awning_sensor"), Some(Status::Failed));
    assert_eq!(orch.status_of("weather_ui"), Some(Status::Degraded));
    assert_eq!(orch.health_report().status, CheckState::Warn);
    orch.stop_all().await.unwrap();
}

/// Records the safety mode seen when a FAILED event arrives.
struct ModeWitness {
    priority: i32,
    safety: OnceLock<Arc<SafetyCoordinator>>,
    seen: Mutex<Vec<(String, SafetyMode)>>,
}

impl ModeWitness {
    fn at(priority: i32) -> Arc<Self> {
        Arc::new(Self {
            priority,
            safety: OnceLock::new(),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Listener for ModeWitness {
    async fn on_event(&self, event: &LifecycleEvent) {
        if event.kind != EventKind::Failed {
            return;
        }
        if let Some(safety) = self.safety.get() {
            self.seen
                .lock()
                .push((event.service.to_string(), safety.mode()));
        }
    }

    fn name(&self) -> &'static str {
        "mode_witness"
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

async fn wait_for(orch: &Orchestrator, name: &str, status: Status) {
    for _ in 0..200 {
        if orch.status_of(name) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{name} never reached {status}");
}

#[tokio::test]
async fn critical_health_failure_enters_safe_shutdown_before_returning() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&healthy);
    let x = ServiceFn::noop()
        .with_health(move || {
            let flag = Arc::clone(&flag);
            async move {
                if flag.load(Ordering::SeqCst) {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::unhealthy("chassis controller silent")
                }
            }
        })
        .arc();

    let witness = ModeWitness::at(10);
    let orch = OrchestratorBuilder::new(quiet_config())
        .with_listener(Arc::clone(&witness) as Arc<dyn Listener>)
        .register(
            ServiceDescriptor::builder("X", x)
                .classification(SafetyClassification::Critical)
                .build(),
        )
        .register(ServiceDescriptor::builder("Y", ServiceFn::noop().arc()).requires("X").build())
        .register(
            ServiceDescriptor::builder("leveler", ServiceFn::noop().arc())
                .classification(SafetyClassification::PositionCritical)
                .build(),
        )
        .build()
        .unwrap();
    let _ = witness.safety.set(Arc::clone(orch.safety()));

    orch.start_all().await.unwrap();
    healthy.store(false, Ordering::SeqCst);
    let tick = orch.monitor().run_once().await;
    assert_eq!(tick.failed, vec!["X".to_string()]);

    // Safe state is in place as soon as the failing call returned.
    assert_eq!(orch.status_of("X"), Some(Status::Failed));
    assert_eq!(orch.safety().mode(), SafetyMode::SafeShutdown);
    assert_eq!(orch.safety().disabled_by("Y").as_deref(), Some("X"));
    // And the lower-priority listener saw it already applied.
    assert_eq!(
        *witness.seen.lock(),
        vec![("X".to_string(), SafetyMode::SafeShutdown)]
    );

    assert!(matches!(
        orch.check_actuation("leveler"),
        Err(OrchestratorError::Safety(SafetyError::SafeModeActive { .. }))
    ));

    wait_for(&orch, "Y", Status::Stopped).await;

    let report = orch.health_report();
    assert_eq!(report.status, CheckState::Fail);
    let x = report.check("X").unwrap();
    assert_eq!(x.status, CheckState::Fail);
    assert_eq!(x.observed_value, Status::Failed);
    let y = report.check("Y").unwrap();
    assert_eq!(y.disabled_by.as_deref(), Some("X"));
    assert_eq!(y.status, CheckState::Fail);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["checks"]["Y:lifecycle"][0]["disabledBy"], "X");
    assert_eq!(json["safety"]["mode"], "safe_shutdown");

    orch.stop_all().await.unwrap();
}

#[tokio::test]
async fn emergency_stop_latches_until_authorized_reset() {
    let orch = OrchestratorBuilder::new(quiet_config())
        .with_authorizer(Arc::new(StaticTokenAuthorizer::new("operator-key")))
        .register(ServiceDescriptor::new("Z", ServiceFn::noop().arc()))
        .build()
        .unwrap();
    orch.start_all().await.unwrap();

    let (release, wait) = tokio::sync::oneshot::channel::<()>();
    let (began_tx, began) = tokio::sync::oneshot::channel::<()>();
    let in_flight = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move {
            orch.actuate("Z", || async move {
                let _ = began_tx.send(());
                let _ = wait.await;
                "extended"
            })
            .await
        })
    };
    began.await.unwrap();

    let latch = orch.trip_emergency_stop("manual");
    assert_eq!(latch.reason, "manual");
    let _ = release.send(());
    // The command already past its checks completes.
    assert_eq!(in_flight.await.unwrap().unwrap(), "extended");

    let rejected = orch.actuate("Z", || async { "retract" }).await.unwrap_err();
    assert!(rejected.is_emergency_stop());
    assert!(orch.start_all().await.unwrap_err().is_emergency_stop());
    assert!(orch.recover("Z").await.unwrap_err().is_emergency_stop());

    assert_eq!(
        orch.reset_emergency_stop(&ResetToken::from("guess")),
        Err(OrchestratorError::Safety(SafetyError::Unauthorized))
    );
    assert!(orch.actuate("Z", || async {}).await.unwrap_err().is_emergency_stop());

    orch.reset_emergency_stop(&ResetToken::from("operator-key")).unwrap();
    assert_eq!(orch.actuate("Z", || async { "retract" }).await.unwrap(), "retract");

    orch.trip_emergency_stop("again");
    // Shutdown stays available while latched.
    orch.stop_all().await.unwrap();
    assert_eq!(orch.status_of("Z"), Some(Status::Stopped));
}

#[tokio::test(start_paused = true)]
async fn missed_heartbeat_fails_within_one_tick() {
    let mut cfg = quiet_config();
    cfg.health_tick = Duration::from_millis(50);
    let orch = OrchestratorBuilder::new(cfg)
        .register(
            ServiceDescriptor::builder("tank_levels", ServiceFn::noop().arc())
                .heartbeat_timeout(Duration::from_millis(200))
                .build(),
        )
        .build()
        .unwrap();
    orch.start_all().await.unwrap();
    assert!(orch.monitor().is_running());

    orch.heartbeat("tank_levels").unwrap();
    tokio::time::sleep(Duration::from_millis(180)).await;
    assert_eq!(orch.status_of("tank_levels"), Some(Status::Healthy));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let rec = orch.get_status(Some("tank_levels")).unwrap().remove("tank_levels").unwrap();
    assert_eq!(rec.status, Status::Failed);
    assert!(rec.last_failure.unwrap().starts_with("WatchdogTimeout"));

    assert!(matches!(
        orch.heartbeat("nope"),
        Err(OrchestratorError::UnknownService { .. })
    ));
    orch.stop_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn recover_restarts_failed_service_with_backoff() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let flaky = ServiceFn::new(move |_ctx| {
        let counter = Arc::clone(&counter);
        async move {
            // Fails on the first two starts.
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError::fail("inverter not ready"))
            } else {
                Ok(())
            }
        }
    })
    .arc();

    let mut cfg = quiet_config();
    cfg.recovery = RecoveryPolicy {
        max_attempts: 3,
        ..RecoveryPolicy::default()
    };
    let orch = OrchestratorBuilder::new(cfg)
        .register(ServiceDescriptor::new("inverter", flaky))
        .register(ServiceDescriptor::new("lights", ServiceFn::noop().arc()))
        .build()
        .unwrap();

    // Non-blocking failure: startup continues.
    orch.start_all().await.unwrap();
    assert_eq!(orch.status_of("inverter"), Some(Status::Failed));
    assert_eq!(orch.status_of("lights"), Some(Status::Healthy));

    assert!(matches!(
        orch.recover("lights").await,
        Err(OrchestratorError::NotRecoverable { .. })
    ));
    assert_eq!(orch.recover("inverter").await.unwrap(), Status::Healthy);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let rec = orch.get_status(Some("inverter")).unwrap().remove("inverter").unwrap();
    assert_eq!(rec.start_attempts, 3);

    orch.flush_events().await;
    let metrics = orch.metrics();
    assert_eq!(metrics.events.failures["inverter"], 2);
    assert_eq!(metrics.events.up, 2);
    orch.stop_all().await.unwrap();
}

#[tokio::test]
async fn fatal_error_stops_recovery_early() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let broken = ServiceFn::new(move |_ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err(ServiceError::fatal("firmware mismatch")) }
    })
    .arc();
    let orch = OrchestratorBuilder::new(quiet_config())
        .register(ServiceDescriptor::new("generator", broken))
        .build()
        .unwrap();

    orch.start_all().await.unwrap();
    match orch.recover("generator").await {
        Err(OrchestratorError::RecoveryFailed { attempts, reason, .. }) => {
            assert_eq!(attempts, 1);
            assert!(reason.contains("firmware mismatch"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    orch.stop_all().await.unwrap();
}

#[tokio::test]
async fn runtime_dependency_is_checked_lazily() {
    let orch = OrchestratorBuilder::new(quiet_config())
        .register(ServiceDescriptor::new("furnace", failing("igniter fault")))
        .register(
            ServiceDescriptor::builder("thermostat", ServiceFn::noop().arc())
                .runtime("furnace")
                .build(),
        )
        .build()
        .unwrap();
    // RUNTIME edges do not order or block startup.
    assert_eq!(orch.plan().stage_count(), 1);

    orch.start_all().await.unwrap();
    assert_eq!(orch.status_of("thermostat"), Some(Status::Healthy));
    assert!(matches!(
        orch.require_runtime("thermostat", "furnace"),
        Err(OrchestratorError::DependencyUnavailable { .. })
    ));
    orch.stop_all().await.unwrap();
}

#[tokio::test]
async fn failing_stop_is_collected_and_still_stops() {
    let orch = OrchestratorBuilder::new(quiet_config())
        .register(ServiceDescriptor::new(
            "water_pump",
            ServiceFn::noop()
                .on_stop(|| async { Err(ServiceError::fail("relay stuck")) })
                .arc(),
        ))
        .register(ServiceDescriptor::new("lights", ServiceFn::noop().arc()))
        .build()
        .unwrap();
    orch.start_all().await.unwrap();

    match orch.stop_all().await {
        Err(OrchestratorError::ShutdownIncomplete { errors }) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].service, "water_pump");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(orch.status_of("water_pump"), Some(Status::Stopped));
    assert_eq!(orch.status_of("lights"), Some(Status::Stopped));
}

#[tokio::test]
async fn listeners_below_safety_priority_still_see_safe_state() {
    let early = ModeWitness::at(-10);
    let earliest = ModeWitness::at(i32::MIN);
    let orch = OrchestratorBuilder::new(quiet_config())
        .with_listener(Arc::clone(&early) as Arc<dyn Listener>)
        .with_listener(Arc::clone(&earliest) as Arc<dyn Listener>)
        .register(
            ServiceDescriptor::builder("chassis", ServiceFn::noop().arc())
                .classification(SafetyClassification::Critical)
                .build(),
        )
        .build()
        .unwrap();
    for w in [&early, &earliest] {
        let _ = w.safety.set(Arc::clone(orch.safety()));
    }
    assert_eq!(
        orch.lifecycle().bus().listener_names(),
        vec!["safety", "mode_witness", "mode_witness", "metrics"]
    );

    orch.start_all().await.unwrap();
    orch.lifecycle()
        .transition("chassis", Status::Failed, "bus-off")
        .await
        .unwrap();

    let expected = vec![("chassis".to_string(), SafetyMode::SafeShutdown)];
    assert_eq!(*early.seen.lock(), expected);
    assert_eq!(*earliest.seen.lock(), expected);
    orch.stop_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_all_waits_for_containment_before_stopping_prerequisites() {
    let stops = log();
    let slow_stops = Arc::clone(&stops);
    let inverter = ServiceFn::noop()
        .on_stop(move || {
            let stops = Arc::clone(&slow_stops);
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                stops.lock().push("inverter".to_string());
                Ok(())
            }
        })
        .arc();
    let battery = tracked("battery_monitor", Duration::ZERO, &stops);
    let orch = OrchestratorBuilder::new(quiet_config())
        .register(
            ServiceDescriptor::builder("battery_monitor", battery)
                .classification(SafetyClassification::Critical)
                .build(),
        )
        .register(
            ServiceDescriptor::builder("inverter", inverter)
                .requires("battery_monitor")
                .build(),
        )
        .build()
        .unwrap();
    orch.start_all().await.unwrap();

    orch.lifecycle()
        .transition("battery_monitor", Status::Failed, "cell overvoltage")
        .await
        .unwrap();
    wait_for(&orch, "inverter", Status::Stopping).await;

    orch.stop_all().await.unwrap();
    assert_eq!(orch.status_of("inverter"), Some(Status::Stopped));
    assert_eq!(orch.status_of("battery_monitor"), Some(Status::Stopped));
    assert_eq!(*stops.lock(), vec!["inverter", "battery_monitor"]);
}

/// Holds the deferred worker on the first DEGRADED event until released.
struct QueueGate {
    entered: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    release: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
}

#[async_trait]
impl Listener for QueueGate {
    async fn on_event(&self, event: &LifecycleEvent) {
        if event.kind != EventKind::Degraded {
            return;
        }
        if let Some(entered) = self.entered.lock().take() {
            let _ = entered.send(());
        }
        let release = self.release.lock().take();
        if let Some(release) = release {
            let _ = release.await;
        }
    }
}

#[tokio::test]
async fn failed_event_reaches_safety_when_queue_is_full() {
    let (entered_tx, entered) = tokio::sync::oneshot::channel();
    let (release, release_rx) = tokio::sync::oneshot::channel();
    let gate = Arc::new(QueueGate {
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(Some(release_rx)),
    });
    let mut cfg = quiet_config();
    cfg.event_queue_capacity = 1;
    let orch = OrchestratorBuilder::new(cfg)
        .with_listener(gate as Arc<dyn Listener>)
        .register(ServiceDescriptor::new("radio", ServiceFn::noop().arc()))
        .register(
            ServiceDescriptor::builder("slides", ServiceFn::noop().arc())
                .classification(SafetyClassification::PositionCritical)
                .build(),
        )
        .build()
        .unwrap();
    orch.start_all().await.unwrap();
    orch.flush_events().await;

    let machine = Arc::clone(orch.lifecycle());
    machine.transition("radio", Status::Degraded, "weak signal").await.unwrap();
    entered.await.unwrap();
    // Worker is parked: one event fills the queue, the next is dropped.
    machine.transition("radio", Status::Healthy, "signal back").await.unwrap();
    machine.transition("radio", Status::Degraded, "weak again").await.unwrap();
    let dropped = orch.metrics().bus.dropped;
    assert!(dropped >= 1);

    let failing = tokio::spawn({
        let machine = Arc::clone(&machine);
        async move {
            machine
                .transition("slides", Status::Failed, "encoder lost")
                .await
        }
    });
    tokio::task::yield_now().await;
    let _ = release.send(());
    failing.await.unwrap().unwrap();
    orch.flush_events().await;

    assert!(orch.safety().is_frozen("slides"));
    assert_eq!(orch.metrics().bus.dropped, dropped);
    orch.stop_all().await.unwrap();
}

#[tokio::test]
async fn safety_related_failure_stops_direct_dependents_only() {
    let orch = OrchestratorBuilder::new(quiet_config())
        .register(
            ServiceDescriptor::builder("lpg_detector", ServiceFn::noop().arc())
                .classification(SafetyClassification::SafetyRelated)
                .build(),
        )
        .register(
            ServiceDescriptor::builder("furnace", ServiceFn::noop().arc())
                .requires("lpg_detector")
                .build(),
        )
        .register(
            ServiceDescriptor::builder("thermostat_ui", ServiceFn::noop().arc())
                .requires("furnace")
                .build(),
        )
        .build()
        .unwrap();
    orch.start_all().await.unwrap();

    orch.lifecycle()
        .transition("lpg_detector", Status::Failed, "sensor fault")
        .await
        .unwrap();
    assert_eq!(orch.safety().disabled_by("furnace").as_deref(), Some("lpg_detector"));
    assert_eq!(orch.safety().disabled_by("thermostat_ui"), None);
    assert_eq!(orch.safety().mode(), SafetyMode::Normal);

    wait_for(&orch, "furnace", Status::Stopped).await;
    assert_eq!(orch.status_of("thermostat_ui"), Some(Status::Healthy));
    orch.stop_all().await.unwrap();
}
