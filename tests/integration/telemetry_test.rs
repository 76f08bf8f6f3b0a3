// Telemetry runtime tests with stub sources and a mocked power daemon

use async_trait::async_trait;
use edgeboard::core::devices::{DeviceCatalog, DeviceDescriptor};
use edgeboard::core::telemetry::sources::PowerSource;
use edgeboard::core::telemetry::{
    AggregatedSnapshot, MetricSample, MetricSource, PollPolicy, SourceKind, SourceScope,
    TelemetryRuntime,
};
use mockito::Server;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct ConstantCpu;

#[async_trait]
impl MetricSource for ConstantCpu {
    fn kind(&self) -> SourceKind {
        SourceKind::Cpu
    }

    fn scope(&self) -> SourceScope {
        SourceScope::Machine
    }

    async fn sample(&self, _device: Option<&DeviceDescriptor>) -> MetricSample {
        MetricSample::reading(SourceKind::Cpu, None, 42.0)
    }
}

struct CountingNpu {
    calls: AtomicU32,
}

#[async_trait]
impl MetricSource for CountingNpu {
    fn kind(&self) -> SourceKind {
        SourceKind::Npu
    }

    fn scope(&self) -> SourceScope {
        SourceScope::Machine
    }

    async fn sample(&self, _device: Option<&DeviceDescriptor>) -> MetricSample {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        MetricSample::reading(SourceKind::Npu, None, n as f64)
    }
}

fn policy(interval_ms: u64) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(interval_ms),
        timeout: Some(Duration::from_millis(500)),
        retry_limit: 0,
        retry_delay: Duration::from_millis(1),
    }
}

async fn wait_for(
    runtime: &TelemetryRuntime,
    predicate: impl Fn(&AggregatedSnapshot) -> bool,
) -> Arc<AggregatedSnapshot> {
    let mut rx = runtime.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if predicate(&snapshot) {
                return snapshot;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("snapshot condition not reached in time")
}

#[tokio::test]
async fn test_failing_power_does_not_affect_cpu() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/persecond")
        .with_status(500)
        .expect_at_least(1)
        .create_async()
        .await;

    let power: Arc<dyn MetricSource> =
        Arc::new(PowerSource::with_base_url(&server.url()).with_platform_support(true));
    let runtime = TelemetryRuntime::start(
        vec![
            (Arc::new(ConstantCpu), policy(50)),
            (power, policy(50)),
        ],
        DeviceCatalog::default(),
    );

    let snapshot = wait_for(&runtime, |s| {
        s.source(SourceKind::Power)
            .is_some_and(|p| p.updated_at.is_some())
            && s.source(SourceKind::Cpu)
                .is_some_and(|c| c.updated_at.is_some())
    })
    .await;

    assert_eq!(
        snapshot
            .sample(SourceKind::Cpu, None)
            .and_then(|s| s.value()),
        Some(42.0)
    );
    assert!(!snapshot.source(SourceKind::Cpu).unwrap().has_error);

    let power = snapshot.source(SourceKind::Power).unwrap();
    assert!(power.has_error);
    assert!(power.last_error.as_deref().unwrap().contains("500"));
    assert!(snapshot.has_errors);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_power_reading_reaches_snapshot() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/persecond")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"Interval us": 2000000, "Uncore Aggregate": {"Uncore Counters": {"Package Joules Consumed": 30.0}}}"#,
        )
        .create_async()
        .await;

    let power: Arc<dyn MetricSource> =
        Arc::new(PowerSource::with_base_url(&server.url()).with_platform_support(true));
    let runtime = TelemetryRuntime::start(vec![(power, policy(50))], DeviceCatalog::default());

    let snapshot = wait_for(&runtime, |s| s.sample(SourceKind::Power, None).is_some()).await;
    assert_eq!(
        snapshot
            .sample(SourceKind::Power, None)
            .and_then(|s| s.value()),
        Some(15.0)
    );
    assert!(!snapshot.has_errors);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_manual_refresh_polls_immediately() {
    let npu = Arc::new(CountingNpu {
        calls: AtomicU32::new(0),
    });
    // Long interval: only the first tick and manual refreshes poll
    let runtime = TelemetryRuntime::start(
        vec![(npu.clone() as Arc<dyn MetricSource>, policy(60_000))],
        DeviceCatalog::default(),
    );

    wait_for(&runtime, |s| s.sample(SourceKind::Npu, None).is_some()).await;
    assert!(runtime.refresh(SourceKind::Npu));

    let snapshot = wait_for(&runtime, |s| {
        s.sample(SourceKind::Npu, None)
            .and_then(|sample| sample.value())
            .is_some_and(|v| v >= 1.0)
    })
    .await;
    assert!(snapshot.sample(SourceKind::Npu, None).is_some());
    assert!(npu.calls.load(Ordering::SeqCst) >= 2);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_polling() {
    let npu = Arc::new(CountingNpu {
        calls: AtomicU32::new(0),
    });
    let runtime = TelemetryRuntime::start(
        vec![(npu.clone() as Arc<dyn MetricSource>, policy(10))],
        DeviceCatalog::default(),
    );
    wait_for(&runtime, |s| s.sample(SourceKind::Npu, None).is_some()).await;

    runtime.shutdown().await;
    let after_shutdown = npu.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(npu.calls.load(Ordering::SeqCst), after_shutdown);
}

#[tokio::test]
async fn test_snapshot_serializes_for_export() {
    let runtime = TelemetryRuntime::start(
        vec![(Arc::new(ConstantCpu) as Arc<dyn MetricSource>, policy(50))],
        DeviceCatalog::default(),
    );
    let snapshot = wait_for(&runtime, |s| s.is_settled() && s.sample(SourceKind::Cpu, None).is_some()).await;

    let json = serde_json::to_value(&*snapshot).unwrap();
    assert_eq!(json["is_loading"], false);
    assert!(json["sources"]["cpu"]["samples"].is_object());

    runtime.shutdown().await;
}
