//! Polling runtime for the telemetry sources.
//!
//! One task per source, each on its own interval. A tick asks the aggregator
//! for a ticket, fans out one sample per target device, retries the samples
//! that failed transiently, merges the result and publishes a fresh snapshot
//! on a watch channel.

use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::aggregator::{AggregatedSnapshot, Aggregator};
use super::sources::{MetricSource, SourceScope};
use super::{MetricSample, PollPolicy, SourceKind};
use crate::core::devices::{DeviceCatalog, DeviceDescriptor};

/// State shared by all polling tasks
struct PollContext {
    aggregator: Mutex<Aggregator>,
    snapshot_tx: watch::Sender<Arc<AggregatedSnapshot>>,
}

impl PollContext {
    fn publish(&self) {
        let snapshot = Arc::new(self.aggregator.lock().snapshot());
        // send_replace never fails, even with no receivers left
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// Handle to the running polling tasks
pub struct TelemetryRuntime {
    snapshot_rx: watch::Receiver<Arc<AggregatedSnapshot>>,
    devices_tx: watch::Sender<Arc<DeviceCatalog>>,
    refresh_tx: HashMap<SourceKind, mpsc::Sender<()>>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl TelemetryRuntime {
    /// Spawn one polling task per source on the current Tokio runtime.
    pub fn start(
        sources: Vec<(Arc<dyn MetricSource>, PollPolicy)>,
        catalog: DeviceCatalog,
    ) -> Self {
        let mut aggregator = Aggregator::new();
        for (source, _) in &sources {
            aggregator.register(source.kind());
        }

        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(aggregator.snapshot()));
        let (devices_tx, devices_rx) = watch::channel(Arc::new(catalog));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let ctx = Arc::new(PollContext {
            aggregator: Mutex::new(aggregator),
            snapshot_tx,
        });

        let mut refresh_tx = HashMap::new();
        let mut handles = Vec::with_capacity(sources.len());
        for (source, policy) in sources {
            // Capacity 1: refresh requests made while a tick is pending collapse into one
            let (tx, rx) = mpsc::channel::<()>(1);
            refresh_tx.insert(source.kind(), tx);
            handles.push(tokio::spawn(poll_source_task(
                source,
                policy,
                ctx.clone(),
                devices_rx.clone(),
                rx,
                shutdown_tx.subscribe(),
            )));
        }

        log::info!("Telemetry runtime started with {} sources", handles.len());

        Self {
            snapshot_rx,
            devices_tx,
            refresh_tx,
            shutdown_tx,
            handles,
        }
    }

    /// Receiver that yields every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<AggregatedSnapshot>> {
        self.snapshot_rx.clone()
    }

    pub fn latest(&self) -> Arc<AggregatedSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Request an immediate poll of `kind` (manual retry). Returns `false`
    /// when a request is already queued or the source is unknown.
    pub fn refresh(&self, kind: SourceKind) -> bool {
        self.refresh_tx
            .get(&kind)
            .is_some_and(|tx| tx.try_send(()).is_ok())
    }

    /// Replace the per-device polling set (after re-running discovery)
    pub fn set_devices(&self, catalog: DeviceCatalog) {
        self.devices_tx.send_replace(Arc::new(catalog));
    }

    /// Stop every polling task and wait for them to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
        log::info!("Telemetry runtime stopped");
    }
}

async fn poll_source_task(
    source: Arc<dyn MetricSource>,
    policy: PollPolicy,
    ctx: Arc<PollContext>,
    devices_rx: watch::Receiver<Arc<DeviceCatalog>>,
    mut refresh_rx: mpsc::Receiver<()>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let kind = source.kind();
    let mut ticker = interval(policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            Some(()) = refresh_rx.recv() => {
                log::debug!("Manual refresh of {}", kind);
            }
            _ = shutdown.recv() => break,
        }

        let Some(ticket) = ctx.aggregator.lock().begin(kind) else {
            continue;
        };
        ctx.publish();

        let catalog = devices_rx.borrow().clone();
        let targets = targets_for(source.scope(), &catalog);

        tokio::select! {
            samples = collect_tick(source.as_ref(), &policy, &targets) => {
                ctx.aggregator.lock().complete(ticket, samples);
                ctx.publish();
            }
            _ = shutdown.recv() => {
                ctx.aggregator.lock().abandon(ticket);
                break;
            }
        }
    }

    log::debug!("{} polling task stopped", kind);
}

fn targets_for(scope: SourceScope, catalog: &DeviceCatalog) -> Vec<Option<DeviceDescriptor>> {
    match scope {
        SourceScope::Machine => vec![None],
        SourceScope::PerDevice(kind) => catalog.of_kind(kind).cloned().map(Some).collect(),
    }
}

/// Sample every target concurrently, then retry the transient failures.
///
/// A failure on one target never touches the samples of the others; retries
/// only re-run the failed targets, with the policy's backoff between rounds.
pub async fn collect_tick(
    source: &dyn MetricSource,
    policy: &PollPolicy,
    targets: &[Option<DeviceDescriptor>],
) -> Vec<MetricSample> {
    let mut samples = join_all(
        targets
            .iter()
            .map(|target| sample_once(source, policy, target.as_ref())),
    )
    .await;

    for attempt in 1..=policy.retry_limit {
        let failed: Vec<usize> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_transient_error())
            .map(|(i, _)| i)
            .collect();
        if failed.is_empty() {
            break;
        }

        tokio::time::sleep(policy.backoff(attempt)).await;
        let retried = join_all(
            failed
                .iter()
                .map(|&i| sample_once(source, policy, targets[i].as_ref())),
        )
        .await;
        for (i, sample) in failed.into_iter().zip(retried) {
            samples[i] = sample;
        }
    }

    samples
}

async fn sample_once(
    source: &dyn MetricSource,
    policy: &PollPolicy,
    target: Option<&DeviceDescriptor>,
) -> MetricSample {
    let Some(limit) = policy.timeout else {
        return source.sample(target).await;
    };

    match tokio::time::timeout(limit, source.sample(target)).await {
        Ok(sample) => sample,
        Err(_) => MetricSample::transient(
            source.kind(),
            target.map(|d| d.id.as_str()),
            format!("timed out after {:?}", limit),
        ),
    }
}
