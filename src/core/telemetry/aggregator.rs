//! Merge state for all telemetry sources.
//!
//! The aggregator is plain data: polling tasks ask it for a ticket before a
//! tick, hand the samples back when the tick settles, and publish the
//! resulting snapshot. It owns the per-source `idle -> loading -> idle`
//! state machine.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use super::{MetricSample, SourceKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    #[default]
    Idle,
    Loading,
}

/// Proof that a poll for `source` was admitted. Completing with an outdated
/// ticket is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    source: SourceKind,
    generation: u64,
}

impl PollTicket {
    pub fn source(&self) -> SourceKind {
        self.source
    }
}

/// Latest known state of one source
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceSnapshot {
    pub state: PollState,
    /// The latest completed tick contained at least one transient failure
    pub has_error: bool,
    pub last_error: Option<String>,
    /// Ticks in a row that ended in error
    pub consecutive_failures: u32,
    /// Unix millis of the last completed tick
    pub updated_at: Option<i64>,
    /// Latest sample per device id (`""` for machine-wide sources)
    pub samples: BTreeMap<String, MetricSample>,
}

/// Merged view across all sources
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedSnapshot {
    pub sources: BTreeMap<SourceKind, SourceSnapshot>,
    /// Any source currently loading
    pub is_loading: bool,
    /// Any source whose latest tick ended in error
    pub has_errors: bool,
    pub timestamp: i64,
}

impl AggregatedSnapshot {
    pub fn source(&self, kind: SourceKind) -> Option<&SourceSnapshot> {
        self.sources.get(&kind)
    }

    pub fn sample(&self, kind: SourceKind, device_id: Option<&str>) -> Option<&MetricSample> {
        self.sources
            .get(&kind)?
            .samples
            .get(device_id.unwrap_or_default())
    }

    /// Settled and error free: safe to export
    pub fn is_settled(&self) -> bool {
        !self.is_loading && !self.has_errors
    }
}

#[derive(Debug, Default)]
struct SourceEntry {
    snapshot: SourceSnapshot,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    entries: BTreeMap<SourceKind, SourceEntry>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source so it shows up in snapshots before its first tick.
    pub fn register(&mut self, kind: SourceKind) {
        self.entries.entry(kind).or_default();
    }

    /// Admit a poll for `kind`, or `None` if one is already in flight.
    pub fn begin(&mut self, kind: SourceKind) -> Option<PollTicket> {
        let entry = self.entries.entry(kind).or_default();
        if entry.snapshot.state == PollState::Loading {
            log::debug!("Skipping {} poll: previous tick still loading", kind);
            return None;
        }
        entry.generation += 1;
        entry.snapshot.state = PollState::Loading;
        Some(PollTicket {
            source: kind,
            generation: entry.generation,
        })
    }

    /// Merge the samples of a settled tick. Returns `false` when the ticket is
    /// stale and the samples were discarded.
    ///
    /// Devices absent from `samples` are dropped: the tick polled every device
    /// the source currently knows about.
    pub fn complete(&mut self, ticket: PollTicket, samples: Vec<MetricSample>) -> bool {
        let Some(entry) = self.entries.get_mut(&ticket.source) else {
            return false;
        };
        if entry.generation != ticket.generation || entry.snapshot.state != PollState::Loading {
            log::debug!("Discarding late {} samples", ticket.source);
            return false;
        }

        let failures: Vec<&MetricSample> =
            samples.iter().filter(|s| s.is_transient_error()).collect();
        let snapshot = &mut entry.snapshot;
        snapshot.has_error = !failures.is_empty();
        snapshot.last_error = failures.first().and_then(|s| {
            s.error().map(|e| match s.device_id() {
                Some(device) => format!("{}: {}", device, e.reason),
                None => e.reason.clone(),
            })
        });
        if snapshot.has_error {
            snapshot.consecutive_failures += 1;
        } else {
            snapshot.consecutive_failures = 0;
        }

        let polled: HashSet<String> = samples.iter().map(MetricSample::device_key).collect();
        snapshot.samples.retain(|key, _| polled.contains(key));
        for sample in samples {
            snapshot.samples.insert(sample.device_key(), sample);
        }

        snapshot.state = PollState::Idle;
        snapshot.updated_at = Some(chrono::Utc::now().timestamp_millis());
        true
    }

    /// Release a ticket without merging anything (the polling task is stopping).
    pub fn abandon(&mut self, ticket: PollTicket) {
        if let Some(entry) = self.entries.get_mut(&ticket.source) {
            if entry.generation == ticket.generation {
                entry.snapshot.state = PollState::Idle;
            }
        }
    }

    pub fn snapshot(&self) -> AggregatedSnapshot {
        let sources: BTreeMap<SourceKind, SourceSnapshot> = self
            .entries
            .iter()
            .map(|(kind, entry)| (*kind, entry.snapshot.clone()))
            .collect();

        AggregatedSnapshot {
            is_loading: sources.values().any(|s| s.state == PollState::Loading),
            has_errors: sources.values().any(|s| s.has_error),
            sources,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
