//! Live hardware telemetry.
//!
//! This module provides the metric source adapters, the per-source polling
//! runtime and the aggregator that merges samples into one snapshot with
//! per-source loading and error state.

mod aggregator;
mod policy;
mod runtime;
mod sample;
pub mod sources;

pub use aggregator::{AggregatedSnapshot, Aggregator, PollState, PollTicket, SourceSnapshot};
pub use policy::PollPolicy;
pub use runtime::{collect_tick, TelemetryRuntime};
pub use sample::{MetricSample, SampleError, SampleErrorKind, SourceKind};
pub use sources::{default_sources, MetricSource, PowerReading, SourceScope};
