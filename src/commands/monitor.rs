//! Live telemetry command handler.
//!
//! Starts the polling runtime and prints the merged snapshot at a fixed
//! display cadence until Ctrl+C or `--count` snapshots.

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::core::config::Config;
use crate::core::devices::DeviceDiscovery;
use crate::core::telemetry::{
    default_sources, AggregatedSnapshot, PollState, SourceKind, SourceSnapshot, TelemetryRuntime,
};

const DEFAULT_DISPLAY_INTERVAL_MS: u64 = 1000;

pub async fn execute(matches: &ArgMatches, config: &Config) -> Result<()> {
    let interval_override = matches.get_one::<u64>("interval").copied();
    let count = matches.get_one::<usize>("count").copied();
    let json_output = matches.get_flag("json");

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_flag_clone = cancel_flag.clone();
    ctrlc::set_handler(move || {
        cancel_flag_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    let catalog = DeviceDiscovery::new(&config.gpu_tool).discover().await;
    let sources = default_sources(config)
        .into_iter()
        .map(|source| {
            let mut policy = config.poll_policy(source.kind());
            if let Some(ms) = interval_override {
                policy.interval = Duration::from_millis(ms.max(1));
            }
            (source, policy)
        })
        .collect();

    let runtime = TelemetryRuntime::start(sources, catalog);

    if !json_output {
        println!("{}", "Press Ctrl+C to stop".dimmed());
    }

    let display_ms = interval_override.unwrap_or(DEFAULT_DISPLAY_INTERVAL_MS).max(1);
    let mut ticker = tokio::time::interval(Duration::from_millis(display_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut printed = 0usize;
    while !cancel_flag.load(Ordering::Relaxed) {
        ticker.tick().await;
        let snapshot = runtime.latest();

        if json_output {
            println!(
                "{}",
                serde_json::to_string(&*snapshot).context("Failed to serialize snapshot")?
            );
        } else {
            print_snapshot(&snapshot);
        }

        printed += 1;
        if count.is_some_and(|n| printed >= n) {
            break;
        }
    }

    runtime.shutdown().await;
    Ok(())
}

fn unit(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Power => "W",
        _ => "%",
    }
}

fn print_snapshot(snapshot: &AggregatedSnapshot) {
    let header = chrono::DateTime::from_timestamp_millis(snapshot.timestamp)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_default();
    let status = if snapshot.has_errors {
        "errors".red()
    } else if snapshot.is_loading {
        "loading".yellow()
    } else {
        "ok".green()
    };
    println!("{} {}", header.bold(), status);

    for (kind, source) in &snapshot.sources {
        print_source(*kind, source);
    }
    println!();
}

fn print_source(kind: SourceKind, source: &SourceSnapshot) {
    let marker = match source.state {
        PollState::Loading => "…".yellow(),
        PollState::Idle => " ".normal(),
    };

    if source.samples.is_empty() {
        println!("  {} {:<12} {}", marker, kind.as_str(), "-".dimmed());
        return;
    }

    for (device, sample) in &source.samples {
        let label = if device.is_empty() {
            kind.as_str().to_string()
        } else {
            format!("{} {}", kind.as_str(), device)
        };

        let value = match (sample.value(), sample.error()) {
            (Some(v), _) => format!("{:>6.1}{}", v, unit(kind)).normal(),
            (None, Some(err)) => err.reason.red(),
            (None, None) => "n/a".dimmed(),
        };
        println!("  {} {:<20} {}", marker, label, value);
    }

    if source.has_error && source.consecutive_failures > 1 {
        println!(
            "    {}",
            format!("failing for {} ticks", source.consecutive_failures).red()
        );
    }
}
