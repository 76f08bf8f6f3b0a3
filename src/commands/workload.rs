//! Workload command handlers.
//!
//! Each subcommand goes through the workload store, so status changes fire
//! the reconciler exactly as a dashboard edit would.

use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use colored::*;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::devices::DeviceDiscovery;
use crate::core::reconciler::Reconciler;
use crate::core::supervisor::{
    LocalProcessRegistry, MemoryRegistry, ProcessRegistry, RegistryCall, Supervisor,
    WorkerEnvironment,
};
use crate::core::workload::{
    MediaSource, NewWorkload, Usecase, UsecaseMetadata, Workload, WorkloadStatus, WorkloadStore,
};

pub async fn execute(matches: &ArgMatches, config: &Config) -> Result<()> {
    let dry_run = matches.get_flag("dry-run");
    let check_devices = matches.get_flag("check-devices");

    if dry_run {
        println!(
            "{}",
            "DRY RUN MODE - No worker processes, workload records or uploads will be changed"
                .yellow()
                .bold()
        );
        println!();
    }

    let session = open_store(config, dry_run, check_devices).await?;
    let store = &session.store;

    let result = match matches.subcommand() {
        Some(("list", sub_matches)) => list(store, sub_matches.get_flag("json")),
        Some(("create", sub_matches)) => create(store, sub_matches).await,
        Some(("activate", sub_matches)) => {
            set_status(store, parse_id(sub_matches)?, WorkloadStatus::Active).await
        }
        Some(("deactivate", sub_matches)) => {
            set_status(store, parse_id(sub_matches)?, WorkloadStatus::Inactive).await
        }
        Some(("set-status", sub_matches)) => {
            let status = sub_matches
                .get_one::<String>("status")
                .context("Missing status")?
                .parse::<WorkloadStatus>()?;
            set_status(store, parse_id(sub_matches)?, status).await
        }
        Some(("delete", sub_matches)) => {
            let id = parse_id(sub_matches)?;
            let removed = store
                .delete(id)
                .await
                .with_context(|| format!("Failed to delete workload {}", id))?;
            println!("{} workload {}", "Deleted".green(), removed.id);
            Ok(())
        }
        _ => {
            println!("Use 'edgeboard workload --help' for more information.");
            Ok(())
        }
    };

    if let Some(recorded) = &session.recorded {
        print_recorded_calls(&recorded.calls());
    }
    result
}

/// Workload store wired to its reconciler
pub struct WorkloadSession {
    pub store: WorkloadStore,
    /// Registry calls captured instead of executed, in dry-run mode
    pub recorded: Option<Arc<MemoryRegistry>>,
}

/// Wire the store to a reconciler over the local registry.
///
/// A dry run works on an in-memory copy of the store, records registry calls
/// instead of executing them and keeps uploaded media.
pub async fn open_store(
    config: &Config,
    dry_run: bool,
    check_devices: bool,
) -> Result<WorkloadSession> {
    let recorded = dry_run.then(|| Arc::new(MemoryRegistry::new()));
    let registry: Arc<dyn ProcessRegistry> = match &recorded {
        Some(memory) => memory.clone(),
        None => Arc::new(
            LocalProcessRegistry::open(&config.process_table_path(), &config.logs_dir())
                .context("Failed to open process table")?,
        ),
    };

    let supervisor = Arc::new(Supervisor::new(
        registry,
        WorkerEnvironment::new(&config.workers_dir),
    ));
    let mut reconciler = Reconciler::new(supervisor, &config.media_dir, &config.assets_dir);
    if check_devices {
        let catalog = DeviceDiscovery::new(&config.gpu_tool).discover().await;
        reconciler = reconciler.with_catalog(catalog);
    }

    let store = if dry_run {
        WorkloadStore::detached_copy(
            &config.workload_store_path(),
            Arc::new(reconciler.keep_uploads()),
        )
        .context("Failed to read workload store")?
    } else {
        WorkloadStore::new(&config.workload_store_path(), Arc::new(reconciler))
    };

    Ok(WorkloadSession { store, recorded })
}

fn print_recorded_calls(calls: &[RegistryCall]) {
    println!();
    if calls.is_empty() {
        println!("{}", "Dry run: no worker would be touched.".dimmed());
        return;
    }
    println!("{}", "Dry run: worker actions that would run".yellow().bold());
    for call in calls {
        match call {
            RegistryCall::Launch { id, args } => {
                println!("  launch    {} {}", id.bold(), args.join(" ").dimmed())
            }
            RegistryCall::Relaunch { id } => println!("  resume    {}", id.bold()),
            RegistryCall::Terminate { id } => println!("  stop      {}", id.bold()),
            RegistryCall::Forget { id } => println!("  forget    {}", id.bold()),
        }
    }
}

fn parse_id(matches: &ArgMatches) -> Result<u64> {
    matches
        .get_one::<u64>("id")
        .copied()
        .context("Missing workload id")
}

fn list(store: &WorkloadStore, json_output: bool) -> Result<()> {
    let workloads = store.list().context("Failed to read workload store")?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&workloads)?);
        return Ok(());
    }

    if workloads.is_empty() {
        println!("{}", "No workloads.".dimmed());
        println!();
        println!("{}", "To create one, run:".white());
        println!(
            "  {}",
            "edgeboard workload create --usecase text-generation --model <MODEL> --device CPU --port 5001"
                .cyan()
                .bold()
        );
        return Ok(());
    }

    for workload in &workloads {
        print_workload(workload);
    }
    Ok(())
}

async fn create(store: &WorkloadStore, matches: &ArgMatches) -> Result<()> {
    let usecase = matches
        .get_one::<String>("usecase")
        .context("Missing usecase")?
        .parse::<Usecase>()?;
    let model = matches
        .get_one::<String>("model")
        .context("Missing model")?
        .clone();
    let devices: Vec<String> = matches
        .get_many::<String>("device")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let port = *matches.get_one::<u16>("port").context("Missing port")?;
    let task = matches
        .get_one::<String>("task")
        .cloned()
        .unwrap_or_else(|| usecase.as_str().to_string());
    let source = matches
        .get_one::<String>("source")
        .map(|s| MediaSource::parse(s))
        .transpose()?;
    let metadata = match matches.get_one::<u32>("streams") {
        Some(_) if !usecase.accepts_stream_count() => {
            bail!("--streams is not supported by the {} worker", usecase)
        }
        Some(&num_streams) => UsecaseMetadata::Streaming { num_streams },
        None => UsecaseMetadata::None,
    };

    let workload = store
        .create(NewWorkload {
            task,
            usecase,
            model,
            devices,
            source,
            port,
            metadata,
        })
        .await
        .context("Failed to create workload")?;

    print_workload(&workload);
    Ok(())
}

async fn set_status(store: &WorkloadStore, id: u64, status: WorkloadStatus) -> Result<()> {
    let workload = store
        .update_status(id, status)
        .await
        .with_context(|| format!("Failed to set workload {} to {}", id, status))?;

    if workload.status != status {
        println!(
            "{} workload {} ended up {}",
            "Warning:".yellow().bold(),
            id,
            colored_status(workload.status)
        );
    }
    print_workload(&workload);
    Ok(())
}

fn colored_status(status: WorkloadStatus) -> ColoredString {
    match status {
        WorkloadStatus::Prepare => status.as_str().yellow(),
        WorkloadStatus::Active => status.as_str().green(),
        WorkloadStatus::Inactive => status.as_str().dimmed(),
        WorkloadStatus::Failed => status.as_str().red().bold(),
    }
}

fn print_workload(workload: &Workload) {
    println!(
        "  {:>4}  {:<10} {:<30} {:<20} port {:<6} [{}]",
        workload.id.to_string().bold(),
        colored_status(workload.status),
        workload.usecase.as_str().cyan(),
        workload.model,
        workload.port,
        workload.devices.join(", ")
    );
}
