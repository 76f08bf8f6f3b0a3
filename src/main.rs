use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};

use edgeboard::commands;
use edgeboard::core::config::Config;

fn id_arg() -> Arg {
    Arg::new("id")
        .help("Workload id")
        .required(true)
        .index(1)
        .value_parser(value_parser!(u64))
}

fn workload_command() -> Command {
    Command::new("workload")
        .about("Manage inference workloads (use 'edgeboard workload --help' for subcommands)")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Record worker launches instead of starting processes")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-devices")
                .long("check-devices")
                .help("Run device discovery and drop unknown device selections before launching")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("list").about("List workloads").arg(
                Arg::new("json")
                    .long("json")
                    .help("Output as JSON")
                    .action(ArgAction::SetTrue),
            ),
        )
        .subcommand(
            Command::new("create")
                .about("Create a workload and launch its worker")
                .arg(
                    Arg::new("usecase")
                        .short('u')
                        .long("usecase")
                        .value_name("USECASE")
                        .help("text-generation, text-to-image, automatic-speech-recognition, text-to-speech, object-detection or instance-segmentation")
                        .required(true),
                )
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .value_name("MODEL")
                        .help("Model identifier")
                        .required(true),
                )
                .arg(
                    Arg::new("device")
                        .short('d')
                        .long("device")
                        .value_name("DEVICE")
                        .help("Inference device id; repeat for an ordered preference list")
                        .action(ArgAction::Append)
                        .required(true),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("Port the worker listens on")
                        .value_parser(value_parser!(u16))
                        .required(true),
                )
                .arg(
                    Arg::new("task")
                        .long("task")
                        .value_name("TASK")
                        .help("Task category (defaults to the usecase)"),
                )
                .arg(
                    Arg::new("source")
                        .short('s')
                        .long("source")
                        .value_name("TYPE:NAME")
                        .help("Media input: camera:<index>, upload:<file> or predefined:<file>"),
                )
                .arg(
                    Arg::new("streams")
                        .long("streams")
                        .value_name("N")
                        .help("Number of parallel streams for streaming usecases")
                        .value_parser(value_parser!(u32).range(1..)),
                ),
        )
        .subcommand(
            Command::new("activate")
                .about("Resume a stopped workload")
                .arg(id_arg()),
        )
        .subcommand(
            Command::new("deactivate")
                .about("Stop a running workload, keeping its configuration")
                .arg(id_arg()),
        )
        .subcommand(
            Command::new("delete")
                .about("Stop a workload, delete its uploaded media and remove it")
                .arg(id_arg()),
        )
        .subcommand(
            Command::new("set-status")
                .about("Record a status reported by a worker")
                .arg(id_arg())
                .arg(
                    Arg::new("status")
                        .help("prepare, active, inactive or failed")
                        .required(true)
                        .index(2),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    edgeboard::init_logging();

    let matches = Command::new("edgeboard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Workload supervisor and live hardware telemetry for a local edge AI dashboard")
        .subcommand(
            Command::new("devices")
                .about("Discover CPU, GPUs, NPU and cameras")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Output as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("monitor")
                .about("Poll hardware telemetry and print live snapshots")
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .value_name("MS")
                        .help("Polling and display interval in milliseconds")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .value_name("N")
                        .help("Exit after printing N snapshots")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Output one JSON snapshot per line")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(workload_command())
        .get_matches();

    let config = Config::load().context("Failed to load configuration")?;

    match matches.subcommand() {
        Some(("devices", sub_matches)) => commands::devices(sub_matches, &config).await?,
        Some(("monitor", sub_matches)) => commands::monitor(sub_matches, &config).await?,
        Some(("workload", sub_matches)) => commands::workload(sub_matches, &config).await?,
        _ => {
            println!("Welcome to edgeboard!");
            println!("Use 'edgeboard --help' for more information.");
        }
    }

    Ok(())
}
