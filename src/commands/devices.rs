use anyhow::Result;
use clap::ArgMatches;
use colored::*;

use crate::core::config::Config;
use crate::core::devices::{DeviceCatalog, DeviceDiscovery, DeviceKind};

pub async fn execute(matches: &ArgMatches, config: &Config) -> Result<()> {
    let catalog = DeviceDiscovery::new(&config.gpu_tool).discover().await;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    print_catalog(&catalog);
    Ok(())
}

fn print_catalog(catalog: &DeviceCatalog) {
    println!("{}", "Devices".cyan().bold());
    println!();

    for device in catalog.devices() {
        let kind = match device.kind {
            DeviceKind::Cpu => "cpu".green(),
            DeviceKind::Gpu => "gpu".magenta(),
            DeviceKind::Npu => "npu".blue(),
            DeviceKind::Camera => "camera".yellow(),
        };
        let bus = device
            .bus_address
            .as_ref()
            .map(|b| format!(" [{}]", b))
            .unwrap_or_default();

        println!(
            "  {:<10} {:<8} {}{}",
            device.id.bold(),
            kind,
            device.name,
            bus.dimmed()
        );
    }

    if catalog.of_kind(DeviceKind::Gpu).next().is_none() {
        println!();
        println!(
            "{}",
            "No GPU found; GPU metrics will report as unsupported.".dimmed()
        );
    }
}
