use edgeboard::core::config::{Config, PolicyOverride, DEFAULT_GPU_TOOL, DEFAULT_POWER_PORT};
use edgeboard::core::telemetry::{PollPolicy, SourceKind};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.power_port, DEFAULT_POWER_PORT);
    assert_eq!(config.gpu_tool, DEFAULT_GPU_TOOL);
    assert!(config.telemetry.is_empty());
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("edgeboard").join("config.json");

    let mut config = Config {
        power_port: 19738,
        workers_dir: temp_dir.path().join("workers"),
        ..Default::default()
    };
    config.telemetry.insert(
        SourceKind::GpuCompute,
        PolicyOverride {
            interval_ms: Some(1500),
            ..Default::default()
        },
    );
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.power_port, 19738);
    assert_eq!(loaded.workers_dir, temp_dir.path().join("workers"));
    assert_eq!(
        loaded.poll_policy(SourceKind::GpuCompute).interval,
        Duration::from_millis(1500)
    );
}

#[test]
fn test_policy_override_keeps_unset_fields() {
    let mut config = Config::default();
    config.telemetry.insert(
        SourceKind::Power,
        PolicyOverride {
            retry_limit: Some(0),
            ..Default::default()
        },
    );

    let policy = config.poll_policy(SourceKind::Power);
    let defaults = PollPolicy::for_source(SourceKind::Power);
    assert_eq!(policy.retry_limit, 0);
    assert_eq!(policy.interval, defaults.interval);
    assert_eq!(policy.timeout, defaults.timeout);
}

#[test]
fn test_config_load_missing_or_empty_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");

    let missing = Config::load_from(&path).unwrap();
    assert_eq!(missing.power_port, DEFAULT_POWER_PORT);

    fs::write(&path, "").unwrap();
    let empty = Config::load_from(&path).unwrap();
    assert_eq!(empty.gpu_tool, DEFAULT_GPU_TOOL);
}

#[test]
fn test_config_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, r#"{"gpu_tool": "/opt/xpu/bin/xpu-smi"}"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.gpu_tool, "/opt/xpu/bin/xpu-smi");
    assert_eq!(config.power_port, DEFAULT_POWER_PORT);
}

#[test]
fn test_state_paths_live_under_state_dir() {
    let config = Config::default();
    assert!(config.process_table_path().starts_with(&config.state_dir));
    assert!(config.workload_store_path().starts_with(&config.state_dir));
    assert!(config.logs_dir().starts_with(&config.state_dir));
}
