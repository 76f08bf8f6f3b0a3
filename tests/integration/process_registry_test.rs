// Local process registry against real OS processes.
// The worker "interpreter" is /bin/sh and main.py is a shell script that sleeps,
// so the tests only need a POSIX shell.

#![cfg(unix)]

use edgeboard::core::supervisor::{
    LaunchRequest, LocalProcessRegistry, StartOutcome, Supervisor, WorkerEnvironment,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn install_sleeping_worker(workers: &Path, script: &str) {
    let bin = workers.join(script).join(".venv").join("bin");
    fs::create_dir_all(&bin).unwrap();
    std::os::unix::fs::symlink("/bin/sh", bin.join("python")).unwrap();
    fs::write(
        workers.join(script).join("main.py"),
        "echo \"worker args: $*\"\nexec sleep 30\n",
    )
    .unwrap();
}

fn supervisor(temp: &TempDir) -> Supervisor {
    let workers = temp.path().join("workers");
    install_sleeping_worker(&workers, "text-generation");

    let registry = LocalProcessRegistry::open(
        &temp.path().join("state").join("processes.json"),
        &temp.path().join("state").join("logs"),
    )
    .unwrap()
    .with_stop_grace(Duration::from_secs(2));

    Supervisor::new(Arc::new(registry), WorkerEnvironment::new(&workers))
}

fn request() -> LaunchRequest {
    LaunchRequest::new(
        "text-generation",
        vec!["--device".into(), "CPU".into(), "--id".into(), "21".into()],
    )
}

#[tokio::test]
async fn test_launch_stop_resume_delete() {
    let temp = TempDir::new().unwrap();
    let supervisor = supervisor(&temp);

    let outcome = supervisor.start("21", Some(request())).await.unwrap();
    assert!(matches!(outcome, StartOutcome::Launched(_)));
    assert!(supervisor.is_running("21").await.unwrap());

    // A second start must not spawn another worker
    assert_eq!(
        supervisor.start("21", Some(request())).await.unwrap(),
        StartOutcome::AlreadyRunning
    );

    assert!(supervisor.stop("21").await.unwrap());
    assert!(!supervisor.is_running("21").await.unwrap());
    assert!(!supervisor.stop("21").await.unwrap());

    let resumed = supervisor.start("21", None).await.unwrap();
    assert!(matches!(resumed, StartOutcome::Resumed(_)));
    assert!(supervisor.is_running("21").await.unwrap());

    supervisor.delete("21").await.unwrap();
    assert!(!supervisor.is_running("21").await.unwrap());
}

#[tokio::test]
async fn test_worker_output_goes_to_log() {
    let temp = TempDir::new().unwrap();
    let supervisor = supervisor(&temp);

    supervisor.start("22", Some(request())).await.unwrap();

    let log_path = temp.path().join("state").join("logs").join("22.log");
    let mut content = String::new();
    for _ in 0..50 {
        content = fs::read_to_string(&log_path).unwrap_or_default();
        if content.contains("worker args:") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    supervisor.delete("22").await.unwrap();

    assert!(content.contains("worker args: --device CPU --id 21"));
}

#[tokio::test]
async fn test_process_table_is_shared_across_instances() {
    let temp = TempDir::new().unwrap();
    let first = supervisor(&temp);
    first.start("23", Some(request())).await.unwrap();

    // A new CLI invocation reopens the same table
    let registry = LocalProcessRegistry::open(
        &temp.path().join("state").join("processes.json"),
        &temp.path().join("state").join("logs"),
    )
    .unwrap()
    .with_stop_grace(Duration::from_secs(2));
    let second = Supervisor::new(
        Arc::new(registry),
        WorkerEnvironment::new(temp.path().join("workers")),
    );

    assert!(second.is_running("23").await.unwrap());
    assert!(second.stop("23").await.unwrap());
    assert!(!first.is_running("23").await.unwrap());
}
