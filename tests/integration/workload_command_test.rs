// Dry-run wiring of the workload command: nothing on disk may change

use edgeboard::commands::workload::open_store;
use edgeboard::core::config::Config;
use edgeboard::core::reconciler::Reconciler;
use edgeboard::core::supervisor::{MemoryRegistry, RegistryCall, Supervisor, WorkerEnvironment};
use edgeboard::core::workload::{
    MediaSource, NewWorkload, Usecase, UsecaseMetadata, WorkloadStatus, WorkloadStore,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn config_in(temp: &TempDir) -> Config {
    let config = Config {
        workers_dir: temp.path().join("workers"),
        media_dir: temp.path().join("media"),
        assets_dir: temp.path().join("assets"),
        state_dir: temp.path().join("state"),
        ..Default::default()
    };
    let venv_bin = config
        .workers_dir
        .join("instance-segmentation")
        .join(".venv")
        .join(if cfg!(windows) { "Scripts" } else { "bin" });
    fs::create_dir_all(&venv_bin).unwrap();
    fs::write(
        venv_bin.join(if cfg!(windows) { "python.exe" } else { "python" }),
        "",
    )
    .unwrap();
    fs::write(
        config.workers_dir.join("instance-segmentation").join("main.py"),
        "",
    )
    .unwrap();
    fs::create_dir_all(&config.media_dir).unwrap();
    fs::create_dir_all(&config.assets_dir).unwrap();
    config
}

/// Store over the real file, launching through an in-memory registry
fn seeded_store(config: &Config) -> WorkloadStore {
    let supervisor = Arc::new(Supervisor::new(
        Arc::new(MemoryRegistry::new()),
        WorkerEnvironment::new(&config.workers_dir),
    ));
    let reconciler = Reconciler::new(supervisor, &config.media_dir, &config.assets_dir);
    WorkloadStore::new(&config.workload_store_path(), Arc::new(reconciler))
}

fn segmentation_upload(name: &str) -> NewWorkload {
    NewWorkload {
        task: "vision".to_string(),
        usecase: Usecase::InstanceSegmentation,
        model: "yolo11n-seg".to_string(),
        devices: vec!["CPU".to_string()],
        source: Some(MediaSource::Upload {
            name: name.to_string(),
        }),
        port: 5997,
        metadata: UsecaseMetadata::Streaming { num_streams: 1 },
    }
}

#[tokio::test]
async fn test_dry_run_delete_keeps_record_and_upload() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let upload = config.media_dir.join("clip.mp4");
    fs::write(&upload, b"video").unwrap();

    let store = seeded_store(&config);
    let workload = store.create(segmentation_upload("clip.mp4")).await.unwrap();
    let on_disk = fs::read_to_string(config.workload_store_path()).unwrap();

    let session = open_store(&config, true, false).await.unwrap();
    let deleted = session.store.delete(workload.id).await.unwrap();
    assert_eq!(deleted.id, workload.id);

    assert!(upload.exists());
    assert_eq!(
        fs::read_to_string(config.workload_store_path()).unwrap(),
        on_disk
    );
    assert_eq!(store.get(workload.id).unwrap().status, WorkloadStatus::Prepare);

    let recorded = session.recorded.expect("dry run records registry calls");
    assert_eq!(
        recorded.calls(),
        vec![RegistryCall::Forget {
            id: workload.id.to_string()
        }]
    );
    assert!(!config.process_table_path().exists());
}

#[tokio::test]
async fn test_dry_run_status_change_is_not_persisted() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    fs::write(config.media_dir.join("clip.mp4"), b"video").unwrap();

    let store = seeded_store(&config);
    let workload = store.create(segmentation_upload("clip.mp4")).await.unwrap();
    store
        .update_status(workload.id, WorkloadStatus::Active)
        .await
        .unwrap();

    let session = open_store(&config, true, false).await.unwrap();
    let changed = session
        .store
        .update_status(workload.id, WorkloadStatus::Inactive)
        .await
        .unwrap();
    assert_eq!(changed.status, WorkloadStatus::Inactive);

    assert_eq!(store.get(workload.id).unwrap().status, WorkloadStatus::Active);
}
