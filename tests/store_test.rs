// Artifact store contract: round trips, write order, on-disk layout and
// run partitioning, for both store implementations

use serde_json::json;
use std::sync::Arc;

use paperbanana::backend::ImageData;
use paperbanana::store::{
    ArtifactKey, ArtifactStore, FsArtifactStore, MemoryArtifactStore, Payload, PayloadKind,
    RunId, StoreError,
};

fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, 4, 4);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0u8; 16]).unwrap();
    }
    bytes
}

fn sample_payloads() -> Vec<(&'static str, u32, Payload)> {
    vec![
        ("retriever", 0, Payload::Json(json!({"category": "Agent & Reasoning"}))),
        ("planner", 0, Payload::Text("Two boxes, one arrow.".into())),
        ("visualizer", 1, Payload::Image(ImageData::png(png_bytes()))),
        ("critic", 1, Payload::Json(json!({"scores": {"faithfulness": 8}}))),
    ]
}

async fn exercise_round_trip(store: &dyn ArtifactStore) {
    let run_id = RunId::new();
    for (phase, iteration, payload) in sample_payloads() {
        let key = ArtifactKey::new(run_id, phase, iteration);
        let record = store.put(&key, &payload).await.unwrap();
        assert_eq!(record.kind, payload.kind());
        assert_eq!(store.get(&key).await.unwrap(), payload);
    }

    let listed: Vec<(String, u32)> = store
        .list(run_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.phase, r.iteration))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("retriever".to_string(), 0),
            ("planner".to_string(), 0),
            ("visualizer".to_string(), 1),
            ("critic".to_string(), 1),
        ]
    );
}

#[tokio::test]
async fn test_fs_store_round_trip_and_order() {
    let dir = tempfile::tempdir().unwrap();
    exercise_round_trip(&FsArtifactStore::new(dir.path())).await;
}

#[tokio::test]
async fn test_memory_store_round_trip_and_order() {
    exercise_round_trip(&MemoryArtifactStore::new()).await;
}

#[tokio::test]
async fn test_fs_layout_and_byte_identical_images() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path());
    let run_id = RunId::new();
    let bytes = png_bytes();

    let key = ArtifactKey::new(run_id, "visualizer", 2);
    let record = store
        .put(&key, &Payload::Image(ImageData::png(bytes.clone())))
        .await
        .unwrap();

    let path = dir.path().join(run_id.to_string()).join("02-visualizer.png");
    assert_eq!(record.file, "02-visualizer.png");
    assert_eq!(store.locate(&record), Some(path.clone()));
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
    assert_eq!(record.size, bytes.len() as u64);

    let manifest = std::fs::read_to_string(store.manifest_path(run_id)).unwrap();
    assert_eq!(manifest.lines().count(), 1);
    assert!(manifest.contains("\"phase\":\"visualizer\""));
}

#[tokio::test]
async fn test_fs_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let run_id = RunId::new();
    let key = ArtifactKey::new(run_id, "stylist", 0);
    FsArtifactStore::new(dir.path())
        .put(&key, &Payload::Text("styled".into()))
        .await
        .unwrap();

    let reopened = FsArtifactStore::new(dir.path());
    assert_eq!(
        reopened.get(&key).await.unwrap(),
        Payload::Text("styled".into())
    );
    assert_eq!(reopened.list(run_id).await.unwrap()[0].kind, PayloadKind::Text);
}

#[tokio::test]
async fn test_missing_and_invalid_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path());
    let run_id = RunId::new();

    let missing = ArtifactKey::new(run_id, "critic", 3);
    assert!(matches!(
        store.get(&missing).await,
        Err(StoreError::NotFound(key)) if key == missing
    ));

    for phase in ["../escape", "Upper", "", ".hidden"] {
        let key = ArtifactKey::new(run_id, phase, 0);
        assert!(
            store.put(&key, &Payload::Text("x".into())).await.is_err(),
            "phase {:?} should be rejected",
            phase
        );
    }
}

#[tokio::test]
async fn test_concurrent_runs_are_partitioned() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsArtifactStore::new(dir.path()));
    let runs: Vec<RunId> = (0..4).map(|_| RunId::new()).collect();

    let mut handles = Vec::new();
    for run_id in runs.clone() {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for iteration in 1..=3 {
                let key = ArtifactKey::new(run_id, "critic", iteration);
                store
                    .put(&key, &Payload::Text(format!("{} #{}", run_id, iteration)))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for run_id in runs {
        let records = store.list(run_id).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.run_id == run_id));
        assert_eq!(
            records.iter().map(|r| r.iteration).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
}
