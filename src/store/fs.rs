// Filesystem artifact store — <root>/<run_id>/<iteration:02>-<phase>.<ext>
//
// Each run directory carries a manifest.jsonl with one ArtifactRecord per
// write. Files are written to a temp name and renamed into place, so a
// cancelled or crashed run never leaves a half-written artifact.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{ArtifactKey, ArtifactRecord, ArtifactStore, Payload, RunId, StoreError};

const MANIFEST: &str = "manifest.jsonl";

/// Manifest locks are striped by run; the set never grows.
const LOCK_STRIPES: usize = 16;

pub struct FsArtifactStore {
    root: PathBuf,
    // Serialises manifest appends within a run
    run_locks: Vec<Mutex<()>>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            run_locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: RunId) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    pub fn manifest_path(&self, run_id: RunId) -> PathBuf {
        self.run_dir(run_id).join(MANIFEST)
    }

    fn stripe(run_id: RunId) -> usize {
        let mut hasher = DefaultHasher::new();
        run_id.hash(&mut hasher);
        (hasher.finish() % LOCK_STRIPES as u64) as usize
    }

    fn lock_for(&self, run_id: RunId) -> &Mutex<()> {
        &self.run_locks[Self::stripe(run_id)]
    }

    async fn read_manifest(&self, run_id: RunId) -> Result<Vec<ArtifactRecord>, StoreError> {
        let path = self.manifest_path(run_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(bytes).await.map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &ArtifactKey, payload: &Payload) -> Result<ArtifactRecord, StoreError> {
        key.validate()?;
        let bytes = payload.to_bytes()?;
        let record = ArtifactRecord::for_payload(key, payload, bytes.len() as u64);

        let dir = self.run_dir(key.run_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let _guard = self.lock_for(key.run_id).lock().await;

        write_atomic(&dir.join(&record.file), &bytes).await?;

        let manifest = dir.join(MANIFEST);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest)
            .await
            .map_err(|e| StoreError::io(&manifest, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&manifest, e))?;

        tracing::debug!(artifact = %key, bytes = bytes.len(), "Artifact stored");
        Ok(record)
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Payload, StoreError> {
        key.validate()?;
        let record = self
            .read_manifest(key.run_id)
            .await?
            .into_iter()
            .rev()
            .find(|r| r.phase == key.phase && r.iteration == key.iteration)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let path = self.run_dir(key.run_id).join(&record.file);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Payload::from_bytes(record.kind, &record.media_type, bytes)
    }

    async fn list(&self, run_id: RunId) -> Result<Vec<ArtifactRecord>, StoreError> {
        self.read_manifest(run_id).await
    }

    fn locate(&self, record: &ArtifactRecord) -> Option<PathBuf> {
        Some(self.run_dir(record.run_id).join(&record.file))
    }
}
