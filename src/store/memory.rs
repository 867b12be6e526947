// In-memory artifact store, used by the test suites

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ArtifactKey, ArtifactRecord, ArtifactStore, Payload, RunId, StoreError};

#[derive(Default)]
pub struct MemoryArtifactStore {
    runs: DashMap<RunId, Vec<(ArtifactRecord, Payload)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &ArtifactKey, payload: &Payload) -> Result<ArtifactRecord, StoreError> {
        key.validate()?;
        let size = payload.to_bytes()?.len() as u64;
        let record = ArtifactRecord::for_payload(key, payload, size);
        self.runs
            .entry(key.run_id)
            .or_default()
            .push((record.clone(), payload.clone()));
        Ok(record)
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Payload, StoreError> {
        self.runs
            .get(&key.run_id)
            .and_then(|entries| {
                entries
                    .iter()
                    .rev()
                    .find(|(r, _)| r.phase == key.phase && r.iteration == key.iteration)
                    .map(|(_, payload)| payload.clone())
            })
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(&self, run_id: RunId) -> Result<Vec<ArtifactRecord>, StoreError> {
        Ok(self
            .runs
            .get(&run_id)
            .map(|entries| entries.iter().map(|(r, _)| r.clone()).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_are_partitioned() {
        let store = MemoryArtifactStore::new();
        let a = ArtifactKey::new(RunId::new(), "retriever", 0);
        let b = ArtifactKey::new(RunId::new(), "retriever", 0);
        store.put(&a, &Payload::Text("a".into())).await.unwrap();
        store.put(&b, &Payload::Text("b".into())).await.unwrap();

        assert_eq!(store.get(&a).await.unwrap(), Payload::Text("a".into()));
        assert_eq!(store.list(a.run_id).await.unwrap().len(), 1);
        assert_eq!(store.run_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = MemoryArtifactStore::new();
        let key = ArtifactKey::new(RunId::new(), "critic", 1);
        assert!(matches!(store.get(&key).await, Err(StoreError::NotFound(_))));
    }
}
