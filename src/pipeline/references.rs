// Reference catalog — curated example figures the Retriever chooses from
//
// Layout: <references_dir>/index.json plus the image files it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::error::PipelineError;
use super::types::Phase;
use crate::backend::ImageData;
use crate::validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    /// Image file, relative to the catalog directory
    pub file: String,
    pub category: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    root: PathBuf,
    entries: Vec<ReferenceEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexFile {
    Wrapped { references: Vec<ReferenceEntry> },
    Bare(Vec<ReferenceEntry>),
}

impl ReferenceCatalog {
    /// Catalog with no entries (plot mode).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(root: impl Into<PathBuf>, entries: Vec<ReferenceEntry>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    /// Load `<dir>/index.json`. Accepts a bare array or `{"references": [...]}`.
    pub fn load(dir: &Path) -> Result<Self> {
        let index = dir.join("index.json");
        let contents = std::fs::read_to_string(&index)
            .with_context(|| format!("Failed to read reference index {}", index.display()))?;
        let parsed: IndexFile = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid reference index {}", index.display()))?;
        let entries = match parsed {
            IndexFile::Wrapped { references } => references,
            IndexFile::Bare(entries) => entries,
        };

        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                anyhow::bail!("Duplicate reference id '{}' in {}", entry.id, index.display());
            }
        }

        tracing::info!(count = entries.len(), dir = %dir.display(), "Loaded reference catalog");
        Ok(Self::from_entries(dir, entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Numbered candidate list for the Retriever prompt.
    pub fn candidates_text(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut line = format!("{}. [{}] ({}) {}", i + 1, e.id, e.category, e.caption);
                if let Some(desc) = e.description.as_deref().filter(|d| !d.is_empty()) {
                    line.push_str(" | ");
                    line.push_str(desc);
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Read and check one reference image for the Planner.
    pub async fn load_image(&self, id: &str) -> Result<ImageData, PipelineError> {
        let entry = self.get(id).ok_or_else(|| {
            PipelineError::invalid_input(Phase::Planner, format!("unknown reference '{}'", id))
        })?;
        let path = self.root.join(&entry.file);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            PipelineError::invalid_input(
                Phase::Planner,
                format!("reference image {} unreadable: {}", path.display(), e),
            )
        })?;
        validate::check_image(&bytes).map_err(|e| {
            PipelineError::invalid_input(
                Phase::Planner,
                format!("reference image {}: {}", path.display(), e),
            )
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        Ok(ImageData::new(bytes, ImageData::media_type_for_extension(ext)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> ReferenceEntry {
        ReferenceEntry {
            id: id.into(),
            file: format!("{}.png", id),
            category: "Agent & Reasoning".into(),
            caption: format!("caption {}", id),
            description: None,
        }
    }

    #[test]
    fn test_load_bare_and_wrapped_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.json"),
            serde_json::to_string(&vec![entry("a"), entry("b")]).unwrap(),
        )
        .unwrap();
        assert_eq!(ReferenceCatalog::load(dir.path()).unwrap().len(), 2);

        std::fs::write(
            dir.path().join("index.json"),
            serde_json::json!({"references": [entry("c")]}).to_string(),
        )
        .unwrap();
        let catalog = ReferenceCatalog::load(dir.path()).unwrap();
        assert!(catalog.contains("c"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.json"),
            serde_json::to_string(&vec![entry("a"), entry("a")]).unwrap(),
        )
        .unwrap();
        assert!(ReferenceCatalog::load(dir.path()).is_err());
    }

    #[test]
    fn test_candidates_text_is_numbered() {
        let catalog = ReferenceCatalog::from_entries("/refs", vec![entry("a"), entry("b")]);
        let text = catalog.candidates_text();
        assert!(text.starts_with("1. [a]"));
        assert!(text.contains("\n2. [b]"));
    }

    #[tokio::test]
    async fn test_missing_image_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ReferenceCatalog::from_entries(dir.path(), vec![entry("a")]);
        let err = catalog.load_image("a").await.unwrap_err();
        assert_eq!(err.kind(), super::super::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"not an image").unwrap();
        let catalog = ReferenceCatalog::from_entries(dir.path(), vec![entry("a")]);
        assert!(catalog.load_image("a").await.is_err());
    }
}
