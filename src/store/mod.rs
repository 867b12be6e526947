// Artifact store
//
// Every phase persists its raw backend output here, keyed by
// (run, phase, iteration), before anything parses it. Runs are partitioned
// by RunId so concurrent runs never see each other's artifacts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::backend::ImageData;

pub mod fs;
pub mod memory;

pub use fs::FsArtifactStore;
pub(crate) use fs::write_atomic;
pub use memory::MemoryArtifactStore;

/// Identifies one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// (run, phase, iteration)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub run_id: RunId,
    pub phase: String,
    pub iteration: u32,
}

impl ArtifactKey {
    pub fn new(run_id: RunId, phase: impl Into<String>, iteration: u32) -> Self {
        Self {
            run_id,
            phase: phase.into(),
            iteration,
        }
    }

    /// `<iteration:02>-<phase>.<ext>`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{:02}-{}.{}", self.iteration, self.phase, extension)
    }

    /// Phase names end up in file names: lowercase ASCII, digits, `_`, `-`, `.`
    pub fn validate(&self) -> Result<(), StoreError> {
        let ok = !self.phase.is_empty()
            && !self.phase.starts_with('.')
            && self
                .phase
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'));
        if ok {
            Ok(())
        } else {
            Err(StoreError::InvalidKey(self.phase.clone()))
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02}-{}", self.run_id, self.iteration, self.phase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Text,
    Json,
    Image,
}

/// Content of one stored artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
    Image(ImageData),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Text(_) => PayloadKind::Text,
            Self::Json(_) => PayloadKind::Json,
            Self::Image(_) => PayloadKind::Image,
        }
    }

    pub fn media_type(&self) -> &str {
        match self {
            Self::Text(_) => "text/plain",
            Self::Json(_) => "application/json",
            Self::Image(image) => &image.media_type,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text(_) => "txt",
            Self::Json(_) => "json",
            Self::Image(image) => image.extension(),
        }
    }

    /// Serialized file content.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        match self {
            Self::Text(text) => Ok(text.as_bytes().to_vec()),
            Self::Json(value) => Ok(serde_json::to_vec_pretty(value)?),
            Self::Image(image) => Ok(image.bytes.clone()),
        }
    }

    /// Inverse of [`Payload::to_bytes`].
    pub fn from_bytes(kind: PayloadKind, media_type: &str, bytes: Vec<u8>) -> Result<Self, StoreError> {
        match kind {
            PayloadKind::Text => String::from_utf8(bytes)
                .map(Self::Text)
                .map_err(|e| StoreError::Corrupt(format!("text artifact is not UTF-8: {}", e))),
            PayloadKind::Json => Ok(Self::Json(serde_json::from_slice(&bytes)?)),
            PayloadKind::Image => Ok(Self::Image(ImageData::new(bytes, media_type))),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// One write, as recorded in a run's manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub run_id: RunId,
    pub phase: String,
    pub iteration: u32,
    pub kind: PayloadKind,
    pub media_type: String,
    /// File name inside the run directory
    pub file: String,
    pub size: u64,
    pub written_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::new(self.run_id, self.phase.clone(), self.iteration)
    }

    pub(crate) fn for_payload(key: &ArtifactKey, payload: &Payload, size: u64) -> Self {
        Self {
            run_id: key.run_id,
            phase: key.phase.clone(),
            iteration: key.iteration,
            kind: payload.kind(),
            media_type: payload.media_type().to_string(),
            file: key.file_name(payload.extension()),
            size,
            written_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(ArtifactKey),

    #[error("invalid phase name for artifact key: '{0}'")]
    InvalidKey(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt artifact: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Run-partitioned storage for intermediate and final artifacts.
///
/// Writing the same key twice replaces the stored content; `list` still
/// reports both writes, in write order.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &ArtifactKey, payload: &Payload) -> Result<ArtifactRecord, StoreError>;

    /// Latest content written under `key`.
    async fn get(&self, key: &ArtifactKey) -> Result<Payload, StoreError>;

    /// Every write for the run, oldest first.
    async fn list(&self, run_id: RunId) -> Result<Vec<ArtifactRecord>, StoreError>;

    /// Filesystem location of the artifact, if the store has one.
    fn locate(&self, _record: &ArtifactRecord) -> Option<PathBuf> {
        None
    }
}
