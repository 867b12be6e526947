// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::constants::*;

/// Sampling temperature per phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTemperatures {
    pub retriever: f32,
    pub planner: f32,
    pub stylist: f32,
    pub visualizer: f32,
    pub critic: f32,
}

impl Default for PhaseTemperatures {
    fn default() -> Self {
        Self {
            retriever: RETRIEVER_TEMPERATURE,
            planner: PLANNER_TEMPERATURE,
            stylist: STYLIST_TEMPERATURE,
            visualizer: VISUALIZER_TEMPERATURE,
            critic: CRITIC_TEMPERATURE,
        }
    }
}

/// Everything the generative backend needs, handed over at construction.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub api_key: String,
    pub base_url: String,
    pub reasoning_model: String,
    pub image_model: String,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub temperatures: PhaseTemperatures,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            reasoning_model: DEFAULT_REASONING_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            temperatures: PhaseTemperatures::default(),
        }
    }
}

// Never print the key.
impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("reasoning_model", &self.reasoning_model)
            .field("image_model", &self.image_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("temperatures", &self.temperatures)
            .finish()
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Refinement cap: the Visualizer → Critic loop runs at most this many times
    pub max_iterations: u32,

    /// Root of the artifact store (`<work_dir>/<run_id>/...`)
    pub work_dir: PathBuf,

    /// Directory holding `index.json` and the reference images
    pub references_dir: Option<PathBuf>,

    /// Concurrent runs in a batch
    pub batch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            work_dir: PathBuf::from("paperbanana-runs"),
            references_dir: None,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Directory for daily run-metric logs
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            pipeline: PipelineConfig::default(),
            metrics_dir: default_metrics_dir(),
        }
    }
}

/// `~/.paperbanana` (or `./.paperbanana` when there is no home directory)
pub fn config_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

fn default_metrics_dir() -> PathBuf {
    config_home().join("metrics")
}

impl Config {
    /// Configuration with the given API key and every other value defaulted.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.backend.api_key = api_key.into();
        config
    }

    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend.api_key.trim().is_empty() {
            anyhow::bail!(
                "No API key configured.\n\n\
                 Set `api_key` under [backend] in ~/{}/config.toml, or export GOOGLE_API_KEY.",
                CONFIG_DIR_NAME
            );
        }
        if self.backend.base_url.trim().is_empty() {
            anyhow::bail!("backend.base_url must not be empty");
        }
        if self.backend.reasoning_model.trim().is_empty() || self.backend.image_model.trim().is_empty() {
            anyhow::bail!("backend.reasoning_model and backend.image_model must be set");
        }
        if self.backend.request_timeout_secs == 0 {
            anyhow::bail!("backend.request_timeout_secs must be at least 1");
        }
        if self.backend.max_attempts == 0 {
            anyhow::bail!("backend.max_attempts must be at least 1");
        }
        if self.pipeline.max_iterations == 0 {
            anyhow::bail!("pipeline.max_iterations must be at least 1");
        }
        if self.pipeline.batch_concurrency == 0 {
            anyhow::bail!("pipeline.batch_concurrency must be at least 1");
        }
        Ok(())
    }
}
