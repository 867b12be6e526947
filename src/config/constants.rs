// Project-wide constants
//
// Centralised here so model names and tuning defaults have one source of
// truth. Import via `use crate::config::constants::*;`.

/// Base URL of the Generative Language API.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Vision/language model used for every `reason` call.
pub const DEFAULT_REASONING_MODEL: &str = "gemini-2.0-flash";

/// Image model used by the diagram-mode Visualizer.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

/// Refinement iterations (Visualizer → Critic rounds) per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Per-attempt deadline for one backend call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Attempts per backend call, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles afterwards.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2000;

/// Runs executed at once by `Orchestrator::run_batch`.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 2;

// Phase temperatures. Classification and judging stay cold; rendering is
// left at the model default.
pub const RETRIEVER_TEMPERATURE: f32 = 0.2;
pub const PLANNER_TEMPERATURE: f32 = 0.4;
pub const STYLIST_TEMPERATURE: f32 = 0.3;
pub const VISUALIZER_TEMPERATURE: f32 = 1.0;
pub const CRITIC_TEMPERATURE: f32 = 0.2;

/// Config directory under $HOME.
pub const CONFIG_DIR_NAME: &str = ".paperbanana";

/// Environment variables consulted, in order, when no config file exists.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];
