// Generative backend abstraction
//
// Two call kinds cover every phase: `reason` (vision/language model, used by
// Retriever, Planner, Stylist, Critic and the plot-mode Visualizer) and
// `render` (image model, used by the diagram-mode Visualizer).

use async_trait::async_trait;

pub mod error;
pub mod gemini;
pub mod retry;
pub mod scripted;
pub mod types;

pub use error::BackendError;
pub use gemini::GeminiBackend;
pub use retry::{with_retry, RetryPolicy, RetryingBackend};
pub use scripted::{ScriptedBackend, ScriptedReply};
pub use types::{
    strip_markdown_fences, AspectRatio, ImageData, ReasonOutput, ReasonRequest, RenderRequest,
};

/// Trait for generative model backends
///
/// Implementations are black-box request/response services. They must not
/// hold per-run state: one backend instance is shared by concurrent runs.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Reason over text and image inputs.
    ///
    /// Returns `ReasonOutput::Structured` when `request.output_schema` is set,
    /// `ReasonOutput::Text` otherwise.
    async fn reason(&self, request: &ReasonRequest) -> Result<ReasonOutput, BackendError>;

    /// Render an image from a text description.
    async fn render(&self, request: &RenderRequest) -> Result<ImageData, BackendError>;

    /// Backend name for logs (e.g. "gemini")
    fn name(&self) -> &str;
}
