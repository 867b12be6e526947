// Visualizer — render the current description (image, or plotting script
// in plot mode)

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::{prompts, reason_payload, reply_text, require_text, PhaseContext, PhaseExecutor};
use crate::backend::{AspectRatio, ReasonRequest, RenderRequest};
use crate::pipeline::error::PipelineError;
use crate::pipeline::types::{ArtifactContent, DiagramDescription, Mode, Phase, RenderedArtifact};
use crate::store::{ArtifactKey, Payload};
use crate::validate;

/// Companion record stored next to each rendered artifact.
pub const RENDER_META_PHASE: &str = "render_meta";

pub struct VisualizerInput {
    pub description: DiagramDescription,
    pub aspect_ratio: AspectRatio,
    pub mode: Mode,
}

#[derive(Default)]
pub struct VisualizerExecutor;

impl VisualizerExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhaseExecutor for VisualizerExecutor {
    type Input = VisualizerInput;
    type Output = RenderedArtifact;

    fn phase(&self) -> Phase {
        Phase::Visualizer
    }

    fn check_input(&self, input: &VisualizerInput) -> Result<(), PipelineError> {
        require_text(Phase::Visualizer, "description", input.description.text())
    }

    async fn request(&self, ctx: &PhaseContext, input: &VisualizerInput) -> Result<Payload, PipelineError> {
        match input.mode {
            Mode::Diagram => {
                let request = RenderRequest::new(
                    format!("{}{}", prompts::RENDER_PREFIX, input.description.text()),
                    input.aspect_ratio,
                )
                .with_temperature(ctx.temperatures.visualizer);
                ctx.backend
                    .render(&request)
                    .await
                    .map(Payload::Image)
                    .map_err(|e| PipelineError::backend(Phase::Visualizer, e))
            }
            Mode::Plot => {
                let request = ReasonRequest::new(prompts::plot_code_prompt(
                    input.description.text(),
                    validate::APPROVED_IMPORTS,
                ))
                .with_temperature(ctx.temperatures.visualizer);
                ctx.backend
                    .reason(&request)
                    .await
                    .map(reason_payload)
                    .map_err(|e| PipelineError::backend(Phase::Visualizer, e))
            }
        }
    }

    async fn interpret(
        &self,
        ctx: &PhaseContext,
        key: &ArtifactKey,
        input: &VisualizerInput,
        raw: Payload,
    ) -> Result<RenderedArtifact, PipelineError> {
        let (content, meta) = match input.mode {
            Mode::Diagram => {
                let image = match raw {
                    Payload::Image(image) => image,
                    other => {
                        return Err(PipelineError::contract(
                            Phase::Visualizer,
                            format!("expected an image, got {:?}", other.kind()),
                        ))
                    }
                };
                let info = validate::check_image(&image.bytes)
                    .map_err(|e| PipelineError::contract(Phase::Visualizer, e.to_string()))?;
                let meta = json!({
                    "media_type": image.media_type,
                    "width": info.width,
                    "height": info.height,
                    "aspect_ratio": input.aspect_ratio,
                });
                (ArtifactContent::Image(image), meta)
            }
            Mode::Plot => {
                let reply = reply_text(Phase::Visualizer, &raw)?;
                let code = validate::extract_code(&reply).to_string();
                let report = validate::check_plot_code(&code);
                for warning in &report.warnings {
                    tracing::warn!("Plot script: {}", warning);
                }
                if !report.is_ok() {
                    return Err(PipelineError::contract(
                        Phase::Visualizer,
                        format!("plot script rejected: {}", report.errors.join("; ")),
                    ));
                }
                let meta = json!({
                    "imports": report.imports,
                    "warnings": report.warnings,
                });
                (ArtifactContent::Script(code), meta)
            }
        };

        let artifact = RenderedArtifact {
            content,
            source_version: input.description.version(),
            aspect_ratio: (input.mode == Mode::Diagram).then_some(input.aspect_ratio),
            rendered_at: Utc::now(),
            key: key.clone(),
        };

        let mut meta = meta;
        meta["source_version"] = json!(artifact.source_version);
        meta["rendered_at"] = json!(artifact.rendered_at.to_rfc3339());
        let meta_key = ctx.key(RENDER_META_PHASE, key.iteration);
        ctx.persist(Phase::Visualizer, &meta_key, &Payload::Json(meta)).await?;

        tracing::info!(
            iteration = key.iteration,
            source_version = artifact.source_version,
            bytes = artifact.content.bytes().len(),
            "Artifact rendered"
        );
        Ok(artifact)
    }
}
