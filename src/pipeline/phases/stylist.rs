// Stylist — one aesthetic pass over the planned description

use async_trait::async_trait;

use super::{prompts, reason_payload, reply_text, require_text, PhaseContext, PhaseExecutor};
use crate::backend::ReasonRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::types::{Category, DiagramDescription, Mode, Phase, Provenance};
use crate::store::{ArtifactKey, Payload};

pub struct StylistInput {
    pub description: DiagramDescription,
    /// Diagram mode only
    pub category: Option<Category>,
    pub mode: Mode,
}

#[derive(Default)]
pub struct StylistExecutor;

impl StylistExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhaseExecutor for StylistExecutor {
    type Input = StylistInput;
    type Output = DiagramDescription;

    fn phase(&self) -> Phase {
        Phase::Stylist
    }

    fn check_input(&self, input: &StylistInput) -> Result<(), PipelineError> {
        require_text(Phase::Stylist, "description", input.description.text())?;
        if input.mode == Mode::Diagram && input.category.is_none() {
            return Err(PipelineError::invalid_input(
                Phase::Stylist,
                "diagram mode needs a category",
            ));
        }
        Ok(())
    }

    async fn request(&self, ctx: &PhaseContext, input: &StylistInput) -> Result<Payload, PipelineError> {
        let prompt = match (input.mode, input.category) {
            (Mode::Diagram, Some(category)) => {
                prompts::stylist_prompt(input.description.text(), category)
            }
            _ => prompts::plot_stylist_prompt(input.description.text()),
        };
        let request = ReasonRequest::new(prompt).with_temperature(ctx.temperatures.stylist);

        ctx.backend
            .reason(&request)
            .await
            .map(reason_payload)
            .map_err(|e| PipelineError::backend(Phase::Stylist, e))
    }

    async fn interpret(
        &self,
        _ctx: &PhaseContext,
        _key: &ArtifactKey,
        input: &StylistInput,
        raw: Payload,
    ) -> Result<DiagramDescription, PipelineError> {
        let text = reply_text(Phase::Stylist, &raw)?;
        let styled = input.description.derive(text, Provenance::Stylist);
        tracing::info!(version = styled.version(), "Description styled");
        Ok(styled)
    }
}
