// Planner — first full description of the figure

use async_trait::async_trait;
use std::sync::Arc;

use super::{prompts, reason_payload, reply_text, require_text, PhaseContext, PhaseExecutor};
use crate::backend::ReasonRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::references::ReferenceCatalog;
use crate::pipeline::types::{
    DiagramDescription, MethodologyInput, Mode, Phase, ReferenceSelection,
};
use crate::store::{ArtifactKey, Payload};

pub struct PlannerInput {
    pub input: MethodologyInput,
    /// Required in diagram mode, absent in plot mode
    pub selection: Option<ReferenceSelection>,
}

pub struct PlannerExecutor {
    catalog: Arc<ReferenceCatalog>,
}

impl PlannerExecutor {
    pub fn new(catalog: Arc<ReferenceCatalog>) -> Self {
        Self { catalog }
    }

    async fn diagram_request(
        &self,
        ctx: &PhaseContext,
        input: &MethodologyInput,
        selection: &ReferenceSelection,
    ) -> Result<ReasonRequest, PipelineError> {
        let prompt = prompts::planner_prompt(&input.text, input.caption_or_empty(), selection);
        let mut request = ReasonRequest {
            text_inputs: vec![prompt],
            image_inputs: Vec::with_capacity(2),
            output_schema: None,
            temperature: Some(ctx.temperatures.planner),
        };
        for reference in &selection.references {
            request.image_inputs.push(self.catalog.load_image(&reference.id).await?);
        }
        Ok(request)
    }
}

#[async_trait]
impl PhaseExecutor for PlannerExecutor {
    type Input = PlannerInput;
    type Output = DiagramDescription;

    fn phase(&self) -> Phase {
        Phase::Planner
    }

    fn check_input(&self, input: &PlannerInput) -> Result<(), PipelineError> {
        require_text(Phase::Planner, "methodology text", &input.input.text)?;
        match (input.input.mode, &input.selection) {
            (Mode::Diagram, None) => Err(PipelineError::invalid_input(
                Phase::Planner,
                "diagram mode needs a reference selection",
            )),
            (Mode::Plot, _) => require_text(Phase::Planner, "plot intent", input.input.caption_or_empty()),
            _ => Ok(()),
        }
    }

    async fn request(&self, ctx: &PhaseContext, input: &PlannerInput) -> Result<Payload, PipelineError> {
        let request = match &input.selection {
            Some(selection) if input.input.mode == Mode::Diagram => {
                self.diagram_request(ctx, &input.input, selection).await?
            }
            _ => ReasonRequest::new(prompts::plot_planner_prompt(
                &input.input.text,
                input.input.caption_or_empty(),
            ))
            .with_temperature(ctx.temperatures.planner),
        };

        tracing::debug!(images = request.image_inputs.len(), "Planner request built");
        ctx.backend
            .reason(&request)
            .await
            .map(reason_payload)
            .map_err(|e| PipelineError::backend(Phase::Planner, e))
    }

    async fn interpret(
        &self,
        _ctx: &PhaseContext,
        _key: &ArtifactKey,
        _input: &PlannerInput,
        raw: Payload,
    ) -> Result<DiagramDescription, PipelineError> {
        let text = reply_text(Phase::Planner, &raw)?;
        tracing::info!(chars = text.len(), "Description planned");
        Ok(DiagramDescription::planned(text))
    }
}
