// Critic — score a rendered artifact and, on a primary failure, supply a
// revised description

use async_trait::async_trait;
use serde::Deserialize;

use super::{prompts, reason_payload, reply_text, require_text, PhaseContext, PhaseExecutor};
use crate::backend::ReasonRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::types::{
    ArtifactContent, DiagramDescription, EvaluationResult, MethodologyInput, Phase,
    RenderedArtifact, Scores,
};
use crate::store::{ArtifactKey, Payload};
use crate::validate;

/// Phase name for the follow-up revision request.
pub const REVISION_PHASE: &str = "critic.revision";

pub struct CriticInput {
    pub input: MethodologyInput,
    /// The description the artifact was rendered from
    pub description: DiagramDescription,
    pub artifact: RenderedArtifact,
}

#[derive(Default)]
pub struct CriticExecutor;

impl CriticExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Ask once more for the revision the first reply left out.
    async fn request_revision(
        &self,
        ctx: &PhaseContext,
        key: &ArtifactKey,
        input: &CriticInput,
        suggestions: &[String],
    ) -> Result<String, PipelineError> {
        tracing::warn!("Critic failed the artifact without a revision; asking again");
        let request = ReasonRequest::new(prompts::revision_followup_prompt(
            input.description.text(),
            suggestions,
        ))
        .with_temperature(ctx.temperatures.critic);

        let raw = ctx
            .backend
            .reason(&request)
            .await
            .map(reason_payload)
            .map_err(|e| PipelineError::backend(Phase::Critic, e))?;

        let followup_key = ctx.key(REVISION_PHASE, key.iteration);
        ctx.persist(Phase::Critic, &followup_key, &raw).await?;

        reply_text(Phase::Critic, &raw).map_err(|_| {
            PipelineError::contract(
                Phase::Critic,
                "primary dimensions failed and no revised description was supplied",
            )
        })
    }
}

/// Raw JSON shape from the model. Pass flags may be present; they are recomputed
#[derive(Debug, Deserialize)]
struct RawCritique {
    scores: RawScores,
    #[serde(default, alias = "suggestions")]
    critic_suggestions: Vec<String>,
    #[serde(default)]
    revised_description: Option<String>,
    #[serde(default)]
    primary_pass: Option<bool>,
    #[serde(default)]
    overall_pass: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawScores {
    faithfulness: u8,
    readability: u8,
    conciseness: u8,
    aesthetics: u8,
}

/// Parse a critique. The revision is still missing at this point if the
/// model left it out on a primary failure.
fn parse_critique(value: &serde_json::Value) -> Result<EvaluationResult, PipelineError> {
    let raw: RawCritique = serde_json::from_value(value.clone())
        .map_err(|e| PipelineError::contract(Phase::Critic, format!("malformed critique: {}", e)))?;

    let scores = Scores::new(
        raw.scores.faithfulness,
        raw.scores.readability,
        raw.scores.conciseness,
        raw.scores.aesthetics,
    );
    if !scores.in_range() {
        return Err(PipelineError::contract(
            Phase::Critic,
            format!("scores out of range 0-{}: {:?}", Scores::MAX, scores),
        ));
    }

    let verdict = scores.verdict();
    if raw.primary_pass.is_some_and(|p| p != verdict.primary_pass)
        || raw.overall_pass.is_some_and(|o| o != verdict.overall_pass)
    {
        tracing::debug!("Critic pass flags disagree with its scores; using the scores");
    }

    let revised_description = raw
        .revised_description
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if verdict.primary_pass && revised_description.is_some() {
        return Err(PipelineError::contract(
            Phase::Critic,
            "revised description supplied although primary dimensions passed",
        ));
    }

    Ok(EvaluationResult {
        scores,
        suggestions: raw
            .critic_suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        revised_description,
    })
}

#[async_trait]
impl PhaseExecutor for CriticExecutor {
    type Input = CriticInput;
    type Output = EvaluationResult;

    fn phase(&self) -> Phase {
        Phase::Critic
    }

    fn check_input(&self, input: &CriticInput) -> Result<(), PipelineError> {
        require_text(Phase::Critic, "methodology text", &input.input.text)?;
        require_text(Phase::Critic, "description", input.description.text())?;
        match &input.artifact.content {
            ArtifactContent::Image(image) => validate::check_image(&image.bytes)
                .map(|_| ())
                .map_err(|e| {
                    PipelineError::invalid_input(Phase::Critic, format!("rendered image: {}", e))
                }),
            ArtifactContent::Script(code) => require_text(Phase::Critic, "plot script", code),
        }
    }

    async fn request(&self, ctx: &PhaseContext, input: &CriticInput) -> Result<Payload, PipelineError> {
        let caption = input.input.caption_or_empty();
        let request = match &input.artifact.content {
            ArtifactContent::Image(image) => ReasonRequest::new(prompts::critic_prompt(
                &input.input.text,
                caption,
                input.description.text(),
                "the generated diagram image above",
            ))
            .with_image(image.clone()),
            ArtifactContent::Script(code) => ReasonRequest::new(prompts::critic_prompt(
                &input.input.text,
                caption,
                input.description.text(),
                "the plot this Python script will draw",
            ))
            .with_text(format!("--- SCRIPT ---\n{}", code)),
        }
        .with_schema(prompts::critic_schema())
        .with_temperature(ctx.temperatures.critic);

        ctx.backend
            .reason(&request)
            .await
            .map(reason_payload)
            .map_err(|e| PipelineError::backend(Phase::Critic, e))
    }

    async fn interpret(
        &self,
        ctx: &PhaseContext,
        key: &ArtifactKey,
        input: &CriticInput,
        raw: Payload,
    ) -> Result<EvaluationResult, PipelineError> {
        let value = raw
            .as_json()
            .ok_or_else(|| PipelineError::contract(Phase::Critic, "expected a structured reply"))?;
        let mut evaluation = parse_critique(value)?;

        if !evaluation.primary_pass() && evaluation.revised_description.is_none() {
            let revision = self
                .request_revision(ctx, key, input, &evaluation.suggestions)
                .await?;
            evaluation.revised_description = Some(revision);
        }

        let verdict = evaluation.scores.verdict();
        tracing::info!(
            iteration = key.iteration,
            faithfulness = evaluation.scores.faithfulness,
            readability = evaluation.scores.readability,
            conciseness = evaluation.scores.conciseness,
            aesthetics = evaluation.scores.aesthetics,
            primary_pass = verdict.primary_pass,
            overall_pass = verdict.overall_pass,
            "Artifact evaluated"
        );
        Ok(evaluation)
    }
}
