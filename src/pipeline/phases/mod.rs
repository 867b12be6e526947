// Phase executors
//
// Every phase follows the same contract: check its input, send one backend
// request, persist the raw reply under (run, phase, iteration), and only then
// interpret it. A reply that does not fit is a ContractViolation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::Instrument;

use crate::backend::{GenerativeBackend, ReasonOutput};
use crate::config::PhaseTemperatures;
use crate::store::{ArtifactKey, ArtifactStore, Payload, RunId};

use super::error::PipelineError;
use super::types::Phase;

pub mod critic;
pub mod planner;
pub mod prompts;
pub mod retriever;
pub mod stylist;
pub mod visualizer;

pub use critic::{CriticExecutor, CriticInput};
pub use planner::{PlannerExecutor, PlannerInput};
pub use retriever::RetrieverExecutor;
pub use stylist::{StylistExecutor, StylistInput};
pub use visualizer::{VisualizerExecutor, VisualizerInput};

/// What a phase needs from its run.
#[derive(Clone)]
pub struct PhaseContext {
    pub run_id: RunId,
    pub backend: Arc<dyn GenerativeBackend>,
    pub store: Arc<dyn ArtifactStore>,
    pub temperatures: PhaseTemperatures,
}

impl PhaseContext {
    pub fn key(&self, phase: impl Into<String>, iteration: u32) -> ArtifactKey {
        ArtifactKey::new(self.run_id, phase, iteration)
    }

    /// Persist under an arbitrary phase name, mapping failures to `phase`.
    pub async fn persist(
        &self,
        phase: Phase,
        key: &ArtifactKey,
        payload: &Payload,
    ) -> Result<(), PipelineError> {
        self.store
            .put(key, payload)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::store(phase, e))
    }
}

/// Raw reason output as a storable payload.
pub(crate) fn reason_payload(output: ReasonOutput) -> Payload {
    match output {
        ReasonOutput::Text(text) => Payload::Text(text),
        ReasonOutput::Structured(value) => Payload::Json(value),
    }
}

/// Reject blank text inputs.
pub(crate) fn require_text(phase: Phase, what: &str, text: &str) -> Result<(), PipelineError> {
    if text.trim().is_empty() {
        Err(PipelineError::invalid_input(phase, format!("{} is empty", what)))
    } else {
        Ok(())
    }
}

/// Non-empty text from a plain-text reply.
pub(crate) fn reply_text(phase: Phase, raw: &Payload) -> Result<String, PipelineError> {
    let text = match raw {
        Payload::Text(text) => text.trim(),
        other => {
            return Err(PipelineError::contract(
                phase,
                format!("expected a text reply, got {:?}", other.kind()),
            ))
        }
    };
    if text.is_empty() {
        return Err(PipelineError::contract(phase, "reply is empty"));
    }
    Ok(text.to_string())
}

#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    fn phase(&self) -> Phase;

    /// Input preconditions, checked before any backend call.
    fn check_input(&self, input: &Self::Input) -> Result<(), PipelineError>;

    /// Build the request and send it. Returns the unparsed reply.
    async fn request(&self, ctx: &PhaseContext, input: &Self::Input) -> Result<Payload, PipelineError>;

    /// Validate and convert the persisted reply.
    async fn interpret(
        &self,
        ctx: &PhaseContext,
        key: &ArtifactKey,
        input: &Self::Input,
        raw: Payload,
    ) -> Result<Self::Output, PipelineError>;

    async fn execute(
        &self,
        ctx: &PhaseContext,
        iteration: u32,
        input: &Self::Input,
    ) -> Result<Self::Output, PipelineError> {
        let phase = self.phase();
        let span = tracing::info_span!("phase", phase = phase.as_str(), iteration);

        async move {
            self.check_input(input)?;
            let raw = self.request(ctx, input).await?;

            let key = ctx.key(phase.as_str(), iteration);
            ctx.persist(phase, &key, &raw).await?;
            tracing::debug!(artifact = %key, kind = ?raw.kind(), "Raw reply persisted");

            self.interpret(ctx, &key, input, raw).await
        }
        .instrument(span)
        .await
    }
}
