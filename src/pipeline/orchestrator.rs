// Orchestrator — drives one run through the phases and the refinement loop
//
// Retriever → Planner → Stylist run once; Visualizer → Critic repeat while
// primary dimensions fail and the cap allows. Cancellation is checked before
// each phase.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::error::PipelineError;
use super::evaluation::Verdict;
use super::phases::{
    CriticExecutor, CriticInput, PhaseContext, PhaseExecutor, PlannerExecutor, PlannerInput,
    RetrieverExecutor, StylistExecutor, StylistInput, VisualizerExecutor, VisualizerInput,
};
use super::references::ReferenceCatalog;
use super::run::{IterationRecord, PipelineRun, RunReport, RunState, RunStateError};
use super::types::{
    ArtifactContent, DiagramDescription, EvaluationResult, Mode, Phase, Provenance, RunRequest,
};
use crate::backend::GenerativeBackend;
use crate::config::{Config, PhaseTemperatures};
use crate::metrics::{MetricsLogger, RunMetric};
use crate::store::{write_atomic, ArtifactStore, Payload, RunId, StoreError};

/// Phase name of the copy of the accepted artifact.
pub const FINAL_PHASE: &str = "final";
/// Phase name of the end-of-run summary.
pub const RESULTS_PHASE: &str = "pipeline_results";

/// Iteration used for the once-per-run phases.
const SETUP_ITERATION: u32 = 0;

pub struct Orchestrator {
    backend: Arc<dyn GenerativeBackend>,
    store: Arc<dyn ArtifactStore>,
    temperatures: PhaseTemperatures,
    max_iterations: u32,
    batch_concurrency: usize,
    metrics: Option<MetricsLogger>,

    retriever: RetrieverExecutor,
    planner: PlannerExecutor,
    stylist: StylistExecutor,
    visualizer: VisualizerExecutor,
    critic: CriticExecutor,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        store: Arc<dyn ArtifactStore>,
        catalog: Arc<ReferenceCatalog>,
        config: &Config,
    ) -> Self {
        Self {
            backend,
            store,
            temperatures: config.backend.temperatures,
            max_iterations: config.pipeline.max_iterations.max(1),
            batch_concurrency: config.pipeline.batch_concurrency.max(1),
            metrics: None,
            retriever: RetrieverExecutor::new(catalog.clone()),
            planner: PlannerExecutor::new(catalog),
            stylist: StylistExecutor::new(),
            visualizer: VisualizerExecutor::new(),
            critic: CriticExecutor::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsLogger) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one request to a terminal state. Never panics on phase errors:
    /// failures come back as a `failed` report.
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> RunReport {
        let run_id = RunId::new();
        let span = info_span!("run", %run_id, mode = request.input.mode.as_str());
        self.run_with_id(run_id, request, cancel).instrument(span).await
    }

    /// Run a batch concurrently, at most `batch_concurrency` at a time.
    /// Reports come back in request order.
    pub async fn run_batch(
        &self,
        requests: Vec<RunRequest>,
        cancel: CancellationToken,
    ) -> Vec<RunReport> {
        let mut reports: Vec<(usize, RunReport)> = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| {
                let cancel = cancel.clone();
                async move { (index, self.run(request, cancel).await) }
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        reports.sort_by_key(|(index, _)| *index);
        reports.into_iter().map(|(_, report)| report).collect()
    }

    async fn run_with_id(
        &self,
        run_id: RunId,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> RunReport {
        let started = Instant::now();
        let ctx = PhaseContext {
            run_id,
            backend: self.backend.clone(),
            store: self.store.clone(),
            temperatures: self.temperatures,
        };
        let mut run = PipelineRun::new(run_id, request.input.clone(), self.max_iterations);
        info!(cap = run.cap(), "Run started");

        let artifact_path = match self.drive(&mut run, &ctx, &request.output_path, &cancel).await {
            Ok(path) => Some(path),
            Err(e) => {
                let last_artifact = match ctx.store.list(run_id).await {
                    Ok(records) => records.last().map(|r| r.key()),
                    Err(list_err) => {
                        warn!("Could not list artifacts of failed run: {}", list_err);
                        None
                    }
                };
                error!(phase = %e.phase(), kind = %e.kind(), "Run failed: {}", e);
                run.fail(&e, last_artifact);
                None
            }
        };

        let report = RunReport::from_run(&run, artifact_path, started.elapsed().as_millis() as u64);
        self.finish(&ctx, &run, &report).await;
        report
    }

    /// Phase sequence and refinement loop. Returns the delivered artifact path.
    async fn drive(
        &self,
        run: &mut PipelineRun,
        ctx: &PhaseContext,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let input = run.input.clone();
        let mode = input.mode;

        // ── Once per run ──

        let selection = match mode {
            Mode::Diagram => {
                enter(run, RunState::Retrieving, Phase::Retriever, cancel)?;
                let selection = self.retriever.execute(ctx, SETUP_ITERATION, &input).await?;
                run.set_selection(selection.clone());
                Some(selection)
            }
            Mode::Plot => None,
        };

        enter(run, RunState::Planning, Phase::Planner, cancel)?;
        let planned = self
            .planner
            .execute(
                ctx,
                SETUP_ITERATION,
                &PlannerInput {
                    input: input.clone(),
                    selection: selection.clone(),
                },
            )
            .await?;

        enter(run, RunState::Styling, Phase::Stylist, cancel)?;
        let mut current = self
            .stylist
            .execute(
                ctx,
                SETUP_ITERATION,
                &StylistInput {
                    description: planned,
                    category: selection.as_ref().map(|s| s.category),
                    mode,
                },
            )
            .await?;

        let aspect_ratio = selection
            .as_ref()
            .map(|s| s.intent.aspect_ratio())
            .unwrap_or_default();

        // ── Refinement loop ──

        loop {
            enter(run, RunState::Visualizing, Phase::Visualizer, cancel)?;
            let iteration = run.iteration();
            let artifact = self
                .visualizer
                .execute(
                    ctx,
                    iteration,
                    &VisualizerInput {
                        description: current.clone(),
                        aspect_ratio,
                        mode,
                    },
                )
                .await?;

            enter(run, RunState::Critiquing, Phase::Critic, cancel)?;
            let evaluation = self
                .critic
                .execute(
                    ctx,
                    iteration,
                    &CriticInput {
                        input: input.clone(),
                        description: current.clone(),
                        artifact: artifact.clone(),
                    },
                )
                .await?;

            let verdict = evaluation.scores.verdict();
            let next = if verdict.primary_pass || !run.iterations_remain() {
                None
            } else {
                Some(revise(&current, &evaluation)?)
            };
            run.record(IterationRecord {
                iteration,
                description: current,
                artifact,
                evaluation,
            })
            .map_err(state_error(Phase::Critic))?;

            let Some(next) = next else {
                return self.conclude(ctx, run, verdict, output_path).await;
            };

            run.transition(RunState::Revising)
                .map_err(state_error(Phase::Critic))?;
            info!(iteration, version = next.version(), "Revising description");
            current = next;
        }
    }

    /// Accept the run: the latest iteration on a clean pass, otherwise the
    /// best one so far. A secondary-only miss is not refined further.
    async fn conclude(
        &self,
        ctx: &PhaseContext,
        run: &mut PipelineRun,
        verdict: Verdict,
        output_path: &Path,
    ) -> Result<PathBuf, PipelineError> {
        if verdict.overall_pass {
            let iteration = run.iteration();
            let path = self.deliver(ctx, run, iteration, output_path).await?;
            run.accept().map_err(state_error(Phase::Critic))?;
            info!(iteration, "Run accepted");
            return Ok(path);
        }

        let best = run
            .best_iteration()
            .ok_or_else(|| state_error(Phase::Critic)(RunStateError::NoIterations))?;
        let path = self.deliver(ctx, run, best, output_path).await?;
        if verdict.primary_pass {
            run.accept_primary().map_err(state_error(Phase::Critic))?;
            warn!(
                best_iteration = best,
                "Secondary dimensions below threshold; accepting without refinement"
            );
        } else {
            run.accept_capped().map_err(state_error(Phase::Critic))?;
            info!(best_iteration = best, cap = run.cap(), "Cap reached; accepting best iteration");
        }
        Ok(path)
    }

    /// Copy the chosen iteration's artifact to `output_path` and keep a
    /// `final` copy in the store.
    async fn deliver(
        &self,
        ctx: &PhaseContext,
        run: &PipelineRun,
        iteration: u32,
        output_path: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let record = run.iteration_record(iteration).ok_or_else(|| {
            PipelineError::contract(
                Phase::Visualizer,
                format!("no artifact recorded for iteration {}", iteration),
            )
        })?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::store(Phase::Visualizer, StoreError::io(parent, e)))?;
        }
        write_atomic(output_path, record.artifact.content.bytes())
            .await
            .map_err(|e| PipelineError::store(Phase::Visualizer, e))?;

        let payload = match &record.artifact.content {
            ArtifactContent::Image(image) => Payload::Image(image.clone()),
            ArtifactContent::Script(code) => Payload::Text(code.clone()),
        };
        ctx.persist(Phase::Visualizer, &ctx.key(FINAL_PHASE, iteration), &payload)
            .await?;

        info!(iteration, path = %output_path.display(), "Final artifact written");
        Ok(output_path.to_path_buf())
    }

    /// Summary to the store and a metric line. Neither can change the outcome.
    async fn finish(&self, ctx: &PhaseContext, run: &PipelineRun, report: &RunReport) {
        match serde_json::to_value(report) {
            Ok(value) => {
                let key = ctx.key(RESULTS_PHASE, SETUP_ITERATION);
                if let Err(e) = ctx.store.put(&key, &Payload::Json(value)).await {
                    warn!("Failed to store run summary: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize run summary: {}", e),
        }

        if let Some(metrics) = &self.metrics {
            let metric = RunMetric::from_report(report, MetricsLogger::hash_input(&run.input.text));
            if let Err(e) = metrics.log(&metric) {
                warn!("Failed to log run metric: {}", e);
            }
        }

        info!(
            status = %report.status,
            iterations = report.iteration_count,
            elapsed_ms = report.elapsed_ms,
            "Run finished"
        );
    }
}

/// Check cancellation, then move the run into `state`.
fn enter(
    run: &mut PipelineRun,
    state: RunState,
    phase: Phase,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled { phase });
    }
    run.transition(state).map_err(state_error(phase))?;
    info!(phase = phase.as_str(), iteration = run.iteration(), "Entering {}", state);
    Ok(())
}

fn state_error(phase: Phase) -> impl Fn(RunStateError) -> PipelineError {
    move |e| PipelineError::contract(phase, e.to_string())
}

/// Next description after a primary miss: the Critic's revision.
fn revise(
    current: &DiagramDescription,
    evaluation: &EvaluationResult,
) -> Result<DiagramDescription, PipelineError> {
    let text = evaluation.revised_description.clone().ok_or_else(|| {
        PipelineError::contract(
            Phase::Critic,
            "primary dimensions failed and no revised description was supplied",
        )
    })?;
    Ok(current.derive(text, Provenance::CriticRevision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{MethodologyInput, Scores};

    fn evaluation(scores: Scores, revised: Option<&str>) -> EvaluationResult {
        EvaluationResult {
            scores,
            suggestions: vec!["enlarge the legend".to_string()],
            revised_description: revised.map(str::to_string),
        }
    }

    #[test]
    fn test_primary_miss_uses_critic_revision() {
        let styled = DiagramDescription::planned("plan").derive("styled", Provenance::Stylist);
        let next = revise(&styled, &evaluation(Scores::new(5, 9, 9, 9), Some("rewritten"))).unwrap();
        assert_eq!(next.text(), "rewritten");
        assert_eq!(next.version(), styled.version() + 1);
        assert_eq!(next.provenance(), Provenance::CriticRevision);
    }

    #[test]
    fn test_suggestions_alone_do_not_revise() {
        let styled = DiagramDescription::planned("plan").derive("styled", Provenance::Stylist);
        assert!(revise(&styled, &evaluation(Scores::new(9, 9, 2, 2), None)).is_err());
    }

    #[test]
    fn test_primary_miss_without_revision_is_contract_violation() {
        let styled = DiagramDescription::planned("plan");
        assert!(revise(&styled, &evaluation(Scores::new(1, 1, 1, 1), None)).is_err());
    }

    #[test]
    fn test_cancelled_token_stops_before_phase() {
        let mut run = PipelineRun::new(RunId::new(), MethodologyInput::diagram("m", None), 3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = enter(&mut run, RunState::Retrieving, Phase::Retriever, &cancel).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { phase: Phase::Retriever }));
        assert_eq!(run.state(), RunState::Pending);
    }
}
