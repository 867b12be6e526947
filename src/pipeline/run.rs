// Pipeline run state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::error::{ErrorKind, PipelineError};
use super::evaluation;
use super::types::{
    Category, DiagramDescription, EvaluationResult, MethodologyInput, Phase, ReferenceSelection,
    RenderedArtifact, Scores, VisualIntent,
};
use crate::store::{ArtifactKey, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Retrieving,
    Planning,
    Styling,
    Visualizing,
    Critiquing,
    Revising,
    Accepted,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Failed)
    }

    /// Legal edges of the run state machine.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Retrieving) => true,
            // Plot mode has no retrieval
            (Pending, Planning) => true,
            (Retrieving, Planning) => true,
            (Planning, Styling) => true,
            (Styling, Visualizing) => true,
            (Visualizing, Critiquing) => true,
            (Critiquing, Accepted) => true,
            (Critiquing, Revising) => true,
            (Revising, Visualizing) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrieving => "retrieving",
            Self::Planning => "planning",
            Self::Styling => "styling",
            Self::Visualizing => "visualizing",
            Self::Critiquing => "critiquing",
            Self::Revising => "revising",
            Self::Accepted => "accepted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunStateError {
    #[error("illegal state transition {from} -> {to}")]
    IllegalTransition { from: RunState, to: RunState },

    #[error("iteration cap of {cap} reached")]
    CapReached { cap: u32 },

    #[error("iterations must be recorded in order: expected {expected}, got {got}")]
    OutOfOrder { expected: u32, got: u32 },

    #[error("description version {got} does not follow {previous}")]
    StaleDescription { previous: u32, got: u32 },

    #[error("no iteration has been recorded")]
    NoIterations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: RunState,
    pub to: RunState,
    pub iteration: u32,
    pub at: DateTime<Utc>,
}

/// One pass of the refinement loop.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: u32,
    pub description: DiagramDescription,
    pub artifact: RenderedArtifact,
    pub evaluation: EvaluationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Accepted,
    /// Primary dimensions pass; secondary ones do not
    PrimaryAccept,
    CappedAccept,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::PrimaryAccept => "primary-accept",
            Self::CappedAccept => "capped-accept",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub phase: Phase,
    pub kind: ErrorKind,
    pub message: String,
    /// Last artifact persisted before the failure
    pub last_artifact: Option<ArtifactKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// overall_pass on `iteration`
    Accepted { iteration: u32 },
    /// primary_pass without overall_pass; no further render is attempted
    PrimaryAccept { best_iteration: u32 },
    /// Cap reached without a clean pass; `best_iteration` chosen by the comparator
    CappedAccept { best_iteration: u32 },
    Failed(FailureRecord),
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Accepted { .. } => RunStatus::Accepted,
            Self::PrimaryAccept { .. } => RunStatus::PrimaryAccept,
            Self::CappedAccept { .. } => RunStatus::CappedAccept,
            Self::Failed(_) => RunStatus::Failed,
        }
    }

    /// Iteration whose artifact is the run's final artifact.
    pub fn final_iteration(&self) -> Option<u32> {
        match self {
            Self::Accepted { iteration } => Some(*iteration),
            Self::PrimaryAccept { best_iteration } | Self::CappedAccept { best_iteration } => {
                Some(*best_iteration)
            }
            Self::Failed(_) => None,
        }
    }
}

/// State of one run. Owned by the orchestrator task driving it.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub input: MethodologyInput,
    cap: u32,
    state: RunState,
    iteration: u32,
    transitions: Vec<Transition>,
    selection: Option<ReferenceSelection>,
    history: Vec<IterationRecord>,
    outcome: Option<RunOutcome>,
}

impl PipelineRun {
    pub fn new(run_id: RunId, input: MethodologyInput, cap: u32) -> Self {
        Self {
            run_id,
            input,
            cap: cap.max(1),
            state: RunState::Pending,
            iteration: 0,
            transitions: Vec::new(),
            selection: None,
            history: Vec::new(),
            outcome: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Current refinement iteration (0 before the first render).
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn selection(&self) -> Option<&ReferenceSelection> {
        self.selection.as_ref()
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn transition(&mut self, next: RunState) -> Result<(), RunStateError> {
        if !self.state.can_transition_to(next) {
            return Err(RunStateError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        // Entering Visualizing starts a new iteration; the cap is enforced here
        if next == RunState::Visualizing {
            if self.iteration >= self.cap {
                return Err(RunStateError::CapReached { cap: self.cap });
            }
            self.iteration += 1;
        }

        tracing::debug!(from = %self.state, to = %next, iteration = self.iteration, "State transition");
        self.transitions.push(Transition {
            from: self.state,
            to: next,
            iteration: self.iteration,
            at: Utc::now(),
        });
        self.state = next;
        Ok(())
    }

    pub fn set_selection(&mut self, selection: ReferenceSelection) {
        self.selection = Some(selection);
    }

    /// Whether another Visualizer pass fits under the cap.
    pub fn iterations_remain(&self) -> bool {
        self.iteration < self.cap
    }

    /// Record the current iteration's result.
    pub fn record(&mut self, record: IterationRecord) -> Result<(), RunStateError> {
        if record.iteration != self.iteration || record.iteration != self.history.len() as u32 + 1 {
            return Err(RunStateError::OutOfOrder {
                expected: self.iteration,
                got: record.iteration,
            });
        }
        if let Some(previous) = self.history.last() {
            if record.description.version() <= previous.description.version() {
                return Err(RunStateError::StaleDescription {
                    previous: previous.description.version(),
                    got: record.description.version(),
                });
            }
        }
        self.history.push(record);
        Ok(())
    }

    pub fn latest(&self) -> Option<&IterationRecord> {
        self.history.last()
    }

    pub fn iteration_record(&self, iteration: u32) -> Option<&IterationRecord> {
        self.history.iter().find(|r| r.iteration == iteration)
    }

    /// Critiquing → Accepted after a clean pass.
    pub fn accept(&mut self) -> Result<RunOutcome, RunStateError> {
        self.transition(RunState::Accepted)?;
        let outcome = RunOutcome::Accepted {
            iteration: self.iteration,
        };
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Critiquing → Accepted at the cap, keeping the best iteration.
    pub fn accept_capped(&mut self) -> Result<RunOutcome, RunStateError> {
        self.accept_best(|best_iteration| RunOutcome::CappedAccept { best_iteration })
    }

    /// Critiquing → Accepted when only secondary dimensions miss.
    pub fn accept_primary(&mut self) -> Result<RunOutcome, RunStateError> {
        self.accept_best(|best_iteration| RunOutcome::PrimaryAccept { best_iteration })
    }

    /// Iteration the comparator ranks first.
    pub fn best_iteration(&self) -> Option<u32> {
        evaluation::select_best(
            self.history
                .iter()
                .map(|r| (r.iteration, &r.evaluation.scores)),
        )
    }

    fn accept_best(
        &mut self,
        outcome: impl FnOnce(u32) -> RunOutcome,
    ) -> Result<RunOutcome, RunStateError> {
        let best = self.best_iteration().ok_or(RunStateError::NoIterations)?;
        self.transition(RunState::Accepted)?;
        let outcome = outcome(best);
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    pub fn fail(&mut self, error: &PipelineError, last_artifact: Option<ArtifactKey>) -> RunOutcome {
        if self.state.can_transition_to(RunState::Failed) {
            // Failed is reachable from every non-terminal state
            let _ = self.transition(RunState::Failed);
        }
        let outcome = RunOutcome::Failed(FailureRecord {
            phase: error.phase(),
            kind: error.kind(),
            message: error.to_string(),
            last_artifact,
        });
        self.outcome = Some(outcome.clone());
        outcome
    }
}

/// Per-iteration summary carried in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration: u32,
    pub description_version: u32,
    pub scores: Scores,
    pub primary_pass: bool,
    pub overall_pass: bool,
    pub suggestions: Vec<String>,
}

/// Entry-call result; also written to the store as `pipeline_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub mode: super::types::Mode,
    pub status: RunStatus,
    pub artifact_path: Option<PathBuf>,
    pub iteration_count: u32,
    pub final_iteration: Option<u32>,
    pub final_scores: Option<Scores>,
    pub category: Option<Category>,
    pub intent: Option<VisualIntent>,
    pub iterations: Vec<IterationSummary>,
    pub failure: Option<FailureRecord>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn from_run(run: &PipelineRun, artifact_path: Option<PathBuf>, elapsed_ms: u64) -> Self {
        let outcome = run.outcome();
        let final_iteration = outcome.and_then(RunOutcome::final_iteration);
        let final_scores = final_iteration
            .and_then(|i| run.iteration_record(i))
            .map(|r| r.evaluation.scores);

        Self {
            run_id: run.run_id,
            mode: run.input.mode,
            status: outcome.map(RunOutcome::status).unwrap_or(RunStatus::Failed),
            artifact_path,
            iteration_count: run.iteration(),
            final_iteration,
            final_scores,
            category: run.selection().map(|s| s.category),
            intent: run.selection().map(|s| s.intent),
            iterations: run
                .history()
                .iter()
                .map(|r| {
                    let verdict = r.evaluation.scores.verdict();
                    IterationSummary {
                        iteration: r.iteration,
                        description_version: r.description.version(),
                        scores: r.evaluation.scores,
                        primary_pass: verdict.primary_pass,
                        overall_pass: verdict.overall_pass,
                        suggestions: r.evaluation.suggestions.clone(),
                    }
                })
                .collect(),
            failure: match outcome {
                Some(RunOutcome::Failed(record)) => Some(record.clone()),
                _ => None,
            },
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImageData;
    use crate::pipeline::types::{ArtifactContent, Provenance};

    fn record(run: &PipelineRun, description: &DiagramDescription, scores: Scores) -> IterationRecord {
        IterationRecord {
            iteration: run.iteration(),
            description: description.clone(),
            artifact: RenderedArtifact {
                content: ArtifactContent::Image(ImageData::png(vec![1])),
                source_version: description.version(),
                aspect_ratio: None,
                rendered_at: Utc::now(),
                key: ArtifactKey::new(run.run_id, "visualizer", run.iteration()),
            },
            evaluation: EvaluationResult {
                scores,
                suggestions: vec![],
                revised_description: None,
            },
        }
    }

    fn to_critiquing(run: &mut PipelineRun) {
        for state in [
            RunState::Retrieving,
            RunState::Planning,
            RunState::Styling,
            RunState::Visualizing,
            RunState::Critiquing,
        ] {
            run.transition(state).unwrap();
        }
    }

    #[test]
    fn test_planning_requires_retrieval_first_in_diagram_flow() {
        let mut run = PipelineRun::new(RunId::new(), MethodologyInput::diagram("m", None), 3);
        run.transition(RunState::Retrieving).unwrap();
        assert!(run.transition(RunState::Styling).is_err());
        assert!(run.transition(RunState::Planning).is_ok());
    }

    #[test]
    fn test_cap_is_enforced() {
        let mut run = PipelineRun::new(RunId::new(), MethodologyInput::diagram("m", None), 2);
        to_critiquing(&mut run);
        run.transition(RunState::Revising).unwrap();
        run.transition(RunState::Visualizing).unwrap();
        run.transition(RunState::Critiquing).unwrap();
        assert_eq!(run.iteration(), 2);
        assert!(!run.iterations_remain());
        run.transition(RunState::Revising).unwrap();
        assert_eq!(
            run.transition(RunState::Visualizing),
            Err(RunStateError::CapReached { cap: 2 })
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = PipelineRun::new(RunId::new(), MethodologyInput::diagram("m", None), 3);
        to_critiquing(&mut run);
        let description = DiagramDescription::planned("d");
        run.record(record(&run, &description, Scores::new(9, 9, 9, 9))).unwrap();
        run.accept().unwrap();
        assert!(run.transition(RunState::Failed).is_err());
        assert!(run.transition(RunState::Visualizing).is_err());
    }

    #[test]
    fn test_capped_accept_picks_best_not_latest() {
        let mut run = PipelineRun::new(RunId::new(), MethodologyInput::diagram("m", None), 3);
        to_critiquing(&mut run);
        let d1 = DiagramDescription::planned("d1");
        run.record(record(&run, &d1, Scores::new(6, 6, 5, 5))).unwrap();

        let d2 = d1.derive("d2", Provenance::CriticRevision);
        run.transition(RunState::Revising).unwrap();
        run.transition(RunState::Visualizing).unwrap();
        run.transition(RunState::Critiquing).unwrap();
        run.record(record(&run, &d2, Scores::new(6, 5, 9, 9))).unwrap();

        let outcome = run.accept_capped().unwrap();
        assert_eq!(outcome, RunOutcome::CappedAccept { best_iteration: 1 });
    }

    #[test]
    fn test_primary_accept_is_not_a_clean_accept() {
        let mut run = PipelineRun::new(RunId::new(), MethodologyInput::diagram("m", None), 3);
        to_critiquing(&mut run);
        let description = DiagramDescription::planned("d");
        run.record(record(&run, &description, Scores::new(8, 8, 2, 3))).unwrap();

        let outcome = run.accept_primary().unwrap();
        assert_eq!(outcome, RunOutcome::PrimaryAccept { best_iteration: 1 });
        assert_eq!(outcome.status(), RunStatus::PrimaryAccept);
        assert_ne!(outcome.status(), RunStatus::Accepted);
        assert_eq!(outcome.final_iteration(), Some(1));
        assert_eq!(run.state(), RunState::Accepted);
    }

    #[test]
    fn test_stale_description_rejected() {
        let mut run = PipelineRun::new(RunId::new(), MethodologyInput::diagram("m", None), 3);
        to_critiquing(&mut run);
        let d1 = DiagramDescription::planned("d1");
        run.record(record(&run, &d1, Scores::new(1, 1, 1, 1))).unwrap();
        run.transition(RunState::Revising).unwrap();
        run.transition(RunState::Visualizing).unwrap();
        run.transition(RunState::Critiquing).unwrap();
        assert!(matches!(
            run.record(record(&run, &d1, Scores::new(1, 1, 1, 1))),
            Err(RunStateError::StaleDescription { .. })
        ));
    }

    #[test]
    fn test_fail_records_phase_and_kind() {
        let mut run = PipelineRun::new(RunId::new(), MethodologyInput::diagram("m", None), 3);
        run.transition(RunState::Retrieving).unwrap();
        let err = PipelineError::contract(Phase::Retriever, "bad category");
        let outcome = run.fail(&err, None);
        assert_eq!(run.state(), RunState::Failed);
        match outcome {
            RunOutcome::Failed(record) => {
                assert_eq!(record.phase, Phase::Retriever);
                assert_eq!(record.kind, ErrorKind::ContractViolation);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(
            serde_json::to_string(&RunStatus::CappedAccept).unwrap(),
            "\"capped-accept\""
        );
        assert_eq!(RunStatus::PrimaryAccept.to_string(), "primary-accept");
        assert_eq!(RunState::Critiquing.to_string(), "critiquing");
    }
}
