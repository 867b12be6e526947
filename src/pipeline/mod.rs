// Pipeline module
// Figure generation phases and the loop that drives them

pub mod error;
pub mod evaluation;
pub mod orchestrator;
pub mod phases;
pub mod references;
pub mod run;
pub mod types;

pub use error::{ErrorKind, PipelineError};
pub use evaluation::{compare_iterations, select_best, verdict, Verdict};
pub use orchestrator::{Orchestrator, FINAL_PHASE, RESULTS_PHASE};
pub use references::{ReferenceCatalog, ReferenceEntry};
pub use run::{
    FailureRecord, IterationRecord, IterationSummary, PipelineRun, RunOutcome, RunReport,
    RunState, RunStateError, RunStatus,
};
pub use types::{
    ArtifactContent, Category, DiagramDescription, EvaluationResult, MethodologyInput, Mode,
    Phase, Provenance, ReferenceSelection, RenderedArtifact, RunRequest, Scores,
    SelectedReference, VisualIntent,
};
