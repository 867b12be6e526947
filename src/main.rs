// PaperBanana - academic figure generation pipeline
// Main entry point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use paperbanana::backend::{GeminiBackend, GenerativeBackend, RetryPolicy, RetryingBackend};
use paperbanana::config::{load_config, Config};
use paperbanana::logging::init_tracing;
use paperbanana::metrics::MetricsLogger;
use paperbanana::pipeline::{
    MethodologyInput, Mode, Orchestrator, ReferenceCatalog, RunReport, RunRequest,
};
use paperbanana::store::FsArtifactStore;

#[derive(Parser)]
#[command(name = "paperbanana")]
#[command(about = "Generate publication-ready diagrams and plots from methodology text")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ~/.paperbanana/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Refinement cap (overrides the config file)
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Where run artifacts are stored (overrides the config file)
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Methodology diagram from a method section
    Diagram {
        /// Methodology text
        #[arg(long, conflicts_with = "methodology_file")]
        methodology: Option<String>,

        /// Read the methodology text from a file
        #[arg(long)]
        methodology_file: Option<PathBuf>,

        /// Figure caption
        #[arg(long)]
        caption: Option<String>,

        #[arg(short, long)]
        output: PathBuf,

        /// Directory with index.json and the reference figures
        #[arg(long)]
        references_dir: Option<PathBuf>,
    },

    /// Statistical plot (matplotlib script) from data and an intent
    Plot {
        /// Data to plot (JSON or CSV text), or @path to read it from a file
        #[arg(long)]
        data: String,

        /// What the plot should show
        #[arg(long)]
        intent: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Summary of today's runs from the metrics log
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(max_iterations) = cli.max_iterations {
        config.pipeline.max_iterations = max_iterations;
    }
    if let Some(work_dir) = cli.work_dir.clone() {
        config.pipeline.work_dir = work_dir;
    }

    let (request, references_dir) = match cli.command {
        Command::Metrics => return show_metrics(&config),
        Command::Diagram {
            methodology,
            methodology_file,
            caption,
            output,
            references_dir,
        } => {
            let text = match (methodology, methodology_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path).with_context(|| {
                    format!("Failed to read methodology file: {}", path.display())
                })?,
                (None, None) => bail!("Provide --methodology or --methodology-file"),
            };
            (
                RunRequest::new(MethodologyInput::diagram(text, caption), output),
                references_dir.or_else(|| config.pipeline.references_dir.clone()),
            )
        }
        Command::Plot {
            data,
            intent,
            output,
        } => {
            let data = match data.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read data file: {}", path))?,
                None => data,
            };
            (RunRequest::new(MethodologyInput::plot(data, intent), output), None)
        }
    };

    config.validate()?;

    let catalog = match (request.input.mode, references_dir) {
        (Mode::Diagram, Some(dir)) => ReferenceCatalog::load(&dir)?,
        (Mode::Diagram, None) => {
            bail!("Diagram mode needs --references-dir (or pipeline.references_dir in the config)")
        }
        (Mode::Plot, _) => ReferenceCatalog::empty(),
    };

    let orchestrator = build_orchestrator(&config, catalog)?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; stopping at the next phase boundary");
            ctrl_c_cancel.cancel();
        }
    });

    let report = orchestrator.run(request, cancel).await;
    print_summary(&report);

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn build_orchestrator(config: &Config, catalog: ReferenceCatalog) -> Result<Orchestrator> {
    let gemini = GeminiBackend::new(config.backend.clone())?;
    let backend: Arc<dyn GenerativeBackend> = Arc::new(RetryingBackend::new(
        Arc::new(gemini),
        RetryPolicy::from_config(&config.backend),
    ));
    let store = Arc::new(FsArtifactStore::new(config.pipeline.work_dir.clone()));

    let orchestrator = Orchestrator::new(backend, store, Arc::new(catalog), config);
    match MetricsLogger::new(config.metrics_dir.clone()) {
        Ok(metrics) => Ok(orchestrator.with_metrics(metrics)),
        Err(e) => {
            eprintln!("Warning: metrics disabled: {:#}", e);
            Ok(orchestrator)
        }
    }
}

fn show_metrics(config: &Config) -> Result<()> {
    let logger = MetricsLogger::new(config.metrics_dir.clone())?;
    print!("{}", logger.get_today_summary()?.format());
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("Run:        {}", report.run_id);
    println!("Status:     {}", report.status);
    println!("Iterations: {}", report.iteration_count);

    if let (Some(category), Some(intent)) = (report.category, report.intent) {
        println!("Category:   {} ({})", category.as_str(), intent.as_str());
    }
    if let Some(scores) = report.final_scores {
        println!(
            "Scores:     faithfulness {} · readability {} · conciseness {} · aesthetics {}",
            scores.faithfulness, scores.readability, scores.conciseness, scores.aesthetics
        );
    }
    if let Some(path) = &report.artifact_path {
        println!("Artifact:   {}", path.display());
    }
    if let Some(failure) = &report.failure {
        println!("Failed in:  {} ({})", failure.phase, failure.kind);
        println!("Error:      {}", failure.message);
        if let Some(key) = &failure.last_artifact {
            println!("Last saved: {}", key);
        }
    }
    println!("Elapsed:    {:.1}s", report.elapsed_ms as f64 / 1000.0);
}
