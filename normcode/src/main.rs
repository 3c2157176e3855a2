//! `normcode` — run, resume, fork, and inspect NormCode plan executions
//! from the command line. Mirrors the teacher's `cli.rs`/`main.rs` split:
//! `main` wires up logging and dispatches to a thin command layer, exit
//! codes follow the documented policy rather than `?`-propagating straight
//! out of `main`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{Context, Result};

use normcode::body::mock::MockBody;
use normcode::{
    BodyInterface, ConceptRepo, FailedInference, FlowIndex, InferenceRepo, Orchestrator, OrchestratorOpts, RunOutcome,
};

#[derive(Parser)]
#[command(name = "normcode", about = "Run, resume, and fork NormCode plan executions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a fresh run from a concept/inference repository pair.
    Run {
        #[arg(long)]
        concepts: PathBuf,
        #[arg(long)]
        inferences: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Resume a run from its latest (or a given) checkpoint.
    Resume {
        #[arg(long)]
        concepts: PathBuf,
        #[arg(long)]
        inferences: PathBuf,
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        cycle: Option<i64>,
    },
    /// Copy a run's checkpoint history into a new run_id and continue it.
    Fork {
        #[arg(long)]
        concepts: PathBuf,
        #[arg(long)]
        inferences: PathBuf,
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        source_run_id: String,
        #[arg(long)]
        new_run_id: String,
        #[arg(long)]
        cycle: Option<i64>,
    },
    /// List every checkpoint recorded for a run.
    ListCheckpoints {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        run_id: String,
    },
}

fn init_tracing() {
    let filter = std::env::var("NORMCODE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(%error, "normcode failed");
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Run { concepts, inferences, db, run_id, max_cycles } => {
            let (concepts, inferences) = load_repos(&concepts, &inferences)?;
            let mut opts = OrchestratorOpts {
                run_id,
                db_path: db,
                ..Default::default()
            };
            if let Some(max_cycles) = max_cycles {
                opts.max_cycles = Some(max_cycles);
            }
            let body: Arc<dyn BodyInterface> = Arc::new(MockBody::new());
            let mut orchestrator = Orchestrator::new(concepts, inferences, body, opts).context("failed to construct orchestrator")?;
            let outcome = orchestrator.run().await.context("run failed")?;
            Ok(report(outcome))
        }
        Command::Resume { concepts, inferences, db, run_id, cycle } => {
            let (concepts, inferences) = load_repos(&concepts, &inferences)?;
            let body: Arc<dyn BodyInterface> = Arc::new(MockBody::new());
            let mut orchestrator = Orchestrator::load_checkpoint(concepts, inferences, body, &db, &run_id, cycle, OrchestratorOpts::default())
                .context("failed to load checkpoint")?;
            let outcome = orchestrator.run().await.context("run failed")?;
            Ok(report(outcome))
        }
        Command::Fork { concepts, inferences, db, source_run_id, new_run_id, cycle } => {
            let (concepts, inferences) = load_repos(&concepts, &inferences)?;
            let body: Arc<dyn BodyInterface> = Arc::new(MockBody::new());
            let mut orchestrator = Orchestrator::fork_checkpoint(
                concepts,
                inferences,
                body,
                &db,
                &source_run_id,
                &new_run_id,
                cycle,
                OrchestratorOpts::default(),
            )
            .context("failed to fork checkpoint")?;
            let outcome = orchestrator.run().await.context("run failed")?;
            Ok(report(outcome))
        }
        Command::ListCheckpoints { db, run_id } => {
            let store = normstore::CheckpointStore::open(&db).context("failed to open checkpoint store")?;
            let checkpoints = store.list_checkpoints(&run_id).context("failed to list checkpoints")?;
            for checkpoint in &checkpoints {
                println!(
                    "cycle={} inference_count={} created_at={}",
                    checkpoint.cycle, checkpoint.inference_count, checkpoint.created_at
                );
            }
            Ok(ExitCode::from(0))
        }
    }
}

fn load_repos(concepts_path: &PathBuf, inferences_path: &PathBuf) -> Result<(ConceptRepo, InferenceRepo)> {
    let concepts = ConceptRepo::load(concepts_path).context("failed to load concept repository")?;
    let inferences = InferenceRepo::load(inferences_path).context("failed to load inference repository")?;
    Ok((concepts, inferences))
}

fn report(outcome: RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Completed { final_concepts } => {
            let payload: Vec<_> = final_concepts
                .iter()
                .map(|c| serde_json::json!({"concept_name": c.concept_name, "reference": c.reference}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
            ExitCode::from(0)
        }
        RunOutcome::Failed { failed } => {
            print_failed(&failed);
            ExitCode::from(2)
        }
        RunOutcome::Stuck { failed, reason } => {
            eprintln!("stuck: {reason}");
            print_failed(&failed);
            ExitCode::from(3)
        }
        RunOutcome::Cancelled => {
            eprintln!("run cancelled");
            ExitCode::from(1)
        }
        RunOutcome::Paused => {
            eprintln!("run paused");
            ExitCode::from(0)
        }
    }
}

fn print_failed(failed: &[FailedInference]) {
    for f in failed {
        let flow_index: &FlowIndex = &f.flow_index;
        eprintln!("failed inference {flow_index}: {:?}", f.detail);
    }
}
