//! # repo-oracle CLI (`oracle`)
//!
//! Turns a repository into a set of per-file summaries and answers questions
//! about it.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `oracle process <repo>` | Fetch, summarize and save; optionally answer `--question`s |
//! | `oracle select --summary <file> "<question>"` | Rank files from a saved summary |
//! | `oracle ask --summary <file> "<question>"` | Answer from a saved summary (needs file contents) |
//! | `oracle stats <file>` | Print statistics for a saved summary; `--language`, `--min-size`/`--max-size` filter, `--compare <other>` |
//!
//! ## Examples
//!
//! ```bash
//! # Summarize a GitHub repository and ask two questions
//! oracle process https://github.com/acme/widgets \
//!     --question "How is configuration handled?" \
//!     --question "Where are the tests?"
//!
//! # Work offline on a local checkout, no model
//! oracle --config ./config/offline.toml process ./my-checkout
//!
//! # Re-rank files later from the saved summary
//! oracle select --summary ./repo_analysis/repo_summary_20250101_120000.json "logging"
//! ```
//!
//! Logging goes to stderr and is controlled by `-v`/`-q` or `ORACLE_LOG`.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use repo_oracle::config::{self, Config};
use repo_oracle::gateway::{create_gateway, CompletionGateway, DisabledGateway};
use repo_oracle::progress::ProgressMode;
use repo_oracle::source::create_source;
use repo_oracle::stats::{run_stats, StatsOptions, SummaryFilter};
use repo_oracle::workflow::Workflow;

/// repo-oracle: summarize a repository with a language model and answer
/// questions grounded in its files.
#[derive(Parser)]
#[command(name = "oracle", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when it
    /// does not exist.
    #[arg(long, global = true, default_value = "./config/oracle.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    /// Debug-level logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and summarize a repository, then answer any questions.
    ///
    /// The repository is a GitHub URL (`source.provider = "github"`) or a
    /// directory (`source.provider = "local"`).
    Process {
        repo: String,

        /// Question to answer after processing. Repeatable.
        #[arg(long = "question")]
        questions: Vec<String>,

        /// Number of files to select per question.
        #[arg(long)]
        top_k: Option<usize>,

        /// Directory for the summary and question-result files.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Select the files most relevant to a question from a saved summary.
    Select {
        #[arg(long)]
        summary: PathBuf,

        question: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer a question from a saved summary.
    ///
    /// Saved summaries carry no file contents, so this reports that the
    /// repository has to be processed again.
    Ask {
        #[arg(long)]
        summary: PathBuf,

        question: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Print statistics for a saved summary.
    Stats {
        summary: PathBuf,

        /// Also list summaries mentioning this keyword.
        #[arg(long)]
        search: Option<String>,

        /// Only count files in this language (e.g. `Python`).
        #[arg(long)]
        language: Option<String>,

        /// Only count files of at least this many bytes.
        #[arg(long)]
        min_size: Option<u64>,

        /// Only count files of at most this many bytes.
        #[arg(long)]
        max_size: Option<u64>,

        /// Compare against a second summary file.
        #[arg(long, value_name = "OTHER")]
        compare: Option<PathBuf>,
    },
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("ORACLE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

/// Build a workflow whose gateway calls are cancelled on Ctrl-C.
fn build_workflow(
    cfg: &Config,
    progress: ProgressMode,
    gateway: Arc<dyn CompletionGateway>,
) -> anyhow::Result<Workflow> {
    let source = create_source(&cfg.source).context("Failed to create repository source")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling outstanding model calls");
            on_interrupt.cancel();
        }
    });

    Ok(Workflow::from_config(cfg, source, gateway, cancel).with_progress(progress.reporter()))
}

fn configured_gateway(cfg: &Config) -> anyhow::Result<Arc<dyn CompletionGateway>> {
    create_gateway(&cfg.gateway).context("Failed to create completion gateway")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    if let Commands::Stats {
        summary,
        search,
        language,
        min_size,
        max_size,
        compare,
    } = &cli.command
    {
        let options = StatsOptions {
            search: search.clone(),
            filter: SummaryFilter {
                language: language.clone(),
                min_size: *min_size,
                max_size: *max_size,
            },
            compare_with: compare.clone(),
        };
        return run_stats(summary, &options);
    }

    let cfg = config::load_config_or_default(&cli.config)?;
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Process {
            repo,
            questions,
            top_k,
            output,
        } => {
            let output = output.unwrap_or_else(|| cfg.output.dir.clone());
            let top_k = top_k.unwrap_or(cfg.retrieval.top_k);
            run_process(&cfg, progress, &repo, &questions, top_k, &output).await?;
        }
        Commands::Select {
            summary,
            question,
            top_k,
        } => {
            let mut workflow = build_workflow(&cfg, progress, configured_gateway(&cfg)?)?;
            workflow.load_summaries(&summary)?;
            let selected = workflow
                .select_files(&question, top_k.unwrap_or(cfg.retrieval.top_k))
                .await?;
            for path in selected {
                println!("{}", path);
            }
        }
        Commands::Ask {
            summary,
            question,
            top_k,
        } => {
            // A loaded summary carries no contents, so `ask` is refused
            // before any model call and needs no credentials.
            let mut workflow = build_workflow(&cfg, progress, Arc::new(DisabledGateway))?;
            workflow.load_summaries(&summary)?;
            let result = workflow
                .ask(&question, top_k.unwrap_or(cfg.retrieval.top_k))
                .await?;
            println!("{}", result.answer);
        }
        Commands::Stats { .. } => {}
    }

    Ok(())
}

async fn run_process(
    cfg: &Config,
    progress: ProgressMode,
    repo: &str,
    questions: &[String],
    top_k: usize,
    output: &Path,
) -> anyhow::Result<()> {
    let mut workflow = build_workflow(cfg, progress, configured_gateway(cfg)?)?;
    let summary_path = workflow.process_repository(repo, output).await?;

    if let Some(metadata) = workflow.metadata() {
        println!(
            "Processed {} files ({} bytes) from {} in {:.1}s",
            metadata.total_files, metadata.total_size, metadata.repo_url, metadata.processing_time
        );
    }
    println!("Summaries saved to {}", summary_path.display());

    if questions.is_empty() {
        return Ok(());
    }

    let mut results = Vec::with_capacity(questions.len());
    for question in questions {
        let result = workflow.ask(question, top_k).await?;
        println!();
        println!("Q: {}", result.question);
        println!("Files: {}", result.selected_files.join(", "));
        println!();
        println!("{}", result.answer);
        results.push(result);
    }

    let qa_path = workflow.save_question_results(&results)?;
    println!();
    println!("Question results saved to {}", qa_path.display());
    Ok(())
}
