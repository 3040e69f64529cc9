//! Workflow orchestrator.
//!
//! Owns the working set and sequences the stages:
//!
//! ```text
//! fetch ──► summarize ──► save_summaries          (process_repository)
//!                │
//!                ▼
//!        select_files ──► answer                  (ask)
//! ```
//!
//! # States
//!
//! | State | Holds | `select_files` | `ask` |
//! |-------|-------|----------------|-------|
//! | `Empty` | nothing | `NotReady` | `NotReady` |
//! | `Fetched` | contents | `NotReady` | `NotReady` |
//! | `Ready` | contents + summaries | ok | ok |
//! | `LoadedFromPersisted` | summaries only | ok | `ContentUnavailable` |
//!
//! The working set is only ever replaced as a whole. A failed `fetch` or
//! `load_summaries` leaves the previous one in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::answer::Answerer;
use crate::config::Config;
use crate::error::{WorkflowError, WorkflowState};
use crate::fetch::{fetch_repository, FetchOptions};
use crate::gateway::{CallPolicy, CompletionGateway};
use crate::models::{
    FetchedFile, FetchedRepository, FileSummary, QuestionResult, RepositoryMetadata,
    SummaryDocument,
};
use crate::persist;
use crate::progress::{NoProgress, ProgressReporter};
use crate::select::Decider;
use crate::source::RepositorySource;
use crate::summarize::Summarizer;

enum WorkingSet {
    Empty,
    Fetched {
        repo: FetchedRepository,
    },
    Ready {
        repo: FetchedRepository,
        summaries: Vec<FileSummary>,
    },
    LoadedFromPersisted {
        path: PathBuf,
        document: SummaryDocument,
    },
}

pub struct Workflow {
    source: Arc<dyn RepositorySource>,
    summarizer: Summarizer,
    decider: Decider,
    answerer: Answerer,
    fetch_options: FetchOptions,
    progress: Box<dyn ProgressReporter>,
    working_set: WorkingSet,
    summary_path: Option<PathBuf>,
}

impl Workflow {
    /// Workflow with default limits and no progress output.
    pub fn new(source: Arc<dyn RepositorySource>, gateway: Arc<dyn CompletionGateway>) -> Self {
        let policy = CallPolicy::default();
        Self {
            source,
            summarizer: Summarizer::new(gateway.clone(), policy.clone()),
            decider: Decider::new(gateway.clone(), policy.clone()),
            answerer: Answerer::new(gateway, policy),
            fetch_options: FetchOptions::default(),
            progress: Box::new(NoProgress),
            working_set: WorkingSet::Empty,
            summary_path: None,
        }
    }

    /// Workflow whose limits and per-call deadline come from `config`.
    pub fn from_config(
        config: &Config,
        source: Arc<dyn RepositorySource>,
        gateway: Arc<dyn CompletionGateway>,
        cancel: CancellationToken,
    ) -> Self {
        let policy = CallPolicy::from_config(&config.gateway, cancel);
        Self {
            source,
            summarizer: Summarizer::from_config(gateway.clone(), policy.clone(), &config.summarize),
            decider: Decider::new(gateway.clone(), policy.clone()),
            answerer: Answerer::new(gateway, policy).with_max_file_chars(config.answer.max_file_chars),
            fetch_options: FetchOptions::from_config(&config.source),
            progress: Box::new(NoProgress),
            working_set: WorkingSet::Empty,
            summary_path: None,
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = options;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn state(&self) -> WorkflowState {
        match &self.working_set {
            WorkingSet::Empty => WorkflowState::Empty,
            WorkingSet::Fetched { .. } => WorkflowState::Fetched,
            WorkingSet::Ready { .. } => WorkflowState::Ready,
            WorkingSet::LoadedFromPersisted { .. } => WorkflowState::LoadedFromPersisted,
        }
    }

    pub fn metadata(&self) -> Option<&RepositoryMetadata> {
        match &self.working_set {
            WorkingSet::Empty => None,
            WorkingSet::Fetched { repo } | WorkingSet::Ready { repo, .. } => Some(&repo.metadata),
            WorkingSet::LoadedFromPersisted { document, .. } => Some(&document.metadata),
        }
    }

    pub fn files(&self) -> Option<&[FetchedFile]> {
        match &self.working_set {
            WorkingSet::Fetched { repo } | WorkingSet::Ready { repo, .. } => Some(&repo.files),
            _ => None,
        }
    }

    pub fn summaries(&self) -> Option<&[FileSummary]> {
        match &self.working_set {
            WorkingSet::Ready { summaries, .. } => Some(summaries),
            WorkingSet::LoadedFromPersisted { document, .. } => Some(&document.summaries),
            _ => None,
        }
    }

    /// Where the current summaries were last saved to or loaded from.
    pub fn summary_path(&self) -> Option<&Path> {
        self.summary_path.as_deref()
    }

    /// Fetch `repo`, replacing the working set with its contents.
    pub async fn fetch(&mut self, repo: &str) -> Result<(), WorkflowError> {
        let fetched = fetch_repository(
            self.source.as_ref(),
            repo,
            self.fetch_options,
            self.progress.as_ref(),
        )
        .await
        .map_err(|e| WorkflowError::Source {
            repo: repo.to_string(),
            message: format!("{:#}", e),
        })?;

        self.working_set = WorkingSet::Fetched { repo: fetched };
        self.summary_path = None;
        Ok(())
    }

    /// Summarize the fetched files. Legal only from `Fetched`.
    pub async fn summarize(&mut self) -> Result<(), WorkflowError> {
        let summaries = match &self.working_set {
            WorkingSet::Fetched { repo } => {
                self.summarizer
                    .summarize_all(&repo.files, self.progress.as_ref())
                    .await
            }
            _ => {
                return Err(WorkflowError::InvalidState {
                    operation: "summarize",
                    state: self.state(),
                })
            }
        };

        let previous = std::mem::replace(&mut self.working_set, WorkingSet::Empty);
        if let WorkingSet::Fetched { repo } = previous {
            info!(files = repo.files.len(), summaries = summaries.len(), "summarization complete");
            self.working_set = WorkingSet::Ready { repo, summaries };
        }
        Ok(())
    }

    /// Save metadata and summaries under `dir`. Legal only from `Ready`.
    pub fn save_summaries(&mut self, dir: &Path) -> Result<PathBuf, WorkflowError> {
        let WorkingSet::Ready { repo, summaries } = &self.working_set else {
            return Err(WorkflowError::InvalidState {
                operation: "save summaries",
                state: self.state(),
            });
        };

        let document = SummaryDocument {
            metadata: repo.metadata.clone(),
            summaries: summaries.clone(),
        };
        let path = persist::write_summary_document(dir, &document)?;
        self.summary_path = Some(path.clone());
        Ok(path)
    }

    /// Fetch, summarize and save in one go. Returns the summary file path.
    pub async fn process_repository(&mut self, repo: &str, dir: &Path) -> Result<PathBuf, WorkflowError> {
        info!(repo, "processing repository");
        self.fetch(repo).await?;
        self.summarize().await?;
        self.save_summaries(dir)
    }

    /// Load a saved summary document. Contents are not available afterwards.
    pub fn load_summaries(&mut self, path: &Path) -> Result<(), WorkflowError> {
        let document = persist::read_summary_document(path)?;
        info!(
            path = %path.display(),
            summaries = document.summaries.len(),
            "loaded summaries"
        );
        self.working_set = WorkingSet::LoadedFromPersisted {
            path: path.to_path_buf(),
            document,
        };
        self.summary_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Pick up to `top_k` relevant paths for `question`.
    pub async fn select_files(&self, question: &str, top_k: usize) -> Result<Vec<String>, WorkflowError> {
        let summaries = self.summaries().ok_or(WorkflowError::NotReady)?;
        Ok(self.decider.select(question, summaries, top_k).await)
    }

    /// Select files and answer `question` from their contents.
    ///
    /// Requires `Ready`; the state is checked before any gateway call.
    pub async fn ask(&self, question: &str, top_k: usize) -> Result<QuestionResult, WorkflowError> {
        let (repo, summaries) = match &self.working_set {
            WorkingSet::Ready { repo, summaries } => (repo, summaries),
            WorkingSet::LoadedFromPersisted { path, .. } => {
                return Err(WorkflowError::ContentUnavailable { path: path.clone() })
            }
            WorkingSet::Empty | WorkingSet::Fetched { .. } => return Err(WorkflowError::NotReady),
        };

        info!(question, top_k, "answering question");
        let selected = self.decider.select(question, summaries, top_k).await;
        let files: Vec<&FetchedFile> = selected
            .iter()
            .filter_map(|path| repo.files.iter().find(|f| &f.path == path))
            .collect();
        let answer = self.answerer.answer(question, &files, summaries).await;

        Ok(QuestionResult {
            question: question.to_string(),
            selected_files: selected,
            answer,
            timestamp: Utc::now(),
        })
    }

    /// Save question results next to the current summary file.
    pub fn save_question_results(&self, results: &[QuestionResult]) -> Result<PathBuf, WorkflowError> {
        let summary_path = self.summary_path.as_deref().ok_or(WorkflowError::InvalidState {
            operation: "save question results",
            state: self.state(),
        })?;
        let path = persist::qa_results_path_for(summary_path);
        persist::write_question_results(&path, results)?;
        Ok(path)
    }
}
