//! Typed errors for the workflow orchestrator.
//!
//! Callers that need to react to a specific failure (for example telling a
//! user to re-run `process` because only summaries are loaded) match on
//! [`WorkflowError`]; everything below the orchestrator uses `anyhow`.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What the orchestrator currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// Nothing loaded.
    Empty,
    /// File contents fetched, not yet summarized.
    Fetched,
    /// Contents and summaries present; questions can be answered.
    Ready,
    /// Summaries read from disk without any file content.
    LoadedFromPersisted,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Empty => "empty",
            WorkflowState::Fetched => "fetched",
            WorkflowState::Ready => "ready",
            WorkflowState::LoadedFromPersisted => "loaded-from-persisted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to fetch repository {repo}: {message}")]
    Source { repo: String, message: String },

    #[error("no repository is loaded; process a repository or load a summary file first")]
    NotReady,

    #[error(
        "file contents are unavailable: only summaries were loaded from {}; \
         process the repository again to answer questions",
        .path.display()
    )]
    ContentUnavailable { path: PathBuf },

    #[error("cannot {operation} while the working set is {state}")]
    InvalidState {
        operation: &'static str,
        state: WorkflowState,
    },

    #[error("invalid summary document {}: {message}", .path.display())]
    Validation { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let err = WorkflowError::InvalidState {
            operation: "summarize",
            state: WorkflowState::Empty,
        };
        assert_eq!(err.to_string(), "cannot summarize while the working set is empty");

        let err = WorkflowError::ContentUnavailable {
            path: PathBuf::from("out/repo_summary_x.json"),
        };
        assert!(err.to_string().contains("out/repo_summary_x.json"));
        assert!(err.to_string().contains("unavailable"));
    }
}
