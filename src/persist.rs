//! Summary document and question-result persistence.
//!
//! A processed repository is saved as one pretty-printed JSON document:
//!
//! ```json
//! { "metadata": { "repo_url": "...", ... }, "summaries": [ { "path": "...", ... } ] }
//! ```
//!
//! named `repo_summary_<YYYYMMDD_HHMMSS>.json`. Answers for a batch of
//! questions go next to it in `qa_results_<YYYYMMDD_HHMMSS>.json`.
//!
//! Loading validates before returning anything: a document with a missing
//! field or an empty path is rejected with [`WorkflowError::Validation`].

use chrono::Local;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::WorkflowError;
use crate::models::{FileSummary, QuestionResult, RepositoryMetadata, SummaryDocument};

const SUMMARY_PREFIX: &str = "repo_summary";
const QA_PREFIX: &str = "qa_results";

/// Timestamped path for a new summary document inside `dir`.
pub fn summary_path_in(dir: &Path) -> PathBuf {
    dir.join(format!(
        "{}_{}.json",
        SUMMARY_PREFIX,
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Path of the question results that belong to `summary_path`.
pub fn qa_results_path_for(summary_path: &Path) -> PathBuf {
    let name = summary_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let qa_name = if name.contains(SUMMARY_PREFIX) {
        name.replacen(SUMMARY_PREFIX, QA_PREFIX, 1)
    } else {
        format!("{}_{}", QA_PREFIX, name)
    };
    summary_path.with_file_name(qa_name)
}

/// Write `document` into `dir` (created if needed) and return its path.
pub fn write_summary_document(dir: &Path, document: &SummaryDocument) -> Result<PathBuf, WorkflowError> {
    std::fs::create_dir_all(dir)?;
    let path = summary_path_in(dir);
    std::fs::write(&path, serde_json::to_string_pretty(document)?)?;
    info!(path = %path.display(), summaries = document.summaries.len(), "saved summaries");
    Ok(path)
}

/// Read and validate a summary document.
pub fn read_summary_document(path: &Path) -> Result<SummaryDocument, WorkflowError> {
    let text = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    validate_summary_document(path, value)
}

fn validate_summary_document(path: &Path, value: Value) -> Result<SummaryDocument, WorkflowError> {
    let invalid = |message: String| WorkflowError::Validation {
        path: path.to_path_buf(),
        message,
    };

    let Value::Object(mut root) = value else {
        return Err(invalid("top level is not a JSON object".to_string()));
    };

    let metadata_value = root
        .remove("metadata")
        .ok_or_else(|| invalid("missing field `metadata`".to_string()))?;
    let metadata: RepositoryMetadata = serde_json::from_value(metadata_value)
        .map_err(|e| invalid(format!("metadata: {}", e)))?;

    let summaries_value = root
        .remove("summaries")
        .ok_or_else(|| invalid("missing field `summaries`".to_string()))?;
    let Value::Array(entries) = summaries_value else {
        return Err(invalid("`summaries` is not an array".to_string()));
    };

    let mut summaries = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let summary: FileSummary =
            serde_json::from_value(entry).map_err(|e| invalid(format!("summaries[{}]: {}", i, e)))?;
        if summary.path.trim().is_empty() {
            return Err(invalid(format!("summaries[{}]: empty path", i)));
        }
        summaries.push(summary);
    }

    Ok(SummaryDocument {
        metadata,
        summaries,
    })
}

/// Write a batch of question results as a JSON array.
pub fn write_question_results(path: &Path, results: &[QuestionResult]) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(results)?)?;
    info!(path = %path.display(), results = results.len(), "saved question results");
    Ok(())
}

pub fn read_question_results(path: &Path) -> Result<Vec<QuestionResult>, WorkflowError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
