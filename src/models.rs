//! Core data models used throughout repo-oracle.
//!
//! These types represent the fetched files, per-file summaries, repository
//! metadata and question results that flow through the fetch → summarize →
//! select → answer pipeline. Everything that is persisted derives
//! `Serialize`/`Deserialize` so a saved summary document round-trips
//! field-for-field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate facts about one fetch of a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub repo_url: String,
    pub total_files: usize,
    /// Extension (including the dot, or `no_extension`) → number of files.
    pub file_types: BTreeMap<String, usize>,
    /// Sum of the reported sizes of all fetched files, in bytes.
    pub total_size: u64,
    /// Wall-clock duration of the fetch, in seconds.
    pub processing_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// One file listed by a repository source, before its content is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    /// Source-specific blob identifier (git SHA or content hash).
    pub blob_id: String,
}

/// A file whose content has been retrieved from the repository source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: String,
    pub size: u64,
    pub sha: String,
    pub content: String,
}

/// Structured, model-generated description of a single file.
///
/// A failed summarization still produces a `FileSummary` (see
/// [`FileSummary::fallback`]) so every fetched file has exactly one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub file_type: String,
    #[serde(default)]
    pub language: Option<String>,
    pub size: u64,
    pub summary: String,
    pub key_concepts: Vec<String>,
    pub dependencies: Vec<String>,
    pub functions_classes: Vec<String>,
    pub purpose: String,
    pub timestamp: DateTime<Utc>,
}

impl FileSummary {
    /// Placeholder summary used when the completion gateway cannot produce one.
    pub fn fallback(path: &str, file_type: &str, language: &str, size: u64) -> Self {
        Self {
            path: path.to_string(),
            file_type: file_type.to_string(),
            language: Some(language.to_string()),
            size,
            summary: format!("File of type {}", file_type),
            key_concepts: Vec::new(),
            dependencies: Vec::new(),
            functions_classes: Vec::new(),
            purpose: "Unknown".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Language label for prompts, `"Unknown"` when absent.
    pub fn language_label(&self) -> &str {
        self.language.as_deref().unwrap_or("Unknown")
    }
}

/// The answer to one question, with the files it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question: String,
    pub selected_files: Vec<String>,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

/// Output of the fetch stage: metadata plus every successfully fetched file.
#[derive(Debug, Clone)]
pub struct FetchedRepository {
    pub metadata: RepositoryMetadata,
    pub files: Vec<FetchedFile>,
}

/// On-disk summary document: `{ "metadata": ..., "summaries": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub metadata: RepositoryMetadata,
    pub summaries: Vec<FileSummary>,
}
