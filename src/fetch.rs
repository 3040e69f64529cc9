//! Fetch stage.
//!
//! Lists a repository through a [`RepositorySource`], drops files at or above
//! the size limit, downloads the remaining contents with bounded concurrency
//! and computes [`RepositoryMetadata`] for the result.
//!
//! A listing failure is fatal. A single file that cannot be fetched is
//! logged and left out; the rest of the repository still comes back.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::language::file_type_for_path;
use crate::models::{FetchedFile, FetchedRepository, FileEntry, RepositoryMetadata};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::source::RepositorySource;

/// Limits applied while fetching.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Files whose listed size is `>= max_file_size` are skipped.
    pub max_file_size: u64,
    /// Maximum number of content requests in flight.
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_file_size: 1_000_000,
            concurrency: 16,
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            concurrency: config.fetch_concurrency,
        }
    }
}

/// Fetch every eligible file of `repo_id`.
///
/// Files come back in listing order regardless of completion order.
pub async fn fetch_repository(
    source: &dyn RepositorySource,
    repo_id: &str,
    options: FetchOptions,
    progress: &dyn ProgressReporter,
) -> Result<FetchedRepository> {
    let started = Instant::now();

    progress.report(ProgressEvent::Listing {
        repo: repo_id.to_string(),
    });
    let listing = source
        .list_files(repo_id)
        .await
        .with_context(|| format!("Failed to list files of {}", repo_id))?;

    let listed = listing.len();
    let eligible: Vec<FileEntry> = listing
        .into_iter()
        .filter(|entry| entry.size < options.max_file_size)
        .collect();
    info!(
        source = source.name(),
        repo = repo_id,
        listed,
        eligible = eligible.len(),
        "listed repository"
    );

    let total = eligible.len() as u64;
    let done = AtomicU64::new(0);
    let concurrency = options.concurrency.max(1);
    let sem = Arc::new(Semaphore::new(concurrency));

    let mut fetched: Vec<(usize, FetchedFile)> = stream::iter(eligible.into_iter().enumerate())
        .map(|(idx, entry)| {
            let sem = sem.clone();
            let done = &done;
            async move {
                let _permit = sem.acquire().await;
                let file = fetch_one(source, repo_id, entry).await;
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.report(ProgressEvent::Fetching { n, total });
                file.map(|f| (idx, f))
            }
        })
        .buffer_unordered(concurrency)
        .filter_map(|x| async move { x })
        .collect()
        .await;

    fetched.sort_by_key(|(idx, _)| *idx);
    let files: Vec<FetchedFile> = fetched.into_iter().map(|(_, f)| f).collect();

    let metadata = build_metadata(repo_id, &files, started.elapsed().as_secs_f64());
    info!(
        repo = repo_id,
        files = metadata.total_files,
        bytes = metadata.total_size,
        seconds = metadata.processing_time,
        "fetched repository"
    );

    Ok(FetchedRepository { metadata, files })
}

async fn fetch_one(source: &dyn RepositorySource, repo_id: &str, entry: FileEntry) -> Option<FetchedFile> {
    match source.get_content(repo_id, &entry.path).await {
        Ok(Some(bytes)) => Some(FetchedFile {
            content: String::from_utf8_lossy(&bytes).into_owned(),
            path: entry.path,
            size: entry.size,
            sha: entry.blob_id,
        }),
        Ok(None) => {
            warn!(path = %entry.path, "file content not available, skipping");
            None
        }
        Err(e) => {
            warn!(path = %entry.path, error = %e, "failed to fetch file, skipping");
            None
        }
    }
}

/// Aggregate extension counts and sizes over the fetched files.
pub fn build_metadata(repo_id: &str, files: &[FetchedFile], processing_time: f64) -> RepositoryMetadata {
    let mut file_types: BTreeMap<String, usize> = BTreeMap::new();
    for file in files {
        *file_types.entry(file_type_for_path(&file.path)).or_insert(0) += 1;
    }

    RepositoryMetadata {
        repo_url: repo_id.to_string(),
        total_files: files.len(),
        file_types,
        total_size: files.iter().map(|f| f.size).sum(),
        processing_time,
        timestamp: Utc::now(),
    }
}
