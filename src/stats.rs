//! Statistics over a saved summary document.
//!
//! Gives a quick picture of what a processed repository contains: language
//! mix, most common dependencies and concepts, and the largest files. The
//! report can be narrowed with a [`SummaryFilter`] (language, size range) and
//! set side by side with a second document via [`compare`]. Used by
//! `oracle stats`.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::models::{FileSummary, SummaryDocument};
use crate::persist::read_summary_document;

const TOP_DEPENDENCIES: usize = 10;
const TOP_CONCEPTS: usize = 20;
const LARGEST_FILES: usize = 10;
const COMPARED_CONCEPTS: usize = 10;
const COMMON_CONCEPT_POOL: usize = 50;

/// Aggregates computed from a summary document.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStats {
    pub repo_url: String,
    pub total_files: usize,
    pub total_size: u64,
    /// Language → file count, most common first.
    pub languages: Vec<(String, usize)>,
    pub top_dependencies: Vec<(String, usize)>,
    pub top_concepts: Vec<(String, usize)>,
    /// `(path, size)` of the largest files, largest first.
    pub largest_files: Vec<(String, u64)>,
}

impl SummaryStats {
    pub fn from_document(document: &SummaryDocument) -> Self {
        let summaries = &document.summaries;

        let languages = ranked(summaries.iter().map(|s| s.language_label()), usize::MAX);
        let top_dependencies = ranked(
            summaries
                .iter()
                .flat_map(|s| s.dependencies.iter().map(String::as_str)),
            TOP_DEPENDENCIES,
        );
        let top_concepts = ranked(
            summaries
                .iter()
                .flat_map(|s| s.key_concepts.iter().map(String::as_str)),
            TOP_CONCEPTS,
        );

        let mut by_size: Vec<&FileSummary> = summaries.iter().collect();
        by_size.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        let largest_files = by_size
            .into_iter()
            .take(LARGEST_FILES)
            .map(|s| (s.path.clone(), s.size))
            .collect();

        Self {
            repo_url: document.metadata.repo_url.clone(),
            total_files: summaries.len(),
            total_size: summaries.iter().map(|s| s.size).sum(),
            languages,
            top_dependencies,
            top_concepts,
            largest_files,
        }
    }

    /// Plain-text report for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Repository: {}\n", self.repo_url));
        out.push_str(&format!("{}\n\n", "=".repeat(12 + self.repo_url.len())));
        out.push_str(&format!("  Files:       {}\n", self.total_files));
        out.push_str(&format!("  Total size:  {}\n", format_bytes(self.total_size)));

        render_counts(&mut out, "Languages", &self.languages);
        render_counts(&mut out, "Top dependencies", &self.top_dependencies);
        render_counts(&mut out, "Top concepts", &self.top_concepts);

        if !self.largest_files.is_empty() {
            out.push_str("\n  Largest files:\n");
            for (path, size) in &self.largest_files {
                out.push_str(&format!("    {:<48} {:>10}\n", path, format_bytes(*size)));
            }
        }
        out
    }
}

fn render_counts(out: &mut String, title: &str, counts: &[(String, usize)]) {
    if counts.is_empty() {
        return;
    }
    out.push_str(&format!("\n  {}:\n", title));
    for (name, count) in counts {
        out.push_str(&format!("    {:<32} {:>6}\n", name, count));
    }
}

/// Count occurrences, most frequent first; ties sort by name.
fn ranked<'a>(items: impl Iterator<Item = &'a str>, limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Summaries whose path, summary or purpose contains `keyword`
/// (case-insensitive).
pub fn search_summaries<'a>(summaries: &'a [FileSummary], keyword: &str) -> Vec<&'a FileSummary> {
    let needle = keyword.to_lowercase();
    summaries
        .iter()
        .filter(|s| {
            s.path.to_lowercase().contains(&needle)
                || s.summary.to_lowercase().contains(&needle)
                || s.purpose.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Summaries whose language equals `language` (case-insensitive). Files
/// without a language match `"Unknown"`.
pub fn filter_by_language<'a>(summaries: &'a [FileSummary], language: &str) -> Vec<&'a FileSummary> {
    summaries
        .iter()
        .filter(|s| s.language_label().eq_ignore_ascii_case(language))
        .collect()
}

/// Summaries with `min <= size <= max`.
pub fn filter_by_size(summaries: &[FileSummary], min: u64, max: u64) -> Vec<&FileSummary> {
    summaries
        .iter()
        .filter(|s| (min..=max).contains(&s.size))
        .collect()
}

/// Restricts which summaries a report covers.
#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    pub language: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

impl SummaryFilter {
    pub fn is_empty(&self) -> bool {
        self.language.is_none() && self.min_size.is_none() && self.max_size.is_none()
    }

    pub fn matches(&self, summary: &FileSummary) -> bool {
        let language_ok = self
            .language
            .as_deref()
            .map_or(true, |l| summary.language_label().eq_ignore_ascii_case(l));
        let min = self.min_size.unwrap_or(0);
        let max = self.max_size.unwrap_or(u64::MAX);
        language_ok && (min..=max).contains(&summary.size)
    }

    /// Copy of `document` keeping only matching summaries.
    pub fn apply(&self, document: &SummaryDocument) -> SummaryDocument {
        SummaryDocument {
            metadata: document.metadata.clone(),
            summaries: document
                .summaries
                .iter()
                .filter(|s| self.matches(s))
                .cloned()
                .collect(),
        }
    }
}

/// One side of a [`RepositoryComparison`].
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryOverview {
    pub repo_url: String,
    pub total_files: usize,
    pub languages: Vec<(String, usize)>,
    pub top_concepts: Vec<(String, usize)>,
}

impl RepositoryOverview {
    fn of(document: &SummaryDocument) -> Self {
        Self {
            repo_url: document.metadata.repo_url.clone(),
            total_files: document.summaries.len(),
            languages: ranked(document.summaries.iter().map(|s| s.language_label()), usize::MAX),
            top_concepts: concept_ranking(document, COMPARED_CONCEPTS),
        }
    }
}

/// Two summary documents side by side.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryComparison {
    pub left: RepositoryOverview,
    pub right: RepositoryOverview,
    /// Concepts in both repositories' top 50, in the left side's rank order.
    pub common_concepts: Vec<String>,
}

impl RepositoryComparison {
    pub fn render(&self) -> String {
        let mut out = String::from("Comparison\n==========\n");
        for side in [&self.left, &self.right] {
            out.push_str(&format!("\n  {} ({} files)\n", side.repo_url, side.total_files));
            render_counts(&mut out, "Languages", &side.languages);
            render_counts(&mut out, "Top concepts", &side.top_concepts);
        }
        out.push_str(&format!("\n  Common concepts: {}\n", self.common_concepts.len()));
        for concept in &self.common_concepts {
            out.push_str(&format!("    {}\n", concept));
        }
        out
    }
}

pub fn compare(left: &SummaryDocument, right: &SummaryDocument) -> RepositoryComparison {
    let right_pool: HashSet<String> = concept_ranking(right, COMMON_CONCEPT_POOL)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    let common_concepts = concept_ranking(left, COMMON_CONCEPT_POOL)
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| right_pool.contains(name))
        .collect();

    RepositoryComparison {
        left: RepositoryOverview::of(left),
        right: RepositoryOverview::of(right),
        common_concepts,
    }
}

fn concept_ranking(document: &SummaryDocument, limit: usize) -> Vec<(String, usize)> {
    ranked(
        document
            .summaries
            .iter()
            .flat_map(|s| s.key_concepts.iter().map(String::as_str)),
        limit,
    )
}

/// Options of the stats command.
#[derive(Debug, Clone, Default)]
pub struct StatsOptions {
    pub search: Option<String>,
    pub filter: SummaryFilter,
    pub compare_with: Option<PathBuf>,
}

fn load(path: &Path) -> Result<SummaryDocument> {
    read_summary_document(path)
        .with_context(|| format!("Failed to load summary file {}", path.display()))
}

/// Run the stats command: load `path` and print the report.
pub fn run_stats(path: &Path, options: &StatsOptions) -> Result<()> {
    let full = load(path)?;
    let document = options.filter.apply(&full);

    print!("{}", SummaryStats::from_document(&document).render());
    if !options.filter.is_empty() {
        println!();
        println!(
            "  Filter kept {} of {} files",
            document.summaries.len(),
            full.summaries.len()
        );
    }

    if let Some(keyword) = options.search.as_deref() {
        let hits = search_summaries(&document.summaries, keyword);
        println!();
        println!("  Matches for '{}': {}", keyword, hits.len());
        for hit in hits {
            println!("    {}  {}", hit.path, hit.purpose);
        }
    }

    if let Some(other) = options.compare_with.as_deref() {
        let other = options.filter.apply(&load(other)?);
        println!();
        print!("{}", compare(&document, &other).render());
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
