//! Fetch and summarize progress reporting.
//!
//! Reports observable progress while a repository is being fetched and
//! summarized, so users see how many files are done out of how many.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event emitted by the pipeline stages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProgressEvent {
    /// Listing the repository tree. Total unknown.
    Listing { repo: String },
    /// File contents: n fetched (or skipped) out of total.
    Fetching { n: u64, total: u64 },
    /// Summaries: n completed out of total.
    Summarizing { n: u64, total: u64 },
}

/// Receives progress events. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "summarize  1,234 / 5,000 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Listing { repo } => format!("fetch {}  listing...\n", repo),
            ProgressEvent::Fetching { n, total } => format!(
                "fetch  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Summarizing { n, total } => format!(
                "summarize  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// JSON lines on stderr, e.g. `{"event":"progress","phase":"fetching","n":3,"total":9}`.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Listing { repo } => serde_json::json!({
                "event": "progress",
                "phase": "listing",
                "repo": repo,
            }),
            ProgressEvent::Fetching { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "fetching",
                "n": n,
                "total": total,
            }),
            ProgressEvent::Summarizing { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "summarizing",
                "n": n,
                "total": total,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// Discards every event.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Thousands separators: `1234567` → `"1,234,567"`.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut groups: Vec<&str> = Vec::new();
    if head > 0 {
        groups.push(&digits[..head]);
    }
    groups.extend(
        digits.as_bytes()[head..]
            .chunks(3)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok()),
    );
    groups.join(",")
}

/// Which reporter the CLI installs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// `Human` when stderr is a terminal; scripts and pipes get `Off`.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
