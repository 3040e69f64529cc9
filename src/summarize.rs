//! Summarization stage.
//!
//! Builds one structured [`FileSummary`] per fetched file by prompting the
//! completion gateway. Calls fan out with at most `concurrency` in flight and
//! are joined back into input order.
//!
//! A file whose call fails (error, timeout, cancellation or unparseable
//! payload) gets [`FileSummary::fallback`] instead, so the output always has
//! exactly one entry per input file.

use anyhow::{bail, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::SummarizeConfig;
use crate::gateway::{CallPolicy, CompletionGateway};
use crate::language::{file_type_for_path, language_for_path};
use crate::models::{FetchedFile, FileSummary};
use crate::payload::extract_json_payload;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Upper bound on `functions_classes` kept per file.
pub const MAX_FUNCTIONS_CLASSES: usize = 10;

const NO_SUMMARY: &str = "No summary available";
const UNKNOWN_PURPOSE: &str = "Unknown purpose";

/// Cut `content` to its first `max_chars` characters.
///
/// When anything is cut, an explicit marker naming both lengths is appended
/// so the model knows it is looking at a prefix.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((byte_end, _)) => {
            let total = content.chars().count();
            format!(
                "{}\n[content truncated: showing first {} of {} characters]",
                &content[..byte_end],
                max_chars,
                total
            )
        }
    }
}

pub struct Summarizer {
    gateway: Arc<dyn CompletionGateway>,
    policy: CallPolicy,
    concurrency: usize,
    max_content_chars: usize,
}

impl Summarizer {
    pub fn new(gateway: Arc<dyn CompletionGateway>, policy: CallPolicy) -> Self {
        let defaults = SummarizeConfig::default();
        Self {
            gateway,
            policy,
            concurrency: defaults.concurrency,
            max_content_chars: defaults.max_content_chars,
        }
    }

    pub fn from_config(
        gateway: Arc<dyn CompletionGateway>,
        policy: CallPolicy,
        config: &SummarizeConfig,
    ) -> Self {
        Self::new(gateway, policy)
            .with_concurrency(config.concurrency)
            .with_max_content_chars(config.max_content_chars)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_content_chars(mut self, max_content_chars: usize) -> Self {
        self.max_content_chars = max_content_chars;
        self
    }

    /// Prompt asking for the fixed-shape summary object.
    pub fn build_prompt(&self, file: &FetchedFile) -> String {
        let language = language_for_path(&file.path);
        let content = truncate_content(&file.content, self.max_content_chars);

        format!(
            r#"Analyze this file and provide a detailed, structured summary.

File Path: {path}
Language: {language}
Size: {size} bytes

Content:
```
{content}
```

Provide your response in the following JSON format:
{{
    "summary": "A concise 2-3 sentence summary of what this file does",
    "key_concepts": ["concept1", "concept2", "concept3"],
    "dependencies": ["dependency1", "dependency2"],
    "functions_classes": ["function/class names"],
    "purpose": "The main purpose/role of this file in the project"
}}

Key concepts should include: algorithms used, design patterns, data structures, APIs, frameworks.
Dependencies should include: imports, external libraries, related files mentioned.
Functions/classes should list the main ones (up to {max_fc} most important).
Purpose should be specific about what problem this file solves.

Return ONLY the JSON object, with no surrounding text or Markdown."#,
            path = file.path,
            language = language,
            size = file.size,
            content = content,
            max_fc = MAX_FUNCTIONS_CLASSES,
        )
    }

    /// Summarize one file. Never fails; falls back on any gateway problem.
    pub async fn summarize_file(&self, file: &FetchedFile) -> FileSummary {
        let file_type = file_type_for_path(&file.path);
        let language = language_for_path(&file.path);

        match self.try_summarize(file, &file_type, language).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(path = %file.path, error = %e, "summarization failed, using fallback");
                FileSummary::fallback(&file.path, &file_type, language, file.size)
            }
        }
    }

    async fn try_summarize(
        &self,
        file: &FetchedFile,
        file_type: &str,
        language: &str,
    ) -> Result<FileSummary> {
        let prompt = self.build_prompt(file);
        debug!(path = %file.path, prompt_chars = prompt.len(), "requesting summary");

        let text = self.policy.complete(self.gateway.as_ref(), &prompt).await?;
        let payload = extract_json_payload(&text)?;
        let Value::Object(fields) = payload else {
            bail!("summary payload is not a JSON object");
        };

        let mut functions_classes = string_list(fields.get("functions_classes"));
        functions_classes.truncate(MAX_FUNCTIONS_CLASSES);

        Ok(FileSummary {
            path: file.path.clone(),
            file_type: file_type.to_string(),
            language: Some(language.to_string()),
            size: file.size,
            summary: string_field(fields.get("summary"), NO_SUMMARY),
            key_concepts: string_list(fields.get("key_concepts")),
            dependencies: string_list(fields.get("dependencies")),
            functions_classes,
            purpose: string_field(fields.get("purpose"), UNKNOWN_PURPOSE),
            timestamp: Utc::now(),
        })
    }

    /// Summarize every file, preserving cardinality and input order.
    pub async fn summarize_all(
        &self,
        files: &[FetchedFile],
        progress: &dyn ProgressReporter,
    ) -> Vec<FileSummary> {
        let total = files.len() as u64;
        info!(
            files = files.len(),
            concurrency = self.concurrency,
            model = self.gateway.model_name(),
            "summarizing files"
        );

        let done = AtomicU64::new(0);
        let sem = Arc::new(Semaphore::new(self.concurrency));

        let mut results: Vec<(usize, FileSummary)> = stream::iter(files.iter().enumerate())
            .map(|(idx, file)| {
                let sem = sem.clone();
                let done = &done;
                async move {
                    let _permit = sem.acquire().await;
                    let summary = self.summarize_file(file).await;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.report(ProgressEvent::Summarizing { n, total });
                    (idx, summary)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, summary)| summary).collect()
    }
}

fn string_field(value: Option<&Value>, default: &str) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Replies with a canned payload, except for paths containing "fail".
    struct ScriptedGateway {
        reply: String,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedGateway {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionGateway for ScriptedGateway {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if prompt.contains("File Path: fail") {
                bail!("backend unavailable");
            }
            Ok(self.reply.clone())
        }
    }

    fn file(path: &str, content: &str) -> FetchedFile {
        FetchedFile {
            path: path.to_string(),
            size: content.len() as u64,
            sha: "0".to_string(),
            content: content.to_string(),
        }
    }

    const REPLY: &str = r#"```json
{"summary": "Parses config.", "key_concepts": ["toml"], "dependencies": ["serde"],
 "functions_classes": ["a","b","c","d","e","f","g","h","i","j","k","l"], "purpose": "Configuration"}
```"#;

    #[test]
    fn truncation_marker_only_when_truncated() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("exactly10!", 10), "exactly10!");
        let cut = truncate_content("héllo wörld", 5);
        assert!(cut.starts_with("héllo\n"));
        assert!(cut.ends_with("[content truncated: showing first 5 of 11 characters]"));
    }

    #[test]
    fn prompt_marks_truncated_content() {
        let summarizer = Summarizer::new(Arc::new(ScriptedGateway::new(REPLY)), CallPolicy::default())
            .with_max_content_chars(100);
        let long = summarizer.build_prompt(&file("big.py", &"x".repeat(150)));
        assert!(long.contains("[content truncated: showing first 100 of 150 characters]"));
        assert!(long.contains("Language: Python"));

        let short = summarizer.build_prompt(&file("small.py", &"x".repeat(100)));
        assert!(!short.contains("content truncated"));
    }

    #[tokio::test]
    async fn parses_fenced_payload_and_caps_functions() {
        let summarizer = Summarizer::new(Arc::new(ScriptedGateway::new(REPLY)), CallPolicy::default());
        let summary = summarizer.summarize_file(&file("src/config.rs", "fn a() {}")).await;
        assert_eq!(summary.summary, "Parses config.");
        assert_eq!(summary.language.as_deref(), Some("Rust"));
        assert_eq!(summary.file_type, ".rs");
        assert_eq!(summary.dependencies, vec!["serde"]);
        assert_eq!(summary.functions_classes.len(), MAX_FUNCTIONS_CLASSES);
        assert_eq!(summary.purpose, "Configuration");
    }

    #[tokio::test]
    async fn missing_keys_get_defaults() {
        let summarizer = Summarizer::new(
            Arc::new(ScriptedGateway::new(r#"{"key_concepts": ["x"]}"#)),
            CallPolicy::default(),
        );
        let summary = summarizer.summarize_file(&file("notes.txt", "hi")).await;
        assert_eq!(summary.summary, "No summary available");
        assert_eq!(summary.purpose, "Unknown purpose");
        assert_eq!(summary.key_concepts, vec!["x"]);
        assert_eq!(summary.language.as_deref(), Some("Unknown"));
    }

    #[tokio::test]
    async fn unparseable_reply_falls_back() {
        let summarizer = Summarizer::new(
            Arc::new(ScriptedGateway::new("I cannot help with that.")),
            CallPolicy::default(),
        );
        let summary = summarizer.summarize_file(&file("Makefile", "all:")).await;
        assert_eq!(summary.summary, "File of type no_extension");
        assert_eq!(summary.purpose, "Unknown");
        assert!(summary.key_concepts.is_empty());
    }

    #[tokio::test]
    async fn batch_keeps_cardinality_order_and_bound() {
        let gateway = Arc::new(ScriptedGateway::new(REPLY));
        let summarizer = Summarizer::new(gateway.clone(), CallPolicy::default()).with_concurrency(3);

        let files: Vec<FetchedFile> = (0..12)
            .map(|i| {
                let path = if i % 4 == 0 {
                    format!("fail_{}.py", i)
                } else {
                    format!("ok_{}.py", i)
                };
                file(&path, "pass")
            })
            .collect();

        let summaries = summarizer.summarize_all(&files, &NoProgress).await;
        assert_eq!(summaries.len(), files.len());
        for (summary, file) in summaries.iter().zip(&files) {
            assert_eq!(summary.path, file.path);
        }
        assert_eq!(summaries[0].summary, "File of type .py");
        assert_eq!(summaries[1].summary, "Parses config.");
        assert!(gateway.peak.load(Ordering::SeqCst) <= 3);
    }

    /// Replies immediately, except that paths containing "slow" hang.
    struct StallingGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionGateway for StallingGateway {
        fn model_name(&self) -> &str {
            "stalling"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("File Path: slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(REPLY.to_string())
        }
    }

    fn mixed_files() -> Vec<FetchedFile> {
        vec![
            file("fast_a.py", "a"),
            file("slow_b.py", "b"),
            file("fast_c.py", "c"),
            file("slow_d.py", "d"),
        ]
    }

    #[tokio::test]
    async fn timed_out_calls_fall_back_while_the_batch_continues() {
        let policy = CallPolicy::new(
            Some(Duration::from_millis(20)),
            tokio_util::sync::CancellationToken::new(),
        );
        let summarizer = Summarizer::new(Arc::new(StallingGateway { calls: AtomicUsize::new(0) }), policy);

        let summaries = summarizer.summarize_all(&mixed_files(), &NoProgress).await;
        let texts: Vec<&str> = summaries.iter().map(|s| s.summary.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Parses config.", "File of type .py", "Parses config.", "File of type .py"]
        );
    }

    #[tokio::test]
    async fn cancelled_token_turns_every_file_into_a_fallback() {
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let gateway = Arc::new(StallingGateway { calls: AtomicUsize::new(0) });
        let summarizer = Summarizer::new(gateway.clone(), CallPolicy::new(None, cancel));

        let files = mixed_files();
        let summaries = summarizer.summarize_all(&files, &NoProgress).await;
        assert_eq!(summaries.len(), files.len());
        assert!(summaries.iter().all(|s| s.purpose == "Unknown"));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_mid_batch_releases_stalled_calls() {
        let cancel = tokio_util::sync::CancellationToken::new();
        let summarizer = Summarizer::new(
            Arc::new(StallingGateway { calls: AtomicUsize::new(0) }),
            CallPolicy::new(None, cancel.clone()),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let summaries = tokio::time::timeout(
            Duration::from_secs(2),
            summarizer.summarize_all(&mixed_files(), &NoProgress),
        )
        .await
        .unwrap();
        assert_eq!(summaries[0].summary, "Parses config.");
        assert_eq!(summaries[1].summary, "File of type .py");
        assert_eq!(summaries[3].purpose, "Unknown");
    }
}
