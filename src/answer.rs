//! Answering stage.
//!
//! Joins the selected files' content with their summaries and asks the model
//! for an answer grounded only in that context. [`Answerer::answer`] never
//! fails: a gateway problem comes back as a diagnostic answer string.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::gateway::{CallPolicy, CompletionGateway};
use crate::models::{FetchedFile, FileSummary};
use crate::summarize::truncate_content;

/// Sentence the model is told to use when the files do not cover the question.
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information in the provided files to answer this";

const NO_FILES_SELECTED: &str = "(no files were selected)";

pub struct Answerer {
    gateway: Arc<dyn CompletionGateway>,
    policy: CallPolicy,
    max_file_chars: usize,
}

impl Answerer {
    pub fn new(gateway: Arc<dyn CompletionGateway>, policy: CallPolicy) -> Self {
        Self {
            gateway,
            policy,
            max_file_chars: 5_000,
        }
    }

    pub fn with_max_file_chars(mut self, max_file_chars: usize) -> Self {
        self.max_file_chars = max_file_chars;
        self
    }

    pub fn build_prompt(&self, question: &str, files: &[&FetchedFile], summaries: &[FileSummary]) -> String {
        build_answer_prompt(question, files, summaries, self.max_file_chars)
    }

    /// Answer `question` from `files`. Returns trimmed model text, or a
    /// diagnostic string when the call fails.
    pub async fn answer(&self, question: &str, files: &[&FetchedFile], summaries: &[FileSummary]) -> String {
        let prompt = self.build_prompt(question, files, summaries);
        debug!(files = files.len(), prompt_chars = prompt.len(), "requesting answer");

        match self.policy.complete(self.gateway.as_ref(), &prompt).await {
            Ok(text) => {
                let answer = text.trim().to_string();
                info!(chars = answer.len(), "answer generated");
                answer
            }
            Err(e) => {
                warn!(error = %e, "answer generation failed");
                format!("I encountered an error while generating the answer: {}", e)
            }
        }
    }
}

/// Grounded-answer prompt over the selected files.
///
/// Summaries are matched to files by path; a file without one shows `N/A`.
pub fn build_answer_prompt(
    question: &str,
    files: &[&FetchedFile],
    summaries: &[FileSummary],
    max_file_chars: usize,
) -> String {
    let context = if files.is_empty() {
        NO_FILES_SELECTED.to_string()
    } else {
        files
            .iter()
            .map(|file| {
                let matched = summaries.iter().find(|s| s.path == file.path);
                format!(
                    "=== File: {} ===\nSummary: {}\nPurpose: {}\n\nContent:\n{}",
                    file.path,
                    matched.map(|s| s.summary.as_str()).unwrap_or("N/A"),
                    matched.map(|s| s.purpose.as_str()).unwrap_or("N/A"),
                    truncate_content(&file.content, max_file_chars),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        r#"You are a helpful assistant analyzing a source code repository. Answer the user's question based ONLY on the provided file contents.

CRITICAL INSTRUCTIONS:
1. Base your answer ONLY on the provided file contents
2. If the information is not in the files, say "{insufficient}"
3. Cite the specific file names (and line numbers where possible) you rely on
4. If you're uncertain, express that uncertainty
5. Do not make assumptions or add information not present in the files

User Question: {question}

Repository File Contents:
{context}

Provide a detailed, accurate answer based on the file contents above. Include:
- Direct references to specific files
- Code snippets if relevant (keep them short)
- Explanations grounded in the actual code
- If multiple files are relevant, explain how they work together

Your answer:"#,
        insufficient = INSUFFICIENT_INFORMATION,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::DisabledGateway;
    use anyhow::Result;
    use chrono::Utc;

    struct Echo;

    #[async_trait::async_trait]
    impl CompletionGateway for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("\n  The port is set in c.json.  \n".to_string())
        }
    }

    fn fetched(path: &str, content: &str) -> FetchedFile {
        FetchedFile {
            path: path.to_string(),
            size: content.len() as u64,
            sha: "0".to_string(),
            content: content.to_string(),
        }
    }

    fn summary_for(path: &str) -> FileSummary {
        FileSummary {
            summary: "Service settings.".to_string(),
            purpose: "Configuration".to_string(),
            ..FileSummary::fallback(path, ".json", "JSON", 10)
        }
    }

    #[test]
    fn prompt_joins_summaries_and_marks_missing_ones() {
        let a = fetched("c.json", "{\"port\": 8080}");
        let b = fetched("orphan.txt", "text");
        let prompt = build_answer_prompt("port?", &[&a, &b], &[summary_for("c.json")], 5_000);

        assert!(prompt.contains("=== File: c.json ===\nSummary: Service settings.\nPurpose: Configuration"));
        assert!(prompt.contains("=== File: orphan.txt ===\nSummary: N/A\nPurpose: N/A"));
        assert!(prompt.contains(INSUFFICIENT_INFORMATION));
        assert!(!prompt.contains("content truncated"));
    }

    #[test]
    fn long_content_is_capped_with_marker() {
        let big = fetched("big.rs", &"y".repeat(6_000));
        let prompt = build_answer_prompt("q", &[&big], &[], 5_000);
        assert!(prompt.contains("[content truncated: showing first 5000 of 6000 characters]"));
        assert!(!prompt.contains(&"y".repeat(5_001)));
    }

    #[test]
    fn empty_selection_is_explicit() {
        let prompt = build_answer_prompt("q", &[], &[], 5_000);
        assert!(prompt.contains("(no files were selected)"));
    }

    #[tokio::test]
    async fn answer_is_trimmed() {
        let answerer = Answerer::new(Arc::new(Echo), CallPolicy::default());
        let file = fetched("c.json", "{}");
        assert_eq!(answerer.answer("q", &[&file], &[]).await, "The port is set in c.json.");
    }

    #[tokio::test]
    async fn gateway_failure_becomes_diagnostic() {
        let answerer = Answerer::new(Arc::new(DisabledGateway), CallPolicy::default());
        let answer = answerer.answer("q", &[], &[]).await;
        assert_eq!(
            answer,
            "I encountered an error while generating the answer: Completion gateway is disabled"
        );
    }
}
