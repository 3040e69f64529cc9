//! Retrieval stage: pick the files most relevant to a question.
//!
//! The [`Decider`] shows the model a numbered index of every summary and asks
//! for the indices of the top-K files. The reply may be
//! `{"selected_files": [..]}` or a bare array; entries that are not valid
//! indices are dropped, duplicates keep their first position, and the list
//! is cut to `top_k`.
//!
//! If the call fails, the reply cannot be parsed, or nothing usable is left,
//! selection falls back to [`keyword_fallback`], which is deterministic and
//! cannot fail.

use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::gateway::{CallPolicy, CompletionGateway};
use crate::models::FileSummary;
use crate::payload::extract_json_payload;

/// Number of key concepts / functions shown per file in the index.
const INDEX_LIST_LIMIT: usize = 5;

pub struct Decider {
    gateway: Arc<dyn CompletionGateway>,
    policy: CallPolicy,
}

impl Decider {
    pub fn new(gateway: Arc<dyn CompletionGateway>, policy: CallPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Select up to `top_k` paths from `summaries` for `question`.
    ///
    /// `top_k` is clamped to `[1, summaries.len()]`. Every returned path is
    /// drawn from `summaries`.
    pub async fn select(&self, question: &str, summaries: &[FileSummary], top_k: usize) -> Vec<String> {
        if summaries.is_empty() {
            return Vec::new();
        }
        let top_k = top_k.clamp(1, summaries.len());

        match self.ask_model(question, summaries, top_k).await {
            Ok(indices) => {
                let paths: Vec<String> = indices
                    .into_iter()
                    .map(|i| summaries[i].path.clone())
                    .collect();
                info!(selected = paths.len(), "model selected files");
                paths
            }
            Err(e) => {
                warn!(error = %e, "file selection failed, using keyword fallback");
                let paths = keyword_fallback(question, summaries, top_k);
                info!(selected = paths.len(), "keyword fallback selected files");
                paths
            }
        }
    }

    async fn ask_model(&self, question: &str, summaries: &[FileSummary], top_k: usize) -> Result<Vec<usize>> {
        let prompt = build_selection_prompt(question, summaries, top_k);
        debug!(files = summaries.len(), prompt_chars = prompt.len(), "requesting selection");

        let text = self.policy.complete(self.gateway.as_ref(), &prompt).await?;
        let payload = extract_json_payload(&text)?;
        let indices = parse_selection(&payload, summaries.len(), top_k)?;
        if indices.is_empty() {
            bail!("selection contained no usable file indices");
        }
        Ok(indices)
    }
}

/// Numbered index of every summary followed by the selection instructions.
pub fn build_selection_prompt(question: &str, summaries: &[FileSummary], top_k: usize) -> String {
    let index = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "File {}: {}\nLanguage: {}\nSummary: {}\nPurpose: {}\nKey Concepts: {}\nFunctions/Classes: {}",
                i,
                s.path,
                s.language_label(),
                s.summary,
                s.purpose,
                head_joined(&s.key_concepts),
                head_joined(&s.functions_classes),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an intelligent file selector. Given a user's question and summaries of files in a repository, select the most relevant files that would help answer the question.

User Question: {question}

File Summaries:
{index}

Analyze the question and select the TOP {top_k} most relevant files. Consider:
1. Direct relevance to the question topic
2. Files that implement the functionality asked about
3. Configuration files if the question is about setup/config
4. Documentation files if the question is about usage
5. Test files if the question is about testing or examples

Return your response as a JSON object of 0-based file indices, most relevant first:
{{"selected_files": [0, 3, 7]}}

Return ONLY the JSON object, with no explanation or Markdown."#
    )
}

fn head_joined(items: &[String]) -> String {
    items
        .iter()
        .take(INDEX_LIST_LIMIT)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turn a selection payload into valid, distinct indices (at most `top_k`).
///
/// Fails only when the payload has neither accepted shape.
pub fn parse_selection(payload: &Value, file_count: usize, top_k: usize) -> Result<Vec<usize>> {
    let entries = match payload {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("selected_files") {
            Some(Value::Array(items)) => items,
            _ => bail!("selection payload has no selected_files array"),
        },
        _ => bail!("selection payload is neither an object nor an array"),
    };

    let mut indices: Vec<usize> = Vec::new();
    for entry in entries {
        let Some(i) = entry.as_u64().and_then(|i| usize::try_from(i).ok()) else {
            continue;
        };
        if i < file_count && !indices.contains(&i) {
            indices.push(i);
        }
        if indices.len() == top_k {
            break;
        }
    }
    Ok(indices)
}

/// Keyword-overlap ranking used when the model is unavailable.
///
/// Each whitespace-separated token of the lowercased question scores one
/// point per summary whose `path summary purpose` text contains it. Paths
/// with a positive score come back best first; ties keep summary order.
pub fn keyword_fallback(question: &str, summaries: &[FileSummary], top_k: usize) -> Vec<String> {
    let lowered = question.to_lowercase();
    let keywords: Vec<&str> = lowered.split_whitespace().collect();

    let mut scored: Vec<(usize, &str)> = summaries
        .iter()
        .map(|s| {
            let haystack = format!("{} {} {}", s.path, s.summary, s.purpose).to_lowercase();
            let score = keywords.iter().filter(|k| haystack.contains(*k)).count();
            (score, s.path.as_str())
        })
        .collect();

    // sort_by is stable, so equal scores keep their input order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .filter(|(score, _)| *score > 0)
        .take(top_k)
        .map(|(_, path)| path.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::DisabledGateway;
    use chrono::Utc;
    use serde_json::json;

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl CompletionGateway for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn summary(path: &str, summary: &str, purpose: &str) -> FileSummary {
        FileSummary {
            path: path.to_string(),
            file_type: ".x".to_string(),
            language: None,
            size: 1,
            summary: summary.to_string(),
            key_concepts: (0..8).map(|i| format!("concept{}", i)).collect(),
            dependencies: vec![],
            functions_classes: vec![],
            purpose: purpose.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn three_files() -> Vec<FileSummary> {
        vec![
            summary("a.py", "Entry point script that runs the app.", "Main program"),
            summary("b.md", "Project readme with usage notes.", "Documentation"),
            summary(
                "c.json",
                "Configuration values for the service; configuration is handled here.",
                "Holds configuration settings",
            ),
        ]
    }

    #[test]
    fn prompt_lists_every_file_with_capped_lists() {
        let prompt = build_selection_prompt("where?", &three_files(), 2);
        assert!(prompt.contains("File 0: a.py"));
        assert!(prompt.contains("File 2: c.json"));
        assert!(prompt.contains("Language: Unknown"));
        assert!(prompt.contains("concept4"));
        assert!(!prompt.contains("concept5"));
        assert!(prompt.contains("TOP 2"));
    }

    #[test]
    fn parse_accepts_both_shapes() {
        assert_eq!(parse_selection(&json!({"selected_files": [2, 0]}), 3, 3).unwrap(), vec![2, 0]);
        assert_eq!(parse_selection(&json!([1]), 3, 3).unwrap(), vec![1]);
        assert!(parse_selection(&json!({"files": [1]}), 3, 3).is_err());
        assert!(parse_selection(&json!("0"), 3, 3).is_err());
    }

    #[test]
    fn parse_drops_invalid_and_duplicate_entries() {
        let payload = json!({"selected_files": [5, 1, "2", -1, 1, 1.5, 0, 2]});
        assert_eq!(parse_selection(&payload, 3, 10).unwrap(), vec![1, 0, 2]);
        assert_eq!(parse_selection(&payload, 3, 2).unwrap(), vec![1, 0]);
    }

    #[test]
    fn fallback_ranks_config_file_first() {
        let summaries = three_files();
        let picked = keyword_fallback("How is configuration handled?", &summaries, 2);
        assert_eq!(picked[0], "c.json");
        assert!(picked.len() <= 2);
        assert_eq!(picked, keyword_fallback("How is configuration handled?", &summaries, 2));
    }

    #[test]
    fn fallback_ties_keep_input_order_and_zero_scores_are_dropped() {
        let summaries = vec![
            summary("x.rs", "alpha", ""),
            summary("y.rs", "beta", ""),
            summary("z.rs", "alpha", ""),
        ];
        assert_eq!(keyword_fallback("ALPHA", &summaries, 5), vec!["x.rs", "z.rs"]);
        assert!(keyword_fallback("gamma", &summaries, 5).is_empty());
    }

    #[tokio::test]
    async fn gateway_down_uses_fallback() {
        let decider = Decider::new(Arc::new(DisabledGateway), CallPolicy::default());
        let picked = decider
            .select("How is configuration handled?", &three_files(), 2)
            .await;
        assert_eq!(picked[0], "c.json");
        assert!(picked.len() <= 2);
    }

    #[tokio::test]
    async fn model_selection_is_bounded_and_deduped() {
        let decider = Decider::new(
            Arc::new(Fixed(r#"Sure: {"selected_files": [1, 1, 9, 0, 2]}"#)),
            CallPolicy::default(),
        );
        let picked = decider.select("anything", &three_files(), 2).await;
        assert_eq!(picked, vec!["b.md", "a.py"]);
    }

    #[tokio::test]
    async fn bracketed_prose_does_not_shadow_the_selection() {
        let decider = Decider::new(
            Arc::new(Fixed(
                r#"Per criteria [1] and [3], the best files are: {"selected_files": [0, 2]}"#,
            )),
            CallPolicy::default(),
        );
        let picked = decider.select("anything", &three_files(), 2).await;
        assert_eq!(picked, vec!["a.py", "c.json"]);
    }

    #[tokio::test]
    async fn unusable_indices_fall_back() {
        let decider = Decider::new(Arc::new(Fixed("[7, 8]")), CallPolicy::default());
        let picked = decider.select("configuration", &three_files(), 0).await;
        assert_eq!(picked, vec!["c.json"]);
    }

    #[tokio::test]
    async fn empty_summaries_select_nothing() {
        let decider = Decider::new(Arc::new(DisabledGateway), CallPolicy::default());
        assert!(decider.select("q", &[], 3).await.is_empty());
    }
}
