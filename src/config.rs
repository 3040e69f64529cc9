//! Configuration parsing and validation.
//!
//! Configuration lives in a TOML file (default `./config/oracle.toml`).
//! Every section is optional; missing sections fall back to the defaults
//! below, so running without a config file is equivalent to an empty one.
//!
//! ```toml
//! [gateway]
//! provider = "openai"          # openai | gemini | disabled
//! model = "gpt-4o-mini"
//! timeout_secs = 60
//!
//! [source]
//! provider = "github"          # github | local
//! max_file_size = 1000000
//! fetch_concurrency = 16
//!
//! [summarize]
//! concurrency = 10
//! max_content_chars = 100000
//!
//! [retrieval]
//! top_k = 10
//!
//! [answer]
//! max_file_chars = 5000
//!
//! [output]
//! dir = "./repo_analysis"
//! ```
//!
//! API keys are never read from this file: `OPENAI_API_KEY`,
//! `GEMINI_API_KEY` and `GITHUB_TOKEN` come from the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub summarize: SummarizeConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Override for the provider's API root (e.g. a local Ollama server).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Timeout of one HTTP attempt; `0` disables it. A whole call may take
    /// up to `(max_retries + 1) * timeout_secs` plus retry backoff.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_gateway_provider(),
            model: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_gateway_provider() -> String {
    "openai".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_tokens() -> u32 {
    4096
}

impl GatewayConfig {
    /// Model name, falling back to the provider's default model.
    pub fn model_or_default(&self) -> String {
        match (&self.model, self.provider.as_str()) {
            (Some(m), _) => m.clone(),
            (None, "gemini") => "gemini-2.0-flash".to_string(),
            (None, _) => "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_provider")]
    pub provider: String,
    /// Files of this size or larger are skipped before content is requested.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: default_source_provider(),
            max_file_size: default_max_file_size(),
            fetch_concurrency: default_fetch_concurrency(),
            api_url: default_api_url(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_source_provider() -> String {
    "github".to_string()
}
fn default_max_file_size() -> u64 {
    1_000_000
}
fn default_fetch_concurrency() -> usize {
    16
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizeConfig {
    #[serde(default = "default_summarize_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_summarize_concurrency(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_summarize_concurrency() -> usize {
    10
}
fn default_max_content_chars() -> usize {
    100_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_file_chars: default_max_file_chars(),
        }
    }
}

fn default_max_file_chars() -> usize {
    5_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./repo_analysis")
}

/// Read and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load `path` if it exists, otherwise use built-in defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::default();
        validate(&config)?;
        Ok(config)
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.gateway.provider.as_str() {
        "openai" | "gemini" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown gateway provider: '{}'. Must be openai, gemini, or disabled.",
            other
        ),
    }

    match config.source.provider.as_str() {
        "github" | "local" => {}
        other => anyhow::bail!(
            "Unknown source provider: '{}'. Must be github or local.",
            other
        ),
    }

    if config.gateway.max_tokens == 0 {
        anyhow::bail!("gateway.max_tokens must be > 0");
    }
    if config.source.max_file_size == 0 {
        anyhow::bail!("source.max_file_size must be > 0");
    }
    if config.source.fetch_concurrency == 0 {
        anyhow::bail!("source.fetch_concurrency must be >= 1");
    }
    if config.summarize.concurrency == 0 {
        anyhow::bail!("summarize.concurrency must be >= 1");
    }
    if config.summarize.max_content_chars == 0 {
        anyhow::bail!("summarize.max_content_chars must be > 0");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.answer.max_file_chars == 0 {
        anyhow::bail!("answer.max_file_chars must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.gateway.provider, "openai");
        assert_eq!(config.gateway.model_or_default(), "gpt-4o-mini");
        assert_eq!(config.source.max_file_size, 1_000_000);
        assert_eq!(config.summarize.concurrency, 10);
        assert_eq!(config.summarize.max_content_chars, 100_000);
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.answer.max_file_chars, 5_000);
        assert_eq!(config.output.dir, PathBuf::from("./repo_analysis"));
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
[gateway]
provider = "gemini"
timeout_secs = 5

[source]
provider = "local"
exclude_globs = ["**/*.lock"]

[summarize]
concurrency = 3
"#,
        )
        .unwrap();
        assert_eq!(config.gateway.model_or_default(), "gemini-2.0-flash");
        assert_eq!(config.gateway.timeout_secs, 5);
        assert_eq!(config.source.provider, "local");
        assert_eq!(config.source.exclude_globs, vec!["**/*.lock".to_string()]);
        assert_eq!(config.summarize.concurrency, 3);
        assert_eq!(config.summarize.max_content_chars, 100_000);
    }

    #[test]
    fn rejects_unknown_providers() {
        let err = parse_config("[gateway]\nprovider = \"claude-v0\"").unwrap_err();
        assert!(err.to_string().contains("Unknown gateway provider"));
        let err = parse_config("[source]\nprovider = \"svn\"").unwrap_err();
        assert!(err.to_string().contains("Unknown source provider"));
    }

    #[test]
    fn rejects_zero_limits() {
        assert!(parse_config("[summarize]\nconcurrency = 0").is_err());
        assert!(parse_config("[retrieval]\ntop_k = 0").is_err());
        assert!(parse_config("[source]\nfetch_concurrency = 0").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config_or_default(Path::new("/nonexistent/oracle.toml")).unwrap();
        assert_eq!(config.source.provider, "github");
    }
}
