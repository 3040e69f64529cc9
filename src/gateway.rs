//! Completion gateway abstraction and implementations.
//!
//! Defines the [`CompletionGateway`] trait (prompt in, text out) and the
//! concrete backends:
//! - **[`OpenAiGateway`]**: `POST /chat/completions` on the OpenAI API or any
//!   OpenAI-compatible server (Ollama, vLLM, LM Studio) via `base_url`.
//! - **[`GeminiGateway`]**: Google Generative Language `generateContent`.
//! - **[`DisabledGateway`]**: always fails; every stage then takes its
//!   fallback path, which makes the pipeline usable offline.
//!
//! Gateways are constructed once with [`create_gateway`] and handed to each
//! stage as an `Arc<dyn CompletionGateway>`; there is no process-wide client
//! configuration.
//!
//! # Retries
//!
//! The HTTP backends retry rate limiting (429), server errors (5xx) and
//! transport failures up to `gateway.max_retries` times, sleeping 1s, 2s,
//! 4s, ... between attempts (capped at 32s). Any other 4xx fails at once.
//!
//! # Deadlines and cancellation
//!
//! Stages never call [`CompletionGateway::complete`] directly; they go through
//! [`CallPolicy::complete`], which applies a per-call deadline and a shared
//! [`CancellationToken`]. Expiry surfaces as an ordinary `Err`.
//!
//! `gateway.timeout_secs` bounds a single HTTP attempt. The per-call deadline
//! built by [`CallPolicy::from_config`] covers every attempt plus the backoff
//! sleeps between them, so timed-out attempts are still retried.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;

/// A text-generation backend.
///
/// Implementations must not assume anything about the structure of the
/// prompt; callers parse the returned text defensively.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Send one prompt and return the generated text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Deadline and cancellation applied to every gateway call.
#[derive(Debug, Clone, Default)]
pub struct CallPolicy {
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl CallPolicy {
    pub fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// Build a policy whose deadline spans the whole retry budget
    /// (`gateway.timeout_secs = 0` means no deadline).
    pub fn from_config(config: &GatewayConfig, cancel: CancellationToken) -> Self {
        Self::new(call_deadline(config), cancel)
    }

    /// Call `gateway`, failing on timeout or cancellation.
    pub async fn complete(&self, gateway: &dyn CompletionGateway, prompt: &str) -> Result<String> {
        if self.cancel.is_cancelled() {
            bail!("gateway call cancelled");
        }

        let call = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, gateway.complete(prompt)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!(
                        "gateway call timed out after {}ms",
                        limit.as_millis()
                    )),
                },
                None => gateway.complete(prompt).await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(anyhow!("gateway call cancelled")),
            result = call => result,
        }
    }
}

/// Instantiate the gateway named by `config.provider`.
pub fn create_gateway(config: &GatewayConfig) -> Result<Arc<dyn CompletionGateway>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGateway::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiGateway::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGateway)),
        other => bail!("Unknown gateway provider: {}", other),
    }
}

// ============ Disabled Gateway ============

/// A gateway that refuses every call.
pub struct DisabledGateway;

#[async_trait]
impl CompletionGateway for DisabledGateway {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Completion gateway is disabled")
    }
}

// ============ OpenAI-compatible Gateway ============

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and compatible servers.
///
/// Requires `OPENAI_API_KEY` when talking to the official endpoint; a custom
/// `base_url` may be used without a key.
pub struct OpenAiGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

impl OpenAiGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        if base_url.contains("api.openai.com") && api_key.is_none() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let endpoint = if base_url.ends_with("/chat/completions") {
            base_url
        } else {
            format!("{}/chat/completions", base_url.trim_end_matches('/'))
        };

        Ok(Self {
            client: http_client(config)?,
            endpoint,
            api_key,
            model: config.model_or_default(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "max_tokens": self.max_tokens,
            "temperature": 0.2,
        });

        let json = post_with_retry("OpenAI", self.max_retries, || {
            let req = self.client.post(&self.endpoint).json(&body);
            match &self.api_key {
                Some(key) => req.bearer_auth(key),
                None => req,
            }
        })
        .await?;

        parse_openai_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_openai_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Gemini Gateway ============

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `generateContent` client. Requires `GEMINI_API_KEY`.
pub struct GeminiGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

impl GeminiGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        let model = config.model_or_default();
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string());
        let endpoint = format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        );

        Ok(Self {
            client: http_client(config)?,
            endpoint,
            api_key,
            model,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionGateway for GeminiGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
                "temperature": 0.2,
            },
        });

        let json = post_with_retry("Gemini", self.max_retries, || {
            self.client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates[0].content.parts"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Invalid Gemini response: candidate has no text parts");
    }
    Ok(text)
}

// ============ HTTP helpers ============

/// Sleep before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped at 32s.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// Time allowed for one logical call: every attempt at `timeout_secs` plus
/// the backoff between attempts.
pub fn call_deadline(config: &GatewayConfig) -> Option<Duration> {
    if config.timeout_secs == 0 {
        return None;
    }
    let attempts = config.max_retries + 1;
    let backoff: Duration = (1..attempts).map(retry_backoff).sum();
    Some(Duration::from_secs(config.timeout_secs) * attempts + backoff)
}

fn http_client(config: &GatewayConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    Ok(builder.build()?)
}

/// Send a JSON POST, retrying on 429, 5xx and network errors.
async fn post_with_retry<F>(provider: &str, max_retries: u32, build: F) -> Result<Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = retry_backoff(attempt);
            tracing::debug!(provider, attempt, ?delay, "retrying completion request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", provider, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", provider, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", provider)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct SlowGateway;

    #[async_trait]
    impl CompletionGateway for SlowGateway {
        fn model_name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    #[test]
    fn openai_response_content() {
        let json = json!({
            "choices": [ { "message": { "role": "assistant", "content": "hello" } } ]
        });
        assert_eq!(parse_openai_response(&json).unwrap(), "hello");
        assert!(parse_openai_response(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn gemini_response_joins_parts() {
        let json = json!({
            "candidates": [ { "content": { "parts": [ { "text": "foo " }, { "text": "bar" } ] } } ]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "foo bar");
        let empty = json!({ "candidates": [ { "content": { "parts": [] } } ] });
        assert!(parse_gemini_response(&empty).is_err());
    }

    #[tokio::test]
    async fn disabled_gateway_always_fails() {
        let policy = CallPolicy::default();
        assert!(policy.complete(&DisabledGateway, "hi").await.is_err());
    }

    #[tokio::test]
    async fn timeout_turns_into_error() {
        let policy = CallPolicy::new(Some(Duration::from_millis(20)), CancellationToken::new());
        let err = policy.complete(&SlowGateway, "hi").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_turns_into_error() {
        let token = CancellationToken::new();
        let policy = CallPolicy::new(None, token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = policy.complete(&SlowGateway, "hi").await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        canceller.await.unwrap();
    }

    #[test]
    fn call_deadline_covers_every_attempt_and_backoff() {
        let config = GatewayConfig {
            timeout_secs: 10,
            max_retries: 3,
            ..Default::default()
        };
        // 4 attempts of 10s plus 1s + 2s + 4s of backoff.
        assert_eq!(call_deadline(&config), Some(Duration::from_secs(47)));

        let policy = CallPolicy::from_config(&config, CancellationToken::new());
        assert!(policy.timeout.unwrap() > Duration::from_secs(config.timeout_secs));

        let no_retries = GatewayConfig {
            timeout_secs: 5,
            max_retries: 0,
            ..Default::default()
        };
        assert_eq!(call_deadline(&no_retries), Some(Duration::from_secs(5)));

        let unbounded = GatewayConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(call_deadline(&unbounded), None);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(1), Duration::from_secs(1));
        assert_eq!(retry_backoff(3), Duration::from_secs(4));
        assert_eq!(retry_backoff(20), Duration::from_secs(32));
    }

    #[test]
    fn factory_builds_disabled_gateway() {
        let config = GatewayConfig {
            provider: "disabled".to_string(),
            ..Default::default()
        };
        let gateway = create_gateway(&config).unwrap();
        assert_eq!(gateway.model_name(), "disabled");
    }
}
