//! GitHub repository source.
//!
//! Lists a repository with the recursive git-trees API and downloads each
//! file through the contents API (base64-encoded payloads).
//!
//! # Repository identifiers
//!
//! | Form | Branch |
//! |------|--------|
//! | `https://github.com/owner/repo` | `main` |
//! | `https://github.com/owner/repo/tree/dev` | `dev` |
//! | `github.com/owner/repo.git` | `main` |
//! | `owner/repo` | `main` |
//!
//! # Environment Variables
//!
//! - `GITHUB_TOKEN`: optional, raises the API rate limit.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;

use crate::config::SourceConfig;
use crate::models::FileEntry;
use crate::source::RepositorySource;

/// Owner, repository and branch parsed from a GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

/// Parse a GitHub repository URL (or `owner/repo` shorthand).
pub fn parse_github_url(url: &str) -> Result<GitHubRepo> {
    let trimmed = url.trim().trim_end_matches('/');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);

    let path = match without_scheme
        .strip_prefix("github.com/")
        .or_else(|| without_scheme.strip_prefix("www.github.com/"))
    {
        Some(rest) => rest,
        None => {
            // GitHub owner names never contain dots, so a dotted first
            // segment is some other host.
            let host = without_scheme.split('/').next().unwrap_or_default();
            if host.contains('.') || without_scheme.contains("://") {
                bail!("Not a GitHub repository URL: {}", url);
            }
            without_scheme
        }
    };

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        bail!(
            "Malformed GitHub repository URL '{}': expected https://github.com/<owner>/<repo>",
            url
        );
    }

    let owner = parts[0].to_string();
    let repo = parts[1].trim_end_matches(".git").to_string();
    if repo.is_empty() {
        bail!("Malformed GitHub repository URL '{}': empty repository name", url);
    }

    let branch = if parts.len() > 3 && parts[2] == "tree" {
        parts[3].to_string()
    } else {
        "main".to_string()
    };

    Ok(GitHubRepo {
        owner,
        repo,
        branch,
    })
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// Repository source backed by the GitHub REST API.
pub struct GitHubSource {
    client: reqwest::Client,
    api_url: String,
}

impl GitHubSource {
    pub fn new(api_url: &str, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("repo-oracle"));
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("token {}", token))
                .context("GITHUB_TOKEN contains invalid header characters")?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build from config, reading `GITHUB_TOKEN` from the environment.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN").ok();
        Self::new(&config.api_url, token.as_deref())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_url)
            .with_context(|| format!("Invalid GitHub API URL: {}", self.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("GitHub API URL cannot be a base: {}", self.api_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl RepositorySource for GitHubSource {
    fn name(&self) -> &str {
        "github"
    }

    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileEntry>> {
        let gh = parse_github_url(repo_id)?;
        let mut url = self.endpoint(&[
            "repos",
            gh.owner.as_str(),
            gh.repo.as_str(),
            "git",
            "trees",
            gh.branch.as_str(),
        ])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to reach GitHub for {}/{}", gh.owner, gh.repo))?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "Failed to fetch repo tree for {}/{}@{}: HTTP {}",
                gh.owner,
                gh.repo,
                gh.branch,
                status
            );
        }

        let tree: TreeResponse = response.json().await?;
        if tree.truncated {
            tracing::warn!(
                owner = %gh.owner,
                repo = %gh.repo,
                "GitHub truncated the tree listing; some files will be missing"
            );
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| FileEntry {
                path: item.path,
                size: item.size,
                blob_id: item.sha,
            })
            .collect())
    }

    async fn get_content(&self, repo_id: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let gh = parse_github_url(repo_id)?;
        let mut segments = vec!["repos", gh.owner.as_str(), gh.repo.as_str(), "contents"];
        segments.extend(path.split('/'));
        let mut url = self.endpoint(&segments)?;
        url.query_pairs_mut().append_pair("ref", &gh.branch);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            tracing::debug!(path, status = %response.status(), "content not available");
            return Ok(None);
        }

        let body: ContentResponse = response.json().await?;
        decode_content(&body).map(Some)
    }
}

fn decode_content(body: &ContentResponse) -> Result<Vec<u8>> {
    if !body.encoding.is_empty() && body.encoding != "base64" {
        bail!("Unsupported content encoding: {}", body.encoding);
    }
    let compact: String = body
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .context("Failed to decode base64 file content")
}
