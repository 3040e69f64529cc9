//! Repository source abstraction.
//!
//! A [`RepositorySource`] lists the files of a repository and returns the
//! raw bytes of any one of them. The fetch stage ([`crate::fetch`]) drives it
//! with bounded concurrency; sources themselves stay simple and stateless.
//!
//! Built-in sources:
//! - [`GitHubSource`](crate::source_github::GitHubSource): the GitHub REST API.
//! - [`LocalSource`](crate::source_local::LocalSource): a local checkout on disk.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::SourceConfig;
use crate::models::FileEntry;
use crate::source_github::GitHubSource;
use crate::source_local::LocalSource;

/// A service exposing a repository's file tree and file contents.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use repo_oracle::models::FileEntry;
/// use repo_oracle::source::RepositorySource;
///
/// struct Empty;
///
/// #[async_trait]
/// impl RepositorySource for Empty {
///     fn name(&self) -> &str { "empty" }
///
///     async fn list_files(&self, _repo_id: &str) -> Result<Vec<FileEntry>> {
///         Ok(vec![])
///     }
///
///     async fn get_content(&self, _repo_id: &str, _path: &str) -> Result<Option<Vec<u8>>> {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Short identifier used in logs (e.g. `"github"`).
    fn name(&self) -> &str;

    /// List every regular file in the repository.
    ///
    /// Errors here (unparseable identifier, unreachable service, non-success
    /// response) are fatal to the fetch.
    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileEntry>>;

    /// Fetch one file's bytes. `Ok(None)` means the file is not available.
    async fn get_content(&self, repo_id: &str, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Instantiate the source named by `config.provider`.
pub fn create_source(config: &SourceConfig) -> Result<Arc<dyn RepositorySource>> {
    match config.provider.as_str() {
        "github" => Ok(Arc::new(GitHubSource::from_config(config)?)),
        "local" => Ok(Arc::new(LocalSource::from_config(config)?)),
        other => bail!("Unknown source provider: {}", other),
    }
}
