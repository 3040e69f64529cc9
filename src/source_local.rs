//! Local checkout source.
//!
//! Walks a directory on disk and serves it as a repository. The repository
//! identifier is the directory path. Files are matched against
//! `source.include_globs` / `source.exclude_globs` (relative paths, `/`
//! separators); `.git/`, `target/` and `node_modules/` are always excluded.
//! The blob id of a file is the hex SHA-256 of its bytes.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::models::FileEntry;
use crate::source::RepositorySource;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

#[derive(Clone)]
pub struct LocalSource {
    include: GlobSet,
    exclude: GlobSet,
    max_file_size: u64,
}

impl LocalSource {
    pub fn new(include_globs: &[String], exclude_globs: &[String], max_file_size: u64) -> Result<Self> {
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(exclude_globs.iter().cloned());

        Ok(Self {
            include: build_globset(include_globs)?,
            exclude: build_globset(&excludes)?,
            max_file_size,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(
            &config.include_globs,
            &config.exclude_globs,
            config.max_file_size,
        )
    }

    fn scan(&self, root: &Path) -> Result<Vec<FileEntry>> {
        if !root.is_dir() {
            bail!("Local repository root is not a directory: {}", root.display());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative_path_string(relative);

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            let size = entry.metadata()?.len();
            if size >= self.max_file_size {
                tracing::debug!(path = %rel_str, size, "skipping oversized file");
                continue;
            }

            entries.push(FileEntry {
                path: rel_str,
                size,
                blob_id: hash_file(path)?,
            });
        }

        Ok(entries)
    }
}

#[async_trait]
impl RepositorySource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileEntry>> {
        let root = PathBuf::from(repo_id);
        let source = self.clone();

        tokio::task::spawn_blocking(move || source.scan(&root))
            .await
            .context("Local listing task panicked")?
    }

    async fn get_content(&self, repo_id: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let full = Path::new(repo_id).join(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", full.display())),
        }
    }
}

/// Hex SHA-256 of a file, streamed so listing never buffers whole files.
fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

fn relative_path_string(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::create_dir_all(tmp.path().join("target/debug")).unwrap();
        fs::write(tmp.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(tmp.path().join("README.md"), "# demo\n").unwrap();
        fs::write(tmp.path().join("Cargo.lock"), "lock\n").unwrap();
        fs::write(tmp.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(tmp.path().join("target/debug/out"), "bin").unwrap();
        tmp
    }

    #[tokio::test]
    async fn lists_files_with_default_excludes() {
        let tmp = fixture();
        let source = LocalSource::new(&["**/*".to_string()], &[], 1_000_000).unwrap();
        let files = source
            .list_files(tmp.path().to_str().unwrap())
            .await
            .unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["Cargo.lock", "README.md", "src/main.rs"]);
    }

    #[tokio::test]
    async fn honors_exclude_globs_and_size_limit() {
        let tmp = fixture();
        fs::write(tmp.path().join("big.txt"), vec![b'x'; 64]).unwrap();
        let source = LocalSource::new(&["**/*".to_string()], &["*.lock".to_string()], 64).unwrap();
        let files = source
            .list_files(tmp.path().to_str().unwrap())
            .await
            .unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/main.rs"]);
    }

    #[tokio::test]
    async fn blob_id_is_content_hash() {
        let tmp = fixture();
        let source = LocalSource::new(&["**/*.md".to_string()], &[], 1_000_000).unwrap();
        let files = source
            .list_files(tmp.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].blob_id, hex::encode(Sha256::digest(b"# demo\n")));
        assert_eq!(files[0].size, 7);
    }

    #[test]
    fn streamed_hash_matches_whole_file_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        let bytes: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &bytes).unwrap();
        assert_eq!(hash_file(&path).unwrap(), hex::encode(Sha256::digest(&bytes)));
    }

    #[tokio::test]
    async fn missing_content_is_none() {
        let tmp = fixture();
        let source = LocalSource::new(&["**/*".to_string()], &[], 1_000_000).unwrap();
        let root = tmp.path().to_str().unwrap();
        assert_eq!(
            source.get_content(root, "README.md").await.unwrap(),
            Some(b"# demo\n".to_vec())
        );
        assert_eq!(source.get_content(root, "nope.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let source = LocalSource::new(&["**/*".to_string()], &[], 1_000_000).unwrap();
        assert!(source.list_files("/nonexistent/repo").await.is_err());
    }
}
