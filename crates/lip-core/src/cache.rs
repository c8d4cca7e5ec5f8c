//! Download cache layout
//!
//! Downloaded files and cloned git repositories are stored under the cache
//! root, keyed by the SHA-256 of their URL:
//!
//! ```text
//! <cache>/
//! ├── downloads/<sha256(url)>
//! ├── git_repos/<sha256(url)>/<sha256(tag)>/
//! └── tmp/
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error (file operations)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A cached download does not hash to the expected checksum
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },
}

/// Paths of the lip cache
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory structure if missing
    pub fn init(&self) -> Result<(), CacheError> {
        fs::create_dir_all(self.downloads_dir())?;
        fs::create_dir_all(self.git_repos_dir())?;
        fs::create_dir_all(self.tmp_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn git_repos_dir(&self) -> PathBuf {
        self.root.join("git_repos")
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Where the download of `url` is kept
    pub fn download_path(&self, url: &Url) -> PathBuf {
        self.downloads_dir().join(sha256_hex(url.as_str().as_bytes()))
    }

    /// Where the checkout of `tag` from the repository at `url` is kept
    pub fn git_repo_path(&self, url: &Url, tag: &str) -> PathBuf {
        self.git_repos_dir()
            .join(sha256_hex(url.as_str().as_bytes()))
            .join(sha256_hex(tag.as_bytes()))
    }

    /// Path of the cached download of `url`, if present
    pub fn cached_download(&self, url: &Url) -> Option<PathBuf> {
        let path = self.download_path(url);
        path.is_file().then_some(path)
    }

    /// Store downloaded bytes for `url` and return the cache path.
    ///
    /// The file is written under `tmp/` and renamed into place. On failure
    /// the temporary file is removed again.
    pub fn store_download(&self, url: &Url, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let final_path = self.download_path(url);
        fs::create_dir_all(self.downloads_dir())?;
        fs::create_dir_all(self.tmp_dir())?;

        let tmp_path = self.tmp_dir().join(format!("{}.tmp", sha256_hex(url.as_str().as_bytes())));
        let stored = fs::File::create(&tmp_path)
            .and_then(|mut tmp_file| {
                tmp_file.write_all(bytes)?;
                tmp_file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp_path, &final_path));
        if let Err(e) = stored {
            tracing::warn!(%url, error = %e, "failed to store download");
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        tracing::debug!(%url, path = %final_path.display(), "stored download");
        Ok(final_path)
    }

    /// Check a cached download against a hex SHA-256 checksum
    pub fn verify_download(&self, url: &Url, expected: &str) -> Result<(), CacheError> {
        let bytes = fs::read(self.download_path(url))?;
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(CacheError::ChecksumMismatch {
                url: url.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Remove every cached download and repository
    pub fn clean(&self) -> Result<(), CacheError> {
        for dir in [self.downloads_dir(), self.git_repos_dir(), self.tmp_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
