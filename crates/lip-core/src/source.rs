//! File sources
//!
//! Assets are read through [`FileSource`], which lists `/`-separated keys and
//! opens them for reading. Archive codecs live outside this crate and only
//! need to implement the trait.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::{Placement, PlacementType};
use crate::module::proxy;
use crate::semver::Version;
use crate::validate;

/// Errors raised by file sources
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Entry not found: '{0}'")]
    NotFound(String),
}

/// One readable entry of a source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileSourceEntry {
    pub key: String,
}

/// A set of files addressed by key
pub trait FileSource {
    /// Every entry, ordered by key
    fn entries(&self) -> Result<Vec<FileSourceEntry>, SourceError>;

    /// Open the entry stored under `key`
    fn open(&self, key: &str) -> Result<Box<dyn Read + '_>, SourceError>;
}

/// Files below a directory
#[derive(Debug, Clone)]
pub struct DirectoryFileSource {
    root: PathBuf,
}

impl DirectoryFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<FileSourceEntry>) -> Result<(), SourceError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = format!("{prefix}{name}");
            if entry.file_type()?.is_dir() {
                self.walk(&entry.path(), &format!("{key}/"), out)?;
            } else {
                out.push(FileSourceEntry { key });
            }
        }
        Ok(())
    }
}

impl FileSource for DirectoryFileSource {
    fn entries(&self) -> Result<Vec<FileSourceEntry>, SourceError> {
        let mut entries = Vec::new();
        self.walk(&self.root, "", &mut entries)?;
        entries.sort();
        Ok(entries)
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read + '_>, SourceError> {
        if key.is_empty() || !validate::check_safe_place_path(key) {
            return Err(SourceError::NotFound(key.to_string()));
        }
        let path = self.root.join(key);
        if !path.is_file() {
            return Err(SourceError::NotFound(key.to_string()));
        }
        Ok(Box::new(File::open(path)?))
    }
}

/// A single file, exposed under one key (empty by default)
#[derive(Debug, Clone)]
pub struct StandaloneFileSource {
    path: PathBuf,
    key: String,
}

impl StandaloneFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: String::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl FileSource for StandaloneFileSource {
    fn entries(&self) -> Result<Vec<FileSourceEntry>, SourceError> {
        Ok(vec![FileSourceEntry {
            key: self.key.clone(),
        }])
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read + '_>, SourceError> {
        if key != self.key {
            return Err(SourceError::NotFound(key.to_string()));
        }
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// The entries of `inner` below `prefix`, with the prefix removed
#[derive(Debug, Clone)]
pub struct PrefixedFileSource<S> {
    inner: S,
    prefix: String,
}

impl<S: FileSource> PrefixedFileSource<S> {
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    /// View a module proxy archive, whose entries sit under `<path>@<version>/`
    pub fn for_module(inner: S, module_path: &str, version: &Version) -> Self {
        Self::new(inner, proxy::archive_prefix(module_path, version))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl<S: FileSource> FileSource for PrefixedFileSource<S> {
    fn entries(&self) -> Result<Vec<FileSourceEntry>, SourceError> {
        Ok(self
            .inner
            .entries()?
            .into_iter()
            .filter_map(|entry| {
                entry
                    .key
                    .strip_prefix(&self.prefix)
                    .filter(|key| !key.is_empty())
                    .map(|key| FileSourceEntry { key: key.to_string() })
            })
            .collect())
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read + '_>, SourceError> {
        self.inner.open(&format!("{}{key}", self.prefix))
    }
}

/// Destination of the source entry `key` under `placement`, or `None` when the
/// placement does not cover it.
///
/// A file placement covers exactly its `src` key and maps it to `dest`. A
/// directory placement covers every key below `src` and keeps the remainder.
pub fn placement_target(placement: &Placement, key: &str) -> Option<String> {
    match placement.kind {
        PlacementType::File => (key == placement.src).then(|| placement.dest.clone()),
        PlacementType::Dir => {
            let src = if placement.src.is_empty() || placement.src.ends_with('/') {
                placement.src.clone()
            } else {
                format!("{}/", placement.src)
            };
            let rest = key.strip_prefix(&src)?;
            let dest = placement.dest.trim_end_matches('/');
            Some(if dest.is_empty() {
                rest.to_string()
            } else {
                format!("{dest}/{rest}")
            })
        }
    }
}
