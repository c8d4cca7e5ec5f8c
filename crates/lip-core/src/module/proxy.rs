//! Module proxy URLs
//!
//! Tooth paths double as Go module paths, so a tooth can be fetched from any
//! Go module proxy. Mirrors lay modules out as
//! `<proxy>/<escaped-path>/@v/<escaped-version>.<ext>`.

use thiserror::Error;
use url::Url;

use super::path::{self, PathError};
use super::semver as gosemver;
use crate::semver::Version;

/// Errors raised while building proxy URLs
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The tooth path or version is not usable by a module proxy
    #[error(transparent)]
    Path(#[from] PathError),

    /// The proxy URL cannot have path segments appended
    #[error("proxy URL cannot be a base: {0}")]
    CannotBeBase(Url),
}

/// A single module proxy mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProxy {
    base: Url,
}

impl ModuleProxy {
    /// Create a proxy rooted at `base`
    pub fn new(base: Url) -> Result<Self, ProxyError> {
        if base.cannot_be_a_base() {
            return Err(ProxyError::CannotBeBase(base));
        }
        Ok(Self { base })
    }

    /// Base URL of the mirror
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL of the version list for `module_path`
    pub fn list_url(&self, module_path: &str) -> Result<Url, ProxyError> {
        self.url(module_path, "list")
    }

    /// URL of the zip archive for `module_path` at `version`
    pub fn zip_url(&self, module_path: &str, version: &Version) -> Result<Url, ProxyError> {
        self.file_url(module_path, version, "zip")
    }

    /// URL of the go.mod file for `module_path` at `version`
    pub fn mod_url(&self, module_path: &str, version: &Version) -> Result<Url, ProxyError> {
        self.file_url(module_path, version, "mod")
    }

    /// URL of the version metadata for `module_path` at `version`
    pub fn info_url(&self, module_path: &str, version: &Version) -> Result<Url, ProxyError> {
        self.file_url(module_path, version, "info")
    }

    fn file_url(&self, module_path: &str, version: &Version, ext: &str) -> Result<Url, ProxyError> {
        let escaped = path::escape_version(&proxy_version(version))?;
        self.url(module_path, &format!("{escaped}.{ext}"))
    }

    fn url(&self, module_path: &str, leaf: &str) -> Result<Url, ProxyError> {
        let escaped = path::escape_path(module_path)?;
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ProxyError::CannotBeBase(self.base.clone()))?
            .pop_if_empty()
            .extend(escaped.split('/'))
            .push("@v")
            .push(leaf);
        Ok(url)
    }
}

/// Version string a proxy serves `version` under.
///
/// Mirrors publish major versions 2 and above of modules without a go.mod as
/// `+incompatible`. Other build metadata is dropped.
pub fn proxy_version(version: &Version) -> String {
    let mut v = format!("v{}.{}.{}", version.major, version.minor, version.patch);
    if let Some(pre) = &version.prerelease {
        v.push('-');
        v.push_str(pre);
    }
    if version.major >= 2 {
        v.push_str("+incompatible");
    }
    path::canonical_version(&v)
}

/// Prefix every entry of a proxy zip archive carries.
pub fn archive_prefix(module_path: &str, version: &Version) -> String {
    format!("{module_path}@{}/", proxy_version(version))
}

/// Parse the body of an `@v/list` response.
///
/// Lines not starting with `v` or not holding a valid version are skipped.
/// The result is sorted and free of duplicates.
pub fn parse_version_list(body: &str) -> Vec<Version> {
    let mut versions: Vec<Version> = body
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('v'))
        .filter_map(|line| {
            let canonical = gosemver::canonical(line);
            Version::parse(&canonical).ok()
        })
        .collect();
    versions.sort();
    versions.dedup();
    versions
}
