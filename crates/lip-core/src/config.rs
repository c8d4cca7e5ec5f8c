//! Runtime configuration (liprc.toml)
//!
//! Where the cache lives and which mirrors to use. Every key is optional;
//! proxy lists are stored as comma-separated strings.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Overrides the configured cache directory
pub const CACHE_ENV: &str = "LIP_CACHE";

const DEFAULT_GO_MODULE_PROXY: &str = "https://goproxy.io";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Invalid URL '{value}' in '{key}': {source}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Typed runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub cache: PathBuf,
    pub github_proxies: Vec<Url>,
    pub go_module_proxies: Vec<Url>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRuntimeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    github_proxies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    go_module_proxies: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache: default_cache_dir(),
            github_proxies: Vec::new(),
            go_module_proxies: parse_url_list("go_module_proxies", DEFAULT_GO_MODULE_PROXY)
                .unwrap_or_default(),
        }
    }
}

impl FromStr for RuntimeConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let raw: RawRuntimeConfig = toml::from_str(content)?;
        Ok(Self {
            cache: raw.cache.map(PathBuf::from).unwrap_or_else(default_cache_dir),
            github_proxies: parse_url_list("github_proxies", raw.github_proxies.as_deref().unwrap_or(""))?,
            go_module_proxies: parse_url_list(
                "go_module_proxies",
                raw.go_module_proxies.as_deref().unwrap_or(DEFAULT_GO_MODULE_PROXY),
            )?,
        })
    }
}

impl RuntimeConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        std::fs::read_to_string(path)?.parse()
    }

    /// Read `path` if it exists, otherwise use defaults, then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.is_file() {
            Self::from_file(path)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    /// Apply overrides looked up through `env`
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(cache) = env(CACHE_ENV).filter(|v| !v.trim().is_empty()) {
            self.cache = PathBuf::from(cache);
        }
        self
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let raw = RawRuntimeConfig {
            cache: Some(self.cache.to_string_lossy().into_owned()),
            github_proxies: Some(join_urls(&self.github_proxies)),
            go_module_proxies: Some(join_urls(&self.go_module_proxies)),
        };
        toml::to_string_pretty(&raw).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Write config to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

/// `<config dir>/lip/liprc.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".lip"))
        .join("lip")
        .join("liprc.toml")
}

/// `<cache dir>/lip`, or `.lip/cache` when the platform has none
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("lip"))
        .unwrap_or_else(|| PathBuf::from(".lip").join("cache"))
}

fn parse_url_list(key: &'static str, text: &str) -> Result<Vec<Url>, ConfigError> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            Url::parse(item).map_err(|source| ConfigError::InvalidUrl {
                key,
                value: item.to_string(),
                source,
            })
        })
        .collect()
}

fn join_urls(urls: &[Url]) -> String {
    urls.iter().map(Url::as_str).collect::<Vec<_>>().join(",")
}
