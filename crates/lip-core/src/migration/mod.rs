//! Manifest schema migration
//!
//! Brings generation 1 and 2 manifests up to the generation-3 shape that
//! [`crate::manifest`] parses. Every step works on `serde_json::Value` and
//! returns a new document.

pub mod platform;
pub mod v1;
pub mod v2;

use serde_json::Value;
use thiserror::Error;

use crate::manifest::{Manifest, ParseContext, SchemaViolation, FORMAT_UUID, FORMAT_VERSION};

/// Errors raised while migrating a manifest
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The document matches no known generation
    #[error("Unsupported manifest format version {0}")]
    UnsupportedFormat(Value),

    #[error("Unsupported platform GOOS={goos} GOARCH={}", .goarch.as_deref().unwrap_or("*"))]
    UnsupportedPlatform { goos: String, goarch: Option<String> },

    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),

    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Settings for a migration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationContext {
    /// Platform of the placeholder variant added to every migrated document
    pub host_platform: String,
}

impl Default for MigrationContext {
    fn default() -> Self {
        Self {
            host_platform: platform::host_platform(),
        }
    }
}

/// Whether `doc` is already a generation-3 document.
pub fn is_current(doc: &Value) -> bool {
    doc.get("format_version").and_then(Value::as_i64) == Some(FORMAT_VERSION)
        && doc.get("format_uuid").and_then(Value::as_str) == Some(FORMAT_UUID)
}

/// Migration chain entry point
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    context: MigrationContext,
}

impl Migrator {
    pub fn new(context: MigrationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &MigrationContext {
        &self.context
    }

    /// Return `doc` as a generation-3 document.
    pub fn migrate(&self, doc: &Value) -> Result<Value, MigrationError> {
        if is_current(doc) {
            return Ok(doc.clone());
        }
        if v2::is_migratable(doc) {
            tracing::debug!("migrating generation 2 manifest");
            return v2::migrate(doc, &self.context);
        }
        if v1::is_migratable(doc) {
            tracing::debug!("migrating generation 1 manifest");
            return v1::migrate(doc, &self.context);
        }
        Err(MigrationError::UnsupportedFormat(
            doc.get("format_version").cloned().unwrap_or(Value::Null),
        ))
    }

    /// Parse JSON text and migrate it.
    pub fn migrate_str(&self, text: &str) -> Result<Value, MigrationError> {
        let doc: Value = serde_json::from_str(text)?;
        self.migrate(&doc)
    }

    /// Migrate JSON text and parse the result as a [`Manifest`].
    ///
    /// Variants without a platform get the migration host platform.
    pub fn load_manifest(&self, text: &str) -> Result<Manifest, MigrationError> {
        let doc = self.migrate_str(text)?;
        let ctx = ParseContext {
            host_platform: self.context.host_platform.clone(),
        };
        Ok(Manifest::from_json_value_with(&doc, &ctx)?)
    }
}
