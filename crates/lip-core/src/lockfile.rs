//! Package lock (tooth_lock.json)
//!
//! Records every installed package together with its manifest, the variant
//! that was installed, the files it placed and whether the user asked for it
//! explicitly.

use std::path::Path;

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::identifier::{PackageIdentifier, PackageSpecifier};
use crate::manifest::{
    self, Fields, Manifest, ParseContext, SchemaViolation, Variant, FORMAT_UUID, FORMAT_VERSION,
};
use crate::validate;

/// Errors that can occur during lockfile operations
#[derive(Debug, Error)]
pub enum LockfileError {
    /// Failed to read lockfile
    #[error("Failed to read lockfile: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse lockfile: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Validation error
    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),
}

/// The set of installed packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageLock {
    pub packages: Vec<LockedPackage>,
}

/// One installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPackage {
    manifest: Manifest,
    identifier: PackageIdentifier,
    /// Files placed on disk, relative to the workspace
    pub files: Vec<String>,
    /// Installed explicitly rather than as a dependency
    pub locked: bool,
}

impl LockedPackage {
    /// Create a record for `variant_label` of `manifest`.
    pub fn new(
        manifest: Manifest,
        variant_label: &str,
        files: Vec<String>,
        locked: bool,
    ) -> Result<Self, SchemaViolation> {
        if !validate::check_variant_label(variant_label) {
            return Err(SchemaViolation::new(
                "packages[].variant",
                format!("Invalid variant label '{variant_label}'"),
            ));
        }
        let identifier = manifest.identifier(variant_label).ok_or_else(|| {
            SchemaViolation::new("packages[].manifest.tooth", "Invalid tooth path")
        })?;
        Ok(Self {
            manifest,
            identifier,
            files,
            locked,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn identifier(&self) -> &PackageIdentifier {
        &self.identifier
    }

    pub fn variant_label(&self) -> &str {
        self.identifier.variant_label()
    }

    pub fn specifier(&self) -> PackageSpecifier {
        self.identifier.with_version(self.manifest.version.clone())
    }

    /// The installed variant as it applies on `platform`.
    pub fn variant(&self, platform: &str) -> Option<Variant> {
        self.manifest.resolve_variant(self.variant_label(), platform)
    }
}

impl PackageLock {
    /// Create an empty lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a lock file
    pub fn from_file(path: &Path) -> Result<Self, LockfileError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse a lock from JSON text
    pub fn from_json_str(content: &str) -> Result<Self, LockfileError> {
        Self::from_json_str_with(content, &ParseContext::default())
    }

    /// Parse a lock from JSON text; embedded manifests are read with `ctx`.
    pub fn from_json_str_with(content: &str, ctx: &ParseContext) -> Result<Self, LockfileError> {
        let value: Value = serde_json::from_str(content)?;

        if value.get("format_version").and_then(Value::as_i64) != Some(FORMAT_VERSION) {
            return Err(SchemaViolation::new(
                "format_version",
                format!(
                    "Expected format version {FORMAT_VERSION}, but got {}",
                    value.get("format_version").unwrap_or(&Value::Null)
                ),
            )
            .into());
        }
        if value.get("format_uuid").and_then(Value::as_str) != Some(FORMAT_UUID) {
            return Err(SchemaViolation::new(
                "format_uuid",
                format!(
                    "Expected format UUID '{FORMAT_UUID}', but got {}",
                    value.get("format_uuid").unwrap_or(&Value::Null)
                ),
            )
            .into());
        }

        let root = Fields::of(&value, "")?;
        if root.get("packages").is_none() {
            return Err(SchemaViolation::new("packages", "Missing required field").into());
        }

        let packages = root
            .objects("packages")?
            .iter()
            .map(|entry| read_locked_package(entry, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { packages })
    }

    /// Serialize to pretty JSON with a four-space indent
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        manifest::to_json_pretty(self)
    }

    /// Write the lock to a file
    pub fn to_file(&self, path: &Path) -> Result<(), LockfileError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Find the record installed under `identifier`
    pub fn find(&self, identifier: &PackageIdentifier) -> Option<&LockedPackage> {
        self.packages.iter().find(|p| p.identifier() == identifier)
    }

    /// Insert `package`, replacing the record with the same identifier in place.
    pub fn upsert(&mut self, package: LockedPackage) {
        match self
            .packages
            .iter_mut()
            .find(|p| p.identifier() == package.identifier())
        {
            Some(existing) => *existing = package,
            None => self.packages.push(package),
        }
    }

    /// Remove and return the record installed under `identifier`
    pub fn remove(&mut self, identifier: &PackageIdentifier) -> Option<LockedPackage> {
        let index = self.packages.iter().position(|p| p.identifier() == identifier)?;
        Some(self.packages.remove(index))
    }

    /// Identifiers in lock order
    pub fn identifiers(&self) -> impl Iterator<Item = &PackageIdentifier> {
        self.packages.iter().map(LockedPackage::identifier)
    }
}

#[derive(Serialize)]
struct PackageLockDocument<'a> {
    format_version: i64,
    format_uuid: &'static str,
    packages: &'a [LockedPackage],
}

impl Serialize for PackageLock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PackageLockDocument {
            format_version: FORMAT_VERSION,
            format_uuid: FORMAT_UUID,
            packages: &self.packages,
        }
        .serialize(serializer)
    }
}

#[derive(Serialize)]
struct LockedPackageDocument<'a> {
    files: &'a [String],
    locked: bool,
    manifest: &'a Manifest,
    variant: &'a str,
}

impl Serialize for LockedPackage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        LockedPackageDocument {
            files: &self.files,
            locked: self.locked,
            manifest: &self.manifest,
            variant: self.variant_label(),
        }
        .serialize(serializer)
    }
}

fn read_locked_package(entry: &Fields, ctx: &ParseContext) -> Result<LockedPackage, SchemaViolation> {
    let files = entry.optional("files")?.unwrap_or_default();
    let locked = entry.required("locked")?;
    let variant: String = entry.optional("variant")?.unwrap_or_default();

    let document = entry
        .get("manifest")
        .ok_or_else(|| SchemaViolation::new(entry.key("manifest"), "Missing required field"))?;
    let manifest = Manifest::from_json_value_with(document, ctx).map_err(|e| {
        let key = if e.key.is_empty() {
            entry.key("manifest")
        } else {
            format!("{}.{}", entry.key("manifest"), e.key)
        };
        SchemaViolation::new(key, e.message)
    })?;

    LockedPackage::new(manifest, &variant, files, locked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semver::Version;
    use serde_json::json;

    fn ctx() -> ParseContext {
        ParseContext {
            host_platform: "linux-x64".to_string(),
        }
    }

    fn manifest(tooth: &str) -> Manifest {
        Manifest::from_json_value_with(
            &json!({
                "format_version": 3,
                "format_uuid": FORMAT_UUID,
                "tooth": tooth,
                "version": "1.0.0",
                "variants": [{ "label": "", "platform": "linux-x64" }]
            }),
            &ctx(),
        )
        .unwrap()
    }

    fn lock_text() -> String {
        json!({
            "format_version": 3,
            "format_uuid": FORMAT_UUID,
            "packages": [
                {
                    "files": ["plugins/a.dll"],
                    "locked": true,
                    "manifest": {
                        "format_version": 3,
                        "format_uuid": FORMAT_UUID,
                        "tooth": "example.com/a",
                        "version": "1.2.0",
                        "variants": [{ "label": "client", "platform": "linux-x64" }]
                    },
                    "variant": "client"
                }
            ]
        })
        .to_string()
    }

    #[test]
    fn test_parse_lock() {
        let lock = PackageLock::from_json_str_with(&lock_text(), &ctx()).unwrap();
        assert_eq!(lock.packages.len(), 1);

        let package = &lock.packages[0];
        assert!(package.locked);
        assert_eq!(package.files, vec!["plugins/a.dll"]);
        assert_eq!(package.identifier().to_string(), "example.com/a#client");
        assert_eq!(package.specifier().version(), &Version::new(1, 2, 0));
        assert!(package.variant("linux-x64").is_some());
        assert!(package.variant("win-x64").is_none());
    }

    #[test]
    fn test_format_sentinel_required() {
        let text = json!({ "format_version": 2, "packages": [] }).to_string();
        let err = PackageLock::from_json_str_with(&text, &ctx()).unwrap_err();
        assert!(matches!(err, LockfileError::SchemaViolation(v) if v.key == "format_version"));
    }

    #[test]
    fn test_invalid_variant_label() {
        let text = lock_text().replace("\"variant\":\"client\"", "\"variant\":\"Bad Label\"");
        let err = PackageLock::from_json_str_with(&text, &ctx()).unwrap_err();
        assert!(matches!(err, LockfileError::SchemaViolation(v) if v.key == "packages[].variant"));
    }

    #[test]
    fn test_manifest_violation_key_is_prefixed() {
        let text = lock_text().replace("example.com/a", "Example.com/a");
        let err = PackageLock::from_json_str_with(&text, &ctx()).unwrap_err();
        assert!(
            matches!(err, LockfileError::SchemaViolation(v) if v.key == "packages[].manifest.tooth")
        );
    }

    #[test]
    fn test_structural_violation_keys() {
        let cases = [
            (lock_text().replace("\"locked\":true", "\"locked\":\"yes\""), "packages[].locked"),
            (lock_text().replace("\"files\":[\"plugins/a.dll\"]", "\"files\":{}"), "packages[].files"),
            (lock_text().replace("\"version\":\"1.2.0\"", "\"version\":12"), "packages[].manifest.version"),
            (lock_text().replace("\"packages\":[", "\"entries\":["), "packages"),
        ];
        for (text, key) in cases {
            let err = PackageLock::from_json_str_with(&text, &ctx()).unwrap_err();
            assert!(
                matches!(&err, LockfileError::SchemaViolation(v) if v.key == key),
                "{key}: {err:?}"
            );
        }
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut lock = PackageLock::new();
        lock.upsert(LockedPackage::new(manifest("example.com/a"), "", vec![], false).unwrap());
        lock.upsert(LockedPackage::new(manifest("example.com/b"), "", vec![], false).unwrap());
        lock.upsert(
            LockedPackage::new(manifest("example.com/a"), "", vec!["x".to_string()], true).unwrap(),
        );

        assert_eq!(lock.packages.len(), 2);
        let a = PackageIdentifier::parse("example.com/a").unwrap();
        assert_eq!(lock.packages[0].identifier(), &a);
        assert!(lock.find(&a).unwrap().locked);

        let removed = lock.remove(&a).unwrap();
        assert_eq!(removed.files, vec!["x"]);
        assert!(lock.find(&a).is_none());
        assert!(lock.remove(&a).is_none());
    }

    #[test]
    fn test_round_trip() {
        let lock = PackageLock::from_json_str_with(&lock_text(), &ctx()).unwrap();
        let text = lock.to_json_string().unwrap();
        assert!(text.starts_with("{\n    \"format_version\": 3,"));

        let reparsed = PackageLock::from_json_str_with(&text, &ctx()).unwrap();
        assert_eq!(reparsed, lock);
    }
}
