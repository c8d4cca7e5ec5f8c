//! Package identity
//!
//! A package is identified by its tooth path and variant label
//! (`example.com/pkg#variant`); a specifier pins that identity to a version
//! (`example.com/pkg#variant@1.0.0`).

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::semver::{SemverError, Version};
use crate::validate;

/// Errors raised by identity parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Invalid tooth path '{0}'")]
    InvalidToothPath(String),

    #[error("Invalid variant label '{0}'")]
    InvalidVariantLabel(String),

    #[error("Invalid version '{text}': {source}")]
    InvalidVersion {
        text: String,
        #[source]
        source: SemverError,
    },

    /// The text has no `@version` part
    #[error("Invalid package specifier '{0}'. Expected format is 'toothPath[#variantLabel]@version'")]
    InvalidText(String),
}

/// Tooth path plus variant label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIdentifier {
    tooth_path: String,
    variant_label: String,
}

impl PackageIdentifier {
    /// Create an identifier, validating both parts.
    pub fn new(
        tooth_path: impl Into<String>,
        variant_label: impl Into<String>,
    ) -> Result<Self, IdentifierError> {
        let tooth_path = tooth_path.into();
        let variant_label = variant_label.into();
        if !validate::check_tooth_path(&tooth_path) {
            return Err(IdentifierError::InvalidToothPath(tooth_path));
        }
        if !validate::check_variant_label(&variant_label) {
            return Err(IdentifierError::InvalidVariantLabel(variant_label));
        }
        Ok(Self {
            tooth_path,
            variant_label,
        })
    }

    /// Parse `path[#label]`
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        match text.rsplit_once('#') {
            Some((path, label)) => Self::new(path, label),
            None => Self::new(text, ""),
        }
    }

    pub fn tooth_path(&self) -> &str {
        &self.tooth_path
    }

    /// Empty for the default variant
    pub fn variant_label(&self) -> &str {
        &self.variant_label
    }

    /// Pin this identifier to `version`.
    pub fn with_version(&self, version: Version) -> PackageSpecifier {
        PackageSpecifier {
            identifier: self.clone(),
            version,
        }
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tooth_path)?;
        if !self.variant_label.is_empty() {
            write!(f, "#{}", self.variant_label)?;
        }
        Ok(())
    }
}

impl FromStr for PackageIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(de::Error::custom)
    }
}

/// Identifier plus an exact version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageSpecifier {
    identifier: PackageIdentifier,
    version: Version,
}

impl PackageSpecifier {
    pub fn new(
        tooth_path: impl Into<String>,
        variant_label: impl Into<String>,
        version: Version,
    ) -> Result<Self, IdentifierError> {
        Ok(PackageIdentifier::new(tooth_path, variant_label)?.with_version(version))
    }

    pub fn from_identifier(identifier: PackageIdentifier, version: Version) -> Self {
        Self {
            identifier,
            version,
        }
    }

    /// Parse `path[#label]@version`
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        let (identifier, version) = text
            .rsplit_once('@')
            .ok_or_else(|| IdentifierError::InvalidText(text.to_string()))?;

        let identifier = PackageIdentifier::parse(identifier)?;
        let version = Version::parse(version).map_err(|source| IdentifierError::InvalidVersion {
            text: version.to_string(),
            source,
        })?;
        Ok(Self::from_identifier(identifier, version))
    }

    pub fn identifier(&self) -> &PackageIdentifier {
        &self.identifier
    }

    pub fn tooth_path(&self) -> &str {
        self.identifier.tooth_path()
    }

    pub fn variant_label(&self) -> &str {
        self.identifier.variant_label()
    }

    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl fmt::Display for PackageSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.version)
    }
}

impl FromStr for PackageSpecifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageSpecifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageSpecifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifier() {
        let id = PackageIdentifier::parse("example.com/pkg#variant").unwrap();
        assert_eq!(id.tooth_path(), "example.com/pkg");
        assert_eq!(id.variant_label(), "variant");

        let id = PackageIdentifier::parse("example.com/pkg").unwrap();
        assert_eq!(id.variant_label(), "");
        assert_eq!(id.to_string(), "example.com/pkg");
    }

    #[test]
    fn test_identifier_with_empty_label_after_hash() {
        let id = PackageIdentifier::parse("example.com/pkg#").unwrap();
        assert_eq!(id, PackageIdentifier::parse("example.com/pkg").unwrap());
    }

    #[test]
    fn test_identifier_errors_name_the_field() {
        assert!(matches!(
            PackageIdentifier::parse("example.com//pkg"),
            Err(IdentifierError::InvalidToothPath(_))
        ));
        assert!(matches!(
            PackageIdentifier::parse("example.com/pkg#invalid!variant"),
            Err(IdentifierError::InvalidVariantLabel(_))
        ));
        assert!(matches!(
            PackageIdentifier::parse("example.com/pkg#invalid#variant"),
            Err(IdentifierError::InvalidToothPath(_))
        ));
        assert!(PackageIdentifier::parse("").is_err());
    }

    #[test]
    fn test_parse_specifier() {
        let spec = PackageSpecifier::parse("example.com/pkg#variant@1.0.0").unwrap();
        assert_eq!(spec.tooth_path(), "example.com/pkg");
        assert_eq!(spec.variant_label(), "variant");
        assert_eq!(spec.version(), &Version::new(1, 0, 0));
        assert_eq!(spec.to_string(), "example.com/pkg#variant@1.0.0");

        let spec = PackageSpecifier::parse("example.com/pkg@2.0.0").unwrap();
        assert_eq!(spec.to_string(), "example.com/pkg@2.0.0");
    }

    #[test]
    fn test_specifier_errors() {
        assert!(matches!(
            PackageSpecifier::parse("example.com/pkg"),
            Err(IdentifierError::InvalidText(_))
        ));
        assert!(matches!(
            PackageSpecifier::parse("example.com/pkg#variant@invalid"),
            Err(IdentifierError::InvalidVersion { .. })
        ));
        assert!(matches!(
            PackageSpecifier::parse("invalid//pkg#variant@1.0.0"),
            Err(IdentifierError::InvalidToothPath(_))
        ));
        assert!(PackageSpecifier::parse("").is_err());
    }

    #[test]
    fn test_identifier_of_specifier() {
        let spec = PackageSpecifier::parse("example.com/pkg#variant@1.0.0").unwrap();
        assert_eq!(
            spec.identifier(),
            &PackageIdentifier::parse("example.com/pkg#variant").unwrap()
        );
        assert_eq!(spec.identifier().with_version(Version::new(1, 0, 0)), spec);
    }

    #[test]
    fn test_serde_as_strings() {
        let id = PackageIdentifier::parse("example.com/pkg#variant").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"example.com/pkg#variant\"");
        let back: PackageIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let bad: Result<PackageIdentifier, _> = serde_json::from_str("\"Example.com/pkg\"");
        assert!(bad.is_err());
    }
}
