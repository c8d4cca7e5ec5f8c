//! Package manifest parsing (tooth.json)
//!
//! Provides the generation-3 manifest model, its validation and variant
//! selection. Older generations go through [`crate::migration`] first.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::identifier::PackageIdentifier;
use crate::migration::platform;
use crate::semver::{Version, VersionRange};
use crate::template;
use crate::validate;

/// Current manifest format generation
pub const FORMAT_VERSION: i64 = 3;

/// Sentinel that marks a document as generation 3
pub const FORMAT_UUID: &str = "289f771f-2c9a-4d73-9f3f-8492495a924d";

/// A document field failed validation.
///
/// `key` locates the field, for example `variants[].assets[].placements[].dest`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Schema violation at '{key}': {message}")]
pub struct SchemaViolation {
    pub key: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur during manifest parsing
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Validation error
    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),
}

/// Settings that influence how a manifest is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseContext {
    /// Platform given to variants that do not declare one
    pub host_platform: String,
}

impl Default for ParseContext {
    fn default() -> Self {
        Self {
            host_platform: platform::host_platform(),
        }
    }
}

/// Package manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub tooth_path: String,
    pub version: Version,
    pub info: Info,
    pub variants: Vec<Variant>,
}

/// Descriptive package metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Info {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    /// `None` when the manifest leaves the avatar empty
    #[serde(serialize_with = "serialize_optional_url")]
    pub avatar_url: Option<Url>,
}

/// A platform-scoped facet of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub label: String,
    pub platform: String,
    pub dependencies: BTreeMap<PackageIdentifier, VersionRange>,
    pub assets: Vec<Asset>,
    pub preserve_files: Vec<String>,
    pub remove_files: Vec<String>,
    pub scripts: Scripts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    #[serde(rename = "type")]
    pub kind: AssetType,
    pub urls: Vec<Url>,
    pub placements: Vec<Placement>,
}

/// How an asset is packed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Files come from the package archive itself
    #[serde(rename = "self")]
    SelfContained,
    Tar,
    Tgz,
    Uncompressed,
    Zip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    #[serde(rename = "type")]
    pub kind: PlacementType,
    pub src: String,
    pub dest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementType {
    File,
    Dir,
}

/// Lifecycle hooks plus freely named scripts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scripts {
    pub pre_install: Vec<String>,
    pub install: Vec<String>,
    pub post_install: Vec<String>,
    pub pre_pack: Vec<String>,
    pub post_pack: Vec<String>,
    pub pre_uninstall: Vec<String>,
    pub uninstall: Vec<String>,
    pub post_uninstall: Vec<String>,
    #[serde(flatten)]
    pub additional: BTreeMap<String, Vec<String>>,
}

impl FromStr for AssetType {
    type Err = SchemaViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(AssetType::SelfContained),
            "tar" => Ok(AssetType::Tar),
            "tgz" => Ok(AssetType::Tgz),
            "uncompressed" => Ok(AssetType::Uncompressed),
            "zip" => Ok(AssetType::Zip),
            other => Err(SchemaViolation::new(
                "variants[].assets[].type",
                format!("Unknown asset type '{other}'"),
            )),
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetType::SelfContained => "self",
            AssetType::Tar => "tar",
            AssetType::Tgz => "tgz",
            AssetType::Uncompressed => "uncompressed",
            AssetType::Zip => "zip",
        };
        f.write_str(name)
    }
}

impl FromStr for PlacementType {
    type Err = SchemaViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(PlacementType::File),
            "dir" => Ok(PlacementType::Dir),
            other => Err(SchemaViolation::new(
                "variants[].assets[].placements[].type",
                format!("Unknown placement type '{other}'"),
            )),
        }
    }
}

impl Variant {
    /// Check whether this variant applies to `label` on `platform`.
    ///
    /// Label and platform are glob patterns (`*`, `win-*`, `linux-arm?`). An
    /// empty label or platform matches only an empty target.
    pub fn matches(&self, label: &str, platform: &str) -> bool {
        glob_matches(&self.label, label) && glob_matches(&self.platform, platform)
    }

    fn matches_exactly(&self, label: &str, platform: &str) -> bool {
        self.label == label && self.platform == platform
    }
}

fn glob_matches(pattern: &str, target: &str) -> bool {
    if pattern == target {
        return true;
    }
    if pattern.is_empty() {
        return false;
    }
    // Malformed patterns only ever match themselves.
    glob::Pattern::new(pattern).is_ok_and(|p| p.matches(target))
}

impl Manifest {
    /// Load and parse a manifest file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse manifest from JSON text
    pub fn from_json_str(content: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(content)?;
        Ok(Self::from_json_value(&value)?)
    }

    /// Parse a generation-3 document using the host platform for defaults
    pub fn from_json_value(value: &Value) -> Result<Self, SchemaViolation> {
        Self::from_json_value_with(value, &ParseContext::default())
    }

    /// Parse a generation-3 document
    ///
    /// Templates are rendered first, then the format sentinel and every
    /// constrained field is validated.
    pub fn from_json_value_with(value: &Value, ctx: &ParseContext) -> Result<Self, SchemaViolation> {
        let rendered = template::render(value);

        let format_version = rendered.get("format_version").and_then(Value::as_i64);
        if format_version != Some(FORMAT_VERSION) {
            return Err(SchemaViolation::new(
                "format_version",
                format!(
                    "Expected format version {FORMAT_VERSION}, but got {}",
                    rendered.get("format_version").unwrap_or(&Value::Null)
                ),
            ));
        }
        let format_uuid = rendered.get("format_uuid").and_then(Value::as_str);
        if format_uuid != Some(FORMAT_UUID) {
            return Err(SchemaViolation::new(
                "format_uuid",
                format!(
                    "Expected format UUID '{FORMAT_UUID}', but got {}",
                    rendered.get("format_uuid").unwrap_or(&Value::Null)
                ),
            ));
        }

        RawManifest::read(&Fields::of(&rendered, "")?)?.into_manifest(ctx)
    }

    /// Serialize to a JSON value
    pub fn to_json_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Serialize to pretty JSON with a four-space indent
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        to_json_pretty(self)
    }

    /// Write the manifest to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ManifestError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// First variant, in declaration order, that matches.
    pub fn get_variant(&self, label: &str, platform: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.matches(label, platform))
    }

    /// Merge every variant that matches `label` and `platform`.
    ///
    /// At least one variant must match exactly. Lists are concatenated in
    /// declaration order, later dependency entries override earlier ones,
    /// hooks come from the last matched variant and additional scripts are
    /// merged with the last definition winning.
    pub fn resolve_variant(&self, label: &str, platform: &str) -> Option<Variant> {
        let matched: Vec<&Variant> = self
            .variants
            .iter()
            .filter(|v| v.matches(label, platform))
            .collect();

        if !matched.iter().any(|v| v.matches_exactly(label, platform)) {
            tracing::debug!(
                tooth = %self.tooth_path,
                label,
                platform,
                "no variant matches exactly"
            );
            return None;
        }

        let last = matched.last()?;
        let mut merged = Variant {
            label: label.to_string(),
            platform: platform.to_string(),
            scripts: Scripts {
                additional: BTreeMap::new(),
                ..last.scripts.clone()
            },
            ..Variant::default()
        };
        for variant in &matched {
            merged.dependencies.extend(
                variant
                    .dependencies
                    .iter()
                    .map(|(id, range)| (id.clone(), range.clone())),
            );
            merged.assets.extend(variant.assets.iter().cloned());
            merged.preserve_files.extend(variant.preserve_files.iter().cloned());
            merged.remove_files.extend(variant.remove_files.iter().cloned());
            merged.scripts.additional.extend(
                variant
                    .scripts
                    .additional
                    .iter()
                    .map(|(name, lines)| (name.clone(), lines.clone())),
            );
        }
        Some(merged)
    }

    pub fn identifier(&self, variant_label: &str) -> Option<PackageIdentifier> {
        PackageIdentifier::new(self.tooth_path.clone(), variant_label).ok()
    }
}

#[derive(Serialize)]
struct ManifestDocument<'a> {
    format_version: i64,
    format_uuid: &'static str,
    tooth: &'a str,
    version: &'a Version,
    info: &'a Info,
    variants: &'a [Variant],
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ManifestDocument {
            format_version: FORMAT_VERSION,
            format_uuid: FORMAT_UUID,
            tooth: &self.tooth_path,
            version: &self.version,
            info: &self.info,
            variants: &self.variants,
        }
        .serialize(serializer)
    }
}

fn serialize_optional_url<S: Serializer>(url: &Option<Url>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(url.as_ref().map(Url::as_str).unwrap_or(""))
}

/// Pretty JSON with the four-space indent lip writes everywhere.
pub(crate) fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(serde::ser::Error::custom)
}

/// Members of one JSON object. Failures are reported under a dotted key
/// such as `variants[].assets[].type`.
pub(crate) struct Fields<'a> {
    prefix: String,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    /// Read the members of `value`, located at `key` (empty for the root).
    pub(crate) fn of(value: &'a Value, key: &str) -> Result<Self, SchemaViolation> {
        let map = value
            .as_object()
            .ok_or_else(|| SchemaViolation::new(key, "Expected an object"))?;
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}.")
        };
        Ok(Self { prefix, map })
    }

    pub(crate) fn key(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Raw member value; `None` when absent or null.
    pub(crate) fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name).filter(|v| !v.is_null())
    }

    pub(crate) fn required<T: DeserializeOwned>(&self, name: &str) -> Result<T, SchemaViolation> {
        self.optional(name)?
            .ok_or_else(|| SchemaViolation::new(self.key(name), "Missing required field"))
    }

    pub(crate) fn optional<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, SchemaViolation> {
        self.get(name)
            .map(|value| {
                T::deserialize(value).map_err(|e| SchemaViolation::new(self.key(name), e.to_string()))
            })
            .transpose()
    }

    pub(crate) fn object(&self, name: &str) -> Result<Option<Fields<'a>>, SchemaViolation> {
        self.get(name)
            .map(|value| Fields::of(value, &self.key(name)))
            .transpose()
    }

    /// Every object in the array member `name`; empty when absent.
    pub(crate) fn objects(&self, name: &str) -> Result<Vec<Fields<'a>>, SchemaViolation> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => {
                let key = format!("{}[]", self.key(name));
                items.iter().map(|item| Fields::of(item, &key)).collect()
            }
            Some(_) => Err(SchemaViolation::new(self.key(name), "Expected an array")),
        }
    }

    pub(crate) fn members(&self) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.map.iter()
    }
}

// Wire shapes. Every optional field defaults to empty.

struct RawManifest {
    tooth: String,
    version: String,
    info: Option<RawInfo>,
    variants: Vec<RawVariant>,
}

struct RawInfo {
    name: Option<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
    avatar_url: Option<String>,
}

struct RawVariant {
    label: Option<String>,
    platform: Option<String>,
    dependencies: Option<BTreeMap<String, String>>,
    assets: Vec<RawAsset>,
    preserve_files: Option<Vec<String>>,
    remove_files: Option<Vec<String>>,
    scripts: Option<RawScripts>,
}

struct RawAsset {
    kind: String,
    urls: Option<Vec<String>>,
    placements: Vec<RawPlacement>,
}

struct RawPlacement {
    kind: String,
    src: String,
    dest: String,
}

const HOOKS: [&str; 8] = [
    "pre_install",
    "install",
    "post_install",
    "pre_pack",
    "post_pack",
    "pre_uninstall",
    "uninstall",
    "post_uninstall",
];

struct RawScripts {
    pre_install: Option<Vec<String>>,
    install: Option<Vec<String>>,
    post_install: Option<Vec<String>>,
    pre_pack: Option<Vec<String>>,
    post_pack: Option<Vec<String>>,
    pre_uninstall: Option<Vec<String>>,
    uninstall: Option<Vec<String>>,
    post_uninstall: Option<Vec<String>>,
    additional: BTreeMap<String, Value>,
}

impl RawManifest {
    fn read(fields: &Fields) -> Result<Self, SchemaViolation> {
        Ok(Self {
            tooth: fields.required("tooth")?,
            version: fields.required("version")?,
            info: fields.object("info")?.map(|f| RawInfo::read(&f)).transpose()?,
            variants: fields
                .objects("variants")?
                .iter()
                .map(RawVariant::read)
                .collect::<Result<_, _>>()?,
        })
    }

    fn into_manifest(self, ctx: &ParseContext) -> Result<Manifest, SchemaViolation> {
        if !validate::check_tooth_path(&self.tooth) {
            return Err(SchemaViolation::new(
                "tooth",
                format!("Invalid tooth path '{}'", self.tooth),
            ));
        }
        let version = Version::parse(&self.version)
            .map_err(|e| SchemaViolation::new("version", e.to_string()))?;

        let info = self.info.map(RawInfo::into_info).transpose()?.unwrap_or_default();

        let variants = self
            .variants
            .into_iter()
            .map(|v| v.into_variant(ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Manifest {
            tooth_path: self.tooth,
            version,
            info,
            variants,
        })
    }
}

impl RawInfo {
    fn read(fields: &Fields) -> Result<Self, SchemaViolation> {
        Ok(Self {
            name: fields.optional("name")?,
            description: fields.optional("description")?,
            tags: fields.optional("tags")?,
            avatar_url: fields.optional("avatar_url")?,
        })
    }

    fn into_info(self) -> Result<Info, SchemaViolation> {
        let tags = self.tags.unwrap_or_default();
        if let Some(tag) = tags.iter().find(|t| !validate::check_tag(t)) {
            return Err(SchemaViolation::new(
                "info.tags[]",
                format!("Tag '{tag}' is invalid"),
            ));
        }

        let avatar_url = match self.avatar_url.as_deref() {
            None | Some("") => None,
            Some(text) => Some(Url::parse(text).map_err(|e| {
                SchemaViolation::new("info.avatar_url", format!("Invalid URL '{text}': {e}"))
            })?),
        };

        Ok(Info {
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            tags,
            avatar_url,
        })
    }
}

impl RawVariant {
    fn read(fields: &Fields) -> Result<Self, SchemaViolation> {
        Ok(Self {
            label: fields.optional("label")?,
            platform: fields.optional("platform")?,
            dependencies: fields.optional("dependencies")?,
            assets: fields
                .objects("assets")?
                .iter()
                .map(RawAsset::read)
                .collect::<Result<_, _>>()?,
            preserve_files: fields.optional("preserve_files")?,
            remove_files: fields.optional("remove_files")?,
            scripts: fields.object("scripts")?.map(|f| RawScripts::read(&f)).transpose()?,
        })
    }

    fn into_variant(self, ctx: &ParseContext) -> Result<Variant, SchemaViolation> {
        let mut dependencies = BTreeMap::new();
        for (key, range) in self.dependencies.unwrap_or_default() {
            let id = PackageIdentifier::parse(&key)
                .map_err(|e| SchemaViolation::new("variants[].dependencies", e.to_string()))?;
            let range = VersionRange::parse(&range).map_err(|e| {
                SchemaViolation::new(format!("variants[].dependencies.'{key}'"), e.to_string())
            })?;
            dependencies.insert(id, range);
        }

        let assets = self
            .assets
            .into_iter()
            .map(RawAsset::into_asset)
            .collect::<Result<Vec<_>, _>>()?;

        let preserve_files = self.preserve_files.unwrap_or_default();
        if let Some(path) = preserve_files.iter().find(|p| !validate::check_safe_place_path(p)) {
            return Err(SchemaViolation::new(
                "variants[].preserve_files[]",
                format!("Invalid preserve file path '{path}'"),
            ));
        }
        let remove_files = self.remove_files.unwrap_or_default();
        if let Some(path) = remove_files.iter().find(|p| !validate::check_safe_place_path(p)) {
            return Err(SchemaViolation::new(
                "variants[].remove_files[]",
                format!("Invalid remove file path '{path}'"),
            ));
        }

        let scripts = match self.scripts {
            Some(raw) => raw.into_scripts()?,
            None => Scripts::default(),
        };

        Ok(Variant {
            label: self.label.unwrap_or_default(),
            platform: self.platform.unwrap_or_else(|| ctx.host_platform.clone()),
            dependencies,
            assets,
            preserve_files,
            remove_files,
            scripts,
        })
    }
}

impl RawAsset {
    fn read(fields: &Fields) -> Result<Self, SchemaViolation> {
        let placements = fields
            .objects("placements")?
            .iter()
            .map(|p| -> Result<RawPlacement, SchemaViolation> {
                Ok(RawPlacement {
                    kind: p.required("type")?,
                    src: p.required("src")?,
                    dest: p.required("dest")?,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            kind: fields.required("type")?,
            urls: fields.optional("urls")?,
            placements,
        })
    }

    fn into_asset(self) -> Result<Asset, SchemaViolation> {
        let urls = self
            .urls
            .unwrap_or_default()
            .iter()
            .map(|text| {
                Url::parse(text).map_err(|e| {
                    SchemaViolation::new(
                        "variants[].assets[].urls[]",
                        format!("Invalid URL '{text}': {e}"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let placements = self
            .placements
            .into_iter()
            .map(|p| {
                if !validate::check_safe_place_path(&p.dest) {
                    return Err(SchemaViolation::new(
                        "variants[].assets[].placements[].dest",
                        format!("Path '{}' is unsafe to place", p.dest),
                    ));
                }
                Ok(Placement {
                    kind: p.kind.parse()?,
                    src: p.src,
                    dest: p.dest,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Asset {
            kind: self.kind.parse()?,
            urls,
            placements,
        })
    }
}

impl RawScripts {
    fn read(fields: &Fields) -> Result<Self, SchemaViolation> {
        Ok(Self {
            pre_install: fields.optional("pre_install")?,
            install: fields.optional("install")?,
            post_install: fields.optional("post_install")?,
            pre_pack: fields.optional("pre_pack")?,
            post_pack: fields.optional("post_pack")?,
            pre_uninstall: fields.optional("pre_uninstall")?,
            uninstall: fields.optional("uninstall")?,
            post_uninstall: fields.optional("post_uninstall")?,
            additional: fields
                .members()
                .filter(|(name, _)| !HOOKS.contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        })
    }

    fn into_scripts(self) -> Result<Scripts, SchemaViolation> {
        let mut additional = BTreeMap::new();
        for (name, value) in self.additional {
            let key = format!("variants[].assets[].scripts.'{name}'");
            if !validate::check_script_name(&name) {
                return Err(SchemaViolation::new(key, format!("Invalid script name '{name}'")));
            }
            let lines: Vec<String> = serde_json::from_value(value)
                .map_err(|_| SchemaViolation::new(key, "Invalid script list"))?;
            additional.insert(name, lines);
        }

        Ok(Scripts {
            pre_install: self.pre_install.unwrap_or_default(),
            install: self.install.unwrap_or_default(),
            post_install: self.post_install.unwrap_or_default(),
            pre_pack: self.pre_pack.unwrap_or_default(),
            post_pack: self.post_pack.unwrap_or_default(),
            pre_uninstall: self.pre_uninstall.unwrap_or_default(),
            uninstall: self.uninstall.unwrap_or_default(),
            post_uninstall: self.post_uninstall.unwrap_or_default(),
            additional,
        })
    }
}
