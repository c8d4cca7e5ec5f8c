//! Generation 2 to generation 3
//!
//! A generation-2 manifest is flat: one asset URL, one file list and a list of
//! per-platform overrides. It becomes an ordered variant list:
//!
//! 1. an empty variant for the host platform,
//! 2. the top-level fields, with no platform,
//! 3. one variant per `platforms[]` entry.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{platform, MigrationContext, MigrationError};
use crate::manifest::{Fields, SchemaViolation, FORMAT_UUID, FORMAT_VERSION};

static LEGACY_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\((\w+)\)").expect("valid placeholder regex"));

/// Whether `doc` declares generation 2.
pub fn is_migratable(doc: &Value) -> bool {
    doc.get("format_version").and_then(Value::as_i64) == Some(2)
}

/// Rewrite a generation-2 document as generation 3.
pub fn migrate(doc: &Value, ctx: &MigrationContext) -> Result<Value, MigrationError> {
    // `$(version)` becomes `{{version}}` across the whole text, keys included.
    let text = serde_json::to_string(doc)?;
    let text = LEGACY_PLACEHOLDER_RE.replace_all(&text, "{{$1}}");
    let rewritten: Value = serde_json::from_str(&text)?;
    let raw = ManifestV2::read(&Fields::of(&rewritten, "")?)?;

    let mut variants = vec![Value::Object(Map::from_iter([(
        "platform".to_string(),
        Value::String(ctx.host_platform.clone()),
    )]))];
    variants.push(convert_variant(
        None,
        raw.asset_url.as_deref(),
        raw.commands.as_ref(),
        raw.dependencies.as_ref(),
        raw.files.as_ref(),
    ));
    for entry in &raw.platforms {
        let tag = platform::from_go(&entry.goos, entry.goarch.as_deref())?;
        variants.push(convert_variant(
            Some(tag),
            entry.asset_url.as_deref(),
            entry.commands.as_ref(),
            entry.dependencies.as_ref(),
            entry.files.as_ref(),
        ));
    }

    if !raw.prerequisites.is_empty() {
        tracing::debug!(tooth = %raw.tooth, "dropping generation 2 prerequisites");
    }

    let mut info = Map::new();
    info.insert("name".into(), Value::String(raw.info.name));
    info.insert("description".into(), Value::String(raw.info.description));
    info.insert("tags".into(), serde_json::to_value(raw.info.tags)?);
    if let Some(avatar_url) = raw.info.avatar_url {
        info.insert("avatar_url".into(), Value::String(avatar_url));
    }

    let mut out = Map::new();
    out.insert("format_version".into(), Value::from(FORMAT_VERSION));
    out.insert("format_uuid".into(), Value::String(FORMAT_UUID.to_string()));
    out.insert("tooth".into(), Value::String(raw.tooth));
    out.insert("version".into(), Value::String(raw.version));
    out.insert("info".into(), Value::Object(info));
    out.insert("variants".into(), Value::Array(variants));
    Ok(Value::Object(out))
}

/// Build one generation-3 variant. Empty fields are left out.
fn convert_variant(
    platform: Option<String>,
    asset_url: Option<&str>,
    commands: Option<&Commands>,
    dependencies: Option<&BTreeMap<String, String>>,
    files: Option<&Files>,
) -> Value {
    let mut variant = Map::new();
    if let Some(platform) = platform {
        variant.insert("platform".into(), Value::String(platform));
    }

    if let Some(dependencies) = dependencies.filter(|d| !d.is_empty()) {
        let map = dependencies
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        variant.insert("dependencies".into(), Value::Object(map));
    }

    let placements: Vec<Value> = files
        .map(|f| f.place.iter().map(convert_placement).collect())
        .unwrap_or_default();
    let asset = match asset_url {
        Some(url) => Some((asset_type_of(url), vec![Value::String(url.to_string())])),
        None if !placements.is_empty() => Some(("self", Vec::new())),
        None => None,
    };
    if let Some((kind, urls)) = asset {
        let mut asset = Map::new();
        asset.insert("type".into(), Value::String(kind.to_string()));
        asset.insert("urls".into(), Value::Array(urls));
        asset.insert("placements".into(), Value::Array(placements));
        variant.insert("assets".into(), Value::Array(vec![Value::Object(asset)]));
    }

    if let Some(files) = files {
        insert_list(&mut variant, "preserve_files", &files.preserve);
        insert_list(&mut variant, "remove_files", &files.remove);
    }

    if let Some(commands) = commands {
        let mut scripts = Map::new();
        insert_list(&mut scripts, "pre_install", &commands.pre_install);
        insert_list(&mut scripts, "post_install", &commands.post_install);
        insert_list(&mut scripts, "pre_uninstall", &commands.pre_uninstall);
        insert_list(&mut scripts, "post_uninstall", &commands.post_uninstall);
        if !scripts.is_empty() {
            variant.insert("scripts".into(), Value::Object(scripts));
        }
    }

    Value::Object(variant)
}

fn convert_placement(place: &Place) -> Value {
    let kind = if place.src.ends_with('*') { "dir" } else { "file" };
    let mut placement = Map::new();
    placement.insert("type".into(), Value::String(kind.to_string()));
    placement.insert("src".into(), Value::String(place.src.trim_end_matches('*').to_string()));
    placement.insert("dest".into(), Value::String(place.dest.trim_end_matches('*').to_string()));
    Value::Object(placement)
}

/// Guess the asset type from the last extension of `url`.
fn asset_type_of(url: &str) -> &'static str {
    match url.rsplit_once('.').map(|(_, ext)| ext) {
        Some("tar") => "tar",
        Some("tgz") | Some("gz") => "tgz",
        Some("zip") => "zip",
        _ => "uncompressed",
    }
}

fn insert_list(map: &mut Map<String, Value>, key: &str, items: &[String]) {
    if !items.is_empty() {
        let items = items.iter().cloned().map(Value::String).collect();
        map.insert(key.to_string(), Value::Array(items));
    }
}

// Generation-2 wire shapes. Also produced by the generation-1 migrator.

#[derive(Debug, Default, Serialize)]
pub(super) struct ManifestV2 {
    pub format_version: i64,
    pub tooth: String,
    pub version: String,
    pub info: InfoV2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Commands>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prerequisites: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Files>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<PlatformV2>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct InfoV2 {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct Commands {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_install: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_install: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_uninstall: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_uninstall: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct Files {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub place: Vec<Place>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preserve: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Place {
    pub src: String,
    pub dest: String,
}

#[derive(Debug, Serialize)]
pub(super) struct PlatformV2 {
    pub goos: String,
    pub goarch: Option<String>,
    pub asset_url: Option<String>,
    pub commands: Option<Commands>,
    pub dependencies: Option<BTreeMap<String, String>>,
    pub prerequisites: Option<BTreeMap<String, String>>,
    pub files: Option<Files>,
}

impl ManifestV2 {
    fn read(fields: &Fields) -> Result<Self, SchemaViolation> {
        Ok(Self {
            format_version: fields.required("format_version")?,
            tooth: fields.required("tooth")?,
            version: fields.required("version")?,
            info: fields.optional("info")?.unwrap_or_default(),
            asset_url: fields.optional("asset_url")?,
            commands: fields.optional("commands")?,
            dependencies: fields.optional("dependencies")?,
            prerequisites: fields.optional("prerequisites")?.unwrap_or_default(),
            files: fields.optional("files")?,
            platforms: fields
                .objects("platforms")?
                .iter()
                .map(PlatformV2::read)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl PlatformV2 {
    fn read(fields: &Fields) -> Result<Self, SchemaViolation> {
        Ok(Self {
            goos: fields.required("goos")?,
            goarch: fields.optional("goarch")?,
            asset_url: fields.optional("asset_url")?,
            commands: fields.optional("commands")?,
            dependencies: fields.optional("dependencies")?,
            prerequisites: fields.optional("prerequisites")?,
            files: fields.optional("files")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> MigrationContext {
        MigrationContext {
            host_platform: "linux-x64".to_string(),
        }
    }

    fn levilamina() -> Value {
        json!({
            "format_version": 2,
            "tooth": "github.com/LiteLDev/LeviLamina",
            "version": "1.1.0",
            "info": {
                "name": "LeviLamina",
                "description": "A lightweight, modular and versatile mod loader for Minecraft Bedrock Edition.",
                "author": "levimc",
                "tags": []
            },
            "asset_url": "https://github.com/LiteLDev/LeviLamina/releases/download/v$(version)/levilamina-release-windows-x64.zip",
            "dependencies": {
                "github.com/LiteLDev/bds": "1.21.60",
                "github.com/LiteLDev/CrashLogger": "1.3.x"
            },
            "files": {
                "place": [{ "src": "LeviLamina/*", "dest": "plugins/LeviLamina/" }],
                "remove": ["bedrock_server_mod.exe"]
            },
            "platforms": [{
                "goos": "windows",
                "goarch": "amd64",
                "commands": {
                    "post_install": [".\\PeEditor.exe -mb"],
                    "post_uninstall": ["IF EXIST bedrock_server.exe (DEL bedrock_server.exe.bak)"]
                }
            }]
        })
    }

    #[test]
    fn test_is_migratable() {
        assert!(is_migratable(&json!({ "format_version": 2 })));
        assert!(!is_migratable(&json!({ "format_version": 0 })));
        assert!(!is_migratable(&json!({ "format_version": "2" })));
        assert!(!is_migratable(&json!({ "foo": "bar" })));
    }

    #[test]
    fn test_migrate_levilamina() {
        let out = migrate(&levilamina(), &ctx()).unwrap();

        assert_eq!(out["format_version"], 3);
        assert_eq!(out["format_uuid"], FORMAT_UUID);
        assert_eq!(out["info"], json!({
            "name": "LeviLamina",
            "description": "A lightweight, modular and versatile mod loader for Minecraft Bedrock Edition.",
            "tags": []
        }));

        let variants = out["variants"].as_array().unwrap();
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0], json!({ "platform": "linux-x64" }));

        let base = &variants[1];
        assert!(base.get("platform").is_none());
        assert_eq!(base["assets"], json!([{
            "type": "zip",
            "urls": ["https://github.com/LiteLDev/LeviLamina/releases/download/v{{version}}/levilamina-release-windows-x64.zip"],
            "placements": [{ "type": "dir", "src": "LeviLamina/", "dest": "plugins/LeviLamina/" }]
        }]));
        assert_eq!(base["remove_files"], json!(["bedrock_server_mod.exe"]));
        assert_eq!(base["dependencies"]["github.com/LiteLDev/CrashLogger"], "1.3.x");

        assert_eq!(variants[2], json!({
            "platform": "win-x64",
            "scripts": {
                "post_install": [".\\PeEditor.exe -mb"],
                "post_uninstall": ["IF EXIST bedrock_server.exe (DEL bedrock_server.exe.bak)"]
            }
        }));
    }

    #[test]
    fn test_asset_type_sniffing() {
        assert_eq!(asset_type_of("https://e.com/a.tar"), "tar");
        assert_eq!(asset_type_of("https://e.com/a.tar.gz"), "tgz");
        assert_eq!(asset_type_of("https://e.com/a.tgz"), "tgz");
        assert_eq!(asset_type_of("https://e.com/a.zip"), "zip");
        assert_eq!(asset_type_of("https://e.com/a.exe"), "uncompressed");
    }

    #[test]
    fn test_placements_without_url_become_self_asset() {
        let doc = json!({
            "format_version": 2,
            "tooth": "example.com/pkg",
            "version": "1.0.0",
            "info": { "name": "", "description": "", "author": "", "tags": [] },
            "files": { "place": [{ "src": "bin/tool.exe", "dest": "tools/*" }] }
        });
        let out = migrate(&doc, &ctx()).unwrap();
        assert_eq!(out["variants"][1]["assets"], json!([{
            "type": "self",
            "urls": [],
            "placements": [{ "type": "file", "src": "bin/tool.exe", "dest": "tools/" }]
        }]));
    }

    #[test]
    fn test_unknown_platform_is_fatal() {
        let mut doc = levilamina();
        doc["platforms"][0]["goos"] = json!("plan9");
        assert!(matches!(
            migrate(&doc, &ctx()),
            Err(MigrationError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn test_missing_tooth_is_schema_violation() {
        let doc = json!({ "format_version": 2, "version": "1.0.0" });
        assert!(matches!(
            migrate(&doc, &ctx()),
            Err(MigrationError::SchemaViolation(v)) if v.key == "tooth"
        ));
    }

    #[test]
    fn test_structural_violation_keys() {
        let cases = [
            (json!({ "version": 110 }), "version"),
            (json!({ "files": { "place": "bin/" } }), "files"),
            (json!({ "platforms": [{ "goarch": "amd64" }] }), "platforms[].goos"),
            (
                json!({ "platforms": [{ "goos": "windows", "commands": "echo" }] }),
                "platforms[].commands",
            ),
        ];
        for (patch, key) in cases {
            let mut doc = levilamina();
            for (k, v) in patch.as_object().unwrap() {
                doc[k] = v.clone();
            }
            match migrate(&doc, &ctx()) {
                Err(MigrationError::SchemaViolation(v)) => assert_eq!(v.key, key, "patch {patch}"),
                other => panic!("expected a schema violation for {patch}, got {other:?}"),
            }
        }
    }
}
