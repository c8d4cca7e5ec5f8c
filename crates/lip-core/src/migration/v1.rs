//! Generation 1 to generation 3, by way of generation 2

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::v2::{self, Commands, Files, InfoV2, ManifestV2, Place};
use super::{MigrationContext, MigrationError};
use crate::manifest::{Fields, SchemaViolation};

/// Whether `doc` declares generation 1.
pub fn is_migratable(doc: &Value) -> bool {
    doc.get("format_version").and_then(Value::as_i64) == Some(1)
}

/// Rewrite a generation-1 document as generation 3.
pub fn migrate(doc: &Value, ctx: &MigrationContext) -> Result<Value, MigrationError> {
    let raw = ManifestV1::read(&Fields::of(doc, "")?)?;

    let dependencies = raw.dependencies.map(|deps| {
        deps.into_iter()
            .map(|(tooth, groups)| {
                let range = groups
                    .iter()
                    .map(|group| group.join(" && "))
                    .collect::<Vec<_>>()
                    .join(" || ");
                (tooth, range)
            })
            .collect()
    });

    let files = (raw.placement.is_some() || raw.possession.is_some()).then(|| Files {
        place: raw
            .placement
            .unwrap_or_default()
            .into_iter()
            .map(|p| Place {
                src: p.source,
                dest: p.destination.trim_end_matches('*').to_string(),
            })
            .collect(),
        preserve: raw.possession.unwrap_or_default(),
        remove: Vec::new(),
    });

    let intermediate = ManifestV2 {
        format_version: 2,
        tooth: raw.tooth,
        version: raw.version,
        info: convert_information(raw.information.as_ref()),
        commands: raw.commands.as_deref().and_then(convert_commands),
        dependencies,
        files,
        ..ManifestV2::default()
    };

    tracing::debug!(tooth = %intermediate.tooth, "migrated generation 1 manifest to generation 2");
    v2::migrate(&serde_json::to_value(&intermediate)?, ctx)
}

fn convert_information(information: Option<&BTreeMap<String, Value>>) -> InfoV2 {
    let Some(information) = information else {
        return InfoV2::default();
    };
    let text = |key: &str| {
        information
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let tags = information
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    InfoV2 {
        name: text("name"),
        description: text("description"),
        author: text("author"),
        tags,
        avatar_url: None,
    }
}

/// Fold the flat command list into hook buckets. `None` when nothing is kept.
fn convert_commands(commands: &[CommandV1]) -> Option<Commands> {
    let mut result = Commands::default();
    for command in commands {
        if command.kind.eq_ignore_ascii_case("install") {
            result.post_install.extend(command.commands.iter().cloned());
        } else if command.kind.eq_ignore_ascii_case("uninstall") {
            result.post_uninstall.extend(command.commands.iter().cloned());
        } else {
            tracing::warn!(kind = %command.kind, "dropping generation 1 command of unknown type");
        }
    }
    (!result.post_install.is_empty() || !result.post_uninstall.is_empty()).then_some(result)
}

#[derive(Debug)]
struct ManifestV1 {
    tooth: String,
    version: String,
    dependencies: Option<BTreeMap<String, Vec<Vec<String>>>>,
    information: Option<BTreeMap<String, Value>>,
    placement: Option<Vec<PlacementV1>>,
    possession: Option<Vec<String>>,
    commands: Option<Vec<CommandV1>>,
}

impl ManifestV1 {
    fn read(fields: &Fields) -> Result<Self, SchemaViolation> {
        Ok(Self {
            tooth: fields.required("tooth")?,
            version: fields.required("version")?,
            dependencies: fields.optional("dependencies")?,
            information: fields.optional("information")?,
            placement: fields.optional("placement")?,
            possession: fields.optional("possession")?,
            commands: fields.optional("commands")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PlacementV1 {
    source: String,
    destination: String,
}

#[derive(Debug, Deserialize)]
struct CommandV1 {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    commands: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> MigrationContext {
        MigrationContext {
            host_platform: "win-x64".to_string(),
        }
    }

    fn helper_lib() -> Value {
        json!({
            "format_version": 1,
            "tooth": "github.com/LiteLScript-Dev/HelperLib",
            "version": "2.14.1",
            "dependencies": {},
            "information": {
                "name": "HelperLib",
                "description": "Declaration files for LiteLoaderBDS scripts",
                "author": "LiteLScript-Dev",
                "license": "MIT",
                "homepage": "github.com/LiteLScript-Dev/HelperLib"
            },
            "placement": [{ "source": "src/*", "destination": "declaration/llse/*" }]
        })
    }

    #[test]
    fn test_is_migratable() {
        assert!(is_migratable(&json!({ "format_version": 1 })));
        assert!(!is_migratable(&json!({ "format_version": 2 })));
        assert!(!is_migratable(&json!({ "format_version": "1" })));
        assert!(!is_migratable(&json!({ "format_version": 1.5 })));
        assert!(!is_migratable(&json!({})));
    }

    #[test]
    fn test_migrate_helper_lib() {
        let out = migrate(&helper_lib(), &ctx()).unwrap();

        assert_eq!(out["tooth"], "github.com/LiteLScript-Dev/HelperLib");
        assert_eq!(out["version"], "2.14.1");
        assert_eq!(out["info"]["name"], "HelperLib");
        assert_eq!(out["info"]["tags"], json!([]));
        assert!(out["info"].get("author").is_none());

        let variants = out["variants"].as_array().unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0], json!({ "platform": "win-x64" }));
        assert_eq!(variants[1], json!({
            "assets": [{
                "type": "self",
                "urls": [],
                "placements": [{ "type": "dir", "src": "src/", "dest": "declaration/llse/" }]
            }]
        }));
    }

    #[test]
    fn test_information_with_wrong_types() {
        let info = BTreeMap::from([
            ("name".to_string(), json!(42)),
            ("tags".to_string(), json!(["a", 1, "b"])),
        ]);
        let converted = convert_information(Some(&info));
        assert_eq!(converted.name, "");
        assert_eq!(converted.description, "");
        assert_eq!(converted.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_dependency_groups_joined() {
        let mut doc = helper_lib();
        doc["dependencies"] = json!({
            "example.com/dep": [[">=1.0.0", "<2.0.0"], ["3.0.0"]]
        });
        let out = migrate(&doc, &ctx()).unwrap();
        assert_eq!(
            out["variants"][1]["dependencies"]["example.com/dep"],
            ">=1.0.0 && <2.0.0 || 3.0.0"
        );
    }

    #[test]
    fn test_commands_folded_by_type() {
        let mut doc = helper_lib();
        doc["commands"] = json!([
            { "type": "Install", "commands": ["echo a"], "GOOS": "windows" },
            { "type": "uninstall", "commands": ["echo b"], "GOOS": "windows" },
            { "type": "upgrade", "commands": ["echo c"], "GOOS": "windows" },
            { "type": "install", "commands": ["echo d"], "GOOS": "linux" }
        ]);
        let out = migrate(&doc, &ctx()).unwrap();
        assert_eq!(out["variants"][1]["scripts"], json!({
            "post_install": ["echo a", "echo d"],
            "post_uninstall": ["echo b"]
        }));
    }

    #[test]
    fn test_structural_violation_keys() {
        let cases = [
            (json!({ "tooth": 7 }), "tooth"),
            (json!({ "dependencies": { "example.com/dep": ">=1.0.0" } }), "dependencies"),
            (json!({ "placement": [{ "source": "src/*" }] }), "placement"),
        ];
        for (patch, key) in cases {
            let mut doc = helper_lib();
            for (k, v) in patch.as_object().unwrap() {
                doc[k] = v.clone();
            }
            match migrate(&doc, &ctx()) {
                Err(MigrationError::SchemaViolation(v)) => assert_eq!(v.key, key, "patch {patch}"),
                other => panic!("expected a schema violation for {patch}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_possession_becomes_preserve_files() {
        let mut doc = helper_lib();
        doc["possession"] = json!(["config/"]);
        let out = migrate(&doc, &ctx()).unwrap();
        assert_eq!(out["variants"][1]["preserve_files"], json!(["config/"]));
    }
}
