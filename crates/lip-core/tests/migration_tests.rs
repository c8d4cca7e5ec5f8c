//! Integration tests for migrating older tooth.json generations

use lip_core::{AssetType, MigrationContext, MigrationError, Migrator, PlacementType, FORMAT_UUID};
use serde_json::json;

fn migrator(platform: &str) -> Migrator {
    Migrator::new(MigrationContext {
        host_platform: platform.to_string(),
    })
}

const HELPER_LIB_V1: &str = r#"{
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
    "placement": [
        { "source": "src/*", "destination": "declaration/llse/*" }
    ]
}"#;

const LEVILAMINA_V2: &str = r#"{
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
    "platforms": [
        {
            "goos": "windows",
            "goarch": "amd64",
            "commands": {
                "post_install": [".\\PeEditor.exe -mb"]
            }
        }
    ]
}"#;

#[test]
fn test_helper_lib_from_generation_1() {
    let manifest = migrator("win-x64").load_manifest(HELPER_LIB_V1).unwrap();

    assert_eq!(manifest.tooth_path, "github.com/LiteLScript-Dev/HelperLib");
    assert_eq!(manifest.version.to_string(), "2.14.1");
    assert_eq!(manifest.info.name, "HelperLib");
    assert_eq!(manifest.variants.len(), 2);

    let variant = manifest.resolve_variant("", "win-x64").unwrap();
    assert!(variant.dependencies.is_empty());
    assert_eq!(variant.assets.len(), 1);
    assert_eq!(variant.assets[0].kind, AssetType::SelfContained);

    let placement = &variant.assets[0].placements[0];
    assert_eq!(placement.kind, PlacementType::Dir);
    assert_eq!(placement.src, "src/");
    assert_eq!(placement.dest, "declaration/llse/");
}

#[test]
fn test_levilamina_from_generation_2() {
    let manifest = migrator("win-x64").load_manifest(LEVILAMINA_V2).unwrap();
    assert_eq!(manifest.variants.len(), 3);

    let variant = manifest.resolve_variant("", "win-x64").unwrap();
    assert_eq!(variant.dependencies.len(), 2);
    assert_eq!(variant.assets[0].kind, AssetType::Zip);
    assert_eq!(
        variant.assets[0].urls[0].as_str(),
        "https://github.com/LiteLDev/LeviLamina/releases/download/v1.1.0/levilamina-release-windows-x64.zip"
    );
    assert_eq!(variant.remove_files, vec!["bedrock_server_mod.exe"]);
    assert_eq!(variant.scripts.post_install, vec![".\\PeEditor.exe -mb"]);
}

#[test]
fn test_platform_specific_parts_stay_scoped() {
    let manifest = migrator("linux-x64").load_manifest(LEVILAMINA_V2).unwrap();

    // The base variant follows the host, the windows commands do not.
    let variant = manifest.resolve_variant("", "linux-x64").unwrap();
    assert_eq!(variant.assets.len(), 1);
    assert!(variant.scripts.post_install.is_empty());
    assert_eq!(manifest.variants[2].platform, "win-x64");
}

#[test]
fn test_migrated_document_is_current() {
    let migrated = migrator("win-x64").migrate_str(LEVILAMINA_V2).unwrap();
    assert_eq!(migrated["format_version"], 3);
    assert_eq!(migrated["format_uuid"], FORMAT_UUID);

    let again = migrator("win-x64").migrate(&migrated).unwrap();
    assert_eq!(again, migrated);
}

#[test]
fn test_unsupported_platform() {
    let text = LEVILAMINA_V2.replace("\"amd64\"", "\"mips\"");
    match migrator("win-x64").load_manifest(&text) {
        Err(MigrationError::UnsupportedPlatform { goos, goarch }) => {
            assert_eq!(goos, "windows");
            assert_eq!(goarch.as_deref(), Some("mips"));
        }
        other => panic!("expected unsupported platform, got {other:?}"),
    }
}

#[test]
fn test_unsupported_format() {
    let err = migrator("win-x64")
        .migrate(&json!({ "format_version": 0, "tooth": "example.com/pkg" }))
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnsupportedFormat(v) if v == json!(0)));
}

#[test]
fn test_generation_1_requires_tooth() {
    let err = migrator("win-x64")
        .migrate(&json!({ "format_version": 1, "version": "1.0.0" }))
        .unwrap_err();
    assert!(matches!(err, MigrationError::SchemaViolation(v) if v.key == "tooth"));
}

#[test]
fn test_override_without_goarch_applies_to_every_arch() {
    let doc = json!({
        "format_version": 2,
        "tooth": "example.com/pkg",
        "version": "1.0.0",
        "platforms": [
            { "goos": "windows", "commands": { "post_install": ["echo win"] } }
        ]
    })
    .to_string();

    for host in ["win-x64", "win-arm64"] {
        let manifest = migrator(host).load_manifest(&doc).unwrap();
        assert_eq!(manifest.variants[2].platform, "win-*");

        let variant = manifest.resolve_variant("", host).unwrap();
        assert_eq!(variant.scripts.post_install, vec!["echo win"], "host {host}");
    }

    let manifest = migrator("linux-x64").load_manifest(&doc).unwrap();
    let variant = manifest.resolve_variant("", "linux-x64").unwrap();
    assert!(variant.scripts.post_install.is_empty());
}
