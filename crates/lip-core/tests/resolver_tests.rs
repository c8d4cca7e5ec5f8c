//! Integration tests for lock graph analysis and version resolution

use lip_core::{
    DependencyResolver, LockGraph, MemoryIndex, PackageLock, PackageSpecifier, ParseContext,
    ResolverError, FORMAT_UUID,
};
use serde_json::{json, Value};

const PLATFORM: &str = "linux-x64";

fn entry(tooth: &str, version: &str, deps: Value, locked: bool) -> Value {
    json!({
        "files": [],
        "locked": locked,
        "manifest": {
            "format_version": 3,
            "format_uuid": FORMAT_UUID,
            "tooth": tooth,
            "version": version,
            "variants": [{ "label": "", "platform": PLATFORM, "dependencies": deps }]
        },
        "variant": ""
    })
}

fn lock(entries: Vec<Value>) -> PackageLock {
    let text = json!({
        "format_version": 3,
        "format_uuid": FORMAT_UUID,
        "packages": entries
    })
    .to_string();
    PackageLock::from_json_str_with(
        &text,
        &ParseContext {
            host_platform: PLATFORM.to_string(),
        },
    )
    .unwrap()
}

fn spec(text: &str) -> PackageSpecifier {
    PackageSpecifier::parse(text).unwrap()
}

#[test]
fn test_unnecessary_packages_from_lock_file() {
    let lock = lock(vec![
        entry("example.com/a", "1.0.0", json!({}), false),
        entry("example.com/b", "1.0.0", json!({}), true),
        entry("example.com/c", "1.0.0", json!({ "example.com/d": "^1.0.0" }), false),
        entry("example.com/d", "1.0.0", json!({ "example.com/e": "^1.0.0" }), true),
        entry("example.com/e", "1.0.0", json!({}), false),
        entry("example.com/f", "1.0.0", json!({ "example.com/g": "^1.0.0" }), false),
        entry("example.com/g", "1.0.0", json!({}), false),
    ]);

    let unnecessary: Vec<String> = LockGraph::new(&lock, PLATFORM)
        .unnecessary()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        unnecessary,
        vec!["example.com/a", "example.com/c", "example.com/f", "example.com/g"]
    );
}

#[test]
fn test_everything_needed_when_all_locked() {
    let lock = lock(vec![
        entry("example.com/a", "1.0.0", json!({ "example.com/b": "*" }), true),
        entry("example.com/b", "1.0.0", json!({}), true),
    ]);
    assert!(LockGraph::new(&lock, PLATFORM).unnecessary().is_empty());
}

#[test]
fn test_missing_dependency_is_ignored() {
    let lock = lock(vec![entry(
        "example.com/a",
        "1.0.0",
        json!({ "example.com/missing": "^1.0.0" }),
        true,
    )]);
    let graph = LockGraph::new(&lock, PLATFORM);
    assert!(graph.unnecessary().is_empty());
    assert_eq!(graph.topo_sort().unwrap().len(), 1);
}

#[test]
fn test_install_order() {
    let lock = lock(vec![
        entry("example.com/app", "1.0.0", json!({ "example.com/lib": "^1.0.0" }), true),
        entry("example.com/lib", "1.2.0", json!({ "example.com/base": "^1.0.0" }), false),
        entry("example.com/base", "1.0.0", json!({}), false),
    ]);
    let order: Vec<String> = LockGraph::new(&lock, PLATFORM)
        .topo_sort()
        .unwrap()
        .iter()
        .map(|p| p.specifier().to_string())
        .collect();
    assert_eq!(
        order,
        vec!["example.com/base@1.0.0", "example.com/lib@1.2.0", "example.com/app@1.0.0"]
    );
}

#[test]
fn test_cycle_reported() {
    let lock = lock(vec![
        entry("example.com/a", "1.0.0", json!({ "example.com/b": "*" }), true),
        entry("example.com/b", "1.0.0", json!({ "example.com/a": "*" }), false),
    ]);
    match LockGraph::new(&lock, PLATFORM).topo_sort() {
        Err(ResolverError::CircularDependency(path)) => {
            assert_eq!(path, "example.com/b -> example.com/a");
        }
        other => panic!("expected a cycle, got {:?}", other.map(|v| v.len())),
    }
}

#[test]
fn test_resolve_from_lock_index() {
    let installed = lock(vec![
        entry("example.com/app", "1.0.0", json!({ "example.com/lib": "^1.0.0" }), true),
        entry("example.com/lib", "1.1.0", json!({}), false),
        entry("example.com/lib", "1.4.0", json!({}), false),
    ]);
    let mut index = MemoryIndex::new();
    index.add_lock(&installed, PLATFORM);

    let resolved = DependencyResolver::new(&index)
        .resolve(&[spec("example.com/app@1.0.0")])
        .unwrap()
        .unwrap();
    assert_eq!(
        resolved,
        vec![spec("example.com/app@1.0.0"), spec("example.com/lib@1.4.0")]
    );

    let pinned = DependencyResolver::new(&index)
        .resolve(&[spec("example.com/app@1.0.0"), spec("example.com/lib@1.1.0")])
        .unwrap()
        .unwrap();
    assert!(pinned.contains(&spec("example.com/lib@1.1.0")));
}

#[test]
fn test_wildcard_only_root_contributes_no_edges() {
    // No variant names linux-x64 exactly, so the root's dependencies are unreachable.
    let mut root = entry("example.com/root", "1.0.0", json!({}), true);
    root["manifest"]["variants"] = json!([
        { "label": "*", "platform": "*", "dependencies": { "example.com/dep": "^1.0.0" } }
    ]);
    let lock = lock(vec![root, entry("example.com/dep", "1.0.0", json!({}), false)]);

    let graph = LockGraph::new(&lock, PLATFORM);
    let unnecessary: Vec<String> = graph.unnecessary().iter().map(ToString::to_string).collect();
    assert_eq!(unnecessary, vec!["example.com/dep"]);
    assert_eq!(graph.topo_sort().unwrap().len(), 2);
}
