//! String grammars shared by identifiers and manifests

use std::sync::LazyLock;

use regex::Regex;

use crate::module;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(_[a-z0-9]+)*$").expect("valid label regex"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+(:[a-z0-9-]+)?$").expect("valid tag regex"));

/// A tooth path is a module path.
pub fn check_tooth_path(path: &str) -> bool {
    module::check_path(path).is_ok()
}

/// Variant labels are empty (the default variant) or lowercase words joined
/// by single underscores.
pub fn check_variant_label(label: &str) -> bool {
    label.is_empty() || LABEL_RE.is_match(label)
}

/// Script names share the variant label grammar but may not be empty.
pub fn check_script_name(name: &str) -> bool {
    LABEL_RE.is_match(name)
}

/// Tags are `name` or `name:value`.
pub fn check_tag(tag: &str) -> bool {
    TAG_RE.is_match(tag)
}

/// A placement destination or preserved/removed file path must stay inside
/// the working directory: relative, no drive prefix, no `..` segment.
pub fn check_safe_place_path(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return false;
    }
    !path.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tooth_path() {
        for path in [
            "example123.example-domain/example-pkg.example_pkg~Example123",
            "example.com/~a12",
            "github.com/user/repo",
        ] {
            assert!(check_tooth_path(path), "{path} should be valid");
        }
        for path in [
            "",
            "-example.com/pkg",
            "example.com//pkg",
            "example.com/pkg/",
            "example/pkg",
            "Example.com/pkg",
            "example\0.com/pkg",
            "example.com/../pkg",
            "example.com/.pkg",
            "example.com/pkg.",
            "example.com/p*kg",
            "example.com/con.pkg",
            "example.com/pkg~123",
        ] {
            assert!(!check_tooth_path(path), "{path:?} should be invalid");
        }
    }

    #[test]
    fn test_check_variant_label() {
        assert!(check_variant_label(""));
        assert!(check_variant_label("variant"));
        assert!(check_variant_label("variant_name"));
        assert!(check_variant_label("x64_v2"));
        assert!(!check_variant_label("invalid-variant"));
        assert!(!check_variant_label("invalid!variant"));
        assert!(!check_variant_label("Variant"));
        assert!(!check_variant_label("_variant"));
        assert!(!check_variant_label("variant__name"));
    }

    #[test]
    fn test_check_script_name() {
        assert!(check_script_name("script"));
        assert!(check_script_name("script_name"));
        assert!(!check_script_name(""));
        assert!(!check_script_name("script-name"));
        assert!(!check_script_name("script name"));
        assert!(!check_script_name("script_name!"));
    }

    #[test]
    fn test_check_tag() {
        assert!(check_tag("tag"));
        assert!(check_tag("tag:subtag"));
        assert!(check_tag("ll-se"));
        assert!(!check_tag("tag name"));
        assert!(!check_tag("tag!"));
        assert!(!check_tag("a:b:c"));
        assert!(!check_tag("Tag"));
    }

    #[test]
    fn test_check_safe_place_path() {
        assert!(check_safe_place_path("folder/subfolder"));
        assert!(check_safe_place_path("path"));
        assert!(check_safe_place_path("plugins/..hidden"));
        assert!(!check_safe_place_path("folder/../escape"));
        assert!(!check_safe_place_path("folder\\..\\escape"));
        assert!(!check_safe_place_path("/root"));
        assert!(!check_safe_place_path("\\root"));
        assert!(!check_safe_place_path("C:\\root"));
        assert!(!check_safe_place_path(".."));
    }
}
