//! Module, import and file path grammar
//!
//! Validation, major-version splitting and case escaping for Go-style module
//! paths. Tooth paths use the module grammar verbatim.

use std::fmt;

use thiserror::Error;

use super::semver;

/// Errors produced by path and version checks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A path failed validation
    #[error("malformed {kind} path {path:?}: {reason}")]
    InvalidPath {
        kind: PathKind,
        path: String,
        reason: String,
    },

    /// A version string is not usable in this position
    #[error("version {version:?} invalid: {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Escaping was asked to handle a string that validation should have rejected
    #[error("internal error: inconsistency in escape")]
    Inconsistency,
}

/// Which grammar a path is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// Module paths, the strictest grammar
    Module,
    /// Import paths: module grammar plus `+` and leading dots
    Import,
    /// File paths inside a module
    File,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PathKind::Module => "module",
            PathKind::Import => "import",
            PathKind::File => "file",
        };
        f.write_str(name)
    }
}

const BAD_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Check that `path` is a valid module path.
///
/// Beyond the per-element rules, the first element must contain a dot, must
/// not start with a dash and may only use lowercase ASCII, digits, `-` and
/// `.`. A trailing major version suffix (`/v2`) must be well formed.
pub fn check_path(path: &str) -> Result<(), PathError> {
    let fail = |reason: String| PathError::InvalidPath {
        kind: PathKind::Module,
        path: path.to_string(),
        reason,
    };

    check_path_kind(path, PathKind::Module).map_err(fail)?;

    let first = path.split('/').next().unwrap_or_default();
    if first.is_empty() {
        return Err(fail("leading slash".to_string()));
    }
    if !first.contains('.') {
        return Err(fail("missing dot in first path element".to_string()));
    }
    if path.starts_with('-') {
        return Err(fail("leading dash in first path element".to_string()));
    }
    if let Some(c) = first.chars().find(|&c| !first_path_ok(c)) {
        return Err(fail(format!("invalid char {c:?} in first path element")));
    }
    if split_path_version(path).is_none() {
        return Err(fail("invalid version".to_string()));
    }
    Ok(())
}

/// Check that `path` is a valid import path.
pub fn check_import_path(path: &str) -> Result<(), PathError> {
    check_path_kind(path, PathKind::Import).map_err(|reason| PathError::InvalidPath {
        kind: PathKind::Import,
        path: path.to_string(),
        reason,
    })
}

/// Check that `path` is a valid file path inside a module.
pub fn check_file_path(path: &str) -> Result<(), PathError> {
    check_path_kind(path, PathKind::File).map_err(|reason| PathError::InvalidPath {
        kind: PathKind::File,
        path: path.to_string(),
        reason,
    })
}

fn check_path_kind(path: &str, kind: PathKind) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty string".to_string());
    }
    if path.starts_with('-') && kind != PathKind::File {
        return Err("leading dash".to_string());
    }
    if path.contains("//") {
        return Err("double slash".to_string());
    }
    if path.ends_with('/') {
        return Err("trailing slash".to_string());
    }
    path.split('/').try_for_each(|elem| check_elem(elem, kind))
}

/// Check a single path element against the grammar for `kind`.
pub(crate) fn check_elem(elem: &str, kind: PathKind) -> Result<(), String> {
    if elem.is_empty() {
        return Err("empty path element".to_string());
    }
    if elem.bytes().all(|c| c == b'.') {
        return Err(format!("invalid path element {elem:?}"));
    }
    if elem.starts_with('.') && kind == PathKind::Module {
        return Err("leading dot in path element".to_string());
    }
    if elem.ends_with('.') {
        return Err("trailing dot in path element".to_string());
    }

    let allowed = match kind {
        PathKind::Module => mod_path_ok,
        PathKind::Import => import_path_ok,
        PathKind::File => file_name_ok,
    };
    if let Some(c) = elem.chars().find(|&c| !allowed(c)) {
        return Err(format!("invalid char {c:?}"));
    }

    // Windows disallows these names even with an extension.
    let short = elem.split('.').next().unwrap_or(elem);
    if BAD_WINDOWS_NAMES
        .iter()
        .any(|bad| bad.eq_ignore_ascii_case(short))
    {
        return Err(format!(
            "{short:?} disallowed as path element component on Windows"
        ));
    }

    if kind == PathKind::File {
        return Ok(());
    }

    // Reject Windows 8.3 short names such as `PROGRA~1`.
    if let Some(tilde) = short.rfind('~') {
        let suffix = &short[tilde + 1..];
        if !suffix.is_empty() && suffix.bytes().all(|c| c.is_ascii_digit()) {
            return Err("trailing tilde and digits in path element".to_string());
        }
    }

    Ok(())
}

fn first_path_ok(c: char) -> bool {
    c == '-' || c == '.' || c.is_ascii_digit() || c.is_ascii_lowercase()
}

fn mod_path_ok(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn import_path_ok(c: char) -> bool {
    mod_path_ok(c) || c == '+'
}

fn file_name_ok(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_alphanumeric() || "!#$%&()+,-.=@[]^_{}~ ".contains(c);
    }
    c.is_alphabetic()
}

/// Split a module path into its prefix and major version suffix.
///
/// Returns `(prefix, path_major)` where `path_major` is `""`, `"/vN"` or, for
/// `gopkg.in` paths, `".vN"`. Returns `None` if the suffix is malformed, for
/// instance `/v1`, `/v0` or `/v2.0`.
pub fn split_path_version(path: &str) -> Option<(&str, &str)> {
    if path.starts_with("gopkg.in/") {
        return split_gopkg_in(path);
    }

    let bytes = path.as_bytes();
    let mut i = bytes.len();
    let mut dot = false;
    while i > 0 && (bytes[i - 1].is_ascii_digit() || bytes[i - 1] == b'.') {
        if bytes[i - 1] == b'.' {
            dot = true;
        }
        i -= 1;
    }
    if i <= 1 || i == bytes.len() || bytes[i - 1] != b'v' || bytes[i - 2] != b'/' {
        return Some((path, ""));
    }

    let (prefix, path_major) = path.split_at(i - 2);
    if dot || path_major.len() <= 2 || path_major.as_bytes()[2] == b'0' || path_major == "/v1" {
        return None;
    }
    Some((prefix, path_major))
}

fn split_gopkg_in(path: &str) -> Option<(&str, &str)> {
    let bytes = path.as_bytes();
    let mut i = bytes.len();
    if path.ends_with("-unstable") {
        i -= "-unstable".len();
    }
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i <= 1 || bytes[i - 1] != b'v' || bytes[i - 2] != b'.' {
        return None;
    }

    let (prefix, path_major) = path.split_at(i - 2);
    if path_major.len() <= 2 || (path_major.as_bytes()[2] == b'0' && path_major != ".v0") {
        return None;
    }
    Some((prefix, path_major))
}

/// Check that version `v` is allowed under the major suffix `path_major`.
pub fn check_path_major(v: &str, path_major: &str) -> Result<(), PathError> {
    let mut path_major = path_major;
    if path_major.starts_with(".v") {
        path_major = path_major.strip_suffix("-unstable").unwrap_or(path_major);
    }
    // gopkg.in .v1 modules were once published with v0.0.0 pseudo-versions.
    if v.starts_with("v0.0.0-") && path_major == ".v1" {
        return Ok(());
    }

    let m = semver::major(v);
    let expected = if path_major.is_empty() {
        if m == "v0" || m == "v1" || semver::build(v) == "+incompatible" {
            return Ok(());
        }
        "v0 or v1"
    } else if path_major.starts_with('/') || path_major.starts_with('.') {
        if m == path_major[1..] {
            return Ok(());
        }
        &path_major[1..]
    } else {
        path_major
    };

    Err(PathError::InvalidVersion {
        version: v.to_string(),
        reason: format!("should be {expected}, not {m}"),
    })
}

/// Report whether version `v` is allowed under `path_major`.
pub fn match_path_major(v: &str, path_major: &str) -> bool {
    check_path_major(v, path_major).is_ok()
}

/// Canonical form of `v`, keeping a `+incompatible` build suffix.
pub fn canonical_version(v: &str) -> String {
    let cv = semver::canonical(v);
    if semver::build(v) == "+incompatible" {
        return cv + "+incompatible";
    }
    cv
}

/// Escape a module path for use in proxy URLs and on case-insensitive file
/// systems. Uppercase letters become `!` followed by the lowercase letter.
pub fn escape_path(path: &str) -> Result<String, PathError> {
    check_path(path)?;
    escape_string(path)
}

/// Escape a version for use in proxy URLs.
pub fn escape_version(v: &str) -> Result<String, PathError> {
    if let Err(reason) = check_elem(v, PathKind::File) {
        return Err(PathError::InvalidVersion {
            version: v.to_string(),
            reason,
        });
    }
    if v.contains('!') {
        return Err(PathError::InvalidVersion {
            version: v.to_string(),
            reason: "disallowed version string".to_string(),
        });
    }
    escape_string(v)
}

/// Reverse [`escape_path`], checking the result is a valid module path.
pub fn unescape_path(escaped: &str) -> Result<String, PathError> {
    let path = unescape_string(escaped).ok_or_else(|| PathError::InvalidPath {
        kind: PathKind::Module,
        path: escaped.to_string(),
        reason: "invalid escaped module path".to_string(),
    })?;
    check_path(&path)?;
    Ok(path)
}

/// Reverse [`escape_version`].
pub fn unescape_version(escaped: &str) -> Result<String, PathError> {
    let v = unescape_string(escaped).ok_or_else(|| PathError::InvalidVersion {
        version: escaped.to_string(),
        reason: "invalid escaped version".to_string(),
    })?;
    check_elem(&v, PathKind::File).map_err(|reason| PathError::InvalidVersion {
        version: v.clone(),
        reason: format!("invalid escaped version {escaped:?}: {reason}"),
    })?;
    Ok(v)
}

fn escape_string(s: &str) -> Result<String, PathError> {
    if s.chars().any(|c| c == '!' || !c.is_ascii()) {
        return Err(PathError::Inconsistency);
    }

    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn unescape_string(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut bang = false;
    for c in escaped.chars() {
        if !c.is_ascii() {
            return None;
        }
        if bang {
            bang = false;
            if !c.is_ascii_lowercase() {
                return None;
            }
            out.push(c.to_ascii_uppercase());
            continue;
        }
        if c == '!' {
            bang = true;
            continue;
        }
        if c.is_ascii_uppercase() {
            return None;
        }
        out.push(c);
    }
    if bang {
        return None;
    }
    Some(out)
}
