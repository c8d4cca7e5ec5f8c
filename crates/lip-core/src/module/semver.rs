//! Go-style semantic version grammar
//!
//! Versions here always carry a leading `v` (`v1.2.3-pre+build`) and may omit
//! the minor and patch components (`v1`, `v1.2`). This is the grammar module
//! proxies speak, so every function is string-in, string-out.

use std::cmp::Ordering;

/// Components of a successfully parsed version.
///
/// `prerelease` keeps its leading `-` and `build` its leading `+`, so they can
/// be spliced back into the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Parsed<'a> {
    pub major: &'a str,
    pub minor: &'a str,
    pub patch: &'a str,
    /// Suffix needed to complete a shorthand version (`".0"` or `".0.0"`)
    pub short: &'static str,
    pub prerelease: &'a str,
    pub build: &'a str,
}

/// Parse a version, returning `None` for anything that is not well formed.
pub fn parse(v: &str) -> Option<Parsed<'_>> {
    let rest = v.strip_prefix('v')?;

    let (major, rest) = parse_int(rest)?;
    let mut p = Parsed {
        major,
        ..Parsed::default()
    };
    if rest.is_empty() {
        p.minor = "0";
        p.patch = "0";
        p.short = ".0.0";
        return Some(p);
    }

    let rest = rest.strip_prefix('.')?;
    let (minor, rest) = parse_int(rest)?;
    p.minor = minor;
    if rest.is_empty() {
        p.patch = "0";
        p.short = ".0";
        return Some(p);
    }

    let rest = rest.strip_prefix('.')?;
    let (patch, mut rest) = parse_int(rest)?;
    p.patch = patch;

    if rest.starts_with('-') {
        let (prerelease, tail) = parse_prerelease(rest)?;
        p.prerelease = prerelease;
        rest = tail;
    }
    if rest.starts_with('+') {
        let (build, tail) = parse_build(rest)?;
        p.build = build;
        rest = tail;
    }
    if !rest.is_empty() {
        return None;
    }

    Some(p)
}

/// Report whether `v` is a valid version.
pub fn is_valid(v: &str) -> bool {
    parse(v).is_some()
}

/// Canonical form of `v`: all three components present, build metadata
/// dropped. Returns an empty string when `v` is invalid.
pub fn canonical(v: &str) -> String {
    let Some(p) = parse(v) else {
        return String::new();
    };
    if !p.build.is_empty() {
        return v[..v.len() - p.build.len()].to_string();
    }
    if !p.short.is_empty() {
        return format!("{v}{}", p.short);
    }
    v.to_string()
}

/// Major version prefix (`"v2"`), or empty when invalid.
pub fn major(v: &str) -> String {
    match parse(v) {
        Some(p) => v[..1 + p.major.len()].to_string(),
        None => String::new(),
    }
}

/// Major and minor prefix (`"v2.1"`), or empty when invalid.
pub fn major_minor(v: &str) -> String {
    let Some(p) = parse(v) else {
        return String::new();
    };
    let i = 1 + p.major.len();
    let j = i + 1 + p.minor.len();
    if j <= v.len() && v.as_bytes()[i] == b'.' && &v[i + 1..j] == p.minor {
        return v[..j].to_string();
    }
    format!("{}.{}", &v[..i], p.minor)
}

/// Prerelease suffix including the leading `-`, or empty.
pub fn prerelease(v: &str) -> String {
    parse(v).map(|p| p.prerelease.to_string()).unwrap_or_default()
}

/// Build suffix including the leading `+`, or empty.
pub fn build(v: &str) -> String {
    parse(v).map(|p| p.build.to_string()).unwrap_or_default()
}

/// Compare two versions by semantic version precedence.
///
/// Invalid versions are equal to each other and lower than every valid
/// version. Build metadata never affects the result.
pub fn compare(v: &str, w: &str) -> Ordering {
    if v == w {
        return Ordering::Equal;
    }
    let (pv, pw) = match (parse(v), parse(w)) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(pv), Some(pw)) => (pv, pw),
    };

    compare_int(pv.major, pw.major)
        .then_with(|| compare_int(pv.minor, pw.minor))
        .then_with(|| compare_int(pv.patch, pw.patch))
        .then_with(|| compare_prerelease(pv.prerelease, pw.prerelease))
}

/// The larger of two versions, in canonical form.
pub fn max(v: &str, w: &str) -> String {
    let v = canonical(v);
    let w = canonical(w);
    if compare(&v, &w) == Ordering::Greater {
        v
    } else {
        w
    }
}

/// Sort versions in increasing precedence; ties fall back to string order.
pub fn sort(list: &mut [String]) {
    list.sort_by(|a, b| compare(a, b).then_with(|| a.cmp(b)));
}

/// Compare two prerelease suffixes (each either empty or starting with `-`).
///
/// An empty prerelease sorts after any non-empty one. Identifiers are
/// compared numerically when both are numeric, numeric before alphanumeric,
/// otherwise in ASCII order; a shorter identifier list sorts first.
pub fn compare_prerelease(x: &str, y: &str) -> Ordering {
    if x == y {
        return Ordering::Equal;
    }
    if x.is_empty() {
        return Ordering::Greater;
    }
    if y.is_empty() {
        return Ordering::Less;
    }

    let mut xs = x.strip_prefix('-').unwrap_or(x).split('.');
    let mut ys = y.strip_prefix('-').unwrap_or(y).split('.');
    loop {
        match (xs.next(), ys.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(dx), Some(dy)) if dx == dy => continue,
            (Some(dx), Some(dy)) => {
                let (nx, ny) = (is_num(dx), is_num(dy));
                return match (nx, ny) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (true, true) => compare_int(dx, dy),
                    (false, false) => dx.cmp(dy),
                };
            }
        }
    }
}

fn compare_int(x: &str, y: &str) -> Ordering {
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-'
}

fn is_num(v: &str) -> bool {
    !v.is_empty() && v.bytes().all(|c| c.is_ascii_digit())
}

fn is_bad_num(v: &str) -> bool {
    is_num(v) && v.len() > 1 && v.starts_with('0')
}

fn parse_int(v: &str) -> Option<(&str, &str)> {
    let bytes = v.as_bytes();
    if bytes.first().map_or(true, |c| !c.is_ascii_digit()) {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if bytes[0] == b'0' && i != 1 {
        return None;
    }
    Some((&v[..i], &v[i..]))
}

fn parse_prerelease(v: &str) -> Option<(&str, &str)> {
    // Identifiers must be non-empty and numeric ones have no leading zero.
    let bytes = v.as_bytes();
    if bytes.first() != Some(&b'-') {
        return None;
    }
    let mut i = 1;
    let mut start = 1;
    while i < bytes.len() && bytes[i] != b'+' {
        if !is_ident_char(bytes[i]) && bytes[i] != b'.' {
            return None;
        }
        if bytes[i] == b'.' {
            if start == i || is_bad_num(&v[start..i]) {
                return None;
            }
            start = i + 1;
        }
        i += 1;
    }
    if start == i || is_bad_num(&v[start..i]) {
        return None;
    }
    Some((&v[..i], &v[i..]))
}

fn parse_build(v: &str) -> Option<(&str, &str)> {
    let bytes = v.as_bytes();
    if bytes.first() != Some(&b'+') {
        return None;
    }
    let mut i = 1;
    let mut start = 1;
    while i < bytes.len() {
        if !is_ident_char(bytes[i]) && bytes[i] != b'.' {
            return None;
        }
        if bytes[i] == b'.' {
            if start == i {
                return None;
            }
            start = i + 1;
        }
        i += 1;
    }
    if start == i {
        return None;
    }
    Some((&v[..i], &v[i..]))
}
