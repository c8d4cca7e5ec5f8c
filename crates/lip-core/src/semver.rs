//! Semantic versioning parser and range matching
//!
//! Tooth versions are plain semver (`1.2.3-pre+build`); dependency ranges use
//! the npm range syntax.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::module::semver as gosemver;

/// Errors that can occur during semver parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemverError {
    /// Invalid version format
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// Invalid range expression
    #[error("Invalid version range: {0}")]
    InvalidRange(String),
}

/// Semantic version (MAJOR.MINOR.PATCH)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    /// Parse a version string
    ///
    /// A leading `v` is accepted. All three numeric components are required.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();
        let text = format!("v{}", s.strip_prefix('v').unwrap_or(s));

        let invalid = || SemverError::InvalidVersion(s.to_string());
        let parsed = gosemver::parse(&text).ok_or_else(invalid)?;
        if !parsed.short.is_empty() {
            return Err(SemverError::InvalidVersion(format!(
                "Expected MAJOR.MINOR.PATCH, got '{}'",
                s
            )));
        }

        let number = |part: &str| part.parse::<u64>().map_err(|_| invalid());
        Ok(Version {
            major: number(parsed.major)?,
            minor: number(parsed.minor)?,
            patch: number(parsed.patch)?,
            prerelease: parsed.prerelease.strip_prefix('-').map(str::to_string),
            build: parsed.build.strip_prefix('+').map(str::to_string),
        })
    }

    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Bump major version (resets minor and patch to 0)
    ///
    /// Returns `None` if the major component is already `u64::MAX`.
    pub fn bump_major(&self) -> Option<Self> {
        Some(Version::new(self.major.checked_add(1)?, 0, 0))
    }

    /// Bump minor version (resets patch to 0)
    pub fn bump_minor(&self) -> Option<Self> {
        Some(Version::new(self.major, self.minor.checked_add(1)?, 0))
    }

    /// Bump patch version
    pub fn bump_patch(&self) -> Option<Self> {
        Some(Version::new(self.major, self.minor, self.patch.checked_add(1)?))
    }

    /// Compare by semver precedence, ignoring build metadata.
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| {
                let pre = |v: &Self| v.prerelease.as_ref().map(|p| format!("-{p}"));
                gosemver::compare_prerelease(
                    pre(self).as_deref().unwrap_or(""),
                    pre(other).as_deref().unwrap_or(""),
                )
            })
    }

    /// The lowest version sharing this version's numeric components.
    fn lowest_prerelease(mut self) -> Self {
        self.prerelease = Some("0".to_string());
        self.build = None;
        self
    }

    fn same_release(&self, other: &Self) -> bool {
        (self.major, self.minor, self.patch) == (other.major, other.minor, other.patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Build metadata only breaks ties so that ordering agrees with equality.
        self.cmp_precedence(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A primitive comparison against a single version
#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Comparator { op, version }
    }

    /// A comparator no version satisfies.
    fn nothing() -> Self {
        Comparator::new(Op::Lt, Version::new(0, 0, 0).lowest_prerelease())
    }

    fn matches(&self, version: &Version) -> bool {
        let ord = version.cmp_precedence(&self.version);
        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Ge => ord != Ordering::Less,
            Op::Lt => ord == Ordering::Less,
            Op::Le => ord != Ordering::Greater,
        }
    }
}

/// A possibly incomplete version inside a range, such as `1`, `1.2.x` or `*`.
#[derive(Debug, Clone)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    prerelease: Option<String>,
}

impl Partial {
    fn parse(text: &str) -> Result<Self, SemverError> {
        let invalid = || SemverError::InvalidRange(text.to_string());
        let body = text.strip_prefix(['v', 'V']).unwrap_or(text);
        if body.is_empty() {
            return Err(invalid());
        }

        let split = body.find(['-', '+']).unwrap_or(body.len());
        let (core, qualifier) = body.split_at(split);

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid());
        }

        let mut numbers = [None; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            match *part {
                "x" | "X" | "*" => break,
                digits if is_number(digits) => {
                    *slot = Some(digits.parse::<u64>().map_err(|_| invalid())?);
                }
                _ => return Err(invalid()),
            }
        }

        let mut partial = Partial {
            major: numbers[0],
            minor: numbers[0].and(numbers[1]),
            patch: numbers[0].and(numbers[1]).and(numbers[2]),
            prerelease: None,
        };

        if !qualifier.is_empty() {
            if partial.patch.is_none() {
                return Err(invalid());
            }
            let full = Version::parse(body).map_err(|_| invalid())?;
            partial.prerelease = full.prerelease;
        }

        Ok(partial)
    }

    /// Lowest version the partial covers
    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            prerelease: self.prerelease.clone(),
            build: None,
        }
    }

    /// First release past every version the partial covers.
    ///
    /// `None` for a complete partial, or when no release lies past it.
    fn successor(&self) -> Option<Version> {
        let floor = self.floor();
        match (self.major, self.minor, self.patch) {
            (Some(_), None, _) => floor.bump_major(),
            (Some(_), Some(_), None) => floor.bump_minor().or_else(|| floor.bump_major()),
            _ => None,
        }
    }

    /// Exclusive upper bound of an incomplete partial
    fn ceiling(&self) -> Option<Version> {
        self.successor().map(Version::lowest_prerelease)
    }
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit()) && (s == "0" || !s.starts_with('0'))
}

const OPERATORS: &[&str] = &[">=", "<=", "~>", ">", "<", "=", "^", "~"];

/// An npm-style version range, such as `>=1.2.0 <2.0.0 || ^3.1`.
///
/// `&&` may stand in for whitespace between comparators. The source text is
/// kept and used verbatim when the range is displayed or serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    text: String,
    sets: Vec<Vec<Comparator>>,
}

impl VersionRange {
    /// Parse a range expression
    pub fn parse(text: &str) -> Result<Self, SemverError> {
        let sets = text
            .split("||")
            .map(parse_comparator_set)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VersionRange {
            text: text.to_string(),
            sets,
        })
    }

    /// A range satisfied by every release version
    pub fn any() -> Self {
        VersionRange {
            text: "*".to_string(),
            sets: vec![Vec::new()],
        }
    }

    /// The range text as written
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Check whether `version` satisfies the range
    ///
    /// A prerelease version only satisfies a comparator set that names a
    /// prerelease of the same `major.minor.patch`.
    pub fn contains(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| {
            set.iter().all(|c| c.matches(version))
                && (!version.is_prerelease()
                    || set
                        .iter()
                        .any(|c| c.version.is_prerelease() && c.version.same_release(version)))
        })
    }

    /// Highest version in `candidates` that satisfies the range
    pub fn max_satisfying<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates
            .into_iter()
            .filter(|v| self.contains(v))
            .max_by(|a, b| a.cmp_precedence(b))
    }
}

fn parse_comparator_set(text: &str) -> Result<Vec<Comparator>, SemverError> {
    let normalized = text.replace("&&", " ");
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for word in normalized.split_whitespace() {
        if let Some(op) = OPERATORS.iter().find(|op| **op == word) {
            if pending_op.is_some() {
                return Err(SemverError::InvalidRange(text.trim().to_string()));
            }
            pending_op = Some(*op);
            continue;
        }
        tokens.push(format!("{}{}", pending_op.take().unwrap_or(""), word));
    }
    if pending_op.is_some() {
        return Err(SemverError::InvalidRange(text.trim().to_string()));
    }

    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens.get(i + 1).map(String::as_str) == Some("-") {
            let to = tokens
                .get(i + 2)
                .ok_or_else(|| SemverError::InvalidRange(text.trim().to_string()))?;
            desugar_hyphen(&Partial::parse(&tokens[i])?, &Partial::parse(to)?, &mut out);
            i += 3;
            continue;
        }
        desugar_simple(&tokens[i], &mut out)?;
        i += 1;
    }
    Ok(out)
}

fn desugar_hyphen(from: &Partial, to: &Partial, out: &mut Vec<Comparator>) {
    if from.major.is_some() {
        out.push(Comparator::new(Op::Ge, from.floor()));
    }
    if to.major.is_some() {
        match to.ceiling() {
            Some(ceiling) => out.push(Comparator::new(Op::Lt, ceiling)),
            None => out.push(Comparator::new(Op::Le, to.floor())),
        }
    }
}

fn desugar_simple(token: &str, out: &mut Vec<Comparator>) -> Result<(), SemverError> {
    let op = OPERATORS
        .iter()
        .find(|op| token.starts_with(**op))
        .copied()
        .unwrap_or("");
    let p = Partial::parse(&token[op.len()..])?;

    let Some(major) = p.major else {
        // `*` under any operator: `>` and `<` exclude everything, the rest accept anything.
        if op == ">" || op == "<" {
            out.push(Comparator::nothing());
        }
        return Ok(());
    };

    match op {
        "" | "=" if p.patch.is_some() => out.push(Comparator::new(Op::Eq, p.floor())),
        "" | "=" => {
            out.push(Comparator::new(Op::Ge, p.floor()));
            out.extend(p.ceiling().map(|ceiling| Comparator::new(Op::Lt, ceiling)));
        }
        ">" if p.patch.is_some() => out.push(Comparator::new(Op::Gt, p.floor())),
        ">" => match p.successor() {
            Some(next) => out.push(Comparator::new(Op::Ge, next)),
            None => out.push(Comparator::nothing()),
        },
        ">=" => out.push(Comparator::new(Op::Ge, p.floor())),
        "<" => {
            let bound = if p.patch.is_some() {
                p.floor()
            } else {
                p.floor().lowest_prerelease()
            };
            out.push(Comparator::new(Op::Lt, bound));
        }
        "<=" if p.patch.is_some() => out.push(Comparator::new(Op::Le, p.floor())),
        // Past the last representable release `<=` accepts everything.
        "<=" => out.extend(p.ceiling().map(|ceiling| Comparator::new(Op::Lt, ceiling))),
        "~" | "~>" => {
            let floor = p.floor();
            let upper = match p.minor {
                None => floor.bump_major(),
                Some(_) => floor.bump_minor().or_else(|| floor.bump_major()),
            };
            out.push(Comparator::new(Op::Ge, floor));
            out.extend(upper.map(|upper| Comparator::new(Op::Lt, upper.lowest_prerelease())));
        }
        "^" => {
            let floor = p.floor();
            // An exhausted component carries into the next one up.
            let upper = match (p.minor, p.patch) {
                _ if major > 0 => floor.bump_major(),
                (None, _) => floor.bump_major(),
                (Some(minor), patch) if minor > 0 || patch.is_none() => {
                    floor.bump_minor().or_else(|| floor.bump_major())
                }
                _ => floor
                    .bump_patch()
                    .or_else(|| floor.bump_minor())
                    .or_else(|| floor.bump_major()),
            };
            out.push(Comparator::new(Op::Ge, floor));
            out.extend(upper.map(|upper| Comparator::new(Op::Lt, upper.lowest_prerelease())));
        }
        _ => return Err(SemverError::InvalidRange(token.to_string())),
    }
    Ok(())
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for VersionRange {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        VersionRange::parse(&text).map_err(de::Error::custom)
    }
}
