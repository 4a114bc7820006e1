//! Fleet version strings.
//!
//! Two wire shapes are accepted:
//!
//! - long: `major.minor.patch[-pre].branch.commit.buildDate.arch.buildHash`
//!   (8 dot-separated fields, 9 when the pre-release itself contains a dot)
//! - short: `major.minor.patch`, a degraded form with empty metadata
//!
//! Ordering only ever looks at `(major, minor, patch)`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Format of the `buildDate` field.
pub const BUILD_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Errors produced by [`Version::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,

    #[error("expected 3 or 8 dot-separated fields (9 with a dotted pre-release), found {found}")]
    FieldCount { found: usize },

    #[error("invalid {field} number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("empty {field} field")]
    EmptyField { field: &'static str },
}

/// The ordering-significant part of a version.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VersionCore {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionCore {
    pub const ZERO: VersionCore = VersionCore::new(0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// `x.y.(z+1)`; `None` once the patch number is exhausted.
    pub fn next_patch(self) -> Option<Self> {
        let patch = self.patch.checked_add(1)?;
        Some(Self::new(self.major, self.minor, patch))
    }
}

impl fmt::Display for VersionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for VersionCore {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::parse(s)?.into_version().core())
    }
}

/// A fully described build version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: String,
    pub branch: String,
    pub commit: String,
    pub build_date: String,
    pub arch: String,
    pub build_hash: String,
}

/// Result of a successful parse, tagged by which shape matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedVersion {
    Long(Version),
    /// Bare `x.y.z`; metadata fields are empty.
    Short(Version),
}

impl ParsedVersion {
    pub fn into_version(self) -> Version {
        match self {
            ParsedVersion::Long(v) | ParsedVersion::Short(v) => v,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            ParsedVersion::Long(v) | ParsedVersion::Short(v) => v,
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, ParsedVersion::Long(_))
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<u64, VersionParseError> {
    let invalid = || VersionParseError::InvalidNumber {
        field,
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    // Leading zeros would not survive a round trip.
    if value.len() > 1 && value.starts_with('0') {
        return Err(invalid());
    }
    value.parse::<u64>().map_err(|_| invalid())
}

fn non_empty(field: &'static str, value: &str) -> Result<String, VersionParseError> {
    if value.is_empty() {
        Err(VersionParseError::EmptyField { field })
    } else {
        Ok(value.to_string())
    }
}

impl Version {
    /// Parse either wire shape.
    pub fn parse(input: &str) -> Result<ParsedVersion, VersionParseError> {
        if input.is_empty() {
            return Err(VersionParseError::Empty);
        }
        let fields: Vec<&str> = input.split('.').collect();
        let n = fields.len();

        if n == 3 {
            let (patch, pre) = split_patch(fields[2])?;
            if pre.contains('.') {
                return Err(VersionParseError::FieldCount { found: n });
            }
            return Ok(ParsedVersion::Short(Version {
                major: parse_number("major", fields[0])?,
                minor: parse_number("minor", fields[1])?,
                patch,
                pre_release: pre,
                ..Default::default()
            }));
        }

        if n != 8 && n != 9 {
            return Err(VersionParseError::FieldCount { found: n });
        }

        // The last five fields are always metadata; whatever sits between
        // `minor` and them is `patch[-pre]`.
        let patch_part = fields[2..n - 5].join(".");
        let (patch, pre) = split_patch(&patch_part)?;
        if n == 9 && pre.matches('.').count() != 1 {
            return Err(VersionParseError::FieldCount { found: n });
        }

        Ok(ParsedVersion::Long(Version {
            major: parse_number("major", fields[0])?,
            minor: parse_number("minor", fields[1])?,
            patch,
            pre_release: pre,
            branch: non_empty("branch", fields[n - 5])?,
            commit: non_empty("commit", fields[n - 4])?,
            build_date: non_empty("buildDate", fields[n - 3])?,
            arch: non_empty("arch", fields[n - 2])?,
            build_hash: non_empty("buildHash", fields[n - 1])?,
        }))
    }

    /// Stamp a new long-form version for a build happening now.
    ///
    /// The build hash is the first 8 hex chars of SHA-256 over the other
    /// fields, so two builds of the same commit at different times differ.
    pub fn stamp(
        core: VersionCore,
        branch: &str,
        commit: &str,
        built_at: DateTime<Utc>,
        arch: &str,
    ) -> Self {
        let build_date = built_at.format(BUILD_DATE_FORMAT).to_string();
        let branch = sanitize_field(branch, "main");
        let commit = sanitize_field(commit, "unknown");
        let arch = sanitize_field(arch, "unknown");

        let mut hasher = Sha256::new();
        hasher.update(format!("{core}.{branch}.{commit}.{build_date}.{arch}").as_bytes());
        let digest = hex::encode(hasher.finalize());

        Version {
            major: core.major,
            minor: core.minor,
            patch: core.patch,
            pre_release: String::new(),
            branch,
            commit,
            build_date,
            arch,
            build_hash: digest[..8].to_string(),
        }
    }

    pub fn core(&self) -> VersionCore {
        VersionCore::new(self.major, self.minor, self.patch)
    }

    /// `major.minor.patch`
    pub fn short(&self) -> String {
        self.core().to_string()
    }

    /// True when every metadata field is empty (the short wire shape).
    pub fn is_degraded(&self) -> bool {
        self.branch.is_empty()
            && self.commit.is_empty()
            && self.build_date.is_empty()
            && self.arch.is_empty()
            && self.build_hash.is_empty()
    }

    /// Compare on `(major, minor, patch)` only.
    pub fn cmp_version(&self, other: &Self) -> Ordering {
        self.core().cmp(&other.core())
    }
}

fn split_patch(part: &str) -> Result<(u64, String), VersionParseError> {
    match part.split_once('-') {
        Some((patch, pre)) => {
            let pre = non_empty("preRelease", pre)?;
            Ok((parse_number("patch", patch)?, pre))
        }
        None => Ok((parse_number("patch", part)?, String::new())),
    }
}

/// Metadata fields must not contain the separator and must not be empty.
fn sanitize_field(value: &str, fallback: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '.' | '/' | '-' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Architecture name in the spelling release directories use.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

impl fmt::Display for Version {
    /// Long form, or the short form for degraded versions.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release)?;
        }
        if self.is_degraded() {
            return Ok(());
        }
        write!(
            f,
            ".{}.{}.{}.{}.{}",
            self.branch, self.commit, self.build_date, self.arch, self.build_hash
        )
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::parse(s)?.into_version())
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
