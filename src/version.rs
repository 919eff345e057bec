//! Loose semantic versions for managed binaries.
//!
//! # Responsibilities
//! - Parse `v?<major>.<minor>.<patch>[anything]` strings
//! - Render canonical forms with or without the `v` prefix
//! - Interpret the `version` subcommand output of each managed binary
//!
//! # Design Decisions
//! - The edge flavour never fails: unparsable input becomes 0.0.0
//! - The core flavour reports "no version" (`None`) instead
//! - Only equality is needed ("is the installed binary already correct")

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?([0-9]+)\.([0-9]+)\.([0-9]+)").expect("version pattern compiles"));

/// A `major.minor.patch` version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// Error returned when a version string is surfaced to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid version string: {0:?}")]
pub struct InvalidVersion(pub String);

impl SemVer {
    /// The documented fallback version.
    pub const ZERO: SemVer = SemVer::new(0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a loose version string. Trailing content after the patch
    /// digits is ignored, so `1.2.3.2` and `1.2.3-rc1` both yield 1.2.3.
    pub fn parse(raw: &str) -> Option<Self> {
        let captures = VERSION_PATTERN.captures(raw.trim())?;
        let group = |idx: usize| captures.get(idx)?.as_str().parse::<u64>().ok();
        Some(Self::new(group(1)?, group(2)?, group(3)?))
    }

    /// Parse, falling back to [`SemVer::ZERO`] on malformed input.
    pub fn parse_or_zero(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::ZERO;
        }
        Self::parse(raw).unwrap_or_else(|| {
            tracing::warn!(input = %raw, "failed to parse version, falling back to 0.0.0");
            Self::ZERO
        })
    }

    /// `"{major}.{minor}.{patch}"`, or `"v{major}.{minor}.{patch}"` with the prefix.
    pub fn render(&self, with_prefix: bool) -> String {
        if with_prefix {
            format!("v{}", self)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidVersion(s.to_string()))
    }
}

/// Layout of a binary's `version` subcommand output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionReport {
    /// `v2.9.0 h1:...`: version is the first token, zero on failure.
    LeadingToken,
    /// `Xray 25.9.11 (Xray, Penetrates Everything.) ...`: version is the
    /// second token, `None` on failure.
    SecondToken,
}

impl VersionReport {
    /// Extract the installed version from raw command output.
    pub fn installed(&self, output: &str) -> Option<SemVer> {
        let mut tokens = output.split_whitespace();
        match self {
            VersionReport::LeadingToken => {
                Some(SemVer::parse_or_zero(tokens.next().unwrap_or_default()))
            }
            VersionReport::SecondToken => tokens.nth(1).and_then(SemVer::parse),
        }
    }
}
