//! Semantic version parsing and precedence.
//!
//! Supports `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`, with an optional
//! leading `v`. Ordering follows semver 2.0 precedence: build metadata is
//! ignored and a pre-release sorts below the matching release.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::Error;

/// A parsed semantic version.
///
/// Equality and hashing follow precedence, so build metadata is ignored.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
    /// Dot-separated pre-release identifiers (empty for a release).
    pub pre_release: Vec<String>,
    /// Build metadata, kept for display only.
    pub build: Option<String>,
}

impl SemanticVersion {
    /// Creates a release version.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: Vec::new(),
            build: None,
        }
    }

    /// Parses a version string.
    ///
    /// # Examples
    ///
    /// ```
    /// use bazaar_core::SemanticVersion;
    ///
    /// let v = SemanticVersion::parse("1.2.3-beta.1+build.5").unwrap();
    /// assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
    /// assert!(v.is_pre_release());
    ///
    /// assert!(SemanticVersion::parse("1.2").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid semantic version.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidInput {
            reason: format!("'{input}' is not a semantic version: {reason}"),
        };

        let trimmed = input.trim();
        let version = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let (version, build) = match version.split_once('+') {
            Some((v, b)) => {
                if !valid_identifiers(b, false) {
                    return Err(invalid("invalid build metadata"));
                }
                (v, Some(b.to_string()))
            }
            None => (version, None),
        };

        let (core, pre_release) = match version.split_once('-') {
            Some((c, p)) => {
                if !valid_identifiers(p, true) {
                    return Err(invalid("invalid pre-release identifier"));
                }
                (c, p.split('.').map(str::to_string).collect())
            }
            None => (version, Vec::new()),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid("expected MAJOR.MINOR.PATCH"));
        }

        let mut numbers = [0_u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || (part.len() > 1 && part.starts_with('0')) {
                return Err(invalid("numeric components must not be empty or zero-padded"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("numeric components must be unsigned integers"))?;
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre_release,
            build,
        })
    }

    /// Returns true if this version carries pre-release identifiers.
    #[must_use]
    pub fn is_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    /// Returns true if `other` has a higher major component.
    #[must_use]
    pub const fn is_major_bump_to(&self, other: &Self) -> bool {
        other.major > self.major
    }
}

fn valid_identifiers(s: &str, numeric_no_leading_zero: bool) -> bool {
    !s.is_empty()
        && s.split('.').all(|id| {
            !id.is_empty()
                && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                && !(numeric_no_leading_zero
                    && id.len() > 1
                    && id.starts_with('0')
                    && id.chars().all(|c| c.is_ascii_digit()))
        })
}

fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| {
                match (self.pre_release.is_empty(), other.pre_release.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => {
                        for (a, b) in self.pre_release.iter().zip(&other.pre_release) {
                            let ord = compare_identifier(a, b);
                            if ord != Ordering::Equal {
                                return ord;
                            }
                        }
                        self.pre_release.len().cmp(&other.pre_release.len())
                    }
                }
            })
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl Hash for SemanticVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre_release.hash(state);
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for SemanticVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release.join("."))?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}
