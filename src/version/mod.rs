//! Release version resolution and tolerant version comparison.
//!
//! Two notions of "version" live here:
//!
//! - [`ReleaseTag`] is the normalised release identifier (`v4.52.2`) that
//!   appears in cached file names and download URLs.
//! - [`Version`] is the numeric tuple used for ordering.
//!
//! # Parsing policy
//!
//! Version strings are parsed with a **tolerant, prefix-only** policy (see
//! [`Version::parse_tolerant`]). Malformed segments are dropped rather than
//! rejected, so a malformed string degrades to a shorter tuple. A shorter
//! tuple that is a prefix of a longer one compares as smaller. This is not a
//! strict semver comparator and must not be tightened into one: doing so
//! would change which system binaries are accepted.

use std::fmt;

use crate::config::ProvisionConfig;

/// Release pinned by this crate when no override is configured.
///
/// The bundled checksum table in [`crate::checksum`] covers exactly this
/// release.
pub const DEFAULT_VERSION: &str = "v4.52.2";

/// Normalised release identifier carrying a leading `v` marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseTag(String);

impl ReleaseTag {
    /// Returns the pinned default release.
    #[must_use]
    pub fn pinned() -> Self {
        Self(DEFAULT_VERSION.to_owned())
    }

    /// Normalises an operator-supplied version.
    ///
    /// Returns `None` for blank input so callers treat it as absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use yq_provision::ReleaseTag;
    ///
    /// let tag = ReleaseTag::normalise(" 4.53.0 ").expect("non-blank");
    /// assert_eq!(tag.as_str(), "v4.53.0");
    /// assert!(ReleaseTag::normalise("   ").is_none());
    /// ```
    #[must_use]
    pub fn normalise(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('v') {
            Some(Self(trimmed.to_owned()))
        } else {
            Some(Self(format!("v{trimmed}")))
        }
    }

    /// Returns `true` when this is the pinned default release.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.0 == DEFAULT_VERSION
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the tag into a comparable [`Version`].
    #[must_use]
    pub fn version(&self) -> Version {
        Version::parse_tolerant(&self.0)
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the release required for this session.
///
/// Uses the configured override when one was supplied, otherwise the pinned
/// [`DEFAULT_VERSION`].
#[must_use]
pub fn resolve_version(config: &ProvisionConfig) -> ReleaseTag {
    config.tag().clone()
}

/// Ordered tuple of numeric version components.
///
/// Ordering is lexicographic over the components; `(4, 52)` sorts before
/// `(4, 52, 0)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(Vec<u64>);

impl Version {
    /// Parses a dotted version string under the tolerant, prefix-only policy.
    ///
    /// - leading `v` markers are stripped;
    /// - each `.`-separated segment is cut at its first `-` so pre-release
    ///   suffixes vanish (`2-rc1` becomes `2`);
    /// - segments that are not entirely ASCII digits, or that overflow `u64`,
    ///   are dropped without error.
    ///
    /// Parsing never fails. Two different malformed strings can therefore
    /// produce the same tuple.
    ///
    /// # Examples
    ///
    /// ```
    /// use yq_provision::Version;
    ///
    /// assert_eq!(Version::parse_tolerant("v4.52.2-rc1").components(), &[4, 52, 2]);
    /// assert_eq!(Version::parse_tolerant("4.x.7").components(), &[4, 7]);
    /// ```
    #[must_use]
    pub fn parse_tolerant(raw: &str) -> Self {
        let stripped = raw.trim().trim_start_matches('v');
        let parts = stripped
            .split('.')
            .filter_map(|segment| {
                let numeric = segment.split('-').next().unwrap_or_default();
                if numeric.is_empty() || !numeric.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                numeric.parse::<u64>().ok()
            })
            .collect();
        Self(parts)
    }

    /// Returns the numeric components.
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("v")?;
        let mut first = true;
        for part in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

/// Returns `true` when `candidate` is at least `minimum`.
///
/// Both sides are parsed with [`Version::parse_tolerant`], so this never
/// fails; a candidate that degrades to an empty tuple only passes against an
/// equally empty minimum.
#[must_use]
pub fn meets_minimum(candidate: &str, minimum: &str) -> bool {
    Version::parse_tolerant(candidate) >= Version::parse_tolerant(minimum)
}
