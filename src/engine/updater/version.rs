//! Version Comparator
//!
//! Loose `major.minor.patch` parsing for versions published in update manifests.

use std::cmp::Ordering;
use std::fmt;

/// Parsed release version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a free-form version string.
    ///
    /// Accepts an optional leading `v`, takes at most three dot-separated
    /// components and zero-fills the missing ones. Each component is read as
    /// its leading digits, so `1.4.0-beta.2` parses as `1.4.0`.
    /// Returns `None` when a taken component has no leading digit.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let stripped = trimmed
            .strip_prefix(|c: char| c == 'v' || c == 'V')
            .unwrap_or(trimmed);

        let mut parts = [0u64; 3];
        for (slot, component) in parts.iter_mut().zip(stripped.split('.')) {
            *slot = leading_number(component)?;
        }

        Some(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn leading_number(component: &str) -> Option<u64> {
    let end = component
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(component.len());
    if end == 0 {
        return None;
    }
    component[..end].parse().ok()
}

/// Compare two version strings.
///
/// If either side does not parse the result is `Equal`: an unreadable
/// version never produces an ordering.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => Ordering::Equal,
    }
}

/// Whether `latest` is strictly newer than `current`
pub fn update_available(current: &str, latest: &str) -> bool {
    compare(current, latest) == Ordering::Less
}
