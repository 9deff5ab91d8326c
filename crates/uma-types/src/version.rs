//! UMA protocol versions and version negotiation.
//!
//! Versions are `major.minor`. Two VASPs can talk as long as they share a
//! major version; within a major version the higher minor is always used.
//! A receiving VASP that does not support the requested major version answers
//! discovery with `412 Precondition Failed` and an [`UnsupportedVersionResponse`]
//! listing its majors, which the sender feeds into [`select_highest_supported`].

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A `major.minor` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UmaVersion {
    pub major: u16,
    pub minor: u16,
}

impl UmaVersion {
    pub const V1_0: UmaVersion = UmaVersion { major: 1, minor: 0 };
    pub const V0_3: UmaVersion = UmaVersion { major: 0, minor: 3 };

    /// Version used for the first discovery attempt.
    pub const CURRENT: UmaVersion = Self::V1_0;

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// Major versions this implementation can speak, highest version per major.
const SUPPORTED: [UmaVersion; 2] = [UmaVersion::V1_0, UmaVersion::V0_3];

pub fn supported_major_versions() -> impl Iterator<Item = u16> {
    SUPPORTED.iter().map(|v| v.major)
}

/// Returns the highest locally supported version for `major`, if any.
pub fn highest_for_major(major: u16) -> Option<UmaVersion> {
    SUPPORTED.iter().copied().find(|v| v.major == major)
}

pub fn is_version_supported(version: &UmaVersion) -> bool {
    highest_for_major(version.major).is_some()
}

/// Picks the highest version whose major is supported by both sides.
pub fn select_highest_supported(
    counterparty_majors: &[u16],
) -> Result<UmaVersion, UmaVersionError> {
    counterparty_majors
        .iter()
        .filter_map(|major| highest_for_major(*major))
        .max()
        .ok_or_else(|| UmaVersionError::NoCommonVersion(counterparty_majors.to_vec()))
}

/// Picks the highest common version from a comma separated list such as `"1.0,0.3"`,
/// the form used by UMA invoices.
pub fn select_from_version_list(versions: &str) -> Result<UmaVersion, UmaVersionError> {
    let majors = versions
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<UmaVersion>().map(|v| v.major))
        .collect::<Result<Vec<_>, _>>()?;
    select_highest_supported(&majors)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UmaVersionError {
    #[error("Invalid UMA version: {0}")]
    InvalidFormat(String),
    #[error("No supported UMA version among majors {0:?}")]
    NoCommonVersion(Vec<u16>),
}

impl FromStr for UmaVersion {
    type Err = UmaVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| UmaVersionError::InvalidFormat(s.to_string()))?;
        let major = major
            .parse::<u16>()
            .map_err(|_| UmaVersionError::InvalidFormat(s.to_string()))?;
        let minor = minor
            .parse::<u16>()
            .map_err(|_| UmaVersionError::InvalidFormat(s.to_string()))?;
        Ok(UmaVersion { major, minor })
    }
}

impl Display for UmaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for UmaVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UmaVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        UmaVersion::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Body of a `412 Precondition Failed` discovery response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedVersionResponse {
    pub supported_major_versions: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported_version: Option<String>,
}
