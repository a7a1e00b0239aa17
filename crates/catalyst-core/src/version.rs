//! Controller release versions.
//!
//! Catalyst Center reports four-component releases such as `2.3.7.9`, often
//! with a build suffix (`2.3.7.9-70301`). Only the numeric components take
//! part in ordering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A four-component controller release, ordered numerically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControllerVersion([u32; 4]);

impl ControllerVersion {
    /// `2.3.5.3`, the oldest release the engine talks to at all.
    pub const V2_3_5_3: Self = Self::new(2, 3, 5, 3);
    /// `2.3.7.6`.
    pub const V2_3_7_6: Self = Self::new(2, 3, 7, 6);
    /// `2.3.7.9`, the typical minimum for assurance and profile resources.
    pub const V2_3_7_9: Self = Self::new(2, 3, 7, 9);

    /// Build a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self([major, minor, patch, build])
    }

    /// The numeric components.
    #[must_use]
    pub const fn components(&self) -> [u32; 4] {
        self.0
    }
}

impl FromStr for ControllerVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let numeric = trimmed.split(['-', ' ']).next().unwrap_or_default();
        if numeric.is_empty() {
            return Err(CoreError::InvalidVersion(s.to_string()));
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for segment in numeric.split('.') {
            if count == parts.len() {
                return Err(CoreError::InvalidVersion(s.to_string()));
            }
            parts[count] = segment
                .parse()
                .map_err(|_| CoreError::InvalidVersion(s.to_string()))?;
            count += 1;
        }

        Ok(Self(parts))
    }
}

impl TryFrom<String> for ControllerVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ControllerVersion> for String {
    fn from(version: ControllerVersion) -> Self {
        version.to_string()
    }
}

impl fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl fmt::Debug for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControllerVersion({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_suffixed() {
        let v: ControllerVersion = "2.3.7.9".parse().unwrap();
        assert_eq!(v, ControllerVersion::V2_3_7_9);

        let v: ControllerVersion = "2.3.7.9-70301".parse().unwrap();
        assert_eq!(v, ControllerVersion::V2_3_7_9);

        let v: ControllerVersion = "2.3.7".parse().unwrap();
        assert_eq!(v.components(), [2, 3, 7, 0]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<ControllerVersion>().is_err());
        assert!("two.three".parse::<ControllerVersion>().is_err());
        assert!("1.2.3.4.5".parse::<ControllerVersion>().is_err());
    }

    #[test]
    fn ordering_is_numeric() {
        let older: ControllerVersion = "2.3.7.6".parse().unwrap();
        let newer: ControllerVersion = "2.3.10.0".parse().unwrap();
        assert!(older < ControllerVersion::V2_3_7_9);
        assert!(newer > ControllerVersion::V2_3_7_9);
    }

    #[test]
    fn serde_roundtrip_as_string() {
        let json = serde_json::to_string(&ControllerVersion::V2_3_7_6).unwrap();
        assert_eq!(json, "\"2.3.7.6\"");
        let back: ControllerVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ControllerVersion::V2_3_7_6);
    }
}
