//! Protocol versioning for Warren.
//!
//! A connection negotiates exactly one of the supported AMQP revisions during
//! the protocol header exchange and keeps it for its whole lifetime.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// AMQP 0-8, the oldest supported revision.
pub const V0_8: ProtocolVersion = ProtocolVersion { major: 8, minor: 0 };

/// AMQP 0-9.
pub const V0_9: ProtocolVersion = ProtocolVersion { major: 0, minor: 9 };

/// AMQP 0-9-1.
pub const V0_91: ProtocolVersion = ProtocolVersion { major: 0, minor: 91 };

/// Every version this engine can speak, newest first.
pub const SUPPORTED_VERSIONS: [ProtocolVersion; 3] = [V0_91, V0_9, V0_8];

/// Protocol version information.
///
/// Values follow the broker convention of folding the revision into the
/// minor number, so 0-9-1 is `(0, 91)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ProtocolVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl ProtocolVersion {
    /// Create a new version.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether a method table exists for this version.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        SUPPORTED_VERSIONS.contains(self)
    }

    /// Major and minor carried in `connection.start`. 0-9-1 advertises
    /// itself as 0-9 there; the revision is only visible in the header.
    #[must_use]
    pub fn advertised(&self) -> (u8, u8) {
        if *self == V0_91 {
            (0, 9)
        } else {
            (self.major, self.minor)
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.major, self.minor)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        V0_91
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0-8" | "8-0" | "0.8" => Ok(V0_8),
            "0-9" | "0.9" => Ok(V0_9),
            "0-9-1" | "0-91" | "0.9.1" => Ok(V0_91),
            other => Err(format!("Unsupported protocol version: {other}")),
        }
    }
}

impl From<ProtocolVersion> for String {
    fn from(v: ProtocolVersion) -> String {
        v.to_string()
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_display() {
        assert_eq!(V0_8.to_string(), "8-0");
        assert_eq!(V0_9.to_string(), "0-9");
        assert_eq!(V0_91.to_string(), "0-91");
    }

    #[test]
    fn test_version_parse() {
        assert_eq!("0-8".parse::<ProtocolVersion>(), Ok(V0_8));
        assert_eq!("0-9".parse::<ProtocolVersion>(), Ok(V0_9));
        assert_eq!("0-9-1".parse::<ProtocolVersion>(), Ok(V0_91));
        assert_eq!("0-91".parse::<ProtocolVersion>(), Ok(V0_91));
        assert!("1-0".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn test_supported_versions() {
        assert!(V0_8.is_supported());
        assert!(V0_9.is_supported());
        assert!(V0_91.is_supported());
        assert!(!ProtocolVersion::new(1, 0).is_supported());
    }

    #[test]
    fn test_advertised_version() {
        assert_eq!(V0_8.advertised(), (8, 0));
        assert_eq!(V0_9.advertised(), (0, 9));
        assert_eq!(V0_91.advertised(), (0, 9));
    }

    #[test]
    fn test_version_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            versions: Vec<ProtocolVersion>,
        }

        let w: Wrapper = toml::from_str(r#"versions = ["0-8", "0-9-1"]"#).unwrap();
        assert_eq!(w.versions, vec![V0_8, V0_91]);
    }
}
