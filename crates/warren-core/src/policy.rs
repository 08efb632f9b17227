//! Per-version behavior switches, chosen once when the connection negotiates
//! its protocol version.

use warren_protocol::{ProtocolVersion, V0_8, V0_9, V0_91};

use crate::error::Defect;

/// What `channel.open-ok` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelIdPolicy {
    /// No arguments (0-8).
    None,
    /// A fresh 16-byte random identifier.
    Random16,
}

/// How `basic.recover` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverCompletion {
    /// Sync barrier, then exactly one `basic.recover-ok` (0-8).
    SyncOk,
    /// No reply; redeliveries are written and the sync barrier is left to
    /// a later `basic.recover-sync` or channel operation.
    Deferred,
}

/// Behavior differences between protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPolicy {
    pub version: ProtocolVersion,
    pub channel_id: ChannelIdPolicy,
    pub recover: RecoverCompletion,
}

impl VersionPolicy {
    /// # Errors
    ///
    /// Returns [`Defect::UnsupportedVersion`] for a version without a table.
    pub fn for_version(version: ProtocolVersion) -> Result<Self, Defect> {
        let (channel_id, recover) = match version {
            V0_8 => (ChannelIdPolicy::None, RecoverCompletion::SyncOk),
            V0_9 | V0_91 => (ChannelIdPolicy::Random16, RecoverCompletion::Deferred),
            other => return Err(Defect::UnsupportedVersion(other)),
        };
        Ok(Self {
            version,
            channel_id,
            recover,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_per_version() {
        let v8 = VersionPolicy::for_version(V0_8).unwrap();
        assert_eq!(v8.channel_id, ChannelIdPolicy::None);
        assert_eq!(v8.recover, RecoverCompletion::SyncOk);

        for version in [V0_9, V0_91] {
            let policy = VersionPolicy::for_version(version).unwrap();
            assert_eq!(policy.channel_id, ChannelIdPolicy::Random16);
            assert_eq!(policy.recover, RecoverCompletion::Deferred);
        }
    }

    #[test]
    fn test_unsupported_version_is_a_defect() {
        let version = ProtocolVersion::new(1, 0);
        assert_eq!(
            VersionPolicy::for_version(version),
            Err(Defect::UnsupportedVersion(version))
        );
    }
}
