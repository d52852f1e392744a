use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker-assigned position identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl From<u64> for PositionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Label that marks positions as owned by one engine instance.
///
/// Positions opened by other strategies carry a different (or no) label and
/// are never touched by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceTag(pub String);

impl InstanceTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Derive a short tag from a config fingerprint (first 8 hex chars).
    pub fn from_fingerprint(fingerprint: &str) -> Self {
        let short: String = fingerprint.chars().take(8).collect();
        Self(format!("pipguard-{short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
