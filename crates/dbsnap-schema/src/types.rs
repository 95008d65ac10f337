//! Snapshot identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Snapshot tag of the form `V<latest_version>-<hex6>`, derived from migration content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `V<latest_version>` half of the tag.
    pub fn version_segment(&self) -> &str {
        self.0.split_once('-').map_or(self.0.as_str(), |(v, _)| v)
    }

    /// The six-character digest half of the tag.
    pub fn hash_segment(&self) -> &str {
        self.0.split_once('-').map_or("", |(_, h)| h)
    }
}

impl Deref for Fingerprint {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for Fingerprint {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A fully qualified `name:tag` snapshot reference as understood by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub name: String,
    pub tag: Fingerprint,
}

impl SnapshotRef {
    pub fn new(name: impl Into<String>, tag: Fingerprint) -> Self {
        Self {
            name: name.into(),
            tag,
        }
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_segments() {
        let fp = Fingerprint::new("V1_1-abcdef");
        assert_eq!(fp.version_segment(), "V1_1");
        assert_eq!(fp.hash_segment(), "abcdef");
    }

    #[test]
    fn fingerprint_serde_is_transparent() {
        let fp = Fingerprint::new("V2-814c38");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, "\"V2-814c38\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn snapshot_ref_display() {
        let r = SnapshotRef::new("postgres-it-example", Fingerprint::new("V2-814c38"));
        assert_eq!(r.to_string(), "postgres-it-example:V2-814c38");
    }

    #[test]
    fn snapshot_ref_with_registry_path() {
        let r = SnapshotRef::new("registry.local/team/app", Fingerprint::new("V7-000abc"));
        assert_eq!(r.to_string(), "registry.local/team/app:V7-000abc");
    }
}
