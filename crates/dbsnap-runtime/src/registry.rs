use crate::RuntimeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A published snapshot as seen by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: String,
    /// `name:tag` the record was found under.
    pub reference: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Environment configuration baked into the snapshot.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl SnapshotRecord {
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Tag component of the reference, if it has one.
    pub fn tag(&self) -> Option<&str> {
        split_reference(&self.reference).map(|(_, tag)| tag)
    }
}

/// Split `repo[:port]/name:tag` at the tag separator.
///
/// Only a colon after the last `/` separates a tag; a registry port does not.
pub fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let last_slash = reference.rfind('/').map_or(0, |i| i + 1);
    let colon = reference[last_slash..].rfind(':')? + last_slash;
    Some((&reference[..colon], &reference[colon + 1..]))
}

/// Decode `KEY=value` environment entries. Entries without `=` are kept with
/// an empty value; later duplicates win.
pub fn parse_env_entries<'a, I>(entries: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    entries
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((k, v)) => (k.to_owned(), v.to_owned()),
            None => (entry.to_owned(), String::new()),
        })
        .collect()
}

/// The shared store of published snapshots. There is no create-if-absent
/// primitive; publication happens through
/// [`InstanceController::freeze`](crate::InstanceController::freeze).
pub trait SnapshotRegistry: Send + Sync {
    fn find(&self, name: &str, tag: &str) -> Result<Option<SnapshotRecord>, RuntimeError>;

    /// Every snapshot published under `name`, in no particular order.
    fn list(&self, name: &str) -> Result<Vec<SnapshotRecord>, RuntimeError>;

    fn remove(&self, reference: &str) -> Result<(), RuntimeError>;
}
