use crate::SchemaError;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Accepted migration filename grammar. One sublevel only: `1.2` is valid, `1.2.3` is not.
pub const VERSION_PATTERN: &str = r"^V([0-9]+(_([0-9]+))?)__[A-Za-z0-9_]+\.sql$";

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VERSION_PATTERN).expect("version pattern is valid"))
}

/// Version parsed from a migration filename.
///
/// Ordering and equality compare `(major, minor)` numerically with an absent
/// minor treated as `0`. The display form keeps the captured text with `_`
/// replaced by `.`, which is what ends up in snapshot tags.
#[derive(Debug, Clone)]
pub struct MigrationVersion {
    major: u128,
    minor: Option<u128>,
    text: String,
}

impl MigrationVersion {
    pub fn major(&self) -> u128 {
        self.major
    }

    pub fn minor(&self) -> Option<u128> {
        self.minor
    }

    fn key(&self) -> (u128, u128) {
        (self.major, self.minor.unwrap_or(0))
    }

    /// Tag-safe rendering: dots become underscores since `-` separates tag segments.
    pub fn tag_text(&self) -> String {
        self.text.replace('.', "_")
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MigrationVersion {}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parse the version out of a migration filename such as `V47_10__widgets_type_id_not_null.sql`.
///
/// The whole name must match [`VERSION_PATTERN`]; anything else, including
/// names with spaces or a second version sublevel, is rejected with
/// [`SchemaError::MalformedResourceName`].
pub fn parse_version(filename: &str) -> Result<MigrationVersion, SchemaError> {
    let malformed = || SchemaError::MalformedResourceName {
        filename: filename.to_owned(),
        pattern: VERSION_PATTERN.to_owned(),
    };

    let caps = version_regex().captures(filename).ok_or_else(malformed)?;
    let raw = caps.get(1).ok_or_else(malformed)?.as_str();

    let (major_text, minor_text) = match raw.split_once('_') {
        Some((major, minor)) => (major, Some(minor)),
        None => (raw, None),
    };
    let major = major_text.parse::<u128>().map_err(|_| malformed())?;
    let minor = minor_text
        .map(str::parse::<u128>)
        .transpose()
        .map_err(|_| malformed())?;

    Ok(MigrationVersion {
        major,
        minor,
        text: raw.replace('_', "."),
    })
}
