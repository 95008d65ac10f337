//! Migration set description, resource enumeration, and fingerprinting for dbsnap.
//!
//! This crate defines the input layer: the validated `MigrationSet` and its
//! `dbsnap.toml` project file, resource path resolution (`filesystem:` and
//! root-relative addressing), migration filename version parsing, and the
//! deterministic `V<version>-<hex6>` fingerprint used as a snapshot tag.

pub mod fingerprint;
pub mod migration_set;
pub mod project;
pub mod resources;
pub mod types;
pub mod version;

pub use fingerprint::{compute_fingerprint, load_init_scripts, InitScript};
pub use migration_set::{
    validate_snapshot_name, MigrationSet, MigrationSetBuilder, DEFAULT_MIGRATION_PATH,
    DEFAULT_TRACKING_TABLE,
};
pub use project::{
    parse_project_file, parse_project_str, MigrationsSection, ProjectFile, RuntimeSection,
    SnapshotSection, PROJECT_FILE_NAME,
};
pub use resources::{MigrationResource, ResourceLocator, ResourcePath, MIGRATION_EXTENSION};
pub use types::{Fingerprint, SnapshotRef};
pub use version::{parse_version, MigrationVersion, VERSION_PATTERN};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("illegal resource name [{filename}], should match {pattern}")]
    MalformedResourceName { filename: String, pattern: String },
    #[error("migrations list is empty for [{0}]")]
    EmptyResourceSet(String),
    #[error("error while listing resources [{path}]: {source}")]
    ResourceListing {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error while reading resource [{}]: {source}", path.display())]
    ResourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing resource [{0}]")]
    MissingResource(String),
    #[error("ambiguous resource [{path}]: {candidates:?}")]
    AmbiguousResource {
        path: String,
        candidates: Vec<PathBuf>,
    },
    #[error("invalid migration set: {0}")]
    InvalidMigrationSet(String),
    #[error("failed to read project file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse project file: {0}")]
    ParseToml(#[from] toml::de::Error),
}
