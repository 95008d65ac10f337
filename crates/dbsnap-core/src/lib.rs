//! Snapshot cache orchestration for dbsnap.
//!
//! This crate ties together fingerprinting, runtime backends, and a migration
//! engine into the `Engine`: the central API that turns a `MigrationSet` into
//! connection parameters for a migrated database snapshot, building and
//! publishing the snapshot on a cache miss. It also provides inspection and
//! stale-snapshot pruning.

pub mod config;
pub mod connection;
pub mod engine;
pub mod migrate;

pub use config::{backend_options, EngineConfig, DEFAULT_BASE_IMAGE};
pub use connection::{with_current_schema, ConnectionParameters};
pub use engine::{Engine, Inspection, ProvisionOutcome, Provisioned, PruneReport};
pub use migrate::{select_migrator, FlywayCli, MigrationEngine, MigrationTarget};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("migration set error: {0}")]
    Schema(#[from] dbsnap_schema::SchemaError),
    #[error("runtime error: {0}")]
    Runtime(#[from] dbsnap_runtime::RuntimeError),
    #[error("migrations from {path} failed: {reason}")]
    MigrationExecutionFailed { path: String, reason: String },
    #[error("snapshot {0} was committed but is missing from the registry")]
    SnapshotPublicationLost(String),
    #[error("snapshot {reference} has no {key} in its configuration")]
    MalformedSnapshotMetadata { reference: String, key: String },
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_resource() {
        let e = CoreError::MalformedSnapshotMetadata {
            reference: "myapp:V1-abcdef".to_owned(),
            key: "POSTGRES_PASSWORD".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("myapp:V1-abcdef"));
        assert!(msg.contains("POSTGRES_PASSWORD"));

        let e = CoreError::SnapshotPublicationLost("myapp:V1-abcdef".to_owned());
        assert!(e.to_string().contains("myapp:V1-abcdef"));
    }

    #[test]
    fn lower_layer_errors_convert() {
        let e: CoreError =
            dbsnap_schema::SchemaError::EmptyResourceSet("db/migration".to_owned()).into();
        assert!(matches!(e, CoreError::Schema(_)));
        let e: CoreError = dbsnap_runtime::RuntimeError::NotRunning("pg".to_owned()).into();
        assert!(matches!(e, CoreError::Runtime(_)));
    }

    #[test]
    fn provision_outcome_names_match_serde() {
        for outcome in [
            ProvisionOutcome::CacheHit,
            ProvisionOutcome::Built,
            ProvisionOutcome::LostRace,
        ] {
            let json = serde_json::to_value(outcome).unwrap();
            assert_eq!(json, outcome.as_str());
        }
    }
}
