//! Ephemeral instance controllers and snapshot registries for dbsnap.
//!
//! This crate implements the execution layer: the `InstanceController` trait
//! (start, stop, freeze, base identity) with its lifecycle state machine, the
//! `SnapshotRegistry` trait for looking up published snapshots, a Docker
//! backend driving the `docker` CLI, an in-memory mock backend for tests, and
//! prerequisite checks.

pub mod backend;
pub mod controller;
pub mod docker;
pub mod lifecycle;
pub mod mock;
pub mod prereq;
pub mod registry;

pub use backend::{select_backend, BackendOptions, RuntimeBackend, DEFAULT_STARTUP_TIMEOUT};
pub use controller::{
    ConnectionAddress, InstanceController, InstanceCredentials, ENV_DATABASE, ENV_PASSWORD,
    ENV_USER,
};
pub use docker::DockerBackend;
pub use lifecycle::{validate_transition, InstanceState};
pub use mock::{MockBackend, MockFaults, MockStats};
pub use prereq::{check_docker_prereqs, check_flyway_prereqs, format_missing, MissingPrereq};
pub use registry::{split_reference, SnapshotRecord, SnapshotRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("instance of '{0}' is already running")]
    AlreadyRunning(String),
    #[error("instance of '{0}' is not running")]
    NotRunning(String),
    #[error("invalid instance transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("instance from image '{image}' failed to start: {reason}")]
    StartupFailed { image: String, reason: String },
    #[error("error while executing init script {path}: {reason}")]
    InitScriptFailed { path: String, reason: String },
    #[error("saving instance state as '{reference}' failed: {reason}")]
    FreezeFailed { reference: String, reason: String },
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
    #[error("registry error for '{reference}': {reason}")]
    Registry { reference: String, reason: String },
}
