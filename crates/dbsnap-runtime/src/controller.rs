use crate::lifecycle::InstanceState;
use crate::RuntimeError;
use dbsnap_schema::InitScript;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENV_DATABASE: &str = "POSTGRES_DB";
pub const ENV_USER: &str = "POSTGRES_USER";
pub const ENV_PASSWORD: &str = "POSTGRES_PASSWORD";

/// Provisioning credentials a fresh instance is created with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceCredentials {
    pub database: String,
    pub user: String,
    pub password: String,
}

impl InstanceCredentials {
    /// Environment entries that carry the credentials into the instance and
    /// from there into any snapshot committed from it.
    pub fn env_pairs(&self) -> [(&'static str, &str); 3] {
        [
            (ENV_DATABASE, self.database.as_str()),
            (ENV_USER, self.user.as_str()),
            (ENV_PASSWORD, self.password.as_str()),
        ]
    }
}

/// Where a started instance accepts connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionAddress {
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl ConnectionAddress {
    pub fn jdbc_url(&self) -> String {
        format!(
            "jdbc:postgresql://{}:{}/{}",
            self.host, self.port, self.database
        )
    }
}

impl fmt::Display for ConnectionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Drives at most one ephemeral instance at a time.
///
/// Implementations enforce the lifecycle through
/// [`validate_transition`](crate::validate_transition): `start` on a live
/// instance fails with `AlreadyRunning`, `stop` and `freeze` without one fail
/// with `NotRunning`. A failed `start` leaves nothing behind, so callers only
/// owe a `stop` after a successful `start`.
pub trait InstanceController: Send {
    /// Start a fresh instance from the base image and apply `init_scripts`
    /// in order once it reports ready.
    fn start(
        &mut self,
        credentials: &InstanceCredentials,
        init_scripts: &[InitScript],
    ) -> Result<ConnectionAddress, RuntimeError>;

    /// Tear down the instance. Safe to call from a failure-cleanup path.
    fn stop(&mut self) -> Result<(), RuntimeError>;

    /// Checkpoint the running instance and commit its state as `name:tag`.
    /// Returns the id of the published snapshot.
    fn freeze(&mut self, name: &str, tag: &str) -> Result<String, RuntimeError>;

    /// Identity of the declared base image; a fingerprint input.
    fn base_identity(&self) -> &str;

    fn state(&self) -> InstanceState;
}
