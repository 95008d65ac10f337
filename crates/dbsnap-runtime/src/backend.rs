use crate::controller::InstanceController;
use crate::registry::SnapshotRegistry;
use crate::RuntimeError;
use std::time::Duration;

pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    /// Deadline for an instance to report ready.
    pub startup_timeout: Duration,
    /// Container CLI used by the docker backend.
    pub docker_command: String,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            docker_command: "docker".to_owned(),
        }
    }
}

/// A container runtime: hands out instance controllers and exposes the
/// snapshot registry those controllers publish into.
pub trait RuntimeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// A new controller owning no instance yet.
    fn controller(&self, base_image: &str) -> Box<dyn InstanceController>;

    fn registry(&self) -> &dyn SnapshotRegistry;
}

pub fn select_backend(
    name: &str,
    options: &BackendOptions,
) -> Result<Box<dyn RuntimeBackend>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerBackend::new(
            options.docker_command.clone(),
            options.startup_timeout,
        ))),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
