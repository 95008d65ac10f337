use crate::CoreError;
use dbsnap_runtime::{ConnectionAddress, InstanceCredentials};
use dbsnap_schema::RuntimeSection;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Everything a migration engine needs to migrate a freshly started instance.
#[derive(Debug, Clone, Copy)]
pub struct MigrationTarget<'a> {
    pub address: &'a ConnectionAddress,
    pub credentials: &'a InstanceCredentials,
    /// Migration path as configured, for error messages.
    pub migration_path: &'a str,
    /// Resolved directory holding the migration scripts.
    pub location: &'a Path,
    pub schema: Option<&'a str>,
    pub tracking_table: &'a str,
}

impl MigrationTarget<'_> {
    pub fn failed(&self, reason: impl Into<String>) -> CoreError {
        CoreError::MigrationExecutionFailed {
            path: self.migration_path.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Applies migrations to a live instance, recording applied versions in the
/// tracking table.
pub trait MigrationEngine: Send + Sync {
    fn apply(&self, target: &MigrationTarget<'_>) -> Result<(), CoreError>;
}

impl<F> MigrationEngine for F
where
    F: Fn(&MigrationTarget<'_>) -> Result<(), CoreError> + Send + Sync,
{
    fn apply(&self, target: &MigrationTarget<'_>) -> Result<(), CoreError> {
        self(target)
    }
}

/// Drives the Flyway command line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlywayCli {
    command: String,
    extra_args: Vec<String>,
}

impl Default for FlywayCli {
    fn default() -> Self {
        Self::new("flyway", Vec::new())
    }
}

impl FlywayCli {
    pub fn new(command: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            extra_args,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self, target: &MigrationTarget<'_>) -> Vec<String> {
        let mut args = vec![
            format!("-url={}", target.address.jdbc_url()),
            format!("-user={}", target.credentials.user),
            format!("-locations=filesystem:{}", target.location.display()),
            format!("-table={}", target.tracking_table),
        ];
        if let Some(schema) = target.schema {
            args.push(format!("-schemas={schema}"));
        }
        args.push("-baselineOnMigrate=true".to_owned());
        args.extend(self.extra_args.iter().cloned());
        args.push("migrate".to_owned());
        args
    }

    /// Secrets go through the environment, out of sight of `ps`.
    pub fn environment<'a>(target: &MigrationTarget<'a>) -> [(&'static str, &'a str); 1] {
        [("FLYWAY_PASSWORD", target.credentials.password.as_str())]
    }
}

impl MigrationEngine for FlywayCli {
    fn apply(&self, target: &MigrationTarget<'_>) -> Result<(), CoreError> {
        debug!(
            "running {} migrate against {}",
            self.command,
            target.address
        );
        let output = Command::new(&self.command)
            .args(self.args(target))
            .envs(Self::environment(target))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| target.failed(format!("failed to run {}: {e}", self.command)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!("flyway: {line}");
        }
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        Err(target.failed(format!(
            "{} exited with code {}: {detail}",
            self.command,
            output.status.code().unwrap_or(-1)
        )))
    }
}

pub fn select_migrator(section: &RuntimeSection) -> Result<Box<dyn MigrationEngine>, CoreError> {
    match section.migrator.as_str() {
        "flyway" => Ok(Box::new(FlywayCli::new(
            section.flyway_command.clone(),
            section.flyway_args.clone(),
        ))),
        other => Err(CoreError::Config(format!("unknown migrator '{other}'"))),
    }
}
