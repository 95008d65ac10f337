use crate::CoreError;
use dbsnap_runtime::{BackendOptions, InstanceCredentials};
use dbsnap_schema::{MigrationSet, RuntimeSection};
use std::time::Duration;

pub const DEFAULT_BASE_IMAGE: &str = "postgres:15.4-alpine";

/// Orchestrator settings that do not belong to a single migration set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base image for sets that do not name one.
    pub default_base_image: String,
    /// Fixed credentials every build instance is provisioned with; they end
    /// up baked into the published snapshot.
    pub credentials: InstanceCredentials,
    /// Repository prefix, e.g. `registry.example.com/team`.
    pub registry_prefix: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_base_image: DEFAULT_BASE_IMAGE.to_owned(),
            credentials: InstanceCredentials {
                database: "database".to_owned(),
                user: "user".to_owned(),
                password: "password".to_owned(),
            },
            registry_prefix: None,
        }
    }
}

impl EngineConfig {
    pub fn from_runtime_section(section: &RuntimeSection) -> Result<Self, CoreError> {
        let mut config = Self::default();
        if let Some(prefix) = &section.registry_prefix {
            config = config.with_registry_prefix(prefix)?;
        }
        Ok(config)
    }

    pub fn with_registry_prefix(mut self, prefix: &str) -> Result<Self, CoreError> {
        let prefix = prefix.trim().trim_end_matches('/');
        if prefix.is_empty() || prefix.contains(char::is_whitespace) || prefix.contains("//") {
            return Err(CoreError::Config(format!(
                "invalid registry prefix '{prefix}'"
            )));
        }
        self.registry_prefix = Some(prefix.to_owned());
        Ok(self)
    }

    pub fn base_image<'a>(&'a self, set: &'a MigrationSet) -> &'a str {
        set.base_image().unwrap_or(&self.default_base_image)
    }

    /// Repository the set's snapshots are published under.
    pub fn repository(&self, snapshot_name: &str) -> String {
        match &self.registry_prefix {
            Some(prefix) => format!("{prefix}/{snapshot_name}"),
            None => snapshot_name.to_owned(),
        }
    }
}

pub fn backend_options(section: &RuntimeSection) -> BackendOptions {
    BackendOptions {
        startup_timeout: Duration::from_secs(section.startup_timeout_secs),
        ..BackendOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(base: Option<&str>) -> MigrationSet {
        let mut builder = MigrationSet::builder().snapshot_name("myapp");
        if let Some(base) = base {
            builder = builder.base_image(base);
        }
        builder.build().unwrap()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.base_image(&set(None)), "postgres:15.4-alpine");
        assert_eq!(config.base_image(&set(Some("pg:15"))), "pg:15");
        assert_eq!(config.credentials.database, "database");
        assert_eq!(config.repository("myapp"), "myapp");
    }

    #[test]
    fn registry_prefix_applied() {
        let config = EngineConfig::default()
            .with_registry_prefix("registry.example.com/team/")
            .unwrap();
        assert_eq!(config.repository("myapp"), "registry.example.com/team/myapp");
    }

    #[test]
    fn bad_registry_prefix_rejected() {
        assert!(EngineConfig::default().with_registry_prefix("  ").is_err());
        assert!(EngineConfig::default().with_registry_prefix("a b").is_err());
        assert!(EngineConfig::default().with_registry_prefix("a//b").is_err());
    }

    #[test]
    fn from_runtime_section() {
        let section = RuntimeSection {
            registry_prefix: Some("registry.local".to_owned()),
            startup_timeout_secs: 90,
            ..RuntimeSection::default()
        };
        let config = EngineConfig::from_runtime_section(&section).unwrap();
        assert_eq!(config.registry_prefix.as_deref(), Some("registry.local"));
        assert_eq!(backend_options(&section).startup_timeout, Duration::from_secs(90));
        assert_eq!(backend_options(&section).docker_command, "docker");
    }
}
