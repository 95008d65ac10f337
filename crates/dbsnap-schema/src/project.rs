use crate::migration_set::{MigrationSet, DEFAULT_MIGRATION_PATH, DEFAULT_TRACKING_TABLE};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const PROJECT_FILE_NAME: &str = "dbsnap.toml";

/// On-disk `dbsnap.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    #[serde(default)]
    pub migrations: MigrationsSection,
    pub snapshot: SnapshotSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MigrationsSection {
    #[serde(default = "default_migration_path")]
    pub path: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_tracking_table")]
    pub table: String,
    #[serde(default)]
    pub init_scripts: Vec<String>,
}

impl Default for MigrationsSection {
    fn default() -> Self {
        Self {
            path: default_migration_path(),
            schema: None,
            table: default_tracking_table(),
            init_scripts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSection {
    pub name: String,
    #[serde(default)]
    pub base_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    #[serde(default)]
    pub registry_prefix: Option<String>,
    #[serde(default = "default_migrator")]
    pub migrator: String,
    #[serde(default = "default_flyway_command")]
    pub flyway_command: String,
    #[serde(default)]
    pub flyway_args: Vec<String>,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            startup_timeout_secs: default_startup_timeout(),
            registry_prefix: None,
            migrator: default_migrator(),
            flyway_command: default_flyway_command(),
            flyway_args: Vec::new(),
        }
    }
}

fn default_migration_path() -> String {
    DEFAULT_MIGRATION_PATH.to_owned()
}

fn default_tracking_table() -> String {
    DEFAULT_TRACKING_TABLE.to_owned()
}

fn default_backend() -> String {
    "docker".to_owned()
}

fn default_startup_timeout() -> u64 {
    60
}

fn default_migrator() -> String {
    "flyway".to_owned()
}

fn default_flyway_command() -> String {
    "flyway".to_owned()
}

impl ProjectFile {
    /// Validate and convert the `[migrations]` and `[snapshot]` sections.
    pub fn migration_set(&self) -> Result<MigrationSet, SchemaError> {
        let mut builder = MigrationSet::builder()
            .migration_path(self.migrations.path.clone())
            .tracking_table(self.migrations.table.clone())
            .snapshot_name(self.snapshot.name.clone())
            .init_scripts(self.migrations.init_scripts.iter().cloned());
        if let Some(schema) = &self.migrations.schema {
            builder = builder.schema(schema.clone());
        }
        if let Some(image) = &self.snapshot.base_image {
            builder = builder.base_image(image.clone());
        }
        builder.build()
    }
}

pub fn parse_project_str(input: &str) -> Result<ProjectFile, SchemaError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_project_file(path: impl AsRef<Path>) -> Result<ProjectFile, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_project_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_project() {
        let input = r#"
[migrations]
path = "filesystem:./db/migration"
schema = "app"
table = "flyway_history"
init_scripts = ["db/init/roles.sql", "db/init/ext.sql"]

[snapshot]
name = "myapp-it"
base_image = "postgres:16-alpine"

[runtime]
backend = "mock"
startup_timeout_secs = 90
registry_prefix = "registry.local/team"
migrator = "flyway"
flyway_command = "/opt/flyway/flyway"
flyway_args = ["-cleanDisabled=true"]
"#;
        let project = parse_project_str(input).expect("should parse");
        assert_eq!(project.runtime.backend, "mock");
        assert_eq!(project.runtime.startup_timeout_secs, 90);
        assert_eq!(project.runtime.flyway_args, ["-cleanDisabled=true"]);

        let set = project.migration_set().unwrap();
        assert_eq!(set.schema(), Some("app"));
        assert_eq!(set.tracking_table(), "flyway_history");
        assert_eq!(set.base_image(), Some("postgres:16-alpine"));
        assert_eq!(set.init_script_paths().len(), 2);
    }

    #[test]
    fn parses_minimal_project() {
        let project = parse_project_str(
            r#"
[snapshot]
name = "postgres-it-example"
"#,
        )
        .expect("should parse");
        assert_eq!(project.runtime, RuntimeSection::default());
        assert_eq!(project.runtime.backend, "docker");
        assert_eq!(project.runtime.startup_timeout_secs, 60);

        let set = project.migration_set().unwrap();
        assert_eq!(set.migration_path(), "db/migration");
        assert_eq!(set.tracking_table(), "schema_version");
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
[snapshot]
name = "app"
tag = "latest"
"#;
        assert!(parse_project_str(input).is_err());
    }

    #[test]
    fn rejects_missing_snapshot_section() {
        let input = r#"
[migrations]
path = "db/migration"
"#;
        assert!(parse_project_str(input).is_err());
    }

    #[test]
    fn invalid_snapshot_name_surfaces_on_conversion() {
        let project = parse_project_str(
            r#"
[snapshot]
name = "Not Valid"
"#,
        )
        .unwrap();
        assert!(matches!(
            project.migration_set(),
            Err(SchemaError::InvalidMigrationSet(_))
        ));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_FILE_NAME);
        fs::write(&path, "[snapshot]\nname = \"disk\"\n").unwrap();
        let project = parse_project_file(&path).unwrap();
        assert_eq!(project.snapshot.name, "disk");
    }
}
