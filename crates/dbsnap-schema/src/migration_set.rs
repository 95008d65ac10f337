use crate::SchemaError;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const DEFAULT_MIGRATION_PATH: &str = "db/migration";
pub const DEFAULT_TRACKING_TABLE: &str = "schema_version";

/// A migration job: where the scripts live, what to run first, and which
/// snapshot name the populated instance is published under.
///
/// Constructed through [`MigrationSet::builder`]; `build()` rejects missing
/// or empty required fields, so a `MigrationSet` in hand is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSet {
    schema: Option<String>,
    migration_path: String,
    base_image: Option<String>,
    snapshot_name: String,
    init_script_paths: Vec<String>,
    tracking_table: String,
}

impl MigrationSet {
    pub fn builder() -> MigrationSetBuilder {
        MigrationSetBuilder::default()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn migration_path(&self) -> &str {
        &self.migration_path
    }

    pub fn base_image(&self) -> Option<&str> {
        self.base_image.as_deref()
    }

    pub fn snapshot_name(&self) -> &str {
        &self.snapshot_name
    }

    pub fn init_script_paths(&self) -> &[String] {
        &self.init_script_paths
    }

    pub fn tracking_table(&self) -> &str {
        &self.tracking_table
    }
}

#[derive(Debug, Clone)]
pub struct MigrationSetBuilder {
    schema: Option<String>,
    migration_path: String,
    base_image: Option<String>,
    snapshot_name: Option<String>,
    init_script_paths: Vec<String>,
    tracking_table: String,
}

impl Default for MigrationSetBuilder {
    fn default() -> Self {
        Self {
            schema: None,
            migration_path: DEFAULT_MIGRATION_PATH.to_owned(),
            base_image: None,
            snapshot_name: None,
            init_script_paths: Vec::new(),
            tracking_table: DEFAULT_TRACKING_TABLE.to_owned(),
        }
    }
}

impl MigrationSetBuilder {
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn migration_path(mut self, path: impl Into<String>) -> Self {
        self.migration_path = path.into();
        self
    }

    #[must_use]
    pub fn base_image(mut self, image: impl Into<String>) -> Self {
        self.base_image = Some(image.into());
        self
    }

    #[must_use]
    pub fn snapshot_name(mut self, name: impl Into<String>) -> Self {
        self.snapshot_name = Some(name.into());
        self
    }

    /// Append init scripts; they run (and are hashed) in the order given.
    #[must_use]
    pub fn init_scripts<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.init_script_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn tracking_table(mut self, table: impl Into<String>) -> Self {
        self.tracking_table = table.into();
        self
    }

    pub fn build(self) -> Result<MigrationSet, SchemaError> {
        let invalid = |msg: &str| Err(SchemaError::InvalidMigrationSet(msg.to_owned()));

        if self.migration_path.trim().is_empty() {
            return invalid("migration path must not be empty");
        }
        let Some(snapshot_name) = self.snapshot_name else {
            return invalid("snapshot name is required");
        };
        validate_snapshot_name(&snapshot_name)?;
        if self.tracking_table.trim().is_empty() {
            return invalid("tracking table must not be empty");
        }
        if self.schema.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return invalid("schema must not be empty when set");
        }
        if self.base_image.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return invalid("base image must not be empty when set");
        }
        if self.init_script_paths.iter().any(|p| p.trim().is_empty()) {
            return invalid("init script paths must not be empty");
        }

        Ok(MigrationSet {
            schema: self.schema,
            migration_path: self.migration_path,
            base_image: self.base_image,
            snapshot_name,
            init_script_paths: self.init_script_paths,
            tracking_table: self.tracking_table,
        })
    }
}

/// Repository name grammar: `/`-separated path components, each lowercase
/// alphanumeric runs joined by `.`, `_`, `__`, or one or more `-`.
pub const SNAPSHOT_NAME_PATTERN: &str =
    r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$";

fn snapshot_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SNAPSHOT_NAME_PATTERN).expect("snapshot name pattern is valid"))
}

/// Snapshot names become image repository names, so they must satisfy the
/// registry reference grammar before any container is started.
pub fn validate_snapshot_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 255 {
        return Err(SchemaError::InvalidMigrationSet(
            "snapshot name must be 1-255 characters".to_owned(),
        ));
    }
    if !snapshot_name_regex().is_match(name) {
        return Err(SchemaError::InvalidMigrationSet(format!(
            "snapshot name '{name}' is not a valid repository name \
             (lowercase [a-z0-9] separated by '.', '_', '__', '-' or '/')"
        )));
    }
    Ok(())
}
