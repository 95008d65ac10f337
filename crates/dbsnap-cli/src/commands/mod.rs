pub mod completions;
pub mod doctor;
pub mod fingerprint;
pub mod inspect;
pub mod provision;
pub mod prune;

use dbsnap_core::{backend_options, select_migrator, Engine, EngineConfig};
use dbsnap_runtime::{check_docker_prereqs, check_flyway_prereqs, format_missing, select_backend};
use dbsnap_schema::{parse_project_file, MigrationSet, ProjectFile, ResourceLocator};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_RUNTIME_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_outcome(outcome: &str) -> String {
    use console::Style;
    match outcome {
        "cache_hit" => Style::new().green().apply_to(outcome).to_string(),
        "built" => Style::new().cyan().bold().apply_to(outcome).to_string(),
        "lost_race" => Style::new().yellow().apply_to(outcome).to_string(),
        other => other.to_owned(),
    }
}

/// A loaded project file and the migration set it describes.
pub struct Project {
    pub file: ProjectFile,
    pub set: MigrationSet,
    /// Resource root for bare and `classpath:` paths.
    pub root: PathBuf,
}

impl Project {
    pub fn backend_name<'a>(&'a self, backend_override: Option<&'a str>) -> &'a str {
        backend_override.unwrap_or(&self.file.runtime.backend)
    }
}

pub fn load_project(config: &Path) -> Result<Project, String> {
    let file = parse_project_file(config)
        .map_err(|e| format!("failed to load {}: {e}", config.display()))?;
    let set = file.migration_set().map_err(|e| format!("migration set error: {e}"))?;
    let root = match config.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    debug!(
        "loaded {} (snapshot {}, resources under {})",
        config.display(),
        set.snapshot_name(),
        root.display()
    );
    Ok(Project { file, set, root })
}

pub fn make_engine(project: &Project, backend_override: Option<&str>) -> Result<Engine, String> {
    let runtime = &project.file.runtime;
    let backend_name = project.backend_name(backend_override);
    debug!(
        "using backend {backend_name} with migrator {}",
        runtime.migrator
    );
    let backend = select_backend(backend_name, &backend_options(runtime))
        .map_err(|e| format!("runtime error: {e}"))?;
    let migrator = select_migrator(runtime).map_err(|e| e.to_string())?;
    let config = EngineConfig::from_runtime_section(runtime).map_err(|e| e.to_string())?;
    Ok(Engine::new(backend, migrator)
        .with_locator(ResourceLocator::with_root(&project.root))
        .with_config(config))
}

/// Fail early when the docker backend (and, for builds, the migrator) cannot
/// work on this machine. `DBSNAP_SKIP_PREREQS=1` disables the check.
pub fn ensure_prereqs(
    project: &Project,
    backend_override: Option<&str>,
    needs_migrator: bool,
) -> Result<(), String> {
    if std::env::var("DBSNAP_SKIP_PREREQS").as_deref() == Ok("1") {
        debug!("skipping prerequisite checks");
        return Ok(());
    }
    let mut missing = Vec::new();
    if project.backend_name(backend_override) == "docker" {
        missing.extend(check_docker_prereqs("docker"));
    }
    if needs_migrator && project.file.runtime.migrator == "flyway" {
        missing.extend(check_flyway_prereqs(&project.file.runtime.flyway_command));
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format_missing(&missing))
    }
}
