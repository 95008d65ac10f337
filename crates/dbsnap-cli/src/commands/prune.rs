use super::{ensure_prereqs, json_pretty, load_project, make_engine, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;

pub fn run(
    config: &Path,
    backend: Option<&str>,
    keep_current: bool,
    dry_run: bool,
    json: bool,
) -> Result<u8, String> {
    let project = load_project(config)?;
    ensure_prereqs(&project, backend, false)?;
    let engine = make_engine(&project, backend)?;
    let report = engine
        .prune(&project.set, keep_current, dry_run)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        let verb = if dry_run { "would remove" } else { "removed" };
        if let Some(kept) = &report.kept {
            println!("kept {kept}");
        }
        for reference in &report.removed {
            println!("{verb} {reference}");
        }
        for (reference, reason) in &report.failed {
            println!("failed to remove {reference}: {reason}");
        }
        if report.removed.is_empty() && report.failed.is_empty() {
            println!("nothing to prune in {}", report.repository);
        }
    }
    Ok(if report.failed.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
