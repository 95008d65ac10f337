use super::{load_project, make_engine, Project, EXIT_FAILURE, EXIT_SUCCESS};
use dbsnap_runtime::{check_docker_prereqs, check_flyway_prereqs, format_missing, MissingPrereq};
use std::path::Path;

pub fn run(config: &Path, backend: Option<&str>, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    if config.exists() {
        match load_project(config) {
            Ok(project) => {
                checks.push(Check::pass(
                    "project_file",
                    &format!("Project file {} is valid", config.display()),
                ));
                check_prereqs(&project, backend, &mut checks, &mut all_pass);
                check_migrations(&project, backend, &mut checks, &mut all_pass);
            }
            Err(e) => {
                all_pass = false;
                checks.push(Check::fail("project_file", &e));
            }
        }
    } else {
        checks.push(Check::info(
            "project_file",
            &format!("No project file at {}", config.display()),
        ));
        check_tool("docker", &check_docker_prereqs("docker"), &mut checks);
        check_tool("flyway", &check_flyway_prereqs("flyway"), &mut checks);
    }

    print_results(&checks, all_pass, json_output)
}

fn check_tool(name: &str, missing: &[MissingPrereq], checks: &mut Vec<Check>) {
    if missing.is_empty() {
        checks.push(Check::pass(name, &format!("{name} is available")));
    } else {
        checks.push(Check::warn(name, &format_missing(missing)));
    }
}

fn check_prereqs(
    project: &Project,
    backend: Option<&str>,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    let runtime = &project.file.runtime;
    let mut missing = Vec::new();
    if project.backend_name(backend) == "docker" {
        missing.extend(check_docker_prereqs("docker"));
    }
    if runtime.migrator == "flyway" {
        missing.extend(check_flyway_prereqs(&runtime.flyway_command));
    }
    if missing.is_empty() {
        checks.push(Check::pass(
            "runtime_prereqs",
            "Runtime prerequisites satisfied",
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail("runtime_prereqs", &format_missing(&missing)));
    }
}

fn check_migrations(
    project: &Project,
    backend: Option<&str>,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    let engine = match make_engine(project, backend) {
        Ok(engine) => engine,
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("engine", &e));
            return;
        }
    };
    match engine.fingerprint(&project.set) {
        Ok(snapshot) => checks.push(Check::pass(
            "migrations",
            &format!("Migrations resolve to {snapshot}"),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("migrations", &e.to_string()));
        }
    }

    if !engine.backend().available() {
        checks.push(Check::warn(
            "backend",
            &format!("Backend '{}' is not reachable", engine.backend().name()),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("dbsnap doctor\n");
        for check in checks {
            let icon = match check.status.as_str() {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: String,
    message: String,
}

impl Check {
    fn new(name: &str, status: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: status.to_owned(),
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
