use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn daemon_reachable(docker: &str) -> bool {
    Command::new(docker)
        .args(["info", "--format", "{{.ServerVersion}}"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check prerequisites for the docker backend.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_docker_prereqs(docker: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists(docker) {
        missing.push(MissingPrereq {
            name: "docker",
            purpose: "running database containers and storing snapshots",
            install_hint: "https://docs.docker.com/engine/install/ | apt install docker.io | dnf install moby-engine",
        });
    } else if !daemon_reachable(docker) {
        missing.push(MissingPrereq {
            name: "docker daemon",
            purpose: "container runtime reachable from this user",
            install_hint: "systemctl start docker, and add the user to the 'docker' group",
        });
    }

    missing
}

/// Check prerequisites for the Flyway migrator.
pub fn check_flyway_prereqs(flyway: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists(flyway) {
        missing.push(MissingPrereq {
            name: "flyway",
            purpose: "applying migrations to the ephemeral instance",
            install_hint: "https://documentation.red-gate.com/fd/command-line-184127404.html",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\ndbsnap requires these tools to build and reuse database snapshots.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "docker",
            purpose: "running containers",
            install_hint: "apt install docker.io",
        };
        let s = format!("{m}");
        assert!(s.contains("docker"));
        assert!(s.contains("running containers"));
        assert!(s.contains("apt install docker.io"));
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![
            MissingPrereq {
                name: "docker",
                purpose: "containers",
                install_hint: "apt install docker.io",
            },
            MissingPrereq {
                name: "flyway",
                purpose: "migrations",
                install_hint: "download flyway",
            },
        ];
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("docker"));
        assert!(output.contains("flyway"));
    }

    #[test]
    fn absent_binaries_are_reported() {
        let missing = check_docker_prereqs("dbsnap-no-such-docker-binary");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "docker");

        let missing = check_flyway_prereqs("dbsnap-no-such-flyway-binary");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "flyway");
    }
}
