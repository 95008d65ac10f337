//! Docker backend: drives the `docker` CLI to run PostgreSQL containers,
//! commit them as snapshot images, and query the local image store.

use crate::backend::RuntimeBackend;
use crate::controller::{ConnectionAddress, InstanceController, InstanceCredentials};
use crate::lifecycle::{validate_transition, InstanceState};
use crate::registry::{parse_env_entries, SnapshotRecord, SnapshotRegistry};
use crate::RuntimeError;
use chrono::{DateTime, Utc};
use dbsnap_schema::InitScript;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write as _};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POSTGRES_PORT: &str = "5432/tcp";

/// Data directory outside the image's declared volume, so `docker commit`
/// captures it.
pub const PGDATA_DIR: &str = "/var/lib/postgresql/data-no-mounted";

/// initdb's temporary server logs this once before the real server does.
const READY_LINE: &str = "database system is ready to accept connections";
const READY_OCCURRENCES: usize = 2;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub const COMMIT_MESSAGE: &str = "Container for integration tests. \
    It uses non default location for PGDATA which is not mounted to a volume";
pub const COMMIT_LABEL: &str = "org.testcontainers=false";

#[derive(Debug, Clone)]
struct DockerCli {
    command: String,
}

impl DockerCli {
    fn output(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.command, args.join(" "));
        let mut cmd = Command::new(&self.command);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        let Some(input) = stdin else {
            return cmd.stdin(Stdio::null()).output().map_err(|e| {
                RuntimeError::ExecFailed(format!("failed to run {}: {e}", self.command))
            });
        };

        let mut child = cmd
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::ExecFailed(format!("failed to run {}: {e}", self.command)))?;
        let pipe = child.stdin.take();

        // stdin is fed from its own thread while the pipes drain, so a chatty
        // child cannot fill stdout and block on input we have not sent yet.
        std::thread::scope(|scope| -> Result<Output, RuntimeError> {
            let writer = scope.spawn(move || match pipe {
                Some(mut pipe) => pipe.write_all(input),
                None => Ok(()),
            });
            let output = child.wait_with_output()?;
            match writer.join() {
                // An early exit closes the pipe; the exit status tells the story.
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(RuntimeError::Io(e)),
                Err(_) => {
                    return Err(RuntimeError::ExecFailed(format!(
                        "stdin writer for {} panicked",
                        self.command
                    )))
                }
            }
            Ok(output)
        })
    }

    /// Run to completion; on success the trimmed stdout, otherwise a reason
    /// built from stderr.
    fn checked(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<String, String> {
        let output = self.output(args, stdin).map_err(|e| e.to_string())?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
        } else {
            Err(failure_reason(args, &output))
        }
    }

    fn force_remove(&self, container: &str) {
        if let Err(reason) = self.checked(&["rm", "-f", "-v", container], None) {
            warn!("failed to remove container {container}: {reason}");
        }
    }
}

fn failure_reason(args: &[&str], output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!(
        "docker {} exited with code {}: {}",
        args.first().copied().unwrap_or_default(),
        output.status.code().unwrap_or(-1),
        stderr.trim()
    )
}

pub struct DockerBackend {
    cli: DockerCli,
    startup_timeout: Duration,
}

impl DockerBackend {
    pub fn new(command: impl Into<String>, startup_timeout: Duration) -> Self {
        Self {
            cli: DockerCli {
                command: command.into(),
            },
            startup_timeout,
        }
    }

    fn inspect(&self, references: &[&str]) -> Result<Vec<SnapshotRecord>, RuntimeError> {
        let mut args = vec!["image", "inspect"];
        args.extend_from_slice(references);
        let stdout = self.cli.checked(&args, None).map_err(|reason| RuntimeError::Registry {
            reference: references.join(" "),
            reason,
        })?;
        parse_inspect_output(references, &stdout).map_err(|e| RuntimeError::Registry {
            reference: references.join(" "),
            reason: format!("unreadable image inspect output: {e}"),
        })
    }
}

impl RuntimeBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn available(&self) -> bool {
        self.cli
            .checked(&["version", "--format", "{{.Server.Version}}"], None)
            .is_ok()
    }

    fn controller(&self, base_image: &str) -> Box<dyn InstanceController> {
        Box::new(DockerController {
            cli: self.cli.clone(),
            base_image: base_image.to_owned(),
            startup_timeout: self.startup_timeout,
            container: None,
            credentials: None,
            state: InstanceState::Idle,
        })
    }

    fn registry(&self) -> &dyn SnapshotRegistry {
        self
    }
}

impl SnapshotRegistry for DockerBackend {
    fn find(&self, name: &str, tag: &str) -> Result<Option<SnapshotRecord>, RuntimeError> {
        let reference = format!("{name}:{tag}");
        let output = self.cli.output(&["image", "inspect", &reference], None)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_image(&stderr) {
                return Ok(None);
            }
            return Err(RuntimeError::Registry {
                reference,
                reason: failure_reason(&["image"], &output),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let records = parse_inspect_output(&[reference.as_str()], &stdout).map_err(|e| {
            RuntimeError::Registry {
                reference: reference.clone(),
                reason: format!("unreadable image inspect output: {e}"),
            }
        })?;
        Ok(records.into_iter().next())
    }

    fn list(&self, name: &str) -> Result<Vec<SnapshotRecord>, RuntimeError> {
        let filter = format!("reference={name}");
        let stdout = self
            .cli
            .checked(
                &["images", "--filter", &filter, "--format", "{{.Repository}}:{{.Tag}}"],
                None,
            )
            .map_err(|reason| RuntimeError::Registry {
                reference: name.to_owned(),
                reason,
            })?;
        let references = parse_image_list(&stdout);
        if references.is_empty() {
            return Ok(Vec::new());
        }
        let refs: Vec<&str> = references.iter().map(String::as_str).collect();
        self.inspect(&refs)
    }

    fn remove(&self, reference: &str) -> Result<(), RuntimeError> {
        self.cli
            .checked(&["rmi", reference], None)
            .map(drop)
            .map_err(|reason| RuntimeError::Registry {
                reference: reference.to_owned(),
                reason,
            })
    }
}

pub struct DockerController {
    cli: DockerCli,
    base_image: String,
    startup_timeout: Duration,
    container: Option<String>,
    credentials: Option<InstanceCredentials>,
    state: InstanceState,
}

impl DockerController {
    fn wait_until_ready(&self, container: &str, deadline: Instant) -> Result<(), String> {
        loop {
            let output = self
                .cli
                .output(&["logs", container], None)
                .map_err(|e| e.to_string())?;
            // postgres logs to stderr
            let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
            logs.push_str(&String::from_utf8_lossy(&output.stderr));
            if count_ready_lines(&logs) >= READY_OCCURRENCES {
                return Ok(());
            }

            let running = self
                .cli
                .checked(&["inspect", "-f", "{{.State.Running}}", container], None)?;
            if running != "true" {
                return Err("container exited before accepting connections".to_owned());
            }
            if Instant::now() >= deadline {
                return Err(format!(
                    "not ready within {}s",
                    self.startup_timeout.as_secs()
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn launch(
        &self,
        container: &str,
        credentials: &InstanceCredentials,
        init_scripts: &[InitScript],
    ) -> Result<u16, RuntimeError> {
        let startup_failed = |reason: String| RuntimeError::StartupFailed {
            image: self.base_image.clone(),
            reason,
        };

        self.cli
            .checked(&["start", container], None)
            .map_err(startup_failed)?;
        // Image pulls and container creation do not count against startup.
        let deadline = Instant::now() + self.startup_timeout;

        self.wait_until_ready(container, deadline)
            .map_err(startup_failed)?;
        let mapping = self
            .cli
            .checked(&["port", container, POSTGRES_PORT], None)
            .map_err(startup_failed)?;
        let port = parse_port_mapping(&mapping)
            .ok_or_else(|| startup_failed(format!("no host port in '{mapping}'")))?;

        for script in init_scripts {
            debug!("applying init script {}", script.path);
            let args = psql_script_args(container, credentials);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            self.cli
                .checked(&args, Some(&script.content))
                .map_err(|reason| RuntimeError::InitScriptFailed {
                    path: script.path.clone(),
                    reason,
                })?;
        }
        Ok(port)
    }
}

impl InstanceController for DockerController {
    fn start(
        &mut self,
        credentials: &InstanceCredentials,
        init_scripts: &[InitScript],
    ) -> Result<ConnectionAddress, RuntimeError> {
        validate_transition(&self.base_image, self.state, InstanceState::Running)?;
        info!("starting instance from {}", self.base_image);

        let args = create_args(&self.base_image, credentials);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let container = self
            .cli
            .checked(&args, None)
            .map_err(|reason| RuntimeError::StartupFailed {
                image: self.base_image.clone(),
                reason,
            })?;

        // Nothing may outlive a failed start, including a container that
        // was created but never started.
        let port = match self.launch(&container, credentials, init_scripts) {
            Ok(port) => port,
            Err(e) => {
                self.cli.force_remove(&container);
                return Err(e);
            }
        };

        debug!("instance {container} ready on port {port}");
        self.container = Some(container);
        self.credentials = Some(credentials.clone());
        self.state = InstanceState::Running;
        Ok(ConnectionAddress {
            host: "127.0.0.1".to_owned(),
            port,
            database: credentials.database.clone(),
        })
    }

    fn stop(&mut self) -> Result<(), RuntimeError> {
        validate_transition(&self.base_image, self.state, InstanceState::Stopped)?;
        self.state = InstanceState::Stopped;
        self.credentials = None;
        let Some(container) = self.container.take() else {
            return Ok(());
        };
        self.cli
            .checked(&["rm", "-f", "-v", &container], None)
            .map(drop)
            .map_err(RuntimeError::ExecFailed)
    }

    fn freeze(&mut self, name: &str, tag: &str) -> Result<String, RuntimeError> {
        validate_transition(&self.base_image, self.state, InstanceState::Frozen)?;
        let reference = format!("{name}:{tag}");
        let freeze_failed = |reason: String| RuntimeError::FreezeFailed {
            reference: reference.clone(),
            reason,
        };
        let (Some(container), Some(credentials)) = (&self.container, &self.credentials) else {
            return Err(RuntimeError::NotRunning(self.base_image.clone()));
        };

        let args = psql_checkpoint_args(container, credentials);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.cli.checked(&args, None).map_err(freeze_failed)?;
        debug!("checkpoint finished for {container}");

        let args = commit_args(container, &reference);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let image_id = self.cli.checked(&args, None).map_err(freeze_failed)?;
        self.state = InstanceState::Frozen;
        Ok(image_id)
    }

    fn base_identity(&self) -> &str {
        &self.base_image
    }

    fn state(&self) -> InstanceState {
        self.state
    }
}

fn create_args(image: &str, credentials: &InstanceCredentials) -> Vec<String> {
    let mut args: Vec<String> = ["create", "-p", "127.0.0.1::5432"]
        .into_iter()
        .map(str::to_owned)
        .collect();
    for (key, value) in credentials.env_pairs() {
        args.push("-e".to_owned());
        args.push(format!("{key}={value}"));
    }
    args.push("-e".to_owned());
    args.push(format!("PGDATA={PGDATA_DIR}"));
    args.push(image.to_owned());
    args
}

fn psql_script_args(container: &str, credentials: &InstanceCredentials) -> Vec<String> {
    [
        "exec",
        "-i",
        container,
        "psql",
        "-v",
        "ON_ERROR_STOP=1",
        "-q",
        "-U",
        &credentials.user,
        "-d",
        &credentials.database,
        "-f",
        "-",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn psql_checkpoint_args(container: &str, credentials: &InstanceCredentials) -> Vec<String> {
    [
        "exec",
        container,
        "psql",
        "-U",
        &credentials.user,
        "-d",
        &credentials.database,
        "-c",
        "CHECKPOINT",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn commit_args(container: &str, reference: &str) -> Vec<String> {
    [
        "commit",
        "--message",
        COMMIT_MESSAGE,
        "--change",
        &format!("LABEL {COMMIT_LABEL}"),
        container,
        reference,
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn count_ready_lines(logs: &str) -> usize {
    logs.lines().filter(|l| l.contains(READY_LINE)).count()
}

/// First host port in `docker port` output (`0.0.0.0:49153`, `[::]:49153`).
fn parse_port_mapping(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}

fn parse_image_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.contains("<none>"))
        .map(str::to_owned)
        .collect()
}

fn is_missing_image(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("no such image")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedImage {
    id: String,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    config: Option<InspectedConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedConfig {
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

/// Decode `docker image inspect` output. Entries come back in the order the
/// references were given.
fn parse_inspect_output(
    references: &[&str],
    json: &str,
) -> Result<Vec<SnapshotRecord>, serde_json::Error> {
    let images: Vec<InspectedImage> = serde_json::from_str(json)?;
    Ok(images
        .into_iter()
        .zip(references)
        .map(|(image, reference)| {
            let config = image.config.unwrap_or_default();
            SnapshotRecord {
                id: image.id,
                reference: (*reference).to_owned(),
                created: image
                    .created
                    .as_deref()
                    .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
                    .map(|c| c.with_timezone(&Utc)),
                env: parse_env_entries(config.env.iter().flatten().map(String::as_str)),
                labels: config.labels.unwrap_or_default(),
            }
        })
        .collect())
}
