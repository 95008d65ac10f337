//! In-memory backend for tests.
//!
//! Clones of a [`MockBackend`] share one snapshot store, so several
//! controllers (standing in for independent builder processes) observe each
//! other's publications. Call counters and fault switches make lifecycle
//! behaviour observable.

use crate::backend::RuntimeBackend;
use crate::controller::{ConnectionAddress, InstanceController, InstanceCredentials};
use crate::lifecycle::{validate_transition, InstanceState};
use crate::registry::{split_reference, SnapshotRecord, SnapshotRegistry};
use crate::RuntimeError;
use chrono::{DateTime, Utc};
use dbsnap_schema::InitScript;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const FIRST_PORT: u16 = 54320;

/// Call counters across every controller sharing the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MockStats {
    /// `start` calls, successful or not.
    pub starts: usize,
    pub stops: usize,
    /// `freeze` calls, successful or not.
    pub freezes: usize,
    /// Freezes that replaced an already published reference.
    pub overwrites: usize,
    /// Instances started and not yet stopped.
    pub live: usize,
}

#[derive(Debug, Default, Clone)]
pub struct MockFaults {
    pub fail_start: bool,
    /// Fail when the init script with this configured path runs.
    pub fail_init_script: Option<String>,
    pub fail_freeze: bool,
    /// Report a successful freeze without publishing anything.
    pub lose_publication: bool,
    pub fail_stop: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    snapshots: BTreeMap<String, SnapshotRecord>,
    stats: MockStats,
    faults: MockFaults,
    next_id: u64,
    next_port: u16,
}

impl StoreState {
    fn mint_id(&mut self) -> String {
        self.next_id += 1;
        format!("sha256:mock{:08x}", self.next_id)
    }

    fn insert(&mut self, record: SnapshotRecord) {
        if self.snapshots.insert(record.reference.clone(), record).is_some() {
            self.stats.overwrites += 1;
        }
    }
}

type Store = Arc<Mutex<StoreState>>;

fn lock(store: &Store) -> Result<MutexGuard<'_, StoreState>, RuntimeError> {
    store
        .lock()
        .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    store: Store,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> MockStats {
        self.state().stats
    }

    pub fn set_faults(&self, faults: MockFaults) {
        self.state().faults = faults;
    }

    /// Publish a snapshot directly, as another builder process would.
    pub fn publish(&self, reference: &str, env: &[(&str, &str)]) -> SnapshotRecord {
        self.publish_at(reference, Utc::now(), env)
    }

    pub fn publish_at(
        &self,
        reference: &str,
        created: DateTime<Utc>,
        env: &[(&str, &str)],
    ) -> SnapshotRecord {
        let mut state = self.state();
        let record = SnapshotRecord {
            id: state.mint_id(),
            reference: reference.to_owned(),
            created: Some(created),
            env: env
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            labels: BTreeMap::new(),
        };
        state.insert(record.clone());
        record
    }

    /// Every published snapshot, ordered by reference.
    pub fn snapshots(&self) -> Vec<SnapshotRecord> {
        self.state().snapshots.values().cloned().collect()
    }
}

impl RuntimeBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn controller(&self, base_image: &str) -> Box<dyn InstanceController> {
        Box::new(MockController {
            store: Arc::clone(&self.store),
            base_image: base_image.to_owned(),
            state: InstanceState::Idle,
            credentials: None,
        })
    }

    fn registry(&self) -> &dyn SnapshotRegistry {
        self
    }
}

impl SnapshotRegistry for MockBackend {
    fn find(&self, name: &str, tag: &str) -> Result<Option<SnapshotRecord>, RuntimeError> {
        let state = lock(&self.store)?;
        Ok(state.snapshots.get(&format!("{name}:{tag}")).cloned())
    }

    fn list(&self, name: &str) -> Result<Vec<SnapshotRecord>, RuntimeError> {
        let state = lock(&self.store)?;
        Ok(state
            .snapshots
            .values()
            .filter(|r| split_reference(&r.reference).is_some_and(|(repo, _)| repo == name))
            .cloned()
            .collect())
    }

    fn remove(&self, reference: &str) -> Result<(), RuntimeError> {
        let mut state = lock(&self.store)?;
        match state.snapshots.remove(reference) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::Registry {
                reference: reference.to_owned(),
                reason: "no such snapshot".to_owned(),
            }),
        }
    }
}

pub struct MockController {
    store: Store,
    base_image: String,
    state: InstanceState,
    credentials: Option<InstanceCredentials>,
}

impl InstanceController for MockController {
    fn start(
        &mut self,
        credentials: &InstanceCredentials,
        init_scripts: &[InitScript],
    ) -> Result<ConnectionAddress, RuntimeError> {
        validate_transition(&self.base_image, self.state, InstanceState::Running)?;
        let mut store = lock(&self.store)?;
        store.stats.starts += 1;

        if store.faults.fail_start {
            return Err(RuntimeError::StartupFailed {
                image: self.base_image.clone(),
                reason: "injected startup failure".to_owned(),
            });
        }
        if let Some(failing) = &store.faults.fail_init_script {
            if let Some(script) = init_scripts.iter().find(|s| &s.path == failing) {
                return Err(RuntimeError::InitScriptFailed {
                    path: script.path.clone(),
                    reason: "injected init script failure".to_owned(),
                });
            }
        }

        let port = FIRST_PORT + store.next_port;
        store.next_port = store.next_port.wrapping_add(1) % 1000;
        store.stats.live += 1;
        self.state = InstanceState::Running;
        self.credentials = Some(credentials.clone());

        Ok(ConnectionAddress {
            host: "localhost".to_owned(),
            port,
            database: credentials.database.clone(),
        })
    }

    fn stop(&mut self) -> Result<(), RuntimeError> {
        validate_transition(&self.base_image, self.state, InstanceState::Stopped)?;
        let mut store = lock(&self.store)?;
        store.stats.stops += 1;
        store.stats.live = store.stats.live.saturating_sub(1);
        self.state = InstanceState::Stopped;
        self.credentials = None;

        if store.faults.fail_stop {
            return Err(RuntimeError::ExecFailed(
                "injected stop failure".to_owned(),
            ));
        }
        Ok(())
    }

    fn freeze(&mut self, name: &str, tag: &str) -> Result<String, RuntimeError> {
        validate_transition(&self.base_image, self.state, InstanceState::Frozen)?;
        let reference = format!("{name}:{tag}");
        let mut store = lock(&self.store)?;
        store.stats.freezes += 1;

        if store.faults.fail_freeze {
            return Err(RuntimeError::FreezeFailed {
                reference,
                reason: "injected checkpoint failure".to_owned(),
            });
        }

        let id = store.mint_id();
        if !store.faults.lose_publication {
            let env = self
                .credentials
                .iter()
                .flat_map(InstanceCredentials::env_pairs)
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            let labels = BTreeMap::from([(
                "org.testcontainers".to_owned(),
                "false".to_owned(),
            )]);
            store.insert(SnapshotRecord {
                id: id.clone(),
                reference,
                created: Some(Utc::now()),
                env,
                labels,
            });
        }
        self.state = InstanceState::Frozen;
        Ok(id)
    }

    fn base_identity(&self) -> &str {
        &self.base_image
    }

    fn state(&self) -> InstanceState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> InstanceCredentials {
        InstanceCredentials {
            database: "database".to_owned(),
            user: "user".to_owned(),
            password: "password".to_owned(),
        }
    }

    fn script(path: &str) -> InitScript {
        InitScript {
            path: path.to_owned(),
            file_name: path.rsplit('/').next().unwrap_or(path).to_owned(),
            content: b"SELECT 1;\n".to_vec(),
        }
    }

    #[test]
    fn mock_lifecycle() {
        let backend = MockBackend::new();
        let mut ctl = backend.controller("pg:15");
        assert_eq!(ctl.base_identity(), "pg:15");
        assert_eq!(ctl.state(), InstanceState::Idle);

        let addr = ctl.start(&creds(), &[]).unwrap();
        assert_eq!(addr.database, "database");
        assert_eq!(ctl.state(), InstanceState::Running);
        assert!(matches!(
            ctl.start(&creds(), &[]),
            Err(RuntimeError::AlreadyRunning(_))
        ));

        let id = ctl.freeze("myapp", "V1-abcdef").unwrap();
        assert_eq!(ctl.state(), InstanceState::Frozen);
        ctl.stop().unwrap();
        assert_eq!(ctl.state(), InstanceState::Stopped);
        assert!(matches!(ctl.stop(), Err(RuntimeError::NotRunning(_))));

        let record = backend.find("myapp", "V1-abcdef").unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.env_value("POSTGRES_USER"), Some("user"));
        assert_eq!(
            record.labels.get("org.testcontainers").map(String::as_str),
            Some("false")
        );

        let stats = backend.stats();
        assert_eq!((stats.starts, stats.stops, stats.freezes, stats.live), (1, 1, 1, 0));
    }

    #[test]
    fn clones_share_store() {
        let a = MockBackend::new();
        let b = a.clone();
        a.publish("myapp:V1-000001", &[("POSTGRES_DB", "d")]);
        assert!(b.find("myapp", "V1-000001").unwrap().is_some());
        assert!(b.find("myapp", "V1-000002").unwrap().is_none());
    }

    #[test]
    fn freeze_without_start_is_not_running() {
        let backend = MockBackend::new();
        let mut ctl = backend.controller("pg:15");
        assert!(matches!(
            ctl.freeze("myapp", "V1-abcdef"),
            Err(RuntimeError::NotRunning(_))
        ));
        assert_eq!(backend.stats().freezes, 0);
    }

    #[test]
    fn failed_start_leaves_controller_idle() {
        let backend = MockBackend::new();
        backend.set_faults(MockFaults {
            fail_start: true,
            ..MockFaults::default()
        });
        let mut ctl = backend.controller("pg:15");
        assert!(matches!(
            ctl.start(&creds(), &[]),
            Err(RuntimeError::StartupFailed { .. })
        ));
        assert_eq!(ctl.state(), InstanceState::Idle);
        assert_eq!(backend.stats().live, 0);
    }

    #[test]
    fn failing_init_script_is_named() {
        let backend = MockBackend::new();
        backend.set_faults(MockFaults {
            fail_init_script: Some("db/init/b.sql".to_owned()),
            ..MockFaults::default()
        });
        let mut ctl = backend.controller("pg:15");
        let err = ctl
            .start(&creds(), &[script("db/init/a.sql"), script("db/init/b.sql")])
            .unwrap_err();
        match err {
            RuntimeError::InitScriptFailed { path, .. } => assert_eq!(path, "db/init/b.sql"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lost_publication_reports_success() {
        let backend = MockBackend::new();
        backend.set_faults(MockFaults {
            lose_publication: true,
            ..MockFaults::default()
        });
        let mut ctl = backend.controller("pg:15");
        ctl.start(&creds(), &[]).unwrap();
        assert!(ctl.freeze("myapp", "V1-abcdef").is_ok());
        assert!(backend.find("myapp", "V1-abcdef").unwrap().is_none());
    }

    #[test]
    fn overwrite_is_counted() {
        let backend = MockBackend::new();
        backend.publish("myapp:V1-abcdef", &[]);
        let mut ctl = backend.controller("pg:15");
        ctl.start(&creds(), &[]).unwrap();
        ctl.freeze("myapp", "V1-abcdef").unwrap();
        assert_eq!(backend.stats().overwrites, 1);
    }

    #[test]
    fn list_and_remove_by_name() {
        let backend = MockBackend::new();
        backend.publish("myapp:V1-000001", &[]);
        backend.publish("myapp:V2-000002", &[]);
        backend.publish("myapp-other:V1-000001", &[]);
        backend.publish("team/myapp:V1-000001", &[]);

        let mut tags: Vec<_> = backend
            .list("myapp")
            .unwrap()
            .into_iter()
            .map(|r| r.reference)
            .collect();
        tags.sort();
        assert_eq!(tags, ["myapp:V1-000001", "myapp:V2-000002"]);

        backend.remove("myapp:V1-000001").unwrap();
        assert_eq!(backend.list("myapp").unwrap().len(), 1);
        assert!(matches!(
            backend.remove("myapp:V1-000001"),
            Err(RuntimeError::Registry { .. })
        ));
    }
}
