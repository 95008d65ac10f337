use crate::config::EngineConfig;
use crate::connection::ConnectionParameters;
use crate::migrate::{MigrationEngine, MigrationTarget};
use crate::CoreError;
use dbsnap_runtime::{
    ConnectionAddress, InstanceController, RuntimeBackend, SnapshotRecord, SnapshotRegistry,
};
use dbsnap_schema::{
    compute_fingerprint, load_init_scripts, InitScript, MigrationSet, ResourceLocator,
    SchemaError, SnapshotRef,
};
use serde::Serialize;
use std::cmp::Reverse;
use tracing::{debug, info, warn};

/// Snapshot cache orchestrator.
///
/// Resolves a `MigrationSet` to a published snapshot, building and publishing
/// one on a miss. Builders in separate processes share nothing but the
/// registry, so publication is guarded by re-checking the registry right
/// before committing: a builder that finds the tag already published discards
/// its own instance instead of committing over it.
pub struct Engine {
    backend: Box<dyn RuntimeBackend>,
    migrator: Box<dyn MigrationEngine>,
    locator: ResourceLocator,
    config: EngineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The snapshot was already published.
    CacheHit,
    /// This call built and published the snapshot.
    Built,
    /// This call migrated an instance, but another builder published first.
    LostRace,
}

impl ProvisionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::Built => "built",
            Self::LostRace => "lost_race",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Provisioned {
    pub snapshot: SnapshotRef,
    pub outcome: ProvisionOutcome,
    pub connection: ConnectionParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub snapshot: SnapshotRef,
    pub record: Option<SnapshotRecord>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub repository: String,
    /// Current fingerprint's reference, when it was protected.
    pub kept: Option<String>,
    pub removed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub dry_run: bool,
}

impl Engine {
    pub fn new(backend: Box<dyn RuntimeBackend>, migrator: Box<dyn MigrationEngine>) -> Self {
        Self {
            backend,
            migrator,
            locator: ResourceLocator::default(),
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_locator(mut self, locator: ResourceLocator) -> Self {
        self.locator = locator;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn RuntimeBackend {
        self.backend.as_ref()
    }

    fn registry(&self) -> &dyn SnapshotRegistry {
        self.backend.registry()
    }

    /// Compute the snapshot reference for a set without touching the registry.
    pub fn fingerprint(&self, set: &MigrationSet) -> Result<SnapshotRef, CoreError> {
        let controller = self.backend.controller(self.config.base_image(set));
        let (snapshot, _) = self.resolve(set, controller.as_ref())?;
        Ok(snapshot)
    }

    fn resolve(
        &self,
        set: &MigrationSet,
        controller: &dyn InstanceController,
    ) -> Result<(SnapshotRef, Vec<InitScript>), CoreError> {
        let init_scripts = load_init_scripts(&self.locator, set.init_script_paths())?;
        let tag = compute_fingerprint(
            &self.locator,
            controller.base_identity(),
            &init_scripts,
            set.migration_path(),
        )?;
        let snapshot = SnapshotRef::new(self.config.repository(set.snapshot_name()), tag);
        Ok((snapshot, init_scripts))
    }

    /// Connection parameters for a migrated snapshot of `set`.
    pub fn provision(&self, set: &MigrationSet) -> Result<ConnectionParameters, CoreError> {
        self.provision_detailed(set).map(|p| p.connection)
    }

    pub fn provision_detailed(&self, set: &MigrationSet) -> Result<Provisioned, CoreError> {
        let mut controller = self.backend.controller(self.config.base_image(set));
        let (snapshot, init_scripts) = self.resolve(set, controller.as_ref())?;

        if let Some(record) = self.registry().find(&snapshot.name, &snapshot.tag)? {
            info!("snapshot {snapshot} found, reusing it");
            let connection = ConnectionParameters::from_record(&record, set.schema())?;
            return Ok(Provisioned {
                snapshot,
                outcome: ProvisionOutcome::CacheHit,
                connection,
            });
        }

        info!("snapshot {snapshot} not found, creating on demand");
        let address = controller.start(&self.config.credentials, &init_scripts)?;

        // The instance is stopped on every path out of the build.
        let result = self.build(controller.as_mut(), &address, set, &snapshot);

        if let Err(e) = controller.stop() {
            warn!("failed to stop build instance for {snapshot}: {e}");
        }

        let (record, outcome) = result?;
        let connection = ConnectionParameters::from_record(&record, set.schema())?;
        Ok(Provisioned {
            snapshot,
            outcome,
            connection,
        })
    }

    fn build(
        &self,
        controller: &mut dyn InstanceController,
        address: &ConnectionAddress,
        set: &MigrationSet,
        snapshot: &SnapshotRef,
    ) -> Result<(SnapshotRecord, ProvisionOutcome), CoreError> {
        let location = self
            .locator
            .resolve_dir(set.migration_path())
            .ok_or_else(|| SchemaError::EmptyResourceSet(set.migration_path().to_owned()))?;

        let target = MigrationTarget {
            address,
            credentials: &self.config.credentials,
            migration_path: set.migration_path(),
            location: &location,
            schema: set.schema(),
            tracking_table: set.tracking_table(),
        };
        debug!("migrating {address} from {}", location.display());
        self.migrator.apply(&target)?;

        if let Some(record) = self.registry().find(&snapshot.name, &snapshot.tag)? {
            info!("concurrent process generated the snapshot {snapshot}, skipping commit");
            return Ok((record, ProvisionOutcome::LostRace));
        }

        let image_id = controller.freeze(&snapshot.name, &snapshot.tag)?;
        info!("snapshot {snapshot} committed as {image_id}");

        let record = self
            .registry()
            .find(&snapshot.name, &snapshot.tag)?
            .ok_or_else(|| CoreError::SnapshotPublicationLost(snapshot.to_string()))?;
        Ok((record, ProvisionOutcome::Built))
    }

    /// Look up the current fingerprint of `set` in the registry.
    pub fn inspect(&self, set: &MigrationSet) -> Result<Inspection, CoreError> {
        let snapshot = self.fingerprint(set)?;
        let record = self.registry().find(&snapshot.name, &snapshot.tag)?;
        Ok(Inspection { snapshot, record })
    }

    /// Remove stale snapshots of `set`.
    ///
    /// Every snapshot under the set's repository is removed except the one
    /// matching the current fingerprint, or all of them when `keep_current`
    /// is false. Individual removal failures are logged and reported.
    pub fn prune(
        &self,
        set: &MigrationSet,
        keep_current: bool,
        dry_run: bool,
    ) -> Result<PruneReport, CoreError> {
        let repository = self.config.repository(set.snapshot_name());
        info!("pruning snapshots of {repository} (dry_run={dry_run})");

        let current = if keep_current {
            Some(self.fingerprint(set)?.to_string())
        } else {
            None
        };

        let mut snapshots = self.registry().list(&repository)?;
        snapshots.sort_by_key(|s| Reverse(s.created));
        for s in &snapshots {
            let created = s
                .created
                .map_or_else(|| "unknown".to_owned(), |c| c.to_rfc3339());
            debug!("found {} ({}) created {created}", s.reference, s.id);
        }

        let mut report = PruneReport {
            repository,
            kept: None,
            dry_run,
            ..PruneReport::default()
        };
        for s in snapshots {
            if current.as_deref() == Some(s.reference.as_str()) {
                report.kept = Some(s.reference);
                continue;
            }
            if dry_run {
                report.removed.push(s.reference);
                continue;
            }
            match self.registry().remove(&s.reference) {
                Ok(()) => {
                    debug!("removed {}", s.reference);
                    report.removed.push(s.reference);
                }
                Err(e) => {
                    warn!("failed to remove {}: {e}", s.reference);
                    report.failed.push((s.reference, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}
