use criterion::{criterion_group, criterion_main, Criterion};
use dbsnap_core::{CoreError, Engine, MigrationTarget};
use dbsnap_runtime::MockBackend;
use dbsnap_schema::{MigrationSet, ResourceLocator};
use std::fs;
use std::path::Path;

fn create_test_project(dir: &Path, migrations: usize) {
    let migration_dir = dir.join("db/migration");
    fs::create_dir_all(&migration_dir).unwrap();
    for i in 1..=migrations {
        fs::write(
            migration_dir.join(format!("V{i}__step_{i}.sql")),
            format!("CREATE TABLE t{i} (id bigint primary key, payload text);\n"),
        )
        .unwrap();
    }
}

fn noop(_: &MigrationTarget<'_>) -> Result<(), CoreError> {
    Ok(())
}

fn test_engine(root: &Path) -> (MockBackend, Engine) {
    let backend = MockBackend::new();
    let engine = Engine::new(Box::new(backend.clone()), Box::new(noop))
        .with_locator(ResourceLocator::with_root(root));
    (backend, engine)
}

fn migration_set() -> MigrationSet {
    MigrationSet::builder()
        .snapshot_name("bench")
        .build()
        .unwrap()
}

fn bench_provision_cold(c: &mut Criterion) {
    c.bench_function("engine_provision_mock_cold_50", |b| {
        b.iter_with_setup(
            || {
                let project_dir = tempfile::tempdir().unwrap();
                create_test_project(project_dir.path(), 50);
                let (backend, engine) = test_engine(project_dir.path());
                (project_dir, backend, engine)
            },
            |(_pd, _backend, engine)| {
                engine.provision(&migration_set()).unwrap();
            },
        );
    });
}

fn bench_provision_cached(c: &mut Criterion) {
    let project_dir = tempfile::tempdir().unwrap();
    create_test_project(project_dir.path(), 50);
    let (_backend, engine) = test_engine(project_dir.path());
    let set = migration_set();
    engine.provision(&set).unwrap();

    c.bench_function("engine_provision_mock_cached_50", |b| {
        b.iter(|| engine.provision(&set).unwrap());
    });
}

criterion_group!(benches, bench_provision_cold, bench_provision_cached);
criterion_main!(benches);
