use crate::resources::{file_name_of, ResourceLocator};
use crate::types::Fingerprint;
use crate::SchemaError;
use sha1::{Digest, Sha1};
use tracing::debug;

const HASH_SEGMENT_LEN: usize = 6;

/// An auxiliary SQL script applied right after the instance reports ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitScript {
    /// Path as configured, used in error messages.
    pub path: String,
    /// File name (last path component), fed to the digest.
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Read init scripts in the configured order.
pub fn load_init_scripts(
    locator: &ResourceLocator,
    paths: &[String],
) -> Result<Vec<InitScript>, SchemaError> {
    paths
        .iter()
        .map(|path| {
            let (resolved, content) = locator.read_bytes(path)?;
            Ok(InitScript {
                path: path.clone(),
                file_name: file_name_of(&resolved),
                content,
            })
        })
        .collect()
}

/// Compute the snapshot tag for a migration set.
///
/// The SHA-1 digest covers, in order: `base_id` plus a newline, each init
/// script in list order as `file_name\n` plus content, then each migration in
/// ascending version order as `filename\n` plus content. The tag is
/// `V<latest version with '.' as '_'>-<first six hex digits>`; `-` is the
/// separator because `~` is not allowed in image tags.
pub fn compute_fingerprint(
    locator: &ResourceLocator,
    base_id: &str,
    init_scripts: &[InitScript],
    migration_path: &str,
) -> Result<Fingerprint, SchemaError> {
    let migrations = locator.list_migrations(migration_path)?;
    let latest = migrations
        .iter()
        .map(|m| &m.version)
        .max()
        .ok_or_else(|| SchemaError::EmptyResourceSet(migration_path.to_owned()))?;

    let mut hasher = Sha1::new();
    hasher.update(format!("{base_id}\n").as_bytes());
    for script in init_scripts {
        update_digest(&mut hasher, &script.file_name, &script.content);
    }
    for migration in &migrations {
        update_digest(&mut hasher, &migration.filename, &migration.content);
    }
    let digest = hasher.finalize();

    let tag = format!("V{}-{}", latest.tag_text(), leading_hex(&digest));
    debug!(
        "fingerprint {tag} over {} migrations and {} init scripts",
        migrations.len(),
        init_scripts.len()
    );
    Ok(Fingerprint::new(tag))
}

fn update_digest(hasher: &mut Sha1, name: &str, content: &[u8]) {
    hasher.update(format!("{name}\n").as_bytes());
    hasher.update(content);
}

/// First six hex digits of the digest read as an unsigned integer, so leading
/// zero nibbles are skipped. Existing snapshot tags were produced this way.
fn leading_hex(digest: &[u8]) -> String {
    let full = hex::encode(digest);
    let trimmed = full.trim_start_matches('0');
    trimmed.chars().take(HASH_SEGMENT_LEN).collect()
}
