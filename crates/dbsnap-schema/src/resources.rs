use crate::version::{parse_version, MigrationVersion};
use crate::SchemaError;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension of migration scripts; other directory entries are ignored.
pub const MIGRATION_EXTENSION: &str = "sql";

const FILESYSTEM_PREFIX: &str = "filesystem:";
const FILE_PREFIX: &str = "file:";
const CLASSPATH_PREFIX: &str = "classpath:";

/// A logical resource address, normalized from its textual form.
///
/// `filesystem:<p>` (Flyway style) and `file:<p>` name a literal path.
/// `classpath:<p>` and bare `<p>` are relative to the locator's resource roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePath {
    Filesystem(PathBuf),
    Rooted(String),
}

impl ResourcePath {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Some(rest) = input
            .strip_prefix(FILESYSTEM_PREFIX)
            .or_else(|| input.strip_prefix(FILE_PREFIX))
        {
            return Self::Filesystem(PathBuf::from(rest));
        }
        let rest = input.strip_prefix(CLASSPATH_PREFIX).unwrap_or(input);
        Self::Rooted(rest.trim_start_matches('/').to_owned())
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem(p) => write!(f, "{FILESYSTEM_PREFIX}{}", p.display()),
            Self::Rooted(p) => write!(f, "{CLASSPATH_PREFIX}{p}"),
        }
    }
}

/// A single migration script with its parsed version and raw content.
#[derive(Debug, Clone)]
pub struct MigrationResource {
    pub filename: String,
    pub version: MigrationVersion,
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// Resolves resource paths against an ordered list of resource roots.
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    roots: Vec<PathBuf>,
}

impl Default for ResourceLocator {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
        }
    }
}

impl ResourceLocator {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        if roots.is_empty() {
            return Self::default();
        }
        Self { roots }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Locate a directory. Rooted paths use the first root that contains it.
    pub fn resolve_dir(&self, path: &str) -> Option<PathBuf> {
        match ResourcePath::parse(path) {
            ResourcePath::Filesystem(p) => p.is_dir().then_some(p),
            ResourcePath::Rooted(rel) => self
                .roots
                .iter()
                .map(|root| root.join(&rel))
                .find(|candidate| candidate.is_dir()),
        }
    }

    /// Locate a single file. A rooted path present under more than one root is ambiguous.
    pub fn resolve_file(&self, path: &str) -> Result<PathBuf, SchemaError> {
        match ResourcePath::parse(path) {
            ResourcePath::Filesystem(p) => {
                if p.is_file() {
                    Ok(p)
                } else {
                    Err(SchemaError::MissingResource(path.to_owned()))
                }
            }
            ResourcePath::Rooted(rel) => {
                let mut found: Vec<PathBuf> = Vec::new();
                for candidate in self.roots.iter().map(|root| root.join(&rel)) {
                    if !candidate.is_file() {
                        continue;
                    }
                    let canonical = fs::canonicalize(&candidate).unwrap_or(candidate);
                    if !found.contains(&canonical) {
                        found.push(canonical);
                    }
                }
                match found.len() {
                    0 => Err(SchemaError::MissingResource(path.to_owned())),
                    1 => Ok(found.remove(0)),
                    _ => Err(SchemaError::AmbiguousResource {
                        path: path.to_owned(),
                        candidates: found,
                    }),
                }
            }
        }
    }

    /// Read a single resource as raw bytes.
    pub fn read_bytes(&self, path: &str) -> Result<(PathBuf, Vec<u8>), SchemaError> {
        let file = self.resolve_file(path)?;
        let content = fs::read(&file).map_err(|source| SchemaError::ResourceRead {
            path: file.clone(),
            source,
        })?;
        Ok((file, content))
    }

    /// List `*.sql` files directly under `path` (non-recursive), parse their
    /// versions, and return them sorted ascending by version.
    ///
    /// Any `.sql` entry whose name does not match the version grammar fails
    /// the whole listing. Equal versions are ordered by filename so the
    /// result never depends on directory listing order. A directory that does
    /// not exist lists as empty.
    pub fn list_migrations(&self, path: &str) -> Result<Vec<MigrationResource>, SchemaError> {
        let Some(dir) = self.resolve_dir(path) else {
            debug!("migration directory {path} not found under {:?}", self.roots);
            return Ok(Vec::new());
        };

        let listing_error = |source| SchemaError::ResourceListing {
            path: path.to_owned(),
            source,
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(listing_error(e)),
        };

        let mut resources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(listing_error)?;
            let file_type = entry.file_type().map_err(listing_error)?;
            if file_type.is_dir() {
                continue;
            }
            let entry_path = entry.path();
            if entry_path.extension().and_then(|e| e.to_str()) != Some(MIGRATION_EXTENSION) {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let version = parse_version(&filename)?;
            let content = fs::read(&entry_path).map_err(|source| SchemaError::ResourceRead {
                path: entry_path.clone(),
                source,
            })?;
            resources.push(MigrationResource {
                filename,
                version,
                path: entry_path,
                content,
            });
        }

        resources.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        debug!("found {} migrations in {}", resources.len(), dir.display());
        Ok(resources)
    }
}

/// Last path component of a resource address, used when hashing init scripts.
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy())
        .into_owned()
}
