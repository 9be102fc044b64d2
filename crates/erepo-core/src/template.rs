//! # Template Cache
//!
//! Materializes seed storage templates from schema sources, once per source.
//!
//! A template is keyed by the canonical path of its schema source plus the
//! blake3 digest of the source text. Each key owns a slot; the first caller to
//! take a slot's lock builds the artifact while later callers for the same key
//! wait on that lock and reuse the result. Different keys build in parallel.
//!
//! Artifacts are built under a temporary name in the cache directory and only
//! persisted under their final name after every statement applied. A failed
//! build leaves the slot empty so the next caller retries.

use crate::lock_unpoisoned;
use crate::storage::Schema;
use crate::types::RepoError;
use redb::Database;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type TemplateKey = (PathBuf, [u8; 32]);
type TemplateSlot = Arc<Mutex<Option<PathBuf>>>;

/// Process-wide cache of materialized templates.
#[derive(Debug)]
pub struct TemplateCache {
    cache_dir: PathBuf,
    slots: Mutex<BTreeMap<TemplateKey, TemplateSlot>>,
    materializations: AtomicU64,
}

impl TemplateCache {
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            slots: Mutex::new(BTreeMap::new()),
            materializations: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Number of artifacts built by this cache.
    #[must_use]
    pub fn materializations(&self) -> u64 {
        self.materializations.load(Ordering::SeqCst)
    }

    /// Return the template for `schema`, building it on first use.
    ///
    /// Consumers must copy the returned file, never open it in place.
    pub fn materialize(&self, schema: &Path) -> Result<PathBuf, RepoError> {
        let canonical = schema.canonicalize().map_err(|e| missing_or_io(schema, e))?;
        let source = std::fs::read_to_string(&canonical).map_err(|e| missing_or_io(schema, e))?;
        let digest = blake3::hash(source.as_bytes());

        let slot = {
            let mut slots = lock_unpoisoned(&self.slots);
            Arc::clone(
                slots
                    .entry((canonical.clone(), *digest.as_bytes()))
                    .or_default(),
            )
        };

        let mut built = lock_unpoisoned(&slot);
        if let Some(path) = built.as_ref() {
            tracing::debug!(schema = %canonical.display(), template = %path.display(), "template cache hit");
            return Ok(path.clone());
        }

        let path = self.build(&canonical, &source)?;
        *built = Some(path.clone());
        Ok(path)
    }

    fn build(&self, schema_path: &Path, source: &str) -> Result<PathBuf, RepoError> {
        let schema = Schema::parse(source, schema_path)?;

        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| RepoError::io(format!("create {}", self.cache_dir.display()), e))?;

        let staging = tempfile::Builder::new()
            .prefix(".template-")
            .suffix(".db")
            .tempfile_in(&self.cache_dir)
            .map_err(|e| RepoError::io("create template staging file", e))?;

        let statements = {
            let db = Database::create(staging.path()).map_err(|e| {
                RepoError::IoError(format!("open {}: {}", staging.path().display(), e))
            })?;
            schema.apply(&db, schema_path)?
        };

        let target = self.cache_dir.join(artifact_name(schema_path, source));
        staging
            .persist(&target)
            .map_err(|e| RepoError::io(format!("persist {}", target.display()), e.error))?;

        self.materializations.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            schema = %schema_path.display(),
            template = %target.display(),
            statements,
            "materialized storage template"
        );
        Ok(target)
    }
}

fn missing_or_io(schema: &Path, err: std::io::Error) -> RepoError {
    if err.kind() == ErrorKind::NotFound {
        RepoError::SchemaNotFound(schema.to_path_buf())
    } else {
        RepoError::io(format!("read {}", schema.display()), err)
    }
}

/// File name of an artifact, unique per schema path and content.
fn artifact_name(schema_path: &Path, source: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(schema_path.to_string_lossy().as_bytes());
    hasher.update(&[0]);
    hasher.update(source.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("template-{}.db", &hex.as_str()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        version = 1

        [[statements]]
        table = "meta"
        layout = "counter"
        seed = { next_config_id = 1 }
    "#;

    fn write_schema(dir: &Path, name: &str, source: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, source).expect("write schema");
        path
    }

    #[test]
    fn second_call_hits_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let schema = write_schema(dir.path(), "schema.toml", SCHEMA);
        let cache = TemplateCache::new(dir.path().join("cache"));

        let first = cache.materialize(&schema).expect("first");
        let second = cache.materialize(&schema).expect("second");

        assert_eq!(first, second);
        assert!(first.is_file());
        assert_eq!(cache.materializations(), 1);
    }

    #[test]
    fn changed_content_is_a_new_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let schema = write_schema(dir.path(), "schema.toml", SCHEMA);
        let cache = TemplateCache::new(dir.path().join("cache"));

        let first = cache.materialize(&schema).expect("first");
        write_schema(dir.path(), "schema.toml", &format!("{}\n# revised\n", SCHEMA));
        let second = cache.materialize(&schema).expect("second");

        assert_ne!(first, second);
        assert_eq!(cache.materializations(), 2);
    }

    #[test]
    fn missing_schema_is_reported_and_not_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TemplateCache::new(dir.path().join("cache"));

        let err = cache
            .materialize(&dir.path().join("absent.toml"))
            .expect_err("missing");
        assert!(matches!(err, RepoError::SchemaNotFound(_)));
        assert_eq!(cache.materializations(), 0);
    }

    #[test]
    fn failed_build_leaves_no_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = r#"
            version = 1
            [[statements]]
            table = "meta"
            layout = "counter"
            seed = { next = "one" }
        "#;
        let schema = write_schema(dir.path(), "bad.toml", source);
        let cache = TemplateCache::new(dir.path().join("cache"));

        assert!(cache.materialize(&schema).is_err());
        let leftovers = std::fs::read_dir(dir.path().join("cache"))
            .expect("cache dir")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn concurrent_callers_build_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let schema = write_schema(dir.path(), "schema.toml", SCHEMA);
        let cache = TemplateCache::new(dir.path().join("cache"));

        let paths: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.materialize(&schema).expect("materialize")))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("join"))
                .collect()
        });

        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.materializations(), 1);
    }
}
