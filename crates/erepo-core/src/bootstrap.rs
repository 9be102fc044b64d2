//! # Bootstrap
//!
//! Repository creation, teardown and purge.
//!
//! A new repository gets:
//! - `etc/`: the configuration templates, the license artifact and the
//!   settings document
//! - `var/`: the main storage file and one file per cluster, all seeded from
//!   the same storage template
//!
//! The seed template comes from one of three places, in order:
//! 1. the schema source, materialized through the template cache
//! 2. a pre-built template shipped with the install
//! 3. nothing: empty placeholder files (mock mode)

use crate::engine::{ConfigHandle, check};
use crate::lifecycle::RepositoryManager;
use crate::primitives::{
    CONFIG_DIR, DEFAULT_CONFIG_COMMENT, LICENSE_FILE, PRESERVE_REPOSITORY_ENV, STORAGE_DIR,
};
use crate::settings::RepositorySettings;
use crate::types::{ConfigId, RepoError, RepoTarget};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fs;
use std::path::{Path, PathBuf};

/// Options of `create_repository`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Skip seeding and publishing the default configuration.
    pub exclude_default_config: bool,
    /// Suppress informational logs.
    pub silent: bool,
}

/// Where the storage files were seeded from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SeedSource {
    Materialized(PathBuf),
    Prebuilt(PathBuf),
    Mock,
}

impl RepositoryManager {
    /// Create a repository in `directory`, which must be absent or empty.
    ///
    /// Returns the default configuration unless it was excluded. On failure
    /// the directory is removed and the error returned.
    pub fn create_repository(
        &self,
        directory: &Path,
        options: CreateOptions,
    ) -> Result<Option<(ConfigId, String)>, RepoError> {
        precheck(directory)?;

        match self.bootstrap(directory, options) {
            Ok(created) => Ok(created),
            Err(err) => {
                tracing::warn!(
                    directory = %directory.display(),
                    error = %err,
                    "repository creation failed, removing directory"
                );
                self.release_directory(directory);
                if let Err(e) = fs::remove_dir_all(directory) {
                    tracing::warn!(directory = %directory.display(), error = %e, "cleanup failed");
                }
                Err(err)
            }
        }
    }

    /// Remove a repository directory.
    ///
    /// Tiers bound to it are concluded first. Returns `false` when the
    /// directory did not exist or preservation was requested.
    pub fn destroy_repository(&self, directory: &Path) -> Result<bool, RepoError> {
        if !directory.exists() {
            return Ok(false);
        }
        self.release_directory(directory);

        if preserve_requested() {
            tracing::info!(directory = %directory.display(), "preserving repository directory");
            return Ok(false);
        }
        fs::remove_dir_all(directory)
            .map_err(|e| RepoError::io(format!("remove {}", directory.display()), e))?;
        tracing::info!(directory = %directory.display(), "removed repository directory");
        Ok(true)
    }

    /// Remove all loaded data. Registered configurations survive.
    pub fn purge_repository(&self, target: &RepoTarget) -> Result<(), RepoError> {
        let full = self.ensure_fully_ready(target)?;
        let diagnostics = full.diagnostics.as_ref();
        check(
            diagnostics,
            "purge_repository",
            diagnostics.purge_repository(),
        )?;
        tracing::info!(directory = %target.directory().display(), "purged repository");
        Ok(())
    }

    fn bootstrap(
        &self,
        directory: &Path,
        options: CreateOptions,
    ) -> Result<Option<(ConfigId, String)>, RepoError> {
        for sub in [CONFIG_DIR, STORAGE_DIR] {
            let path = directory.join(sub);
            fs::create_dir_all(&path)
                .map_err(|e| RepoError::io(format!("create {}", path.display()), e))?;
        }
        let root = directory
            .canonicalize()
            .map_err(|e| RepoError::io(format!("resolve {}", directory.display()), e))?;

        let copied = self.copy_templates(&root)?;
        let license = self.install_license(&root)?;
        let settings =
            RepositorySettings::for_repository(&root, self.config().resource_dir.as_deref(), license);

        let seed = self.seed_source()?;
        seed_storage(&settings, &seed)?;
        settings.write(&root)?;

        if !options.silent {
            tracing::info!(
                directory = %root.display(),
                templates = copied,
                seed = ?seed,
                "created repository"
            );
        }

        if options.exclude_default_config {
            return Ok(None);
        }

        let target = self.target(&root);
        let base = self.ensure_base_ready(&target)?;
        let document = ConfigHandle::create(base.config.as_ref())?.export()?;
        let catalog = base.catalog.as_ref();
        let id = check(
            catalog,
            "register_config",
            catalog.register_config(&document, DEFAULT_CONFIG_COMMENT),
        )?;
        check(catalog, "set_default_config_id", catalog.set_default_config_id(id))?;
        if !options.silent {
            tracing::info!(config_id = %id, "published default configuration");
        }
        Ok(Some((id, document)))
    }

    /// Copy the configuration templates into `etc/`. Returns the file count.
    fn copy_templates(&self, root: &Path) -> Result<usize, RepoError> {
        match self.config().template_dir() {
            Some(source) if source.is_dir() => copy_tree(&source, &root.join(CONFIG_DIR)),
            Some(source) => {
                tracing::debug!(path = %source.display(), "no configuration templates");
                Ok(0)
            }
            None => Ok(0),
        }
    }

    /// Copy the license artifact and return its base64 form.
    fn install_license(&self, root: &Path) -> Result<Option<String>, RepoError> {
        let Some(source) = self.config().license_file().filter(|p| p.is_file()) else {
            return Ok(None);
        };
        let bytes = fs::read(&source)
            .map_err(|e| RepoError::io(format!("read {}", source.display()), e))?;
        let target = root.join(LICENSE_FILE);
        fs::write(&target, &bytes)
            .map_err(|e| RepoError::io(format!("write {}", target.display()), e))?;
        Ok(Some(BASE64.encode(bytes)))
    }

    fn seed_source(&self) -> Result<SeedSource, RepoError> {
        let config = self.config();
        if let Some(schema) = config.schema_file() {
            // An explicitly named schema must exist.
            if config.schema_file.is_some() || schema.is_file() {
                return self.templates().materialize(&schema).map(SeedSource::Materialized);
            }
        }
        if let Some(prebuilt) = config.prebuilt_template().filter(|p| p.is_file()) {
            return Ok(SeedSource::Prebuilt(prebuilt));
        }
        Ok(SeedSource::Mock)
    }
}

fn precheck(directory: &Path) -> Result<(), RepoError> {
    if !directory.exists() {
        return Ok(());
    }
    if !directory.is_dir() {
        return Err(RepoError::NotADirectory(directory.to_path_buf()));
    }
    let mut entries = fs::read_dir(directory)
        .map_err(|e| RepoError::io(format!("read {}", directory.display()), e))?;
    if entries.next().is_some() {
        return Err(RepoError::DirectoryNotEmpty(directory.to_path_buf()));
    }
    Ok(())
}

fn seed_storage(settings: &RepositorySettings, seed: &SeedSource) -> Result<(), RepoError> {
    for path in settings.storage_paths()? {
        match seed {
            SeedSource::Materialized(template) | SeedSource::Prebuilt(template) => {
                fs::copy(template, &path).map_err(|e| {
                    RepoError::io(format!("copy {} to {}", template.display(), path.display()), e)
                })?;
            }
            SeedSource::Mock => {
                fs::File::create(&path)
                    .map_err(|e| RepoError::io(format!("create {}", path.display()), e))?;
            }
        }
    }
    Ok(())
}

fn copy_tree(source: &Path, target: &Path) -> Result<usize, RepoError> {
    let entries =
        fs::read_dir(source).map_err(|e| RepoError::io(format!("read {}", source.display()), e))?;
    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|e| RepoError::io(format!("read {}", source.display()), e))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            fs::create_dir_all(&to)
                .map_err(|e| RepoError::io(format!("create {}", to.display()), e))?;
            copied += copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)
                .map_err(|e| RepoError::io(format!("copy {}", from.display()), e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn preserve_requested() -> bool {
    std::env::var(PRESERVE_REPOSITORY_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

/// `1`, `true`, `yes` or `on`, ignoring case and surrounding whitespace.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for value in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["", "0", "false", "no", "off", "maybe"] {
            assert!(!is_truthy(value), "{value}");
        }
    }

    #[test]
    fn precheck_accepts_missing_and_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(precheck(&dir.path().join("new")).is_ok());
        assert!(precheck(dir.path()).is_ok());
    }

    #[test]
    fn precheck_rejects_non_empty_and_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("file");
        fs::write(&file, "x").expect("write");

        assert!(matches!(precheck(dir.path()), Err(RepoError::DirectoryNotEmpty(_))));
        assert!(matches!(precheck(&file), Err(RepoError::NotADirectory(_))));
    }

    #[test]
    fn copy_tree_counts_nested_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("nested")).expect("mkdir");
        fs::write(source.join("a.json"), "{}").expect("a");
        fs::write(source.join("nested").join("b.json"), "{}").expect("b");
        let target = dir.path().join("dst");
        fs::create_dir_all(&target).expect("mkdir");

        assert_eq!(copy_tree(&source, &target).expect("copy"), 2);
        assert!(target.join("nested").join("b.json").is_file());
    }
}
