//! # Manager Configuration
//!
//! Where the manager finds its install resources.
//!
//! Loaded from an `erepo.toml` file, then overridden by environment
//! variables. Every field is optional: with nothing configured the
//! bootstrapper runs in mock mode (empty placeholder storage files, no copied
//! templates).
//!
//! ```toml
//! resource_dir = "/opt/erepo/resources"
//! module_name = "loader"
//! ```
//!
//! With only `resource_dir` set the conventional layout is used:
//! `templates/`, `schema/erepo-schema.toml`, `template.db`, `erepo.lic`.

use crate::primitives::DEFAULT_MODULE_NAME;
use crate::types::RepoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides `resource_dir`.
pub const RESOURCE_DIR_ENV: &str = "EREPO_RESOURCE_DIR";

/// Overrides `schema_file`.
pub const SCHEMA_FILE_ENV: &str = "EREPO_SCHEMA_FILE";

/// Install resource locations and defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Root of the install resources.
    pub resource_dir: Option<PathBuf>,
    /// Configuration templates copied into each repository's `etc/`.
    pub template_dir: Option<PathBuf>,
    /// Schema source materialized into the seed storage template.
    pub schema_file: Option<PathBuf>,
    /// Pre-built seed storage template (packaged installs).
    pub prebuilt_template: Option<PathBuf>,
    /// License artifact copied into each repository.
    pub license_file: Option<PathBuf>,
    /// Module name for engine initialization.
    pub module_name: Option<String>,
    /// Where materialized templates are kept.
    pub cache_dir: Option<PathBuf>,
}

impl ManagerConfig {
    /// Configuration using the conventional layout under `resource_dir`.
    #[must_use]
    pub fn from_resource_dir(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: Some(resource_dir.into()),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, RepoError> {
        toml::from_str(source).map_err(|e| RepoError::Config(e.to_string()))
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self, RepoError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Load `path` if given (or `erepo.toml` if it exists), then apply
    /// environment overrides.
    pub fn from_env_and_file(path: Option<&Path>) -> Result<Self, RepoError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let implicit = Path::new("erepo.toml");
                if implicit.is_file() {
                    Self::load(implicit)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(config.with_overrides(
            std::env::var_os(RESOURCE_DIR_ENV).map(PathBuf::from),
            std::env::var_os(SCHEMA_FILE_ENV).map(PathBuf::from),
        ))
    }

    /// Apply explicit overrides (`None` keeps the current value).
    #[must_use]
    pub fn with_overrides(
        mut self,
        resource_dir: Option<PathBuf>,
        schema_file: Option<PathBuf>,
    ) -> Self {
        if resource_dir.is_some() {
            self.resource_dir = resource_dir;
        }
        if schema_file.is_some() {
            self.schema_file = schema_file;
        }
        self
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        self.module_name.as_deref().unwrap_or(DEFAULT_MODULE_NAME)
    }

    #[must_use]
    pub fn template_dir(&self) -> Option<PathBuf> {
        self.resolve(self.template_dir.as_ref(), "templates")
    }

    #[must_use]
    pub fn schema_file(&self) -> Option<PathBuf> {
        self.resolve(self.schema_file.as_ref(), "schema/erepo-schema.toml")
    }

    #[must_use]
    pub fn prebuilt_template(&self) -> Option<PathBuf> {
        self.resolve(self.prebuilt_template.as_ref(), "template.db")
    }

    #[must_use]
    pub fn license_file(&self) -> Option<PathBuf> {
        self.resolve(self.license_file.as_ref(), "erepo.lic")
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("erepo-templates"))
    }

    fn resolve(&self, explicit: Option<&PathBuf>, conventional: &str) -> Option<PathBuf> {
        explicit
            .cloned()
            .or_else(|| self.resource_dir.as_ref().map(|dir| dir.join(conventional)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = ManagerConfig::from_toml_str("").expect("parse");
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.module_name(), DEFAULT_MODULE_NAME);
        assert!(config.schema_file().is_none());
    }

    #[test]
    fn conventional_layout_under_resource_dir() {
        let config = ManagerConfig::from_resource_dir("/opt/erepo");
        assert_eq!(
            config.schema_file(),
            Some(PathBuf::from("/opt/erepo/schema/erepo-schema.toml"))
        );
        assert_eq!(config.template_dir(), Some(PathBuf::from("/opt/erepo/templates")));
    }

    #[test]
    fn explicit_paths_win_over_layout() {
        let config = ManagerConfig::from_toml_str(
            r#"
            resource_dir = "/opt/erepo"
            schema_file = "/custom/schema.toml"
            module_name = "loader"
            "#,
        )
        .expect("parse");
        assert_eq!(config.schema_file(), Some(PathBuf::from("/custom/schema.toml")));
        assert_eq!(config.module_name(), "loader");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ManagerConfig::from_toml_str("resorce_dir = \"/x\"").expect_err("typo");
        assert!(matches!(err, RepoError::Config(_)));
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let config = ManagerConfig::from_resource_dir("/a")
            .with_overrides(None, Some(PathBuf::from("/s.toml")));
        assert_eq!(config.resource_dir, Some(PathBuf::from("/a")));
        assert_eq!(config.schema_file(), Some(PathBuf::from("/s.toml")));
    }
}
