//! # Settings Document
//!
//! The JSON document at `etc/erepo-settings.json` inside every repository.
//!
//! It names the storage files (main connection plus one descriptor per
//! cluster) and the support/config/resource path hints. The manager writes it
//! once at bootstrap and passes it verbatim to every surface initialization;
//! only the backend interprets it.

use crate::primitives::{
    CLUSTER_STORAGE_FILES, CONFIG_DIR, MAIN_STORAGE_FILE, SETTINGS_FILE, STORAGE_DIR,
    STORAGE_SCHEME,
};
use crate::types::RepoError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Path hints for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(rename = "SUPPORTPATH")]
    pub support_path: String,
    #[serde(rename = "CONFIGPATH")]
    pub config_path: String,
    #[serde(rename = "RESOURCEPATH")]
    pub resource_path: String,
    #[serde(
        rename = "LICENSESTRINGBASE64",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub license_base64: Option<String>,
}

/// Main storage connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlSettings {
    #[serde(rename = "BACKEND")]
    pub backend: String,
    #[serde(rename = "CONNECTION")]
    pub connection: String,
}

/// One storage cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    #[serde(rename = "CLUSTER_SIZE")]
    pub cluster_size: u32,
    #[serde(rename = "DB_1")]
    pub db_1: String,
}

/// The repository settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "PIPELINE")]
    pub pipeline: PipelineSettings,
    #[serde(rename = "SQL")]
    pub sql: SqlSettings,
    #[serde(rename = "CLUSTERS", default)]
    pub clusters: BTreeMap<String, ClusterSettings>,
    /// Hybrid key -> cluster name.
    #[serde(rename = "HYBRID", default)]
    pub hybrid: BTreeMap<String, String>,
}

impl RepositorySettings {
    /// Build the settings for a repository rooted at `directory`.
    ///
    /// `directory` should be absolute; the document is read by the engine
    /// from arbitrary working directories.
    #[must_use]
    pub fn for_repository(
        directory: &Path,
        resource_dir: Option<&Path>,
        license_base64: Option<String>,
    ) -> Self {
        let config_dir = directory.join(CONFIG_DIR);
        let storage_dir = directory.join(STORAGE_DIR);
        let resource_path = resource_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_dir.clone());

        let mut clusters = BTreeMap::new();
        let mut hybrid = BTreeMap::new();
        for (cluster, key, file) in CLUSTER_STORAGE_FILES {
            clusters.insert(
                cluster.to_string(),
                ClusterSettings {
                    cluster_size: 1,
                    db_1: connection_string(&storage_dir.join(file)),
                },
            );
            hybrid.insert(key.to_string(), cluster.to_string());
        }

        Self {
            pipeline: PipelineSettings {
                support_path: path_string(&resource_path),
                config_path: path_string(&config_dir),
                resource_path: path_string(&resource_path),
                license_base64,
            },
            sql: SqlSettings {
                backend: "HYBRID".to_string(),
                connection: connection_string(&storage_dir.join(MAIN_STORAGE_FILE)),
            },
            clusters,
            hybrid,
        }
    }

    /// Parse a settings document.
    pub fn parse(raw: &str) -> Result<Self, RepoError> {
        serde_json::from_str(raw).map_err(|e| RepoError::Settings(e.to_string()))
    }

    /// Read and parse the settings document of a repository.
    pub fn read(directory: &Path) -> Result<Self, RepoError> {
        Self::parse(&read_raw(directory)?)
    }

    /// Write the document to `directory/etc/erepo-settings.json`.
    pub fn write(&self, directory: &Path) -> Result<(), RepoError> {
        let path = settings_path(directory);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RepoError::SerializationError(e.to_string()))?;
        std::fs::write(&path, json)
            .map_err(|e| RepoError::io(format!("write {}", path.display()), e))
    }

    /// Path of the main storage file.
    pub fn main_storage_path(&self) -> Result<PathBuf, RepoError> {
        parse_connection(&self.sql.connection)
    }

    /// Paths of every storage file: main first, then clusters in name order.
    pub fn storage_paths(&self) -> Result<Vec<PathBuf>, RepoError> {
        let mut paths = vec![self.main_storage_path()?];
        for cluster in self.clusters.values() {
            paths.push(parse_connection(&cluster.db_1)?);
        }
        Ok(paths)
    }
}

/// Location of the settings document inside a repository.
#[must_use]
pub fn settings_path(directory: &Path) -> PathBuf {
    directory.join(SETTINGS_FILE)
}

/// Read the raw settings document of a repository.
pub fn read_raw(directory: &Path) -> Result<String, RepoError> {
    let path = settings_path(directory);
    std::fs::read_to_string(&path)
        .map_err(|e| RepoError::Settings(format!("cannot read {}: {}", path.display(), e)))
}

/// Build a storage connection string for a file.
#[must_use]
pub fn connection_string(path: &Path) -> String {
    format!("{}{}", STORAGE_SCHEME, path.display())
}

/// Extract the file path from a storage connection string.
pub fn parse_connection(connection: &str) -> Result<PathBuf, RepoError> {
    connection
        .strip_prefix(STORAGE_SCHEME)
        .filter(|rest| !rest.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| RepoError::Settings(format!("unsupported connection: {}", connection)))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// =============================================================================
// TESTS
// =============================================================================
