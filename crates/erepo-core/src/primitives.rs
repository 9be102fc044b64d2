//! # Repository Primitives
//!
//! Fixed layout names, record field names and loop constants shared by the
//! manager, the local backend and the CLI.
//!
//! These values are part of the on-disk repository layout: changing a file
//! name here makes previously created repositories unreadable.

// =============================================================================
// REPOSITORY LAYOUT
// =============================================================================

/// Directory (relative to the repository root) holding copied configuration
/// templates, the settings document and the license artifact.
pub const CONFIG_DIR: &str = "etc";

/// Directory (relative to the repository root) holding storage files.
pub const STORAGE_DIR: &str = "var";

/// Settings document, relative to the repository root.
///
/// Read on every tier (re)initialization.
pub const SETTINGS_FILE: &str = "etc/erepo-settings.json";

/// License artifact copied into the repository, relative to the repository root.
pub const LICENSE_FILE: &str = "etc/erepo.lic";

/// Main storage file (catalog, records, redo queue).
pub const MAIN_STORAGE_FILE: &str = "repository.db";

/// Cluster descriptors: (cluster name, hybrid key, storage file).
pub const CLUSTER_STORAGE_FILES: [(&str, &str, &str); 2] = [
    ("C1", "RES_FEAT", "resolution.db"),
    ("C2", "LIB_FEAT", "features.db"),
];

/// Scheme prefix of storage connection strings in the settings document.
pub const STORAGE_SCHEME: &str = "redb://";

/// Configuration template consulted by the local backend when a fresh
/// configuration is created.
pub const DEFAULT_CONFIG_TEMPLATE: &str = "default-config.json";

// =============================================================================
// RECORD FIELDS
// =============================================================================

/// Mandatory unique record identifier field.
pub const RECORD_ID_FIELD: &str = "RECORD_ID";

/// Data source code field.
pub const DATA_SOURCE_FIELD: &str = "DATA_SOURCE";

/// File extensions accepted by `load_file` (lowercase, without dot).
pub const RECOGNIZED_EXTENSIONS: [&str; 3] = ["csv", "json", "jsonl"];

// =============================================================================
// LOOP CONSTANTS
// =============================================================================

/// First progress reporting interval.
///
/// The interval grows tenfold each time the running count exceeds ten times
/// the current interval.
pub const INITIAL_PROGRESS_INTERVAL: u64 = 10;

/// The redo drain gives up after this many attempts per originally pending item.
pub const REDO_CONVERGENCE_FACTOR: u64 = 5;

// =============================================================================
// IDENTITY & ENVIRONMENT
// =============================================================================

/// Module name passed to the engine when the caller does not choose one.
pub const DEFAULT_MODULE_NAME: &str = "erepo";

/// Comment attached to the configuration seeded by `create_repository`.
pub const DEFAULT_CONFIG_COMMENT: &str = "Initial default configuration";

/// When set to a truthy value, teardown keeps the repository directory.
pub const PRESERVE_REPOSITORY_ENV: &str = "EREPO_PRESERVE_REPOSITORY";

// =============================================================================
// NATIVE ERROR CODES
// =============================================================================

/// Generic failure (bad input, storage error).
pub const NATIVE_CODE_GENERIC: i64 = 7;

/// The record's data source is not in the engine's active configuration.
pub const NATIVE_CODE_UNKNOWN_DATA_SOURCE: i64 = 23;

/// The addressed record does not exist.
pub const NATIVE_CODE_RECORD_NOT_FOUND: i64 = 33;

/// The surface was destroyed or never initialized.
pub const NATIVE_CODE_NOT_INITIALIZED: i64 = 48;
