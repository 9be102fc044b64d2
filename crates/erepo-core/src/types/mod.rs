//! # Core Type Definitions
//!
//! This module contains the value types shared across the manager:
//! - Configuration identifiers (`ConfigId`)
//! - Initialization requests and fingerprints (`RepoTarget`, `Fingerprint`)
//! - Call results (`LoadSummary`, `RedoSummary`)
//! - Native failure payloads (`NativeException`)
//! - Error types (`RepoError`)

use crate::primitives::{DEFAULT_MODULE_NAME, RECORD_ID_FIELD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

// =============================================================================
// CONFIGURATION IDENTIFIER
// =============================================================================

/// Opaque identifier assigned by the configuration catalog on registration.
///
/// Registered documents are immutable: every change produces a new ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigId(pub i64);

impl ConfigId {
    /// Get the raw identifier value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// INITIALIZATION REQUEST
// =============================================================================

/// The settings a tier was initialized with.
///
/// Two requests with equal fingerprints share an initialized tier; any
/// difference forces a destroy-then-init cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Engine verbose logging flag.
    pub verbose: bool,
    /// Canonical identity of the repository directory.
    pub directory: PathBuf,
}

/// A request to operate on a repository directory.
///
/// The module name only matters for the initialization it triggers; it is not
/// part of the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    directory: PathBuf,
    verbose: bool,
    module_name: String,
}

impl RepoTarget {
    /// Create a non-verbose request with the default module name.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            verbose: false,
            module_name: DEFAULT_MODULE_NAME.to_string(),
        }
    }

    /// Set the engine verbose flag.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the module name used if this request initializes a tier.
    #[must_use]
    pub fn with_module_name(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = module_name.into();
        self
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Compute the fingerprint of this request.
    ///
    /// The directory is canonicalized when it exists so that different
    /// spellings of the same path compare equal.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            verbose: self.verbose,
            directory: directory_identity(&self.directory),
        }
    }
}

/// Canonical identity of a directory, or the path itself if it cannot be resolved.
#[must_use]
pub fn directory_identity(directory: &Path) -> PathBuf {
    directory
        .canonicalize()
        .unwrap_or_else(|_| directory.to_path_buf())
}

// =============================================================================
// CALL RESULTS
// =============================================================================

/// Aggregate result of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Records accepted by the engine.
    pub loaded: u64,
    /// Records rejected by the engine.
    pub failed: u64,
    /// False only when the load was aborted by a structural failure.
    pub success: bool,
    /// Why the load was aborted, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    /// Redo work performed after the load.
    #[serde(default)]
    pub redo: RedoSummary,
}

impl LoadSummary {
    /// Number of records submitted to the engine.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.loaded.saturating_add(self.failed)
    }
}

/// Result of one redo drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedoSummary {
    /// Pending redo items observed when draining started.
    pub initial_pending: u64,
    /// Fetch/process attempts made.
    pub processed: u64,
    pub succeeded: u64,
    pub fetch_failed: u64,
    pub process_failed: u64,
    /// False when the drain gave up because it was not converging.
    pub converged: bool,
}

impl Default for RedoSummary {
    fn default() -> Self {
        Self {
            initial_pending: 0,
            processed: 0,
            succeeded: 0,
            fetch_failed: 0,
            process_failed: 0,
            converged: true,
        }
    }
}

// =============================================================================
// NATIVE EXCEPTION
// =============================================================================

/// The last error recorded by a native surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeException {
    pub code: i64,
    pub message: String,
}

impl NativeException {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the repository manager.
///
/// Precondition violations fail before side effects where possible. Native
/// failures always carry the surface's last error.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The bootstrap target exists and has entries.
    #[error("Repository directory is not empty: {}", .0.display())]
    DirectoryNotEmpty(PathBuf),

    /// The bootstrap target exists and is a file.
    #[error("Repository path exists and is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// `load_file` was given a file with an unrecognized extension.
    #[error("Unsupported file extension (expected .csv, .json or .jsonl): {}", .0.display())]
    UnsupportedExtension(PathBuf),

    /// The record stream format could not be determined or is not supported.
    #[error("Unsupported record format: {0}")]
    UnsupportedFormat(String),

    /// A record lacks a non-empty identifier.
    #[error("Record {index} has no {field}", field = RECORD_ID_FIELD)]
    MissingRecordId { index: u64 },

    /// A record has no data source and no default was supplied.
    #[error("Record {record_id} (position {index}) has no data source and no default was given")]
    MissingDataSource { index: u64, record_id: String },

    /// The record stream is malformed at the given position.
    #[error("Malformed record stream at record {index}: {detail}")]
    MalformedRecord { index: u64, detail: String },

    /// The schema source used for template materialization does not exist.
    #[error("Schema source not found: {}", .0.display())]
    SchemaNotFound(PathBuf),

    /// The schema source could not be parsed or applied.
    #[error("Schema error in {}: {detail}", .path.display())]
    Schema { path: PathBuf, detail: String },

    /// A native surface call failed.
    #[error("{surface} {operation} failed: [{code}] {message}")]
    Native {
        surface: &'static str,
        operation: &'static str,
        code: i64,
        message: String,
    },

    /// A load stopped on a structural failure after submitting what it could.
    #[error("Load of {} aborted: {reason}", .path.display())]
    LoadAborted { path: PathBuf, reason: String },

    /// The settings document is missing or invalid.
    #[error("Settings error: {0}")]
    Settings(String),

    /// The manager configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl RepoError {
    /// Failures caused by the shape of the input records.
    ///
    /// These abort a load but are reported through `LoadSummary::success`.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingRecordId { .. }
                | Self::MissingDataSource { .. }
                | Self::MalformedRecord { .. }
        )
    }

    /// Native code carried by this error, if it came from a surface.
    #[must_use]
    pub fn native_code(&self) -> Option<i64> {
        match self {
            Self::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn io(context: impl fmt::Display, err: std::io::Error) -> Self {
        Self::IoError(format!("{}: {}", context, err))
    }
}

// =============================================================================
// TESTS
// =============================================================================
