//! # erepo-core
//!
//! Repository lifecycle and ingestion manager for an entity-resolution engine.
//!
//! The manager creates repository directories, initializes the engine's
//! surfaces against them, keeps the default configuration in step with the
//! data sources being loaded, streams records into the engine and drains the
//! redo queue afterwards.
//!
//! ## Architecture
//!
//! - `engine`: the surface traits every backend implements
//! - `lifecycle`: `RepositoryManager` and its two-tier state machine
//! - `bootstrap`, `reconcile`, `ingestor`, `redo`, `maintenance`: operations,
//!   all as methods on `RepositoryManager`
//! - `template`: single-flight cache of materialized storage templates
//! - `storage`: schema sources and the redb-backed local backend
//! - `reader`: CSV / JSON / JSON-lines record reader
//!
//! ## Architectural Constraints
//!
//! - Blocking and thread-safe: no async runtime
//! - All process-wide state lives in a `RepositoryManager`
//! - The engine is reached only through `engine` traits

// =============================================================================
// MODULES
// =============================================================================

pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod ingestor;
pub mod lifecycle;
pub mod maintenance;
pub mod primitives;
pub mod progress;
pub mod reader;
pub mod reconcile;
pub mod redo;
pub mod settings;
pub mod storage;
pub mod template;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    ConfigId, Fingerprint, LoadSummary, NativeException, RedoSummary, RepoError, RepoTarget,
};

// =============================================================================
// RE-EXPORTS: Manager
// =============================================================================

pub use bootstrap::CreateOptions;
pub use config::ManagerConfig;
pub use engine::{
    BaseSurfaces, CatalogSurface, ConfigHandle, ConfigSurface, DiagnosticSurface, EngineBackend,
    EngineSurface, FullSurfaces, InitParams, NativeResult, NativeStatus, NativeSurface,
    RawConfigHandle,
};
pub use lifecycle::{RepositoryManager, TierStatus};
pub use progress::ProgressInterval;
pub use reader::{Record, RecordFormat, RecordReader};
pub use settings::RepositorySettings;
pub use storage::LocalBackend;
pub use template::TemplateCache;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
