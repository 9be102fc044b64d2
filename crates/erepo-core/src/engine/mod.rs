//! # Engine Surfaces
//!
//! The narrow call contract between the manager and the resolution engine.
//!
//! The engine exposes four independently initialized surfaces:
//! - `ConfigSurface`: configuration authoring (handles, data sources)
//! - `CatalogSurface`: registered configuration versions and the default ID
//! - `EngineSurface`: record submission and the redo queue
//! - `DiagnosticSurface`: repository purge
//!
//! Every call returns a `NativeResult`. A failure carries only a status; the
//! code and message must be read from the same surface's `last_exception`
//! immediately after the failing call. `check` does exactly that.

pub mod handle;

use crate::types::{ConfigId, NativeException, RepoError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use handle::ConfigHandle;

// =============================================================================
// CALL CONTRACT
// =============================================================================

/// Nonzero status returned by a failing native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeStatus(pub i64);

/// Result of a native call.
pub type NativeResult<T> = Result<T, NativeStatus>;

/// Opaque configuration handle owned by a `ConfigSurface`.
///
/// Never use this directly; wrap it in a `ConfigHandle` so it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawConfigHandle(pub u64);

/// Parameters shared by every surface initialization.
#[derive(Debug, Clone, Copy)]
pub struct InitParams<'a> {
    /// Name the engine uses to identify this caller in its logs.
    pub module_name: &'a str,
    /// Raw settings document read from the repository.
    pub settings: &'a str,
    /// Engine verbose logging.
    pub verbose: bool,
}

/// Behaviour common to all surfaces.
pub trait NativeSurface: Send + Sync {
    /// Short name used in errors and logs.
    fn surface_name(&self) -> &'static str;

    /// The error recorded by the most recent failing call.
    fn last_exception(&self) -> NativeException;

    /// Release the surface. Later calls fail.
    fn destroy(&self) -> NativeResult<()>;
}

/// Configuration authoring.
pub trait ConfigSurface: NativeSurface {
    /// Create a handle holding a fresh configuration built from templates.
    fn create_config(&self) -> NativeResult<RawConfigHandle>;

    /// Create a handle holding the given configuration document.
    fn load_config(&self, document: &str) -> NativeResult<RawConfigHandle>;

    /// Register a data source code in the handle. Returns the engine's response.
    fn add_data_source(&self, handle: RawConfigHandle, code: &str) -> NativeResult<String>;

    /// List the handle's data sources as a `DataSourceList` JSON document.
    fn list_data_sources(&self, handle: RawConfigHandle) -> NativeResult<String>;

    /// Serialize the handle to a configuration document.
    fn export_config(&self, handle: RawConfigHandle) -> NativeResult<String>;

    fn close_config(&self, handle: RawConfigHandle) -> NativeResult<()>;
}

/// Configuration catalog (versioning).
pub trait CatalogSurface: NativeSurface {
    /// Register a document, yielding a new configuration ID.
    fn register_config(&self, document: &str, comment: &str) -> NativeResult<ConfigId>;

    fn set_default_config_id(&self, id: ConfigId) -> NativeResult<()>;

    /// The default configuration ID, or `None` if none was ever set.
    fn default_config_id(&self) -> NativeResult<Option<ConfigId>>;

    fn config_document(&self, id: ConfigId) -> NativeResult<String>;
}

/// Resolution engine.
pub trait EngineSurface: NativeSurface {
    fn add_record(&self, data_source: &str, record_id: &str, document: &str) -> NativeResult<()>;

    fn count_redo_records(&self) -> NativeResult<u64>;

    /// Remove and return one redo item, or `None` when the queue is empty.
    fn get_redo_record(&self) -> NativeResult<Option<String>>;

    fn process_redo_record(&self, redo: &str) -> NativeResult<()>;

    /// The resolved entity containing the record, as a JSON document.
    fn entity_by_record_id(&self, data_source: &str, record_id: &str) -> NativeResult<String>;

    fn delete_record(&self, data_source: &str, record_id: &str) -> NativeResult<()>;

    fn reevaluate_record(&self, data_source: &str, record_id: &str) -> NativeResult<()>;
}

/// Diagnostics.
pub trait DiagnosticSurface: NativeSurface {
    /// Remove all loaded data. Registered configurations survive.
    fn purge_repository(&self) -> NativeResult<()>;
}

/// Factory for surfaces.
///
/// A failed initialization produces no surface, so the backend reports the
/// failure directly.
pub trait EngineBackend: Send + Sync {
    fn init_config(&self, params: &InitParams<'_>)
    -> Result<Arc<dyn ConfigSurface>, NativeException>;

    fn init_catalog(
        &self,
        params: &InitParams<'_>,
    ) -> Result<Arc<dyn CatalogSurface>, NativeException>;

    fn init_engine(&self, params: &InitParams<'_>)
    -> Result<Arc<dyn EngineSurface>, NativeException>;

    fn init_diagnostics(
        &self,
        params: &InitParams<'_>,
    ) -> Result<Arc<dyn DiagnosticSurface>, NativeException>;
}

// =============================================================================
// RESOURCE HANDLE SET
// =============================================================================

/// Surfaces of the base tier.
#[derive(Clone)]
pub struct BaseSurfaces {
    pub config: Arc<dyn ConfigSurface>,
    pub catalog: Arc<dyn CatalogSurface>,
}

/// Surfaces of the full tier (base + engine + diagnostics).
#[derive(Clone)]
pub struct FullSurfaces {
    pub base: BaseSurfaces,
    pub engine: Arc<dyn EngineSurface>,
    pub diagnostics: Arc<dyn DiagnosticSurface>,
}

impl fmt::Debug for BaseSurfaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseSurfaces")
            .field("config", &self.config.surface_name())
            .field("catalog", &self.catalog.surface_name())
            .finish()
    }
}

impl fmt::Debug for FullSurfaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullSurfaces")
            .field("base", &self.base)
            .field("engine", &self.engine.surface_name())
            .field("diagnostics", &self.diagnostics.surface_name())
            .finish()
    }
}

// =============================================================================
// DATA SOURCE LISTING
// =============================================================================

/// One entry of a data source listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceEntry {
    #[serde(rename = "DSRC_ID")]
    pub id: u64,
    #[serde(rename = "DSRC_CODE")]
    pub code: String,
}

/// The document returned by `ConfigSurface::list_data_sources`.
///
/// Unknown fields are ignored so configuration documents parse as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceList {
    #[serde(rename = "DATA_SOURCES", default)]
    pub data_sources: Vec<DataSourceEntry>,
}

// =============================================================================
// HELPERS
// =============================================================================

/// Convert a native result into a `RepoError`, reading the surface's last
/// exception on failure.
pub fn check<T, S>(surface: &S, operation: &'static str, result: NativeResult<T>) -> Result<T, RepoError>
where
    S: NativeSurface + ?Sized,
{
    result.map_err(|status| {
        let exception = surface.last_exception();
        tracing::debug!(
            surface = surface.surface_name(),
            operation,
            status = status.0,
            code = exception.code,
            "native call failed"
        );
        RepoError::Native {
            surface: surface.surface_name(),
            operation,
            code: exception.code,
            message: exception.message,
        }
    })
}

/// Map a failed initialization to a `RepoError`.
pub(crate) fn init_error(surface: &'static str, exception: NativeException) -> RepoError {
    RepoError::Native {
        surface,
        operation: "init",
        code: exception.code,
        message: exception.message,
    }
}

/// Destroy a surface, logging instead of failing.
pub(crate) fn destroy_quietly<S: NativeSurface + ?Sized>(surface: &S) {
    if surface.destroy().is_err() {
        let exception = surface.last_exception();
        tracing::warn!(
            surface = surface.surface_name(),
            code = exception.code,
            message = %exception.message,
            "destroy failed"
        );
    }
}
