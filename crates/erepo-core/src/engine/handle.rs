//! Scoped configuration handle.
//!
//! A `ConfigHandle` owns a `RawConfigHandle` and closes it on drop, so a
//! failure halfway through a registration never leaks the native handle.

use super::{check, ConfigSurface, DataSourceList, RawConfigHandle};
use crate::types::RepoError;
use std::collections::BTreeSet;

/// A configuration handle released when dropped.
pub struct ConfigHandle<'a> {
    surface: &'a dyn ConfigSurface,
    raw: RawConfigHandle,
}

impl std::fmt::Debug for ConfigHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("surface", &self.surface.surface_name())
            .field("raw", &self.raw)
            .finish()
    }
}

impl<'a> ConfigHandle<'a> {
    /// Acquire a handle holding a fresh configuration.
    pub fn create(surface: &'a dyn ConfigSurface) -> Result<Self, RepoError> {
        let raw = check(surface, "create_config", surface.create_config())?;
        Ok(Self { surface, raw })
    }

    /// Acquire a handle holding `document`.
    pub fn load(surface: &'a dyn ConfigSurface, document: &str) -> Result<Self, RepoError> {
        let raw = check(surface, "load_config", surface.load_config(document))?;
        Ok(Self { surface, raw })
    }

    /// Data source codes registered in this handle.
    pub fn data_source_codes(&self) -> Result<BTreeSet<String>, RepoError> {
        let listing = check(
            self.surface,
            "list_data_sources",
            self.surface.list_data_sources(self.raw),
        )?;
        let list: DataSourceList = serde_json::from_str(&listing)
            .map_err(|e| RepoError::SerializationError(format!("data source listing: {}", e)))?;
        Ok(list.data_sources.into_iter().map(|entry| entry.code).collect())
    }

    /// Register a data source code, accumulating with existing registrations.
    pub fn add_data_source(&self, code: &str) -> Result<(), RepoError> {
        check(
            self.surface,
            "add_data_source",
            self.surface.add_data_source(self.raw, code),
        )?;
        Ok(())
    }

    /// Serialize the handle to a configuration document.
    pub fn export(&self) -> Result<String, RepoError> {
        check(
            self.surface,
            "export_config",
            self.surface.export_config(self.raw),
        )
    }
}

impl Drop for ConfigHandle<'_> {
    fn drop(&mut self) {
        if self.surface.close_config(self.raw).is_err() {
            let exception = self.surface.last_exception();
            tracing::warn!(
                handle = self.raw.0,
                code = exception.code,
                message = %exception.message,
                "failed to close configuration handle"
            );
        }
    }
}
