//! # Data Source Reconciliation
//!
//! Makes sure the default configuration contains a set of data source codes.
//!
//! Missing codes are added to a working copy of the default configuration,
//! which is then registered as a new version and marked default. The engine
//! only reads its configuration on initialization, so the full tier is
//! re-initialized afterwards. When nothing is missing the catalog is left
//! untouched.

use crate::engine::{BaseSurfaces, ConfigHandle, check};
use crate::lifecycle::RepositoryManager;
use crate::primitives::DEFAULT_CONFIG_COMMENT;
use crate::types::{ConfigId, RepoError, RepoTarget};
use std::collections::BTreeSet;

impl RepositoryManager {
    /// Ensure every code in `codes` is registered in the default configuration.
    ///
    /// Returns the default configuration after reconciliation.
    pub fn ensure_data_sources<I>(
        &self,
        target: &RepoTarget,
        codes: I,
        silent: bool,
    ) -> Result<(ConfigId, String), RepoError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let requested: BTreeSet<String> = codes
            .into_iter()
            .map(|code| code.as_ref().trim().to_string())
            .filter(|code| !code.is_empty())
            .collect();

        let full = self.ensure_fully_ready(target)?;
        let catalog = full.base.catalog.as_ref();
        let current = default_document(&full.base)?;

        let handle = match &current {
            Some((_, document)) => ConfigHandle::load(full.base.config.as_ref(), document)?,
            None => ConfigHandle::create(full.base.config.as_ref())?,
        };
        let existing = handle.data_source_codes()?;
        let missing: Vec<&String> = requested.difference(&existing).collect();

        if missing.is_empty() {
            if let Some(current) = current {
                tracing::debug!(config_id = %current.0, "data sources already registered");
                return Ok(current);
            }
        }

        for code in &missing {
            handle.add_data_source(code)?;
        }
        let document = handle.export()?;
        drop(handle);

        let comment = if missing.is_empty() {
            DEFAULT_CONFIG_COMMENT.to_string()
        } else {
            let joined: Vec<&str> = missing.iter().map(|code| code.as_str()).collect();
            format!("Added data sources: {}", joined.join(", "))
        };
        let id = check(
            catalog,
            "register_config",
            catalog.register_config(&document, &comment),
        )?;
        check(catalog, "set_default_config_id", catalog.set_default_config_id(id))?;

        if !silent {
            tracing::info!(config_id = %id, added = ?missing, "published configuration");
        }

        self.reinitialize_full(target)?;
        Ok((id, document))
    }

    /// Data source codes of the default configuration.
    pub fn registered_data_sources(
        &self,
        target: &RepoTarget,
    ) -> Result<BTreeSet<String>, RepoError> {
        let base = self.ensure_base_ready(target)?;
        active_data_sources(&base)
    }

    /// The default configuration, if one was ever published.
    pub fn default_config(
        &self,
        target: &RepoTarget,
    ) -> Result<Option<(ConfigId, String)>, RepoError> {
        let base = self.ensure_base_ready(target)?;
        default_document(&base)
    }
}

/// The default configuration ID and document.
fn default_document(base: &BaseSurfaces) -> Result<Option<(ConfigId, String)>, RepoError> {
    let catalog = base.catalog.as_ref();
    let Some(id) = check(catalog, "default_config_id", catalog.default_config_id())? else {
        return Ok(None);
    };
    let document = check(catalog, "config_document", catalog.config_document(id))?;
    Ok(Some((id, document)))
}

/// Codes in the default configuration (empty when there is none).
pub(crate) fn active_data_sources(base: &BaseSurfaces) -> Result<BTreeSet<String>, RepoError> {
    match default_document(base)? {
        Some((_, document)) => {
            ConfigHandle::load(base.config.as_ref(), &document)?.data_source_codes()
        }
        None => Ok(BTreeSet::new()),
    }
}
