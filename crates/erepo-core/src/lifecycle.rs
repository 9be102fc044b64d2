//! # Lifecycle
//!
//! The `RepositoryManager` and its tier state machine.
//!
//! Surfaces are initialized in two tiers:
//! - base: config + catalog
//! - full: base + engine + diagnostics
//!
//! Each tier remembers the fingerprint it was initialized with. A request
//! with the same fingerprint reuses the tier; any other fingerprint tears the
//! tier down first (full before base) and initializes again. All transitions
//! run under one mutex.
//!
//! Surfaces handed out before a re-initialization stay valid as `Arc`s but
//! their native side is destroyed; calls on them fail with a "not
//! initialized" error which callers treat as retryable.

use crate::config::ManagerConfig;
use crate::engine::{
    BaseSurfaces, DiagnosticSurface, EngineBackend, EngineSurface, FullSurfaces, InitParams,
    destroy_quietly, init_error,
};
use crate::lock_unpoisoned;
use crate::settings;
use crate::storage::LocalBackend;
use crate::template::TemplateCache;
use crate::types::{Fingerprint, RepoError, RepoTarget, directory_identity};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

// =============================================================================
// TIER STATE
// =============================================================================

struct Tier<S> {
    fingerprint: Fingerprint,
    surfaces: S,
}

#[derive(Clone)]
struct EngineSurfaces {
    engine: Arc<dyn EngineSurface>,
    diagnostics: Arc<dyn DiagnosticSurface>,
}

#[derive(Default)]
struct TierState {
    base: Option<Tier<BaseSurfaces>>,
    full: Option<Tier<EngineSurfaces>>,
}

impl TierState {
    fn conclude_full(&mut self) {
        if let Some(tier) = self.full.take() {
            destroy_quietly(tier.surfaces.diagnostics.as_ref());
            destroy_quietly(tier.surfaces.engine.as_ref());
            tracing::debug!(directory = %tier.fingerprint.directory.display(), "concluded full tier");
        }
    }

    /// Tear down the base tier, and the full tier above it.
    fn conclude_base(&mut self) {
        self.conclude_full();
        if let Some(tier) = self.base.take() {
            destroy_quietly(tier.surfaces.catalog.as_ref());
            destroy_quietly(tier.surfaces.config.as_ref());
            tracing::debug!(directory = %tier.fingerprint.directory.display(), "concluded base tier");
        }
    }

    fn full_surfaces(&self) -> Option<FullSurfaces> {
        match (&self.base, &self.full) {
            (Some(base), Some(full)) => Some(FullSurfaces {
                base: base.surfaces.clone(),
                engine: Arc::clone(&full.surfaces.engine),
                diagnostics: Arc::clone(&full.surfaces.diagnostics),
            }),
            _ => None,
        }
    }
}

/// Fingerprints of the initialized tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierStatus {
    pub base: Option<Fingerprint>,
    pub full: Option<Fingerprint>,
}

// =============================================================================
// MANAGER
// =============================================================================

/// Owns the engine backend, the initialized tiers and the template cache.
///
/// Dropping the manager concludes every tier.
pub struct RepositoryManager {
    backend: Arc<dyn EngineBackend>,
    config: ManagerConfig,
    templates: TemplateCache,
    tiers: Mutex<TierState>,
}

impl fmt::Debug for RepositoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryManager")
            .field("config", &self.config)
            .field("templates", &self.templates)
            .field("tiers", &self.tier_status())
            .finish_non_exhaustive()
    }
}

impl RepositoryManager {
    pub fn new(backend: Arc<dyn EngineBackend>, config: ManagerConfig) -> Self {
        let templates = TemplateCache::new(config.cache_dir());
        Self {
            backend,
            config,
            templates,
            tiers: Mutex::new(TierState::default()),
        }
    }

    /// Manager over the redb-backed local engine.
    pub fn local(config: ManagerConfig) -> Self {
        Self::new(Arc::new(LocalBackend::new()), config)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    /// A request for `directory` using the configured module name.
    pub fn target(&self, directory: impl Into<std::path::PathBuf>) -> RepoTarget {
        RepoTarget::new(directory).with_module_name(self.config.module_name())
    }

    /// Ensure config + catalog are initialized for `target`.
    pub fn ensure_base_ready(&self, target: &RepoTarget) -> Result<BaseSurfaces, RepoError> {
        let mut state = lock_unpoisoned(&self.tiers);
        self.base_locked(&mut state, target).map(|(surfaces, _)| surfaces)
    }

    /// Ensure every surface is initialized for `target`.
    pub fn ensure_fully_ready(&self, target: &RepoTarget) -> Result<FullSurfaces, RepoError> {
        let mut state = lock_unpoisoned(&self.tiers);
        let fingerprint = target.fingerprint();
        if let Some(full) = &state.full {
            if full.fingerprint == fingerprint {
                if let Some(surfaces) = state.full_surfaces() {
                    return Ok(surfaces);
                }
            }
            tracing::info!(
                directory = %fingerprint.directory.display(),
                verbose = fingerprint.verbose,
                "settings changed, reinitializing engine"
            );
            state.conclude_base();
        }
        self.full_locked(&mut state, target)
    }

    /// Tear down the full tier and initialize it again.
    ///
    /// Used after publishing a new default configuration: the engine only
    /// picks it up on initialization.
    pub fn reinitialize_full(&self, target: &RepoTarget) -> Result<FullSurfaces, RepoError> {
        let mut state = lock_unpoisoned(&self.tiers);
        state.conclude_full();
        self.full_locked(&mut state, target)
    }

    /// Destroy every initialized surface. No-op when nothing is initialized.
    pub fn conclude_all(&self) {
        let mut state = lock_unpoisoned(&self.tiers);
        if state.base.is_none() && state.full.is_none() {
            return;
        }
        state.conclude_base();
        tracing::debug!("concluded all tiers");
    }

    pub fn tier_status(&self) -> TierStatus {
        let state = lock_unpoisoned(&self.tiers);
        TierStatus {
            base: state.base.as_ref().map(|t| t.fingerprint.clone()),
            full: state.full.as_ref().map(|t| t.fingerprint.clone()),
        }
    }

    /// The full tier's surfaces, if it is initialized.
    pub(crate) fn full_surfaces(&self) -> Option<FullSurfaces> {
        lock_unpoisoned(&self.tiers).full_surfaces()
    }

    /// Conclude the tiers if they are bound to `directory`.
    pub(crate) fn release_directory(&self, directory: &Path) {
        let identity = directory_identity(directory);
        let mut state = lock_unpoisoned(&self.tiers);
        let bound = state
            .base
            .as_ref()
            .is_some_and(|tier| tier.fingerprint.directory == identity);
        if bound {
            state.conclude_base();
            tracing::debug!(directory = %identity.display(), "released repository directory");
        }
    }

    // -------------------------------------------------------------------------
    // Transitions (state lock held)
    // -------------------------------------------------------------------------

    /// Returns the base surfaces and whether they were started by this call.
    fn base_locked(
        &self,
        state: &mut TierState,
        target: &RepoTarget,
    ) -> Result<(BaseSurfaces, bool), RepoError> {
        let fingerprint = target.fingerprint();
        if let Some(base) = &state.base {
            if base.fingerprint == fingerprint {
                return Ok((base.surfaces.clone(), false));
            }
            tracing::info!(
                directory = %fingerprint.directory.display(),
                verbose = fingerprint.verbose,
                "settings changed, reinitializing configuration surfaces"
            );
            state.conclude_base();
        }

        let raw = settings::read_raw(target.directory())?;
        let params = InitParams {
            module_name: target.module_name(),
            settings: &raw,
            verbose: target.verbose(),
        };

        let config = self
            .backend
            .init_config(&params)
            .map_err(|e| init_error("config", e))?;
        let catalog = match self.backend.init_catalog(&params) {
            Ok(catalog) => catalog,
            Err(e) => {
                destroy_quietly(config.as_ref());
                return Err(init_error("catalog", e));
            }
        };

        let surfaces = BaseSurfaces { config, catalog };
        state.base = Some(Tier {
            fingerprint,
            surfaces: surfaces.clone(),
        });
        tracing::debug!(module = target.module_name(), "initialized base tier");
        Ok((surfaces, true))
    }

    fn full_locked(
        &self,
        state: &mut TierState,
        target: &RepoTarget,
    ) -> Result<FullSurfaces, RepoError> {
        let (base, base_started) = self.base_locked(state, target)?;
        match self.start_engine(target) {
            Ok(surfaces) => {
                state.full = Some(Tier {
                    fingerprint: target.fingerprint(),
                    surfaces: surfaces.clone(),
                });
                tracing::debug!(module = target.module_name(), "initialized full tier");
                Ok(FullSurfaces {
                    base,
                    engine: surfaces.engine,
                    diagnostics: surfaces.diagnostics,
                })
            }
            Err(err) => {
                if base_started {
                    state.conclude_base();
                }
                Err(err)
            }
        }
    }

    fn start_engine(&self, target: &RepoTarget) -> Result<EngineSurfaces, RepoError> {
        let raw = settings::read_raw(target.directory())?;
        let params = InitParams {
            module_name: target.module_name(),
            settings: &raw,
            verbose: target.verbose(),
        };

        let engine = self
            .backend
            .init_engine(&params)
            .map_err(|e| init_error("engine", e))?;
        let diagnostics = match self.backend.init_diagnostics(&params) {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                destroy_quietly(engine.as_ref());
                return Err(init_error("diagnostics", e));
            }
        };
        Ok(EngineSurfaces {
            engine,
            diagnostics,
        })
    }
}

impl Drop for RepositoryManager {
    fn drop(&mut self) {
        self.conclude_all();
    }
}
