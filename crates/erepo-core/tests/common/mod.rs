//! Shared fixtures for the integration tests.
//!
//! `FakeBackend` is an in-memory engine that counts every initialization,
//! destroy and catalog registration, and can be told to fail.

#![allow(dead_code)]

use erepo_core::engine::{DataSourceEntry, DataSourceList};
use erepo_core::{
    CatalogSurface, ConfigId, ConfigSurface, DiagnosticSurface, EngineBackend, EngineSurface,
    InitParams, ManagerConfig, NativeException, NativeResult, NativeStatus, NativeSurface,
    RawConfigHandle, RepoTarget, RepositoryManager, RepositorySettings,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const UNKNOWN_RECORD: i64 = 33;

// =============================================================================
// SHARED STATE
// =============================================================================

#[derive(Debug, Default)]
pub struct FakeState {
    pub inits: BTreeMap<&'static str, u64>,
    pub destroys: BTreeMap<&'static str, u64>,
    pub fail_init: Option<&'static str>,
    pub module_names: Vec<String>,

    pub next_handle: u64,
    pub handles: BTreeMap<u64, BTreeSet<String>>,
    pub configs: BTreeMap<i64, String>,
    pub default_config: Option<i64>,
    pub registrations: u64,
    pub default_updates: u64,

    pub records: Vec<(String, String)>,
    /// Documents accepted by `add_record`, in submission order.
    pub documents: Vec<String>,
    pub reject_ids: BTreeSet<String>,
    pub redo: VecDeque<String>,
    /// Every processed redo item queues itself again.
    pub sticky_redo: bool,
    pub fail_redo_fetch: bool,
    pub purges: u64,
}

impl FakeState {
    pub fn inits(&self, surface: &str) -> u64 {
        self.inits.get(surface).copied().unwrap_or(0)
    }

    pub fn destroys(&self, surface: &str) -> u64 {
        self.destroys.get(surface).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state")
    }

    fn init(&self, surface: &'static str, params: &InitParams<'_>) -> Result<FakeSurface, NativeException> {
        let mut state = self.state();
        if state.fail_init == Some(surface) {
            return Err(NativeException::new(99, format!("{} refused to start", surface)));
        }
        *state.inits.entry(surface).or_default() += 1;
        state.module_names.push(params.module_name.to_string());
        Ok(FakeSurface {
            name: surface,
            state: Arc::clone(&self.state),
            last: Arc::new(Mutex::new(NativeException::default())),
        })
    }
}

impl EngineBackend for FakeBackend {
    fn init_config(&self, params: &InitParams<'_>) -> Result<Arc<dyn ConfigSurface>, NativeException> {
        Ok(Arc::new(self.init("config", params)?))
    }

    fn init_catalog(&self, params: &InitParams<'_>) -> Result<Arc<dyn CatalogSurface>, NativeException> {
        Ok(Arc::new(self.init("catalog", params)?))
    }

    fn init_engine(&self, params: &InitParams<'_>) -> Result<Arc<dyn EngineSurface>, NativeException> {
        Ok(Arc::new(self.init("engine", params)?))
    }

    fn init_diagnostics(
        &self,
        params: &InitParams<'_>,
    ) -> Result<Arc<dyn DiagnosticSurface>, NativeException> {
        Ok(Arc::new(self.init("diagnostics", params)?))
    }
}

// =============================================================================
// SURFACE
// =============================================================================

/// One fake type implements every surface; `name` tells them apart.
#[derive(Debug)]
pub struct FakeSurface {
    name: &'static str,
    state: Arc<Mutex<FakeState>>,
    last: Arc<Mutex<NativeException>>,
}

impl FakeSurface {
    fn call<T>(&self, f: impl FnOnce(&mut FakeState) -> Result<T, NativeException>) -> NativeResult<T> {
        let mut state = self.state.lock().expect("fake state");
        f(&mut state).map_err(|exception| {
            *self.last.lock().expect("last") = exception;
            NativeStatus(-1)
        })
    }
}

fn codes_document(codes: &BTreeSet<String>) -> String {
    let list = DataSourceList {
        data_sources: codes
            .iter()
            .zip(1u64..)
            .map(|(code, id)| DataSourceEntry {
                id,
                code: code.clone(),
            })
            .collect(),
    };
    serde_json::to_string(&list).expect("listing")
}

fn missing_handle() -> NativeException {
    NativeException::new(7, "no such handle")
}

impl NativeSurface for FakeSurface {
    fn surface_name(&self) -> &'static str {
        self.name
    }

    fn last_exception(&self) -> NativeException {
        self.last.lock().expect("last").clone()
    }

    fn destroy(&self) -> NativeResult<()> {
        let name = self.name;
        self.call(|state| {
            *state.destroys.entry(name).or_default() += 1;
            Ok(())
        })
    }
}

impl ConfigSurface for FakeSurface {
    fn create_config(&self) -> NativeResult<RawConfigHandle> {
        self.call(|state| {
            state.next_handle += 1;
            let handle = state.next_handle;
            state.handles.insert(handle, BTreeSet::from(["TEST".to_string()]));
            Ok(RawConfigHandle(handle))
        })
    }

    fn load_config(&self, document: &str) -> NativeResult<RawConfigHandle> {
        self.call(|state| {
            let list: DataSourceList = serde_json::from_str(document)
                .map_err(|e| NativeException::new(7, e.to_string()))?;
            state.next_handle += 1;
            let handle = state.next_handle;
            state
                .handles
                .insert(handle, list.data_sources.into_iter().map(|d| d.code).collect());
            Ok(RawConfigHandle(handle))
        })
    }

    fn add_data_source(&self, handle: RawConfigHandle, code: &str) -> NativeResult<String> {
        self.call(|state| {
            let codes = state.handles.get_mut(&handle.0).ok_or_else(missing_handle)?;
            codes.insert(code.to_string());
            Ok(format!("{{\"DSRC_CODE\":\"{}\"}}", code))
        })
    }

    fn list_data_sources(&self, handle: RawConfigHandle) -> NativeResult<String> {
        self.call(|state| {
            state
                .handles
                .get(&handle.0)
                .map(codes_document)
                .ok_or_else(missing_handle)
        })
    }

    fn export_config(&self, handle: RawConfigHandle) -> NativeResult<String> {
        self.list_data_sources(handle)
    }

    fn close_config(&self, handle: RawConfigHandle) -> NativeResult<()> {
        self.call(|state| {
            state
                .handles
                .remove(&handle.0)
                .map(|_| ())
                .ok_or_else(missing_handle)
        })
    }
}

impl CatalogSurface for FakeSurface {
    fn register_config(&self, document: &str, _comment: &str) -> NativeResult<ConfigId> {
        self.call(|state| {
            state.registrations += 1;
            let id = state.configs.len() as i64 + 1;
            state.configs.insert(id, document.to_string());
            Ok(ConfigId(id))
        })
    }

    fn set_default_config_id(&self, id: ConfigId) -> NativeResult<()> {
        self.call(|state| {
            state.default_updates += 1;
            state.default_config = Some(id.0);
            Ok(())
        })
    }

    fn default_config_id(&self) -> NativeResult<Option<ConfigId>> {
        self.call(|state| Ok(state.default_config.map(ConfigId)))
    }

    fn config_document(&self, id: ConfigId) -> NativeResult<String> {
        self.call(|state| {
            state
                .configs
                .get(&id.0)
                .cloned()
                .ok_or_else(|| NativeException::new(7, "no such config"))
        })
    }
}

impl EngineSurface for FakeSurface {
    fn add_record(&self, data_source: &str, record_id: &str, document: &str) -> NativeResult<()> {
        self.call(|state| {
            if state.reject_ids.contains(record_id) {
                return Err(NativeException::new(7, format!("rejected {}", record_id)));
            }
            state.records.push((data_source.to_string(), record_id.to_string()));
            state.documents.push(document.to_string());
            Ok(())
        })
    }

    fn count_redo_records(&self) -> NativeResult<u64> {
        self.call(|state| Ok(state.redo.len() as u64))
    }

    fn get_redo_record(&self) -> NativeResult<Option<String>> {
        self.call(|state| {
            if state.fail_redo_fetch {
                return Err(NativeException::new(7, "fetch failed"));
            }
            Ok(state.redo.pop_front())
        })
    }

    fn process_redo_record(&self, redo: &str) -> NativeResult<()> {
        self.call(|state| {
            if state.sticky_redo {
                state.redo.push_back(redo.to_string());
            }
            Ok(())
        })
    }

    fn entity_by_record_id(&self, data_source: &str, record_id: &str) -> NativeResult<String> {
        self.call(|state| {
            let known = state
                .records
                .iter()
                .any(|(ds, id)| ds == data_source && id == record_id);
            if known {
                Ok(format!("{{\"RECORD_ID\":\"{}\"}}", record_id))
            } else {
                Err(NativeException::new(UNKNOWN_RECORD, "unknown record"))
            }
        })
    }

    fn delete_record(&self, data_source: &str, record_id: &str) -> NativeResult<()> {
        self.call(|state| {
            let before = state.records.len();
            state
                .records
                .retain(|(ds, id)| !(ds == data_source && id == record_id));
            if state.records.len() == before {
                Err(NativeException::new(UNKNOWN_RECORD, "unknown record"))
            } else {
                Ok(())
            }
        })
    }

    fn reevaluate_record(&self, data_source: &str, record_id: &str) -> NativeResult<()> {
        self.call(|state| {
            let known = state
                .records
                .iter()
                .any(|(ds, id)| ds == data_source && id == record_id);
            if known {
                Ok(())
            } else {
                Err(NativeException::new(UNKNOWN_RECORD, "unknown record"))
            }
        })
    }
}

impl DiagnosticSurface for FakeSurface {
    fn purge_repository(&self) -> NativeResult<()> {
        self.call(|state| {
            state.purges += 1;
            state.records.clear();
            state.redo.clear();
            Ok(())
        })
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

/// A directory holding only a settings document.
pub fn settings_only_repository() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("etc")).expect("etc");
    RepositorySettings::for_repository(dir.path(), None, None)
        .write(dir.path())
        .expect("settings");
    dir
}

/// A manager over a fake backend and a repository to point it at.
pub fn fake_manager() -> (RepositoryManager, FakeBackend, tempfile::TempDir, RepoTarget) {
    let backend = FakeBackend::new();
    let manager = RepositoryManager::new(Arc::new(backend.clone()), ManagerConfig::default());
    let dir = settings_only_repository();
    let target = RepoTarget::new(dir.path());
    (manager, backend, dir, target)
}

/// A configuration with a default config containing `codes`.
pub fn publish_default(backend: &FakeBackend, codes: &[&str]) {
    let mut state = backend.state();
    let set: BTreeSet<String> = codes.iter().map(|c| c.to_string()).collect();
    let id = state.configs.len() as i64 + 1;
    state.configs.insert(id, codes_document(&set));
    state.default_config = Some(id);
}

/// Records as the reader would yield them.
pub fn records(values: Vec<serde_json::Value>) -> Vec<Result<erepo_core::Record, erepo_core::RepoError>> {
    values
        .into_iter()
        .map(|value| match value {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(erepo_core::RepoError::MalformedRecord {
                index: 0,
                detail: other.to_string(),
            }),
        })
        .collect()
}

/// Write a file under `dir`.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write file");
    path
}
