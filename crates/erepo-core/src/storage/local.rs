//! # Local Engine Backend
//!
//! An in-process implementation of the four engine surfaces on top of redb.
//!
//! The backend exists so a repository can be created, configured and loaded
//! without a vendor engine. It keeps everything in the repository's main
//! storage file:
//! - `configs` / `meta`: the configuration catalog and the default pointer
//! - `records`: one postcard row per (data source, record id)
//! - `redo`: pending redo items
//!
//! It performs no matching: every record is its own entity. Two behaviours
//! matter to the manager and are reproduced faithfully:
//! - the engine surface captures the default configuration when it is
//!   initialized, so records for data sources registered later fail with
//!   code 23 until the full tier is re-initialized
//! - replacing a record with a different document queues one redo item
//!
//! A redb file can only be opened once per process, so all surfaces bound to
//! the same storage file share one `LocalStore`.

use super::{CONFIGS, META, RECORDS, REDO};
use crate::engine::{
    CatalogSurface, ConfigSurface, DataSourceEntry, DataSourceList, DiagnosticSurface,
    EngineBackend, EngineSurface, InitParams, NativeResult, NativeStatus, NativeSurface,
    RawConfigHandle,
};
use crate::lock_unpoisoned;
use crate::primitives::{
    DATA_SOURCE_FIELD, DEFAULT_CONFIG_TEMPLATE, NATIVE_CODE_GENERIC, NATIVE_CODE_NOT_INITIALIZED,
    NATIVE_CODE_RECORD_NOT_FOUND, NATIVE_CODE_UNKNOWN_DATA_SOURCE, RECORD_ID_FIELD,
};
use crate::settings::RepositorySettings;
use crate::types::{ConfigId, NativeException, directory_identity};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Status returned by every failing call.
const FAILURE_STATUS: i64 = -2;

/// Data sources of a fresh configuration when no template is installed.
const BUILTIN_DATA_SOURCES: [&str; 2] = ["TEST", "SEARCH"];

const META_DEFAULT_CONFIG: &str = "default_config_id";
const META_NEXT_CONFIG: &str = "next_config_id";
const META_NEXT_ENTITY: &str = "next_entity_id";
const META_NEXT_REDO: &str = "next_redo_seq";

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Configuration document format of the local backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(rename = "CONFIG_VERSION", default = "default_config_version")]
    version: u32,
    #[serde(rename = "DATA_SOURCES", default)]
    data_sources: Vec<DataSourceEntry>,
}

fn default_config_version() -> u32 {
    1
}

impl ConfigDocument {
    fn builtin() -> Self {
        Self {
            version: default_config_version(),
            data_sources: BUILTIN_DATA_SOURCES
                .iter()
                .zip(1u64..)
                .map(|(code, id)| DataSourceEntry {
                    id,
                    code: (*code).to_string(),
                })
                .collect(),
        }
    }

    fn parse(document: &str) -> Result<Self, NativeException> {
        serde_json::from_str(document)
            .map_err(|e| generic(format!("invalid configuration document: {}", e)))
    }

    fn codes(&self) -> BTreeSet<String> {
        self.data_sources.iter().map(|d| d.code.clone()).collect()
    }
}

/// Catalog row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredConfig {
    comment: String,
    document: String,
}

/// Record row (postcard-encoded).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    entity_id: u64,
    document: String,
}

/// Redo item.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RedoItem {
    #[serde(rename = "DATA_SOURCE")]
    data_source: String,
    #[serde(rename = "RECORD_ID")]
    record_id: String,
    #[serde(rename = "REASON")]
    reason: String,
}

fn generic(message: impl Into<String>) -> NativeException {
    NativeException::new(NATIVE_CODE_GENERIC, message)
}

fn storage<E: std::fmt::Display>(err: E) -> NativeException {
    generic(format!("storage error: {}", err))
}

fn not_found(data_source: &str, record_id: &str) -> NativeException {
    NativeException::new(
        NATIVE_CODE_RECORD_NOT_FOUND,
        format!("Unknown record: dsrc[{}], record[{}]", data_source, record_id),
    )
}

fn not_initialized(surface: &str) -> NativeException {
    NativeException::new(
        NATIVE_CODE_NOT_INITIALIZED,
        format!("{} surface is not initialized", surface),
    )
}

fn config_key(id: ConfigId) -> Result<u64, NativeException> {
    u64::try_from(id.0).map_err(|_| generic(format!("invalid configuration id {}", id)))
}

// =============================================================================
// LAST EXCEPTION
// =============================================================================

#[derive(Debug, Default)]
struct LastException(Mutex<NativeException>);

impl LastException {
    fn get(&self) -> NativeException {
        lock_unpoisoned(&self.0).clone()
    }

    /// Record a failure and turn it into a status.
    fn capture<T>(&self, result: Result<T, NativeException>) -> NativeResult<T> {
        result.map_err(|exception| {
            *lock_unpoisoned(&self.0) = exception;
            NativeStatus(FAILURE_STATUS)
        })
    }
}

/// The store a surface is bound to, released on destroy.
#[derive(Debug)]
struct StoreSlot {
    surface: &'static str,
    store: Mutex<Option<Arc<LocalStore>>>,
}

impl StoreSlot {
    fn new(surface: &'static str, store: Arc<LocalStore>) -> Self {
        Self {
            surface,
            store: Mutex::new(Some(store)),
        }
    }

    fn get(&self) -> Result<Arc<LocalStore>, NativeException> {
        lock_unpoisoned(&self.store)
            .clone()
            .ok_or_else(|| not_initialized(self.surface))
    }

    fn release(&self) -> Result<(), NativeException> {
        lock_unpoisoned(&self.store)
            .take()
            .map(|_| ())
            .ok_or_else(|| not_initialized(self.surface))
    }
}

// =============================================================================
// STORE
// =============================================================================

/// An open main storage file.
pub struct LocalStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open a storage file, creating any missing table.
    ///
    /// Empty placeholder files are initialized as fresh databases.
    fn open(path: &Path) -> Result<Self, NativeException> {
        let db = Database::create(path).map_err(storage)?;
        {
            let txn = db.begin_write().map_err(storage)?;
            let _ = txn.open_table(CONFIGS).map_err(storage)?;
            let _ = txn.open_table(REDO).map_err(storage)?;
            let _ = txn.open_table(RECORDS).map_err(storage)?;
            let _ = txn.open_table(META).map_err(storage)?;
            txn.commit().map_err(storage)?;
        }
        tracing::debug!(path = %path.display(), "opened local storage");
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    fn register_config(&self, document: &str, comment: &str) -> Result<ConfigId, NativeException> {
        ConfigDocument::parse(document)?;
        let row = serde_json::to_string(&StoredConfig {
            comment: comment.to_string(),
            document: document.to_string(),
        })
        .map_err(storage)?;

        let txn = self.db.begin_write().map_err(storage)?;
        let id = {
            let mut meta = txn.open_table(META).map_err(storage)?;
            let mut configs = txn.open_table(CONFIGS).map_err(storage)?;
            let id = meta
                .get(META_NEXT_CONFIG)
                .map_err(storage)?
                .map(|v| v.value())
                .unwrap_or(1);
            configs.insert(id, row.as_str()).map_err(storage)?;
            meta.insert(META_NEXT_CONFIG, id.saturating_add(1))
                .map_err(storage)?;
            id
        };
        txn.commit().map_err(storage)?;
        Ok(ConfigId(id as i64))
    }

    fn set_default_config(&self, id: ConfigId) -> Result<(), NativeException> {
        let key = config_key(id)?;
        let txn = self.db.begin_write().map_err(storage)?;
        {
            let configs = txn.open_table(CONFIGS).map_err(storage)?;
            if configs.get(key).map_err(storage)?.is_none() {
                return Err(generic(format!("unknown configuration id {}", id)));
            }
            let mut meta = txn.open_table(META).map_err(storage)?;
            meta.insert(META_DEFAULT_CONFIG, key).map_err(storage)?;
        }
        txn.commit().map_err(storage)
    }

    fn default_config_id(&self) -> Result<Option<ConfigId>, NativeException> {
        let txn = self.db.begin_read().map_err(storage)?;
        let meta = txn.open_table(META).map_err(storage)?;
        Ok(meta
            .get(META_DEFAULT_CONFIG)
            .map_err(storage)?
            .map(|v| ConfigId(v.value() as i64)))
    }

    fn config_document(&self, id: ConfigId) -> Result<String, NativeException> {
        let key = config_key(id)?;
        let txn = self.db.begin_read().map_err(storage)?;
        let configs = txn.open_table(CONFIGS).map_err(storage)?;
        let row = configs
            .get(key)
            .map_err(storage)?
            .map(|v| v.value().to_string())
            .ok_or_else(|| generic(format!("unknown configuration id {}", id)))?;
        let stored: StoredConfig = serde_json::from_str(&row).map_err(storage)?;
        Ok(stored.document)
    }

    /// Data source codes of the default configuration (empty if none).
    fn active_data_sources(&self) -> Result<BTreeSet<String>, NativeException> {
        match self.default_config_id()? {
            Some(id) => Ok(ConfigDocument::parse(&self.config_document(id)?)?.codes()),
            None => Ok(BTreeSet::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Records
    // -------------------------------------------------------------------------

    fn add_record(
        &self,
        data_source: &str,
        record_id: &str,
        document: &str,
    ) -> Result<(), NativeException> {
        let parsed: serde_json::Value = serde_json::from_str(document)
            .map_err(|e| generic(format!("invalid record document: {}", e)))?;
        if !parsed.is_object() {
            return Err(generic("record document must be a JSON object"));
        }

        let txn = self.db.begin_write().map_err(storage)?;
        {
            let mut records = txn.open_table(RECORDS).map_err(storage)?;
            let mut meta = txn.open_table(META).map_err(storage)?;

            let existing = match records.get((data_source, record_id)).map_err(storage)? {
                Some(row) => Some(decode_record(row.value())?),
                None => None,
            };

            let entity_id = match &existing {
                Some(row) => row.entity_id,
                None => next_counter(&mut meta, META_NEXT_ENTITY)?,
            };

            if existing.as_ref().is_some_and(|row| row.document != document) {
                let seq = next_counter(&mut meta, META_NEXT_REDO)?;
                let item = serde_json::to_string(&RedoItem {
                    data_source: data_source.to_string(),
                    record_id: record_id.to_string(),
                    reason: "RECORD_REPLACED".to_string(),
                })
                .map_err(storage)?;
                let mut redo = txn.open_table(REDO).map_err(storage)?;
                redo.insert(seq, item.as_str()).map_err(storage)?;
            }

            let row = postcard::to_allocvec(&StoredRecord {
                entity_id,
                document: document.to_string(),
            })
            .map_err(storage)?;
            records
                .insert((data_source, record_id), row.as_slice())
                .map_err(storage)?;
        }
        txn.commit().map_err(storage)
    }

    fn find_record(
        &self,
        data_source: &str,
        record_id: &str,
    ) -> Result<Option<StoredRecord>, NativeException> {
        let txn = self.db.begin_read().map_err(storage)?;
        let records = txn.open_table(RECORDS).map_err(storage)?;
        match records.get((data_source, record_id)).map_err(storage)? {
            Some(row) => Ok(Some(decode_record(row.value())?)),
            None => Ok(None),
        }
    }

    fn delete_record(&self, data_source: &str, record_id: &str) -> Result<(), NativeException> {
        let txn = self.db.begin_write().map_err(storage)?;
        let removed = {
            let mut records = txn.open_table(RECORDS).map_err(storage)?;
            let removed = records
                .remove((data_source, record_id))
                .map_err(storage)?
                .is_some();
            removed
        };
        if !removed {
            txn.abort().map_err(storage)?;
            return Err(not_found(data_source, record_id));
        }
        txn.commit().map_err(storage)
    }

    fn count_redo(&self) -> Result<u64, NativeException> {
        let txn = self.db.begin_read().map_err(storage)?;
        let redo = txn.open_table(REDO).map_err(storage)?;
        redo.len().map_err(storage)
    }

    fn pop_redo(&self) -> Result<Option<String>, NativeException> {
        let txn = self.db.begin_write().map_err(storage)?;
        let item = {
            let mut redo = txn.open_table(REDO).map_err(storage)?;
            let item = redo
                .pop_first()
                .map_err(storage)?
                .map(|(_, value)| value.value().to_string());
            item
        };
        txn.commit().map_err(storage)?;
        Ok(item)
    }

    fn purge(&self) -> Result<(), NativeException> {
        let txn = self.db.begin_write().map_err(storage)?;
        txn.delete_table(RECORDS).map_err(storage)?;
        txn.delete_table(REDO).map_err(storage)?;
        {
            let _ = txn.open_table(RECORDS).map_err(storage)?;
            let _ = txn.open_table(REDO).map_err(storage)?;
            let mut meta = txn.open_table(META).map_err(storage)?;
            meta.remove(META_NEXT_ENTITY).map_err(storage)?;
            meta.remove(META_NEXT_REDO).map_err(storage)?;
        }
        txn.commit().map_err(storage)
    }
}

fn decode_record(bytes: &[u8]) -> Result<StoredRecord, NativeException> {
    postcard::from_bytes(bytes).map_err(storage)
}

fn next_counter(
    meta: &mut redb::Table<'_, &'static str, u64>,
    key: &str,
) -> Result<u64, NativeException> {
    let value = meta
        .get(key)
        .map_err(storage)?
        .map(|v| v.value())
        .unwrap_or(1);
    meta.insert(key, value.saturating_add(1)).map_err(storage)?;
    Ok(value)
}

// =============================================================================
// BACKEND
// =============================================================================

/// Engine backend storing everything in redb.
#[derive(Debug, Default)]
pub struct LocalBackend {
    stores: Mutex<BTreeMap<PathBuf, Weak<LocalStore>>>,
}

impl LocalBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn open_store(&self, settings: &RepositorySettings) -> Result<Arc<LocalStore>, NativeException> {
        let paths = settings
            .storage_paths()
            .map_err(|e| generic(e.to_string()))?;
        for path in &paths {
            if !path.is_file() {
                return Err(generic(format!("storage file missing: {}", path.display())));
            }
        }
        let main = paths
            .first()
            .ok_or_else(|| generic("settings name no storage file"))?;
        let key = directory_identity(main);

        let mut stores = lock_unpoisoned(&self.stores);
        stores.retain(|_, store| store.strong_count() > 0);
        if let Some(store) = stores.get(&key).and_then(Weak::upgrade) {
            return Ok(store);
        }
        let store = Arc::new(LocalStore::open(main)?);
        stores.insert(key, Arc::downgrade(&store));
        Ok(store)
    }
}

fn parse_settings(params: &InitParams<'_>) -> Result<RepositorySettings, NativeException> {
    RepositorySettings::parse(params.settings).map_err(|e| generic(e.to_string()))
}

fn log_init(surface: &str, params: &InitParams<'_>) {
    tracing::debug!(
        surface,
        module = params.module_name,
        verbose = params.verbose,
        "initializing local surface"
    );
}

impl EngineBackend for LocalBackend {
    fn init_config(
        &self,
        params: &InitParams<'_>,
    ) -> Result<Arc<dyn ConfigSurface>, NativeException> {
        log_init("config", params);
        let settings = parse_settings(params)?;
        Ok(Arc::new(LocalConfig {
            config_path: PathBuf::from(settings.pipeline.config_path),
            handles: Mutex::new(BTreeMap::new()),
            next_handle: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
            last: LastException::default(),
        }))
    }

    fn init_catalog(
        &self,
        params: &InitParams<'_>,
    ) -> Result<Arc<dyn CatalogSurface>, NativeException> {
        log_init("catalog", params);
        let store = self.open_store(&parse_settings(params)?)?;
        Ok(Arc::new(LocalCatalog {
            slot: StoreSlot::new("catalog", store),
            last: LastException::default(),
        }))
    }

    fn init_engine(
        &self,
        params: &InitParams<'_>,
    ) -> Result<Arc<dyn EngineSurface>, NativeException> {
        log_init("engine", params);
        let store = self.open_store(&parse_settings(params)?)?;
        let active = store.active_data_sources()?;
        Ok(Arc::new(LocalEngine {
            slot: StoreSlot::new("engine", store),
            active,
            last: LastException::default(),
        }))
    }

    fn init_diagnostics(
        &self,
        params: &InitParams<'_>,
    ) -> Result<Arc<dyn DiagnosticSurface>, NativeException> {
        log_init("diagnostics", params);
        let store = self.open_store(&parse_settings(params)?)?;
        Ok(Arc::new(LocalDiagnostics {
            slot: StoreSlot::new("diagnostics", store),
            last: LastException::default(),
        }))
    }
}

// =============================================================================
// CONFIG SURFACE
// =============================================================================

#[derive(Debug)]
struct LocalConfig {
    config_path: PathBuf,
    handles: Mutex<BTreeMap<u64, ConfigDocument>>,
    next_handle: AtomicU64,
    destroyed: AtomicBool,
    last: LastException,
}

impl LocalConfig {
    fn ensure_live(&self) -> Result<(), NativeException> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(not_initialized("config"))
        } else {
            Ok(())
        }
    }

    fn open_handle(&self, document: ConfigDocument) -> RawConfigHandle {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.handles).insert(id, document);
        RawConfigHandle(id)
    }

    fn with_handle<T>(
        &self,
        handle: RawConfigHandle,
        f: impl FnOnce(&mut ConfigDocument) -> Result<T, NativeException>,
    ) -> Result<T, NativeException> {
        self.ensure_live()?;
        let mut handles = lock_unpoisoned(&self.handles);
        let document = handles
            .get_mut(&handle.0)
            .ok_or_else(|| generic(format!("invalid configuration handle {}", handle.0)))?;
        f(document)
    }

    fn template(&self) -> Result<ConfigDocument, NativeException> {
        let path = self.config_path.join(DEFAULT_CONFIG_TEMPLATE);
        if !path.is_file() {
            return Ok(ConfigDocument::builtin());
        }
        let source = std::fs::read_to_string(&path)
            .map_err(|e| generic(format!("cannot read {}: {}", path.display(), e)))?;
        ConfigDocument::parse(&source)
    }
}

impl NativeSurface for LocalConfig {
    fn surface_name(&self) -> &'static str {
        "config"
    }

    fn last_exception(&self) -> NativeException {
        self.last.get()
    }

    fn destroy(&self) -> NativeResult<()> {
        let result = if self.destroyed.swap(true, Ordering::SeqCst) {
            Err(not_initialized("config"))
        } else {
            lock_unpoisoned(&self.handles).clear();
            Ok(())
        };
        self.last.capture(result)
    }
}

impl ConfigSurface for LocalConfig {
    fn create_config(&self) -> NativeResult<RawConfigHandle> {
        let result = self
            .ensure_live()
            .and_then(|()| self.template())
            .map(|document| self.open_handle(document));
        self.last.capture(result)
    }

    fn load_config(&self, document: &str) -> NativeResult<RawConfigHandle> {
        let result = self
            .ensure_live()
            .and_then(|()| ConfigDocument::parse(document))
            .map(|document| self.open_handle(document));
        self.last.capture(result)
    }

    fn add_data_source(&self, handle: RawConfigHandle, code: &str) -> NativeResult<String> {
        let result = self.with_handle(handle, |document| {
            let code = code.trim();
            if code.is_empty() {
                return Err(generic("data source code must not be empty"));
            }
            if document.data_sources.iter().any(|d| d.code == code) {
                return Err(generic(format!("data source code [{}] already exists", code)));
            }
            let id = document
                .data_sources
                .iter()
                .map(|d| d.id)
                .max()
                .unwrap_or(0)
                .saturating_add(1);
            document.data_sources.push(DataSourceEntry {
                id,
                code: code.to_string(),
            });
            Ok(serde_json::json!({ "DSRC_ID": id }).to_string())
        });
        self.last.capture(result)
    }

    fn list_data_sources(&self, handle: RawConfigHandle) -> NativeResult<String> {
        let result = self.with_handle(handle, |document| {
            serde_json::to_string(&DataSourceList {
                data_sources: document.data_sources.clone(),
            })
            .map_err(storage)
        });
        self.last.capture(result)
    }

    fn export_config(&self, handle: RawConfigHandle) -> NativeResult<String> {
        let result =
            self.with_handle(handle, |document| serde_json::to_string(document).map_err(storage));
        self.last.capture(result)
    }

    fn close_config(&self, handle: RawConfigHandle) -> NativeResult<()> {
        let result = self.ensure_live().and_then(|()| {
            lock_unpoisoned(&self.handles)
                .remove(&handle.0)
                .map(|_| ())
                .ok_or_else(|| generic(format!("invalid configuration handle {}", handle.0)))
        });
        self.last.capture(result)
    }
}

// =============================================================================
// CATALOG SURFACE
// =============================================================================

#[derive(Debug)]
struct LocalCatalog {
    slot: StoreSlot,
    last: LastException,
}

impl NativeSurface for LocalCatalog {
    fn surface_name(&self) -> &'static str {
        "catalog"
    }

    fn last_exception(&self) -> NativeException {
        self.last.get()
    }

    fn destroy(&self) -> NativeResult<()> {
        self.last.capture(self.slot.release())
    }
}

impl CatalogSurface for LocalCatalog {
    fn register_config(&self, document: &str, comment: &str) -> NativeResult<ConfigId> {
        let result = self
            .slot
            .get()
            .and_then(|store| store.register_config(document, comment));
        self.last.capture(result)
    }

    fn set_default_config_id(&self, id: ConfigId) -> NativeResult<()> {
        let result = self.slot.get().and_then(|store| store.set_default_config(id));
        self.last.capture(result)
    }

    fn default_config_id(&self) -> NativeResult<Option<ConfigId>> {
        let result = self.slot.get().and_then(|store| store.default_config_id());
        self.last.capture(result)
    }

    fn config_document(&self, id: ConfigId) -> NativeResult<String> {
        let result = self.slot.get().and_then(|store| store.config_document(id));
        self.last.capture(result)
    }
}

// =============================================================================
// ENGINE SURFACE
// =============================================================================

#[derive(Debug)]
struct LocalEngine {
    slot: StoreSlot,
    /// Data sources of the default configuration at initialization.
    active: BTreeSet<String>,
    last: LastException,
}

impl LocalEngine {
    fn require_record(
        &self,
        data_source: &str,
        record_id: &str,
    ) -> Result<StoredRecord, NativeException> {
        self.slot
            .get()?
            .find_record(data_source, record_id)?
            .ok_or_else(|| not_found(data_source, record_id))
    }
}

impl NativeSurface for LocalEngine {
    fn surface_name(&self) -> &'static str {
        "engine"
    }

    fn last_exception(&self) -> NativeException {
        self.last.get()
    }

    fn destroy(&self) -> NativeResult<()> {
        self.last.capture(self.slot.release())
    }
}

impl EngineSurface for LocalEngine {
    fn add_record(&self, data_source: &str, record_id: &str, document: &str) -> NativeResult<()> {
        let result = self.slot.get().and_then(|store| {
            if !self.active.contains(data_source) {
                return Err(NativeException::new(
                    NATIVE_CODE_UNKNOWN_DATA_SOURCE,
                    format!("Invalid value for {}: [{}]", DATA_SOURCE_FIELD, data_source),
                ));
            }
            if record_id.trim().is_empty() {
                return Err(generic(format!("missing {}", RECORD_ID_FIELD)));
            }
            store.add_record(data_source, record_id, document)
        });
        self.last.capture(result)
    }

    fn count_redo_records(&self) -> NativeResult<u64> {
        let result = self.slot.get().and_then(|store| store.count_redo());
        self.last.capture(result)
    }

    fn get_redo_record(&self) -> NativeResult<Option<String>> {
        let result = self.slot.get().and_then(|store| store.pop_redo());
        self.last.capture(result)
    }

    fn process_redo_record(&self, redo: &str) -> NativeResult<()> {
        let result = serde_json::from_str::<RedoItem>(redo)
            .map_err(|e| generic(format!("invalid redo document: {}", e)))
            .and_then(|item| self.require_record(&item.data_source, &item.record_id))
            .map(|_| ());
        self.last.capture(result)
    }

    fn entity_by_record_id(&self, data_source: &str, record_id: &str) -> NativeResult<String> {
        let result = self.require_record(data_source, record_id).map(|row| {
            serde_json::json!({
                "RESOLVED_ENTITY": {
                    "ENTITY_ID": row.entity_id,
                    "RECORDS": [
                        { DATA_SOURCE_FIELD: data_source, RECORD_ID_FIELD: record_id }
                    ]
                }
            })
            .to_string()
        });
        self.last.capture(result)
    }

    fn delete_record(&self, data_source: &str, record_id: &str) -> NativeResult<()> {
        let result = self
            .slot
            .get()
            .and_then(|store| store.delete_record(data_source, record_id));
        self.last.capture(result)
    }

    fn reevaluate_record(&self, data_source: &str, record_id: &str) -> NativeResult<()> {
        let result = self.require_record(data_source, record_id).map(|_| ());
        self.last.capture(result)
    }
}

// =============================================================================
// DIAGNOSTIC SURFACE
// =============================================================================

#[derive(Debug)]
struct LocalDiagnostics {
    slot: StoreSlot,
    last: LastException,
}

impl NativeSurface for LocalDiagnostics {
    fn surface_name(&self) -> &'static str {
        "diagnostics"
    }

    fn last_exception(&self) -> NativeException {
        self.last.get()
    }

    fn destroy(&self) -> NativeResult<()> {
        self.last.capture(self.slot.release())
    }
}

impl DiagnosticSurface for LocalDiagnostics {
    fn purge_repository(&self) -> NativeResult<()> {
        let result = self.slot.get().and_then(|store| store.purge());
        self.last.capture(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================
