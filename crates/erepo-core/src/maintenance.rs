//! Single-record operations: lookup, delete, reevaluate.
//!
//! Deleting or reevaluating a record the engine does not know is a no-op
//! reported as `false`.

use crate::engine::check;
use crate::lifecycle::RepositoryManager;
use crate::primitives::NATIVE_CODE_RECORD_NOT_FOUND;
use crate::types::{RepoError, RepoTarget};

impl RepositoryManager {
    /// The resolved entity containing a record.
    pub fn entity_by_record(
        &self,
        target: &RepoTarget,
        data_source: &str,
        record_id: &str,
    ) -> Result<serde_json::Value, RepoError> {
        let full = self.ensure_fully_ready(target)?;
        let engine = full.engine.as_ref();
        let response = check(
            engine,
            "entity_by_record_id",
            engine.entity_by_record_id(data_source, record_id),
        )?;
        serde_json::from_str(&response)
            .map_err(|e| RepoError::SerializationError(format!("entity response: {}", e)))
    }

    /// Delete a record. Returns `false` if the record did not exist.
    pub fn delete_record(
        &self,
        target: &RepoTarget,
        data_source: &str,
        record_id: &str,
        silent: bool,
    ) -> Result<bool, RepoError> {
        let full = self.ensure_fully_ready(target)?;
        let engine = full.engine.as_ref();
        let result = check(
            engine,
            "delete_record",
            engine.delete_record(data_source, record_id),
        );
        self.settle(result, data_source, record_id, silent)
    }

    /// Re-resolve a record. Returns `false` if the record did not exist.
    pub fn reevaluate_record(
        &self,
        target: &RepoTarget,
        data_source: &str,
        record_id: &str,
        silent: bool,
    ) -> Result<bool, RepoError> {
        let full = self.ensure_fully_ready(target)?;
        let engine = full.engine.as_ref();
        let result = check(
            engine,
            "reevaluate_record",
            engine.reevaluate_record(data_source, record_id),
        );
        self.settle(result, data_source, record_id, silent)
    }

    fn settle(
        &self,
        result: Result<(), RepoError>,
        data_source: &str,
        record_id: &str,
        silent: bool,
    ) -> Result<bool, RepoError> {
        let found = match result {
            Ok(()) => true,
            Err(err) if err.native_code() == Some(NATIVE_CODE_RECORD_NOT_FOUND) => {
                tracing::debug!(data_source, record_id, "record not found");
                false
            }
            Err(err) => return Err(err),
        };
        self.drain_redos(silent);
        Ok(found)
    }
}
