//! # Ingestor
//!
//! Streams records into the engine.
//!
//! - Every record needs a non-empty `RECORD_ID`; a record without one aborts
//!   the load
//! - The data source comes from the record or, when the record has none, the
//!   caller's default; a record with neither aborts the load, and a present
//!   but unusable `DATA_SOURCE` is never replaced by the default
//! - The submitted document carries the same trimmed `RECORD_ID` and
//!   `DATA_SOURCE` the engine is keyed by
//! - Data sources the configuration does not know yet are registered before
//!   their first record is submitted
//! - Engine rejections are counted and the loop continues
//!
//! Whenever at least one record reached the engine, pending redo work is
//! drained before returning, even if the load was aborted.

use crate::engine::{FullSurfaces, check};
use crate::lifecycle::RepositoryManager;
use crate::primitives::{DATA_SOURCE_FIELD, RECOGNIZED_EXTENSIONS, RECORD_ID_FIELD};
use crate::progress::ProgressInterval;
use crate::reader::{Record, RecordFormat, RecordReader};
use crate::reconcile::active_data_sources;
use crate::types::{LoadSummary, RepoError, RepoTarget};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

impl RepositoryManager {
    /// Load a `.csv`, `.json` or `.jsonl` file.
    pub fn load_file(
        &self,
        target: &RepoTarget,
        source: &Path,
        default_data_source: Option<&str>,
        silent: bool,
    ) -> Result<LoadSummary, RepoError> {
        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| RECOGNIZED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| RepoError::UnsupportedExtension(source.to_path_buf()))?;

        let file = File::open(source)
            .map_err(|e| RepoError::io(format!("open {}", source.display()), e))?;
        let reader = RecordReader::open(BufReader::new(file))?;
        if let Some(format) = reader.format() {
            check_format(&extension, format)?;
        }

        if !silent {
            tracing::info!(
                file = %source.display(),
                format = ?reader.format(),
                "loading records"
            );
        }
        self.load_records(target, reader, default_data_source, silent)
    }

    /// Load records from any source of records.
    pub fn load_records<I>(
        &self,
        target: &RepoTarget,
        records: I,
        default_data_source: Option<&str>,
        silent: bool,
    ) -> Result<LoadSummary, RepoError>
    where
        I: IntoIterator<Item = Result<Record, RepoError>>,
    {
        let full = self.ensure_fully_ready(target)?;
        let known = active_data_sources(&full.base)?;

        let mut summary = LoadSummary {
            success: true,
            ..LoadSummary::default()
        };
        let outcome = self.ingest(
            target,
            full,
            known,
            records,
            default_data_source.map(str::trim).filter(|ds| !ds.is_empty()),
            silent,
            &mut summary,
        );

        if summary.processed() > 0 {
            summary.redo = self.drain_redos(silent);
        }

        match outcome {
            Ok(()) => {
                if !silent {
                    tracing::info!(
                        loaded = summary.loaded,
                        failed = summary.failed,
                        redo = summary.redo.processed,
                        "load complete"
                    );
                }
                Ok(summary)
            }
            Err(err) if err.is_structural() => {
                tracing::warn!(
                    loaded = summary.loaded,
                    failed = summary.failed,
                    error = %err,
                    "load aborted"
                );
                summary.success = false;
                summary.aborted = Some(err.to_string());
                Ok(summary)
            }
            Err(err) => Err(err),
        }
    }

    fn ingest<I>(
        &self,
        target: &RepoTarget,
        mut full: FullSurfaces,
        mut known: BTreeSet<String>,
        records: I,
        default_data_source: Option<&str>,
        silent: bool,
        summary: &mut LoadSummary,
    ) -> Result<(), RepoError>
    where
        I: IntoIterator<Item = Result<Record, RepoError>>,
    {
        let mut progress = ProgressInterval::new();
        let mut failure_log = ProgressInterval::new();

        for (position, item) in records.into_iter().enumerate() {
            let index = position as u64 + 1;
            let mut record = item?;

            let record_id =
                record_id(&record).ok_or(RepoError::MissingRecordId { index })?;
            let data_source = match identifier(&record, DATA_SOURCE_FIELD) {
                Ok(Some(ds)) => ds,
                Ok(None) => default_data_source
                    .ok_or_else(|| RepoError::MissingDataSource {
                        index,
                        record_id: record_id.clone(),
                    })?
                    .to_string(),
                Err(detail) => return Err(RepoError::MalformedRecord { index, detail }),
            };
            record.insert(RECORD_ID_FIELD.to_string(), Value::String(record_id.clone()));
            record.insert(DATA_SOURCE_FIELD.to_string(), Value::String(data_source.clone()));

            if !known.contains(&data_source) {
                self.ensure_data_sources(target, [data_source.as_str()], silent)?;
                full = self.ensure_fully_ready(target)?;
                known.insert(data_source.clone());
            }

            let document = Value::Object(record).to_string();
            let engine = full.engine.as_ref();
            match check(
                engine,
                "add_record",
                engine.add_record(&data_source, &record_id, &document),
            ) {
                Ok(()) => summary.loaded += 1,
                Err(err) => {
                    summary.failed += 1;
                    if summary.failed == 1 || failure_log.tick(summary.failed) {
                        tracing::warn!(
                            index,
                            data_source = %data_source,
                            record_id = %record_id,
                            failed = summary.failed,
                            error = %err,
                            "record rejected"
                        );
                    }
                }
            }

            if !silent && progress.tick(summary.processed()) {
                tracing::info!(
                    processed = summary.processed(),
                    loaded = summary.loaded,
                    failed = summary.failed,
                    "loading records"
                );
            }
        }
        Ok(())
    }
}

/// The record identifier as text. Numbers are accepted.
fn record_id(record: &Record) -> Option<String> {
    identifier(record, RECORD_ID_FIELD).ok().flatten()
}

/// A key field as trimmed text.
///
/// `Ok(None)` when the field is absent or null. Numbers are stringified; a
/// blank string or any other value is an error.
fn identifier(record: &Record, field: &str) -> Result<Option<String>, String> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(Some(text.trim().to_string())),
        Some(_) => Err(format!("{} must be a non-empty string or number", field)),
    }
}

fn check_format(extension: &str, format: RecordFormat) -> Result<(), RepoError> {
    let consistent = match extension {
        "csv" => !format.is_json(),
        _ => format.is_json(),
    };
    if consistent {
        Ok(())
    } else {
        Err(RepoError::UnsupportedFormat(format!(
            "{:?} content in a .{} file",
            format, extension
        )))
    }
}
