//! # Redo Drain
//!
//! Processes the engine's redo queue until it is empty.
//!
//! The queue may grow while it is being drained, so the loop is bounded: it
//! gives up once the number of attempts reaches `REDO_CONVERGENCE_FACTOR`
//! times the count observed when draining started. Errors stop the drain
//! without failing the caller.

use crate::engine::{EngineSurface, check};
use crate::lifecycle::RepositoryManager;
use crate::primitives::REDO_CONVERGENCE_FACTOR;
use crate::progress::ProgressInterval;
use crate::types::{RedoSummary, RepoError};

impl RepositoryManager {
    /// Drain pending redo work on the current engine.
    ///
    /// Returns an empty summary when the full tier is not initialized.
    pub fn drain_redos(&self, silent: bool) -> RedoSummary {
        let mut summary = RedoSummary::default();
        let Some(full) = self.full_surfaces() else {
            tracing::warn!("engine is not initialized, skipping redo drain");
            return summary;
        };

        if let Err(err) = drain(full.engine.as_ref(), silent, &mut summary) {
            tracing::warn!(
                processed = summary.processed,
                error = %err,
                "redo drain stopped early"
            );
        }
        summary
    }
}

fn drain(
    engine: &dyn EngineSurface,
    silent: bool,
    summary: &mut RedoSummary,
) -> Result<(), RepoError> {
    let mut pending = check(engine, "count_redo_records", engine.count_redo_records())?;
    summary.initial_pending = pending;
    if pending == 0 {
        return Ok(());
    }

    let limit = pending.saturating_mul(REDO_CONVERGENCE_FACTOR);
    let mut progress = ProgressInterval::new();
    if !silent {
        tracing::info!(pending, "draining redo records");
    }

    while pending > 0 {
        if summary.processed >= limit {
            summary.converged = false;
            tracing::warn!(
                initial = summary.initial_pending,
                processed = summary.processed,
                pending,
                "redo processing is not converging, giving up"
            );
            return Ok(());
        }

        summary.processed += 1;
        match check(engine, "get_redo_record", engine.get_redo_record()) {
            Ok(Some(redo)) => {
                match check(engine, "process_redo_record", engine.process_redo_record(&redo)) {
                    Ok(()) => summary.succeeded += 1,
                    Err(err) => {
                        summary.process_failed += 1;
                        tracing::debug!(error = %err, "redo record failed");
                    }
                }
            }
            Ok(None) => {}
            Err(err) => {
                summary.fetch_failed += 1;
                tracing::debug!(error = %err, "redo fetch failed");
            }
        }

        if !silent && progress.tick(summary.processed) {
            tracing::info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                "processing redo records"
            );
        }

        pending = check(engine, "count_redo_records", engine.count_redo_records())?;
    }

    if !silent {
        tracing::info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.fetch_failed + summary.process_failed,
            "redo drain complete"
        );
    }
    Ok(())
}
