//! # CLI Command Implementations

use super::Cli;
use erepo_core::{
    CreateOptions, LoadSummary, ManagerConfig, RedoSummary, RepoError, RepoTarget,
    RepositoryManager,
};
use std::path::Path;

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything a command needs: the manager and the global flags.
#[derive(Debug)]
pub struct Context {
    pub manager: RepositoryManager,
    pub verbose: bool,
    pub silent: bool,
    pub json_mode: bool,
}

impl Context {
    /// Load the manager configuration named by the CLI (or the environment).
    pub fn from_cli(cli: &Cli) -> Result<Self, RepoError> {
        let config = ManagerConfig::from_env_and_file(cli.config.as_deref())?;
        Ok(Self::new(config, cli.verbose, cli.quiet, cli.json_mode))
    }

    pub fn new(config: ManagerConfig, verbose: bool, silent: bool, json_mode: bool) -> Self {
        Self {
            manager: RepositoryManager::local(config),
            verbose,
            silent: silent || json_mode,
            json_mode,
        }
    }

    fn target(&self, directory: &Path) -> RepoTarget {
        self.manager.target(directory).with_verbose(self.verbose)
    }
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn redo_json(redo: &RedoSummary) -> serde_json::Value {
    serde_json::json!({
        "initial_pending": redo.initial_pending,
        "processed": redo.processed,
        "succeeded": redo.succeeded,
        "fetch_failed": redo.fetch_failed,
        "process_failed": redo.process_failed,
        "converged": redo.converged
    })
}

fn print_redo(redo: &RedoSummary) {
    println!("Redo:");
    println!("  Pending:   {}", redo.initial_pending);
    println!("  Processed: {}", redo.processed);
    println!("  Succeeded: {}", redo.succeeded);
    println!("  Failed:    {}", redo.fetch_failed + redo.process_failed);
    if !redo.converged {
        println!("  (stopped: not converging)");
    }
}

// =============================================================================
// CREATE COMMAND
// =============================================================================

/// Create a repository.
pub fn cmd_create(
    ctx: &Context,
    directory: &Path,
    no_default_config: bool,
) -> Result<(), RepoError> {
    let created = ctx.manager.create_repository(
        directory,
        CreateOptions {
            exclude_default_config: no_default_config,
            silent: ctx.silent,
        },
    )?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "directory": directory.to_string_lossy(),
            "default_config_id": created.as_ref().map(|(id, _)| id.value())
        }));
        return Ok(());
    }

    println!("Created repository {}", directory.display());
    match created {
        Some((id, _)) => println!("Default configuration: {}", id),
        None => println!("No default configuration published"),
    }
    Ok(())
}

// =============================================================================
// DATA SOURCE COMMANDS
// =============================================================================

/// Register data source codes.
pub fn cmd_add_sources(
    ctx: &Context,
    directory: &Path,
    codes: &[String],
) -> Result<(), RepoError> {
    let target = ctx.target(directory);
    let (id, _) = ctx.manager.ensure_data_sources(&target, codes, ctx.silent)?;
    let registered = ctx.manager.registered_data_sources(&target)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "config_id": id.value(),
            "data_sources": registered
        }));
        return Ok(());
    }

    println!("Default configuration: {}", id);
    let codes: Vec<String> = registered.into_iter().collect();
    println!("Data sources: {}", codes.join(", "));
    Ok(())
}

/// List registered data sources.
pub fn cmd_sources(ctx: &Context, directory: &Path) -> Result<(), RepoError> {
    let registered = ctx.manager.registered_data_sources(&ctx.target(directory))?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "data_sources": registered }));
        return Ok(());
    }

    if registered.is_empty() {
        println!("No data sources registered");
    }
    for code in registered {
        println!("{}", code);
    }
    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Load a record file.
pub fn cmd_load(
    ctx: &Context,
    directory: &Path,
    file: &Path,
    data_source: Option<&str>,
) -> Result<(), RepoError> {
    let summary: LoadSummary =
        ctx.manager
            .load_file(&ctx.target(directory), file, data_source, ctx.silent)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "file": file.to_string_lossy(),
            "loaded": summary.loaded,
            "failed": summary.failed,
            "success": summary.success,
            "aborted": summary.aborted,
            "redo": redo_json(&summary.redo)
        }));
    } else {
        println!("Loaded:  {}", summary.loaded);
        println!("Failed:  {}", summary.failed);
        if let Some(reason) = &summary.aborted {
            println!("Aborted: {}", reason);
        }
        if summary.redo.processed > 0 {
            print_redo(&summary.redo);
        }
    }

    if summary.success {
        Ok(())
    } else {
        Err(RepoError::LoadAborted {
            path: file.to_path_buf(),
            reason: summary.aborted.unwrap_or_default(),
        })
    }
}

// =============================================================================
// REDO COMMAND
// =============================================================================

/// Drain pending redo work.
pub fn cmd_redo(ctx: &Context, directory: &Path) -> Result<(), RepoError> {
    ctx.manager.ensure_fully_ready(&ctx.target(directory))?;
    let redo = ctx.manager.drain_redos(ctx.silent);

    if ctx.json_mode {
        print_json(&redo_json(&redo));
    } else {
        print_redo(&redo);
    }
    Ok(())
}

// =============================================================================
// RECORD COMMANDS
// =============================================================================

/// Show the entity containing a record.
pub fn cmd_entity(
    ctx: &Context,
    directory: &Path,
    data_source: &str,
    record_id: &str,
) -> Result<(), RepoError> {
    let entity = ctx
        .manager
        .entity_by_record(&ctx.target(directory), data_source, record_id)?;
    print_json(&entity);
    Ok(())
}

/// Delete a record.
pub fn cmd_delete(
    ctx: &Context,
    directory: &Path,
    data_source: &str,
    record_id: &str,
) -> Result<(), RepoError> {
    let found =
        ctx.manager
            .delete_record(&ctx.target(directory), data_source, record_id, ctx.silent)?;
    report_record(ctx, "deleted", data_source, record_id, found);
    Ok(())
}

/// Re-resolve a record.
pub fn cmd_reevaluate(
    ctx: &Context,
    directory: &Path,
    data_source: &str,
    record_id: &str,
) -> Result<(), RepoError> {
    let found =
        ctx.manager
            .reevaluate_record(&ctx.target(directory), data_source, record_id, ctx.silent)?;
    report_record(ctx, "reevaluated", data_source, record_id, found);
    Ok(())
}

fn report_record(ctx: &Context, action: &str, data_source: &str, record_id: &str, found: bool) {
    if ctx.json_mode {
        print_json(&serde_json::json!({
            "data_source": data_source,
            "record_id": record_id,
            "action": action,
            "found": found
        }));
    } else if found {
        println!("Record {}/{} {}", data_source, record_id, action);
    } else {
        println!("Record {}/{} not found", data_source, record_id);
    }
}

// =============================================================================
// REPOSITORY COMMANDS
// =============================================================================

/// Remove all loaded data.
pub fn cmd_purge(ctx: &Context, directory: &Path) -> Result<(), RepoError> {
    ctx.manager.purge_repository(&ctx.target(directory))?;
    if ctx.json_mode {
        print_json(&serde_json::json!({ "purged": true }));
    } else {
        println!("Purged {}", directory.display());
    }
    Ok(())
}

/// Remove a repository.
pub fn cmd_destroy(ctx: &Context, directory: &Path) -> Result<(), RepoError> {
    let removed = ctx.manager.destroy_repository(directory)?;
    if ctx.json_mode {
        print_json(&serde_json::json!({ "removed": removed }));
    } else if removed {
        println!("Removed {}", directory.display());
    } else {
        println!("Nothing removed: {}", directory.display());
    }
    Ok(())
}
