//! # erepo CLI Module
//!
//! ## Available Commands
//!
//! - `create` - Create a repository
//! - `add-sources` - Register data source codes
//! - `sources` - List registered data sources
//! - `load` - Load a record file
//! - `redo` - Drain pending redo work
//! - `entity` - Show the entity containing a record
//! - `delete` - Delete a record
//! - `reevaluate` - Re-resolve a record
//! - `purge` - Remove all loaded data
//! - `destroy` - Remove a repository

mod commands;

use clap::{Parser, Subcommand};
use erepo_core::RepoError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// erepo - entity-resolution repository manager
#[derive(Parser, Debug)]
#[command(name = "erepo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose engine logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner and progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manager configuration file (defaults to ./erepo.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new repository
    Create {
        /// Repository directory (must be absent or empty)
        directory: PathBuf,

        /// Do not publish a default configuration
        #[arg(long)]
        no_default_config: bool,
    },

    /// Register data source codes in the default configuration
    AddSources {
        directory: PathBuf,

        /// Data source codes
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// List registered data sources
    Sources { directory: PathBuf },

    /// Load a .csv, .json or .jsonl file
    Load {
        directory: PathBuf,

        /// Record file
        file: PathBuf,

        /// Data source for records that do not name one
        #[arg(short = 's', long)]
        data_source: Option<String>,
    },

    /// Drain pending redo work
    Redo { directory: PathBuf },

    /// Show the entity containing a record
    Entity {
        directory: PathBuf,
        data_source: String,
        record_id: String,
    },

    /// Delete a record
    Delete {
        directory: PathBuf,
        data_source: String,
        record_id: String,
    },

    /// Re-resolve a record
    Reevaluate {
        directory: PathBuf,
        data_source: String,
        record_id: String,
    },

    /// Remove all loaded data (configurations are kept)
    Purge { directory: PathBuf },

    /// Remove a repository (honours EREPO_PRESERVE_REPOSITORY)
    Destroy { directory: PathBuf },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), RepoError> {
    let ctx = Context::from_cli(&cli)?;

    match cli.command {
        Commands::Create {
            directory,
            no_default_config,
        } => cmd_create(&ctx, &directory, no_default_config),
        Commands::AddSources { directory, codes } => cmd_add_sources(&ctx, &directory, &codes),
        Commands::Sources { directory } => cmd_sources(&ctx, &directory),
        Commands::Load {
            directory,
            file,
            data_source,
        } => cmd_load(&ctx, &directory, &file, data_source.as_deref()),
        Commands::Redo { directory } => cmd_redo(&ctx, &directory),
        Commands::Entity {
            directory,
            data_source,
            record_id,
        } => cmd_entity(&ctx, &directory, &data_source, &record_id),
        Commands::Delete {
            directory,
            data_source,
            record_id,
        } => cmd_delete(&ctx, &directory, &data_source, &record_id),
        Commands::Reevaluate {
            directory,
            data_source,
            record_id,
        } => cmd_reevaluate(&ctx, &directory, &data_source, &record_id),
        Commands::Purge { directory } => cmd_purge(&ctx, &directory),
        Commands::Destroy { directory } => cmd_destroy(&ctx, &directory),
    }
}
