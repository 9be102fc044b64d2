//! # Storage
//!
//! redb-backed pieces of the workspace:
//! - `schema`: TOML schema sources applied to a fresh database (template
//!   materialization)
//! - `local`: an in-process engine backend storing the configuration catalog,
//!   records and the redo queue in the repository's main storage file
//!
//! The table layouts below are shared: a schema statement creating `records`
//! must use the same key/value types the local backend opens it with, or redb
//! rejects the table.

pub mod local;
pub mod schema;

use redb::TableDefinition;

pub use local::LocalBackend;
pub use schema::{Schema, SeedValue, Statement, TableLayout};

/// Registered configurations: config id -> JSON `{comment, document}`.
pub(crate) const CONFIGS: TableDefinition<u64, &str> = TableDefinition::new("configs");

/// Pending redo items: sequence -> JSON redo document.
pub(crate) const REDO: TableDefinition<u64, &str> = TableDefinition::new("redo");

/// Loaded records: (data source, record id) -> postcard-encoded row.
pub(crate) const RECORDS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("records");

/// Counters and pointers: key -> u64.
pub(crate) const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
