//! # Schema Sources
//!
//! A schema source is a TOML document listing the tables of a fresh storage
//! file. Each `[[statements]]` entry is applied in order, in its own write
//! transaction: the table is created with the requested layout and its seed
//! rows are inserted.
//!
//! ```toml
//! version = 1
//!
//! [[statements]]
//! table = "meta"
//! layout = "counter"
//! seed = { next_config_id = 1 }
//! ```

use crate::types::RepoError;
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Schema format version understood by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Key/value layout of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLayout {
    /// `&str -> &str`
    Text,
    /// `&str -> u64`
    Counter,
    /// `u64 -> &str`
    Document,
    /// `(&str, &str) -> &[u8]`
    Record,
}

/// A seed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedValue {
    Int(u64),
    Text(String),
}

/// One schema statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Statement {
    pub table: String,
    pub layout: TableLayout,
    #[serde(default)]
    pub seed: BTreeMap<String, SeedValue>,
}

/// A parsed schema source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    pub version: u32,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl Schema {
    /// Parse and validate a schema source. `path` is only used in errors.
    pub fn parse(source: &str, path: &Path) -> Result<Self, RepoError> {
        let schema: Self = toml::from_str(source).map_err(|e| RepoError::Schema {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        schema.validate(path)?;
        Ok(schema)
    }

    fn validate(&self, path: &Path) -> Result<(), RepoError> {
        let invalid = |detail: String| RepoError::Schema {
            path: path.to_path_buf(),
            detail,
        };
        if self.version != SCHEMA_VERSION {
            return Err(invalid(format!(
                "unsupported version {} (expected {})",
                self.version, SCHEMA_VERSION
            )));
        }
        let mut seen = BTreeSet::new();
        for statement in &self.statements {
            if statement.table.trim().is_empty() {
                return Err(invalid("statement with empty table name".to_string()));
            }
            if !seen.insert(statement.table.as_str()) {
                return Err(invalid(format!("table {} declared twice", statement.table)));
            }
        }
        Ok(())
    }

    /// Apply every statement to `db`, in order.
    ///
    /// Returns the number of statements applied. On error, earlier statements
    /// stay committed; callers must discard the database.
    pub fn apply(&self, db: &Database, path: &Path) -> Result<usize, RepoError> {
        for (index, statement) in self.statements.iter().enumerate() {
            statement.apply(db).map_err(|detail| RepoError::Schema {
                path: path.to_path_buf(),
                detail: format!("statement {} ({}): {}", index + 1, statement.table, detail),
            })?;
        }
        Ok(self.statements.len())
    }
}

impl Statement {
    fn apply(&self, db: &Database) -> Result<(), String> {
        let txn = db.begin_write().map_err(|e| e.to_string())?;
        {
            let name = self.table.as_str();
            match self.layout {
                TableLayout::Text => {
                    let mut table = txn
                        .open_table(TableDefinition::<&str, &str>::new(name))
                        .map_err(|e| e.to_string())?;
                    for (key, value) in &self.seed {
                        let SeedValue::Text(text) = value else {
                            return Err(format!("seed {} must be text", key));
                        };
                        table
                            .insert(key.as_str(), text.as_str())
                            .map_err(|e| e.to_string())?;
                    }
                }
                TableLayout::Counter => {
                    let mut table = txn
                        .open_table(TableDefinition::<&str, u64>::new(name))
                        .map_err(|e| e.to_string())?;
                    for (key, value) in &self.seed {
                        let SeedValue::Int(count) = value else {
                            return Err(format!("seed {} must be an integer", key));
                        };
                        table
                            .insert(key.as_str(), *count)
                            .map_err(|e| e.to_string())?;
                    }
                }
                TableLayout::Document => {
                    self.reject_seed()?;
                    let _ = txn
                        .open_table(TableDefinition::<u64, &str>::new(name))
                        .map_err(|e| e.to_string())?;
                }
                TableLayout::Record => {
                    self.reject_seed()?;
                    let _ = txn
                        .open_table(TableDefinition::<(&str, &str), &[u8]>::new(name))
                        .map_err(|e| e.to_string())?;
                }
            }
        }
        txn.commit().map_err(|e| e.to_string())
    }

    fn reject_seed(&self) -> Result<(), String> {
        if self.seed.is_empty() {
            Ok(())
        } else {
            Err("seed rows are only supported for text and counter tables".to_string())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use redb::{ReadableDatabase, ReadableTable};

    const SCHEMA: &str = r#"
        version = 1

        [[statements]]
        table = "meta"
        layout = "counter"
        seed = { next_config_id = 1 }

        [[statements]]
        table = "info"
        layout = "text"
        seed = { schema = "erepo" }

        [[statements]]
        table = "records"
        layout = "record"
    "#;

    #[test]
    fn parse_accepts_valid_schema() {
        let schema = Schema::parse(SCHEMA, Path::new("schema.toml")).expect("parse");
        assert_eq!(schema.statements.len(), 3);
        assert_eq!(schema.statements[0].layout, TableLayout::Counter);
        assert_eq!(schema.statements[0].seed.get("next_config_id"), Some(&SeedValue::Int(1)));
    }

    #[test]
    fn parse_rejects_duplicate_tables() {
        let source = r#"
            version = 1
            [[statements]]
            table = "a"
            layout = "text"
            [[statements]]
            table = "a"
            layout = "counter"
        "#;
        let err = Schema::parse(source, Path::new("dup.toml")).expect_err("duplicate");
        assert!(matches!(err, RepoError::Schema { .. }));
    }

    #[test]
    fn parse_rejects_unknown_version() {
        let err = Schema::parse("version = 9", Path::new("v.toml")).expect_err("version");
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn apply_creates_tables_and_seeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create(dir.path().join("t.db")).expect("create");
        let schema = Schema::parse(SCHEMA, Path::new("schema.toml")).expect("parse");

        assert_eq!(schema.apply(&db, Path::new("schema.toml")).expect("apply"), 3);

        let txn = db.begin_read().expect("read");
        let meta = txn
            .open_table(TableDefinition::<&str, u64>::new("meta"))
            .expect("meta");
        assert_eq!(
            meta.get("next_config_id").expect("get").map(|v| v.value()),
            Some(1)
        );
    }

    #[test]
    fn apply_rejects_mismatched_seed() {
        let source = r#"
            version = 1
            [[statements]]
            table = "meta"
            layout = "counter"
            seed = { next = "one" }
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create(dir.path().join("t.db")).expect("create");
        let schema = Schema::parse(source, Path::new("bad.toml")).expect("parse");
        let err = schema.apply(&db, Path::new("bad.toml")).expect_err("bad seed");
        assert!(err.to_string().contains("must be an integer"));
    }
}
