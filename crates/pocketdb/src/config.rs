//! Database and table configuration
//!
//! Both structs deserialize from JSON with every field optional:
//!
//! ```
//! use pocketdb::DatabaseConfig;
//!
//! let config: DatabaseConfig =
//!     serde_json::from_str(r#"{"table": {"query_cache_capacity": 64}}"#).unwrap();
//! assert_eq!(config.default_table, "_default");
//! assert_eq!(config.table.query_cache_capacity, Some(64));
//! ```

use serde::Deserialize;

use crate::document::DocId;

/// Name of the table used by [`Database::default_table`](crate::Database::default_table)
pub const DEFAULT_TABLE: &str = "_default";

/// Query cache size used when none is configured
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 10;

/// Per-table settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Maximum cached query results; `None` or `Some(0)` is unbounded
    pub query_cache_capacity: Option<usize>,

    /// ID of the first document in an empty table
    pub first_id: DocId,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            query_cache_capacity: Some(DEFAULT_QUERY_CACHE_CAPACITY),
            first_id: DocId(1),
        }
    }
}

/// Database-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Table returned by `default_table()`
    pub default_table: String,

    /// Settings applied to every table the database creates
    pub table: TableConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_table: DEFAULT_TABLE.to_string(),
            table: TableConfig::default(),
        }
    }
}
