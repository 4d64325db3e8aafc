//! # pocketdb
//!
//! Embedded document store: JSON documents grouped into named tables,
//! persisted through a pluggable storage backend.
//!
//! ## Overview
//! - Documents are JSON objects identified by a per-table integer ID
//! - Queries are composable predicates over field paths
//! - Results of repeatable queries are memoized per table in an LRU cache
//! - Every write is a whole-snapshot read-modify-write on the backend
//!
//! ```
//! use pocketdb::{operations::set, query::field, Database, DocId};
//! use serde_json::json;
//!
//! let db = Database::in_memory();
//! let books = db.table("books");
//!
//! books.insert(json!({"title": "Dune", "year": 1965})).unwrap();
//! books.insert(json!({"title": "Neuromancer", "year": 1984})).unwrap();
//!
//! let old = books.search(&field("year").lt(1970)).unwrap();
//! assert_eq!(old[0].doc_id(), DocId(1));
//!
//! books.update(set("read", true), field("title").eq("Dune")).unwrap();
//! assert_eq!(books.count(&field("read").exists()).unwrap(), 1);
//! ```

#![warn(missing_docs)]

mod config;
mod database;
mod document;
mod error;
pub mod frozen;
pub mod operations;
pub mod query;
pub mod storage;
mod table;

pub use config::{DatabaseConfig, TableConfig, DEFAULT_QUERY_CACHE_CAPACITY, DEFAULT_TABLE};
pub use database::Database;
pub use document::{DocId, Document, Fields, IntoDocument};
pub use error::{Error, PredicateError, Result};
pub use frozen::{freeze, Frozen};
pub use query::{field, Path, Query};
pub use table::{Fetched, IntoUpdate, Selector, Table, Update};
