//! Database handle: shared storage plus a registry of tables

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::storage::{JsonStorage, JsonStorageOptions, MemoryStorage, Snapshot, Storage, StorageHandle};
use crate::table::Table;

/// Entry point: owns the storage and hands out tables
///
/// ```
/// use pocketdb::{query::field, Database};
/// use serde_json::json;
///
/// let db = Database::in_memory();
/// let fruit = db.table("fruit");
/// fruit.insert(json!({"name": "apple", "count": 3})).unwrap();
///
/// let found = fruit.search(&field("count").gt(1)).unwrap();
/// assert_eq!(found.len(), 1);
/// assert!(db.tables().unwrap().contains("fruit"));
/// ```
pub struct Database {
    storage: StorageHandle,
    config: DatabaseConfig,

    /// Tables handed out so far, by name
    tables: RwLock<HashMap<String, Arc<Table>>>,

    /// Is the database closed?
    closed: AtomicBool,
}

impl Database {
    /// Open a database over any storage backend
    pub fn new<S: Storage + 'static>(storage: S, config: DatabaseConfig) -> Self {
        Self::with_handle(StorageHandle::new(storage), config)
    }

    /// Open a database over an existing storage handle
    pub fn with_handle(storage: StorageHandle, config: DatabaseConfig) -> Self {
        info!(default_table = %config.default_table, "opened database");
        Self {
            storage,
            config,
            tables: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Volatile database with default settings
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new(), DatabaseConfig::default())
    }

    /// Database persisted to a JSON file, with default settings
    ///
    /// # Arguments
    /// * `path` - Path of the JSON file
    /// * `options` - How the file is opened and written
    pub fn open_json<P: AsRef<Path>>(path: P, options: JsonStorageOptions) -> Result<Self> {
        let storage = JsonStorage::open(path, options)?;
        Ok(Self::new(storage, DatabaseConfig::default()))
    }

    /// Settings the database was opened with
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Shared storage handle
    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// The table called `name`, created on first use
    ///
    /// Repeated calls return the same instance, so its query cache is
    /// shared by every caller.
    pub fn table(&self, name: &str) -> Arc<Table> {
        if let Some(table) = self.tables.read().get(name) {
            return Arc::clone(table);
        }

        let mut tables = self.tables.write();
        let table = tables.entry(name.to_string()).or_insert_with(|| {
            debug!(table = name, "created table handle");
            Arc::new(Table::new(name, self.storage.clone(), self.config.table.clone()))
        });
        Arc::clone(table)
    }

    /// The table named by [`DatabaseConfig::default_table`]
    pub fn default_table(&self) -> Arc<Table> {
        self.table(&self.config.default_table)
    }

    /// Names of the tables present in storage
    ///
    /// A table shows up once something was written to it, even if it is
    /// empty now.
    pub fn tables(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .storage
            .read()?
            .map(|snapshot| snapshot.into_keys().collect())
            .unwrap_or_default())
    }

    /// Delete a table and all its documents; unknown names are ignored
    pub fn drop_table(&self, name: &str) -> Result<()> {
        if let Some(table) = self.tables.write().remove(name) {
            table.clear_cache();
        }

        self.storage.with(|storage| {
            let Some(mut snapshot) = storage.read()? else {
                return Ok(());
            };
            if snapshot.remove(name).is_none() {
                return Ok(());
            }
            storage.write(&snapshot)
        })?;

        debug!(table = name, "dropped table");
        Ok(())
    }

    /// Delete every table
    pub fn drop_tables(&self) -> Result<()> {
        for (_, table) in self.tables.write().drain() {
            table.clear_cache();
        }

        self.storage.write(&Snapshot::new())?;
        debug!("dropped all tables");
        Ok(())
    }

    /// Close the storage; later calls do nothing
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            trace!("database already closed");
            return Ok(());
        }

        self.storage.close()?;
        info!("closed database");
        Ok(())
    }

    /// False once [`close`](Self::close) was called
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tables: Vec<String> = self.tables.read().keys().cloned().collect();
        tables.sort();
        f.debug_struct("Database")
            .field("tables", &tables)
            .field("default_table", &self.config.default_table)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
