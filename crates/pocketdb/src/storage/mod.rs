//! Storage backends
//!
//! A backend persists one [`Snapshot`]: every table's documents, keyed by
//! table name and then by document ID. Each read and write moves the whole
//! snapshot; tables do their own read-modify-write on top of it.

mod json;
mod memory;
mod middleware;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::document::{DocId, Fields};
use crate::error::Result;

pub use json::{JsonStorage, JsonStorageOptions};
pub use memory::MemoryStorage;
pub use middleware::{CachingMiddleware, DEFAULT_WRITE_CACHE_SIZE};

/// Documents of one table by ID
pub type TableData = BTreeMap<DocId, Fields>;

/// Full persisted state: table name to table data
pub type Snapshot = BTreeMap<String, TableData>;

/// A place to persist snapshots
pub trait Storage: Send {
    /// Load the stored snapshot, or `None` if nothing was written yet
    fn read(&mut self) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot
    fn write(&mut self, data: &Snapshot) -> Result<()>;

    /// Release held resources; calling it twice is fine
    fn close(&mut self) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn read(&mut self) -> Result<Option<Snapshot>> {
        (**self).read()
    }

    fn write(&mut self, data: &Snapshot) -> Result<()> {
        (**self).write(data)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Shared, thread-safe handle to a storage backend
///
/// A database and all of its tables hold clones of the same handle.
#[derive(Clone)]
pub struct StorageHandle {
    inner: Arc<Mutex<Box<dyn Storage>>>,
}

impl StorageHandle {
    /// Wrap a backend
    pub fn new<S: Storage + 'static>(storage: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(storage))),
        }
    }

    /// Read the current snapshot
    pub fn read(&self) -> Result<Option<Snapshot>> {
        self.inner.lock().read()
    }

    /// Replace the stored snapshot
    pub fn write(&self, data: &Snapshot) -> Result<()> {
        self.inner.lock().write(data)
    }

    /// Close the backend
    pub fn close(&self) -> Result<()> {
        self.inner.lock().close()
    }

    /// Run `f` with exclusive access to the backend
    ///
    /// Lets a caller read, modify and write back without another handle
    /// interleaving.
    pub fn with<T>(&self, f: impl FnOnce(&mut dyn Storage) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock();
        f(&mut **guard)
    }

    /// True if both handles point at the same backend
    pub fn same_as(&self, other: &StorageHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
