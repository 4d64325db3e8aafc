//! Write-back caching in front of another backend

use tracing::{debug, info};

use super::{Snapshot, Storage};
use crate::error::Result;

/// Number of writes buffered before they reach the wrapped storage
pub const DEFAULT_WRITE_CACHE_SIZE: usize = 1000;

/// Serves reads from memory and batches writes to the wrapped storage
///
/// Pending writes are flushed every `write_cache_size` writes, on
/// [`flush`](Self::flush) and on [`close`](Storage::close). Data written
/// since the last flush is lost if the process dies first.
#[derive(Debug)]
pub struct CachingMiddleware<S> {
    storage: S,
    cache: Option<Snapshot>,
    pending: usize,
    write_cache_size: usize,
}

impl<S: Storage> CachingMiddleware<S> {
    /// Wrap `storage` with the default write cache size
    pub fn new(storage: S) -> Self {
        Self::with_write_cache_size(storage, DEFAULT_WRITE_CACHE_SIZE)
    }

    /// Wrap `storage`, flushing after `size` writes (at least one)
    pub fn with_write_cache_size(storage: S, size: usize) -> Self {
        Self {
            storage,
            cache: None,
            pending: 0,
            write_cache_size: size.max(1),
        }
    }

    /// Writes not yet flushed
    pub fn pending_writes(&self) -> usize {
        self.pending
    }

    /// Borrow the wrapped storage
    pub fn inner(&self) -> &S {
        &self.storage
    }

    /// Mutably borrow the wrapped storage
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Write pending data to the wrapped storage
    pub fn flush(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }

        if let Some(data) = &self.cache {
            self.storage.write(data)?;
        }
        info!(writes = self.pending, "flushed write cache");
        self.pending = 0;
        Ok(())
    }
}

impl<S: Storage> Storage for CachingMiddleware<S> {
    fn read(&mut self) -> Result<Option<Snapshot>> {
        if self.cache.is_none() {
            self.cache = self.storage.read()?;
        }
        Ok(self.cache.clone())
    }

    fn write(&mut self, data: &Snapshot) -> Result<()> {
        self.cache = Some(data.clone());
        self.pending += 1;

        if self.pending >= self.write_cache_size {
            self.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        debug!("closing wrapped storage");
        self.storage.close()
    }
}
