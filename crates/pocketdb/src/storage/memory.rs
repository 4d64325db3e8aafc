//! In-memory backend

use tracing::trace;

use super::{Snapshot, Storage};
use crate::error::Result;

/// Keeps the snapshot in memory; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    memory: Option<Snapshot>,
}

impl MemoryStorage {
    /// Create an empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&mut self) -> Result<Option<Snapshot>> {
        Ok(self.memory.clone())
    }

    fn write(&mut self, data: &Snapshot) -> Result<()> {
        trace!(tables = data.len(), "memory storage write");
        self.memory = Some(data.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
