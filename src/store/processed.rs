use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ProcessingError, Result};

/// Set of file identifiers (`"<station> -> <file>"`) already ingested.
pub trait ProcessedFileRegistry: Send + Sync {
    fn contains(&self, file_id: &str) -> Result<bool>;

    /// Returns `true` when the identifier was not yet present.
    fn mark(&self, file_id: &str) -> Result<bool>;

    fn clear(&self) -> Result<()>;

    /// Remove every identifier for which `remove` returns `true`; returns how many went.
    fn remove_matching(&self, remove: &dyn Fn(&str) -> bool) -> Result<usize>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Process-lifetime registry. Rebuilt from scratch by a full reset and rescan.
#[derive(Debug, Default)]
pub struct InMemoryProcessedFiles {
    files: RwLock<HashSet<String>>,
}

impl InMemoryProcessedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashSet<String>>> {
        self.files
            .read()
            .map_err(|_| ProcessingError::Store("processed-file registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashSet<String>>> {
        self.files
            .write()
            .map_err(|_| ProcessingError::Store("processed-file registry lock poisoned".to_string()))
    }
}

impl ProcessedFileRegistry for InMemoryProcessedFiles {
    fn contains(&self, file_id: &str) -> Result<bool> {
        Ok(self.read()?.contains(file_id))
    }

    fn mark(&self, file_id: &str) -> Result<bool> {
        Ok(self.write()?.insert(file_id.to_string()))
    }

    fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    fn remove_matching(&self, remove: &dyn Fn(&str) -> bool) -> Result<usize> {
        let mut files = self.write()?;
        let before = files.len();
        files.retain(|file_id| !remove(file_id));
        Ok(before - files.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}
