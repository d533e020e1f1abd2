// src/sheets/persistence/memory.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::SheetPersistence;
use crate::sheets::error::PersistenceError;
use crate::sheets::sheet::Sheet;

/// In-memory adapter that records every save, for session and runner tests.
#[derive(Default, Clone)]
pub struct MemoryPersistence {
    files: Arc<Mutex<HashMap<PathBuf, Sheet>>>,
    history: Arc<Mutex<Vec<Sheet>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryPersistence {
    pub fn saves(&self) -> Vec<Sheet> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

impl SheetPersistence for MemoryPersistence {
    fn load(&self, path: &Path) -> Result<Sheet, PersistenceError> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(path).cloned())
            .ok_or_else(|| PersistenceError::unreadable(path, "not found"))
    }

    fn save(&self, path: &Path, sheet: &Sheet) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::write(path, "disk full"));
        }
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.to_path_buf(), sheet.clone());
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(sheet.clone());
        }
        Ok(())
    }
}
