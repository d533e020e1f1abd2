// src/sheets/resources.rs
use bevy::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::column_registry::TransformationBinding;
use super::definitions::{CellMap, CellValue, ColumnDataType, ColumnRole};
use super::error::{PersistenceError, SheetError};
use super::persistence::{CsvPersistence, SheetPersistence};
use super::runner::{CancellationToken, RunId, RunRequest};
use super::sheet::Sheet;
use crate::transformations::Transformation;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Columns held by one running batch.
#[derive(Debug, Clone)]
struct RunLock {
    transformation: String,
    columns: BTreeSet<String>,
    outputs: BTreeSet<String>,
}

/// One open sheet plus its file, dirty flag and batch locks. Every mutation
/// of the sheet goes through here, so this is the single write path.
pub struct SheetSession {
    sheet: Sheet,
    path: Option<PathBuf>,
    dirty: bool,
    id: u64,
    next_run: u64,
    locks: BTreeMap<RunId, RunLock>,
    persistence: Arc<dyn SheetPersistence>,
}

impl std::fmt::Debug for SheetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetSession")
            .field("path", &self.path)
            .field("dirty", &self.dirty)
            .field("id", &self.id)
            .field("columns", &self.sheet.columns().len())
            .field("rows", &self.sheet.row_count())
            .finish()
    }
}

impl SheetSession {
    pub fn new(sheet: Sheet, path: Option<PathBuf>, persistence: Arc<dyn SheetPersistence>) -> Self {
        SheetSession {
            sheet,
            path,
            dirty: false,
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            next_run: 1,
            locks: BTreeMap::new(),
            persistence,
        }
    }

    /// Loads `path` through `persistence`.
    pub fn open(path: &Path, persistence: Arc<dyn SheetPersistence>) -> Result<Self, PersistenceError> {
        let sheet = persistence.load(path)?;
        Ok(Self::new(sheet, Some(path.to_path_buf()), persistence))
    }

    pub fn open_csv(path: &Path) -> Result<Self, PersistenceError> {
        Self::open(path, Arc::new(CsvPersistence))
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn persistence(&self) -> &Arc<dyn SheetPersistence> {
        &self.persistence
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Saves to the session path when there are unsaved changes. On failure
    /// the in-memory state stays as it is and the session stays dirty, so the
    /// next flush retries.
    pub fn flush(&mut self) -> Result<bool, PersistenceError> {
        let Some(path) = self.path.clone() else {
            return Ok(false);
        };
        if !self.dirty {
            return Ok(false);
        }
        match self.persistence.save(&path, &self.sheet) {
            Ok(()) => {
                self.dirty = false;
                Ok(true)
            }
            Err(e) => {
                error!("Auto-save to {:?} failed: {}", path, e);
                Err(e)
            }
        }
    }

    /// Saves to `path` and makes it the session path.
    pub fn save_as(&mut self, path: &Path) -> Result<(), PersistenceError> {
        self.persistence.save(path, &self.sheet)?;
        self.path = Some(path.to_path_buf());
        self.dirty = false;
        info!("Saved sheet to {:?}.", path);
        Ok(())
    }

    // --- Batch locks ---

    pub fn running_transformations(&self) -> Vec<&str> {
        self.locks.values().map(|l| l.transformation.as_str()).collect()
    }

    pub fn is_running(&self) -> bool {
        !self.locks.is_empty()
    }

    pub(crate) fn run_of(&self, transformation: &str) -> Option<RunId> {
        self.locks
            .iter()
            .find(|(_, lock)| lock.transformation == transformation)
            .map(|(id, _)| *id)
    }

    /// Locks every column of `binding` for a new batch of `transformation`.
    /// Two batches may share inputs but never an output, and a transformation
    /// runs at most once at a time.
    pub(crate) fn acquire_run_lock(
        &mut self,
        transformation: &str,
        binding: &TransformationBinding,
    ) -> Result<RunId, SheetError> {
        self.check_run_lock(transformation, binding)?;
        let id = RunId(self.next_run);
        self.next_run += 1;
        self.locks.insert(
            id,
            RunLock {
                transformation: transformation.to_string(),
                columns: binding.columns().cloned().collect(),
                outputs: binding.outputs.iter().cloned().collect(),
            },
        );
        debug!("Run {:?} locked columns of '{}'.", id, transformation);
        Ok(id)
    }

    /// Whether [`Self::acquire_run_lock`] would succeed, without taking the lock.
    pub(crate) fn check_run_lock(&self, transformation: &str, binding: &TransformationBinding) -> Result<(), SheetError> {
        for lock in self.locks.values() {
            if lock.transformation == transformation {
                return Err(SheetError::BatchInProgress(transformation.to_string()));
            }
            if let Some(column) = binding.outputs.iter().find(|o| lock.columns.contains(*o)) {
                return Err(SheetError::BatchInProgress(column.clone()));
            }
            if let Some(column) = binding.columns().find(|c| lock.outputs.contains(*c)) {
                return Err(SheetError::BatchInProgress(column.clone()));
            }
        }
        Ok(())
    }

    pub(crate) fn release_run_lock(&mut self, id: RunId) {
        if self.locks.remove(&id).is_some() {
            debug!("Run {:?} released its locks.", id);
        }
    }

    fn check_unlocked(&self, column: &str) -> Result<(), SheetError> {
        if self.locks.values().any(|l| l.columns.contains(column)) {
            warn!("Rejected structural change to '{}': batch in progress.", column);
            return Err(SheetError::BatchInProgress(column.to_string()));
        }
        Ok(())
    }

    fn check_not_running(&self, transformation: &str) -> Result<(), SheetError> {
        if self.locks.values().any(|l| l.transformation == transformation) {
            return Err(SheetError::BatchInProgress(transformation.to_string()));
        }
        Ok(())
    }

    /// Applies `edit` and marks the session dirty when it succeeds.
    fn apply<T>(&mut self, edit: impl FnOnce(&mut Sheet) -> Result<T, SheetError>) -> Result<T, SheetError> {
        let value = edit(&mut self.sheet)?;
        self.dirty = true;
        Ok(value)
    }

    /// Write path reserved for the runner, which already holds the locks.
    pub(crate) fn runner_edit<T>(
        &mut self,
        edit: impl FnOnce(&mut Sheet) -> Result<T, SheetError>,
    ) -> Result<T, SheetError> {
        self.apply(edit)
    }

    // --- Structural column operations (rejected while a batch holds the column) ---

    pub fn add_column(&mut self, name: &str, role: ColumnRole) -> Result<(), SheetError> {
        if let Some(producer) = role.producer() {
            self.check_not_running(producer)?;
        }
        self.apply(|s| s.add_column(name, role))
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<(), SheetError> {
        self.check_unlocked(old)?;
        self.check_unlocked(new)?;
        self.apply(|s| s.rename_column(old, new))
    }

    pub fn remove_column(&mut self, name: &str, force: bool) -> Result<Vec<String>, SheetError> {
        self.check_unlocked(name)?;
        self.apply(|s| s.remove_column(name, force))
    }

    pub fn set_column_type(&mut self, column: &str, data_type: ColumnDataType) -> Result<(), SheetError> {
        self.check_unlocked(column)?;
        self.apply(|s| s.set_column_type(column, data_type))
    }

    pub fn bind_output(&mut self, column: &str, transformation_id: &str) -> Result<(), SheetError> {
        self.check_unlocked(column)?;
        self.check_not_running(transformation_id)?;
        self.apply(|s| s.bind_output(column, transformation_id))
    }

    pub fn bind_transformation(
        &mut self,
        transformation: &dyn Transformation,
        binding: TransformationBinding,
    ) -> Result<(), SheetError> {
        self.check_not_running(transformation.name())?;
        for column in &binding.outputs {
            self.check_unlocked(column)?;
        }
        self.apply(|s| s.bind_transformation(transformation, binding))
    }

    pub fn unbind_transformation(&mut self, transformation_id: &str) -> Result<Option<TransformationBinding>, SheetError> {
        self.check_not_running(transformation_id)?;
        self.apply(|s| Ok(s.unbind_transformation(transformation_id)))
    }

    // --- Cell and row operations (always allowed) ---

    pub fn set_cell(&mut self, row: usize, column: &str, value: impl Into<CellValue>) -> Result<(), SheetError> {
        self.apply(|s| s.set_cell(row, column, value))
    }

    pub fn clear_cells(&mut self, row: usize, columns: &[String]) -> Result<(), SheetError> {
        self.apply(|s| s.clear_cells(row, columns))
    }

    pub fn add_row(&mut self, initial_values: CellMap) -> Result<usize, SheetError> {
        self.apply(|s| s.add_row(initial_values))
    }

    pub fn duplicate_row(&mut self, row: usize, reset_columns: &[String]) -> Result<usize, SheetError> {
        self.apply(|s| s.duplicate_row(row, reset_columns))
    }

    pub fn delete_rows(&mut self, indices: &[usize]) -> Result<usize, SheetError> {
        self.apply(|s| s.delete_rows(indices))
    }
}

/// The interactive app's open sheet and the cancellation handles of its
/// running batches.
#[derive(Resource, Default)]
pub struct SheetWorkspace {
    pub session: Option<SheetSession>,
    pub(crate) runs: HashMap<RunId, CancellationToken>,
    /// Batches waiting to start one after another (`run-all`).
    pub(crate) queued: VecDeque<RunRequest>,
}

impl SheetWorkspace {
    pub fn session(&self) -> Result<&SheetSession, SheetError> {
        self.session.as_ref().ok_or(SheetError::NoSheetLoaded)
    }

    pub fn session_mut(&mut self) -> Result<&mut SheetSession, SheetError> {
        self.session.as_mut().ok_or(SheetError::NoSheetLoaded)
    }

    /// Installs a freshly loaded session. Batches of the previous session are
    /// cancelled; their remaining writes are dropped by the session id check.
    pub fn replace_session(&mut self, session: SheetSession) -> Option<SheetSession> {
        self.cancel_all();
        self.session.replace(session)
    }

    pub fn cancel_all(&mut self) -> usize {
        if !self.queued.is_empty() {
            info!("Dropping {} queued batch(es).", self.queued.len());
            self.queued.clear();
        }
        for token in self.runs.values() {
            token.cancel();
        }
        self.runs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::persistence::memory::MemoryPersistence;

    fn session_with(persistence: &MemoryPersistence) -> SheetSession {
        let sheet = Sheet::with_columns(["JobURL", "ScrapedText", "Notes"]).unwrap();
        SheetSession::new(sheet, Some(PathBuf::from("jobs.csv")), Arc::new(persistence.clone()))
    }

    fn scrape_binding() -> TransformationBinding {
        TransformationBinding::identity(&["JobURL".to_string()], &["ScrapedText".to_string()])
    }

    #[test]
    fn flush_saves_only_when_dirty() {
        let store = MemoryPersistence::default();
        let mut session = session_with(&store);
        assert_eq!(session.flush(), Ok(false));
        session.add_row(CellMap::new()).unwrap();
        assert!(session.is_dirty());
        assert_eq!(session.flush(), Ok(true));
        assert_eq!(store.save_count(), 1);
        assert!(!session.is_dirty());
    }

    #[test]
    fn failed_flush_keeps_state_and_retries() {
        let store = MemoryPersistence::default();
        let mut session = session_with(&store);
        session.add_row(CellMap::new()).unwrap();
        store.set_failing(true);
        assert!(matches!(session.flush(), Err(PersistenceError::Write { .. })));
        assert!(session.is_dirty());
        assert_eq!(session.sheet().row_count(), 1);

        store.set_failing(false);
        assert_eq!(session.flush(), Ok(true));
        assert_eq!(store.saves().last().map(|s| s.row_count()), Some(1));
    }

    #[test]
    fn rejected_edit_does_not_dirty() {
        let store = MemoryPersistence::default();
        let mut session = session_with(&store);
        assert!(session.set_cell(0, "Notes", "x").is_err());
        assert!(!session.is_dirty());
    }

    #[test]
    fn structural_changes_wait_for_running_batch() {
        let store = MemoryPersistence::default();
        let mut session = session_with(&store);
        let run = session.acquire_run_lock("scrape", &scrape_binding()).unwrap();

        assert_eq!(
            session.rename_column("ScrapedText", "Text"),
            Err(SheetError::BatchInProgress("ScrapedText".into()))
        );
        assert_eq!(
            session.remove_column("JobURL", true),
            Err(SheetError::BatchInProgress("JobURL".into()))
        );
        assert_eq!(
            session.acquire_run_lock("scrape", &scrape_binding()),
            Err(SheetError::BatchInProgress("scrape".into()))
        );
        // unrelated columns and plain cell edits stay available
        session.rename_column("Notes", "Comments").unwrap();
        session.add_row(CellMap::new()).unwrap();
        session.set_cell(0, "JobURL", "http://x").unwrap();

        session.release_run_lock(run);
        session.rename_column("ScrapedText", "Text").unwrap();
    }

    #[test]
    fn batches_may_share_inputs_but_not_outputs() {
        let store = MemoryPersistence::default();
        let mut session = session_with(&store);
        session.acquire_run_lock("scrape", &scrape_binding()).unwrap();
        let summary = TransformationBinding::identity(&["JobURL".to_string()], &["Notes".to_string()]);
        assert!(session.acquire_run_lock("llm", &summary).is_ok());
        let clash = TransformationBinding::identity(&["Notes".to_string()], &["ScrapedText".to_string()]);
        assert!(session.acquire_run_lock("other", &clash).is_err());
    }
}
