// src/sheets/runner.rs
//! Per-row dispatch of a transformation over selected rows.
//!
//! A batch is planned once ([`TransformationRunner::plan`]) and then stepped
//! row by row: [`RunPlan::begin_row`] reads the inputs, the transformation
//! executes without access to the sheet, and [`RunPlan::commit_row`] writes
//! all of a row's outputs or none of them. The synchronous
//! [`TransformationRunner::run`] and the async batch system both drive this
//! same sequence.

use bevy::log::{debug, info, warn};
use bevy::prelude::Resource;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::column_registry::TransformationBinding;
use super::definitions::{CellMap, CellValue, RowId};
use super::error::{PersistenceError, SheetError};
use super::resources::SheetSession;
use super::sheet::Sheet;
use crate::transformations::{Transformation, TransformationError, TransformationInfo, TransformationRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Skip rows whose bound outputs all hold a value.
    #[default]
    SkipPopulated,
    /// Skip populated rows only when their inputs did not change since the
    /// last successful run.
    SkipUnchanged,
    /// Run every selected row.
    Force,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub transformation: String,
    pub rows: BTreeSet<usize>,
    pub policy: OverwritePolicy,
}

impl RunRequest {
    pub fn new(transformation: impl Into<String>, rows: impl IntoIterator<Item = usize>) -> Self {
        RunRequest {
            transformation: transformation.into(),
            rows: rows.into_iter().collect(),
            policy: OverwritePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: OverwritePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyPopulated,
    Unchanged,
    ConditionNotMet,
    RowRemoved,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::AlreadyPopulated => "already populated",
            SkipReason::Unchanged => "inputs unchanged",
            SkipReason::ConditionNotMet => "condition not met",
            SkipReason::RowRemoved => "row removed",
            SkipReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Values written, keyed by sheet column.
    Success { outputs: CellMap },
    Skipped(SkipReason),
    Failed(TransformationError),
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success { .. } => f.write_str("success"),
            RunStatus::Skipped(reason) => write!(f, "skipped ({})", reason),
            RunStatus::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Outcome for one requested row. `row_index` is the index given in the
/// request, even if the row has moved since.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub row_index: usize,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn tally(results: &[RunResult]) -> Self {
        results.iter().fold(BatchSummary::default(), |mut acc, r| {
            match r.status {
                RunStatus::Success { .. } => acc.succeeded += 1,
                RunStatus::Skipped(_) => acc.skipped += 1,
                RunStatus::Failed(_) => acc.failed += 1,
            }
            acc
        })
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub transformation: String,
    /// Ascending by requested row index.
    pub results: Vec<RunResult>,
    pub summary: BatchSummary,
    /// Set when a per-row flush failed; the data is still in memory.
    pub last_flush_error: Option<PersistenceError>,
}

impl BatchResult {
    pub fn failed_rows(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, RunStatus::Failed(_)))
            .map(|r| r.row_index)
            .collect()
    }

    /// Forced request over just the failed rows, or `None` when nothing failed.
    pub fn retry_request(&self) -> Option<RunRequest> {
        let rows = self.failed_rows();
        if rows.is_empty() {
            return None;
        }
        Some(RunRequest::new(self.transformation.clone(), rows).with_policy(OverwritePolicy::Force))
    }
}

/// Cooperative cancellation flag, checked between rows.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// SHA-256 over the input values in declared order, joined with `|`.
pub fn input_signature(declared_inputs: &[String], inputs: &CellMap) -> String {
    let joined = declared_inputs
        .iter()
        .map(|name| inputs.get(name).map(|v| v.to_string()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|");
    let digest = Sha256::digest(joined.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, Copy)]
struct PlannedRow {
    requested: usize,
    row_id: RowId,
}

/// What to do with one planned row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowStep {
    Finished(RunResult),
    Execute { inputs: CellMap, signature: String },
}

/// A validated batch. Holds the batch's column lock until [`RunPlan::finish`].
pub struct RunPlan {
    run_id: RunId,
    session_id: u64,
    transformation: Arc<dyn Transformation>,
    binding: TransformationBinding,
    policy: OverwritePolicy,
    rows: Vec<PlannedRow>,
}

impl RunPlan {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn transformation(&self) -> &Arc<dyn Transformation> {
        &self.transformation
    }

    pub fn requested_index(&self, slot: usize) -> usize {
        self.rows[slot].requested
    }

    fn finished(&self, slot: usize, status: RunStatus) -> RowStep {
        RowStep::Finished(RunResult {
            row_index: self.rows[slot].requested,
            status,
        })
    }

    /// Current position of the planned row, or `None` once it is gone (or the
    /// session was replaced).
    fn locate(&self, session: &SheetSession, slot: usize) -> Option<usize> {
        if session.id() != self.session_id {
            return None;
        }
        session.sheet().position_of(self.rows[slot].row_id)
    }

    /// Applies the overwrite policy and the binding condition, then reads the
    /// row's inputs keyed by declared input name.
    pub fn begin_row(&self, session: &SheetSession, slot: usize) -> RowStep {
        let Some(index) = self.locate(session, slot) else {
            return self.finished(slot, RunStatus::Skipped(SkipReason::RowRemoved));
        };
        let Some(row) = session.sheet().rows().get(index) else {
            return self.finished(slot, RunStatus::Skipped(SkipReason::RowRemoved));
        };
        let unset = CellValue::Unset;
        let cell = |column: &String| row.cell(column).unwrap_or(&unset);

        let name = self.transformation.name();
        let inputs: CellMap = self
            .transformation
            .inputs()
            .iter()
            .zip(&self.binding.inputs)
            .map(|(declared, column)| (declared.clone(), cell(column).clone()))
            .collect();
        let signature = input_signature(self.transformation.inputs(), &inputs);

        let populated = self.binding.outputs.iter().all(|c| !cell(c).is_unset());
        match self.policy {
            OverwritePolicy::SkipPopulated if populated => {
                return self.finished(slot, RunStatus::Skipped(SkipReason::AlreadyPopulated));
            }
            OverwritePolicy::SkipUnchanged if populated && row.signature(name) == Some(signature.as_str()) => {
                return self.finished(slot, RunStatus::Skipped(SkipReason::Unchanged));
            }
            _ => {}
        }

        if let Some(condition) = &self.binding.condition {
            if !condition.matches(condition.columns.iter().map(cell)) {
                return self.finished(slot, RunStatus::Skipped(SkipReason::ConditionNotMet));
            }
        }

        if populated && !self.transformation.is_idempotent() {
            warn!(
                "Re-running non-idempotent '{}' on row {} which already has output.",
                name, self.rows[slot].requested
            );
        }
        RowStep::Execute { inputs, signature }
    }

    /// Records the outcome of one row. On success every bound output column
    /// is written (created first if missing) along with the input signature;
    /// on any failure nothing in the row changes.
    pub fn commit_row(
        &self,
        session: &mut SheetSession,
        slot: usize,
        outcome: Result<CellMap, TransformationError>,
        signature: String,
    ) -> RunResult {
        let requested = self.rows[slot].requested;
        let name = self.transformation.name().to_string();
        let fail = |error: TransformationError| {
            warn!("'{}' failed on row {}: {}", name, requested, error);
            RunResult {
                row_index: requested,
                status: RunStatus::Failed(error),
            }
        };

        let mut returned = match outcome {
            Ok(values) => values,
            Err(e) => return fail(e),
        };
        let declared: HashSet<&str> = self.transformation.outputs().iter().map(String::as_str).collect();
        let got: HashSet<&str> = returned.keys().map(String::as_str).collect();
        if declared != got {
            let mut got: Vec<&str> = got.into_iter().collect();
            got.sort_unstable();
            return fail(TransformationError::Validation(format!(
                "returned columns {:?}, expected {:?}",
                got,
                self.transformation.outputs()
            )));
        }

        let Some(index) = self.locate(session, slot) else {
            debug!("Row {} of '{}' vanished before its result arrived.", requested, name);
            return self.removed(slot);
        };

        let writes: Vec<(String, CellValue)> = self
            .transformation
            .outputs()
            .iter()
            .zip(&self.binding.outputs)
            .map(|(declared, column)| (column.clone(), returned.remove(declared).unwrap_or_default()))
            .collect();

        let outputs = self.binding.outputs.clone();
        let committed = session.runner_edit(|sheet| {
            for column in &outputs {
                if let Some(owner) = sheet.columns().producer_of(column) {
                    if owner != name {
                        return Err(SheetError::ColumnConflict {
                            column: column.clone(),
                            bound_to: owner.to_string(),
                        });
                    }
                }
            }
            for column in &outputs {
                sheet.ensure_output_column(column, &name)?;
            }
            sheet.set_cells(index, writes.clone())?;
            sheet.set_signature(index, &name, signature);
            Ok(())
        });
        if let Err(e) = committed {
            return fail(TransformationError::Validation(e.to_string()));
        }

        RunResult {
            row_index: requested,
            status: RunStatus::Success {
                outputs: writes.into_iter().collect(),
            },
        }
    }

    /// Result for a row whose session is gone.
    pub fn removed(&self, slot: usize) -> RunResult {
        RunResult {
            row_index: self.rows[slot].requested,
            status: RunStatus::Skipped(SkipReason::RowRemoved),
        }
    }

    pub fn cancelled(&self, slot: usize) -> RunResult {
        RunResult {
            row_index: self.rows[slot].requested,
            status: RunStatus::Skipped(SkipReason::Cancelled),
        }
    }

    /// Releases the batch's lock and aggregates the results.
    pub fn finish(
        &self,
        session: Option<&mut SheetSession>,
        mut results: Vec<RunResult>,
        last_flush_error: Option<PersistenceError>,
    ) -> BatchResult {
        if let Some(session) = session.filter(|s| s.id() == self.session_id) {
            session.release_run_lock(self.run_id);
        }
        results.sort_by_key(|r| r.row_index);
        let summary = BatchSummary::tally(&results);
        info!("Batch '{}' finished: {}.", self.transformation.name(), summary);
        BatchResult {
            transformation: self.transformation.name().to_string(),
            results,
            summary,
            last_flush_error,
        }
    }
}

/// Looks transformations up by name and plans batches against a session.
#[derive(Resource, Clone)]
pub struct TransformationRunner {
    registry: Arc<TransformationRegistry>,
}

impl TransformationRunner {
    pub fn new(registry: TransformationRegistry) -> Self {
        TransformationRunner {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &TransformationRegistry {
        &self.registry
    }

    pub fn list_available_transformations(&self) -> Vec<TransformationInfo> {
        self.registry.list_available_transformations()
    }

    /// Validates `request`, resolves the rows to stable ids and locks the
    /// binding's columns. Every requested index must exist when planning.
    /// Installs the identity binding when the transformation has not been
    /// bound yet; a rejected request leaves the session untouched.
    pub fn plan(&self, session: &mut SheetSession, request: &RunRequest) -> Result<RunPlan, SheetError> {
        let transformation = self.registry.get(&request.transformation)?;
        if request.rows.is_empty() {
            return Err(SheetError::EmptyRowSet(request.transformation.clone()));
        }
        let len = session.sheet().row_count();
        let rows = request
            .rows
            .iter()
            .map(|&requested| {
                session
                    .sheet()
                    .row_id(requested)
                    .map(|row_id| PlannedRow { requested, row_id })
                    .ok_or(SheetError::IndexOutOfRange { index: requested, len })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let name = transformation.name().to_string();
        let binding = match session.sheet().columns().binding(&name) {
            Some(binding) => binding.clone(),
            None => {
                let identity = TransformationBinding::identity(transformation.inputs(), transformation.outputs());
                session.check_run_lock(&name, &identity)?;
                session.bind_transformation(transformation.as_ref(), identity.clone())?;
                identity
            }
        };
        let run_id = session.acquire_run_lock(&name, &binding)?;
        info!(
            "Planned '{}' over {} row(s) ({:?}).",
            name,
            request.rows.len(),
            request.policy
        );
        Ok(RunPlan {
            run_id,
            session_id: session.id(),
            transformation,
            binding,
            policy: request.policy,
            rows,
        })
    }

    /// One `SkipUnchanged` request over every row for each bound
    /// transformation, in the registry's run order. Bindings whose
    /// transformation is not registered are left out.
    pub fn run_all_requests(&self, sheet: &Sheet) -> Vec<RunRequest> {
        if sheet.row_count() == 0 {
            return Vec::new();
        }
        sheet
            .columns()
            .run_order()
            .into_iter()
            .filter(|id| {
                let known = self.registry.contains(id);
                if !known {
                    warn!("Skipping binding '{}': no such transformation.", id);
                }
                known
            })
            .map(|id| RunRequest::new(id, 0..sheet.row_count()).with_policy(OverwritePolicy::SkipUnchanged))
            .collect()
    }

    /// Runs every request of [`Self::run_all_requests`] one after another. A
    /// rejected plan is reported in place and the remaining batches still run.
    pub fn run_all<F>(
        &self,
        session: &mut SheetSession,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Vec<Result<BatchResult, SheetError>>
    where
        F: FnMut(&str, &RunResult),
    {
        let requests = self.run_all_requests(session.sheet());
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            if cancel.is_cancelled() {
                break;
            }
            let name = request.transformation.clone();
            let outcome = self.run(session, &request, cancel, |result| on_progress(&name, result));
            if let Err(e) = &outcome {
                warn!("'{}' was not started: {}", name, e);
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Runs a whole batch on the calling thread, flushing after every row.
    /// Only a malformed request is an error; row failures land in the result.
    pub fn run<F>(
        &self,
        session: &mut SheetSession,
        request: &RunRequest,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<BatchResult, SheetError>
    where
        F: FnMut(&RunResult),
    {
        let plan = self.plan(session, request)?;
        let mut results = Vec::with_capacity(plan.len());
        let mut last_flush_error = None;
        for slot in 0..plan.len() {
            let result = if cancel.is_cancelled() {
                plan.cancelled(slot)
            } else {
                match plan.begin_row(session, slot) {
                    RowStep::Finished(result) => result,
                    RowStep::Execute { inputs, signature } => {
                        let outcome = plan.transformation().execute(&inputs);
                        plan.commit_row(session, slot, outcome, signature)
                    }
                }
            };
            if let Err(e) = session.flush() {
                last_flush_error = Some(e);
            }
            on_progress(&result);
            results.push(result);
        }
        Ok(plan.finish(Some(session), results, last_flush_error))
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod runner_tests;
