// src/sheets/events.rs
use bevy::prelude::Event;
use std::path::PathBuf;

use super::column_registry::TransformationBinding;
use super::definitions::{CellMap, CellValue, ColumnDataType, ColumnRole};
use super::runner::{BatchResult, OverwritePolicy, RunResult};

/// Open a CSV sheet and make it the active session.
#[derive(Event, Debug, Clone)]
pub struct RequestLoadSheet {
    pub path: PathBuf,
}

/// Write a fresh two-column sheet to `path` and open it.
#[derive(Event, Debug, Clone)]
pub struct RequestCreateSheet {
    pub path: PathBuf,
}

/// Save the active sheet. `None` saves to the current path.
#[derive(Event, Debug, Clone, Default)]
pub struct RequestSaveSheet {
    pub path: Option<PathBuf>,
}

/// Write an Excel copy of the active sheet without changing its path.
#[derive(Event, Debug, Clone)]
pub struct RequestExportSheet {
    pub path: PathBuf,
}

#[derive(Event, Debug, Clone)]
pub struct RequestAddColumn {
    pub name: String,
    pub role: ColumnRole,
}

#[derive(Event, Debug, Clone)]
pub struct RequestRenameColumn {
    pub old_name: String,
    pub new_name: String,
}

#[derive(Event, Debug, Clone)]
pub struct RequestRemoveColumn {
    pub name: String,
    pub force: bool,
}

#[derive(Event, Debug, Clone)]
pub struct RequestSetColumnType {
    pub column: String,
    pub data_type: ColumnDataType,
}

#[derive(Event, Debug, Clone)]
pub struct RequestBindTransformation {
    pub transformation: String,
    pub binding: TransformationBinding,
}

#[derive(Event, Debug, Clone)]
pub struct RequestUnbindTransformation {
    pub transformation: String,
}

/// Append a row. Handled by systems in `sheets::systems::logic`.
#[derive(Event, Debug, Clone, Default)]
pub struct AddSheetRowRequest {
    pub initial_values: CellMap,
}

/// Copy a row below itself, resetting the configured columns in the copy.
#[derive(Event, Debug, Clone)]
pub struct RequestDuplicateRow {
    pub row_index: usize,
}

#[derive(Event, Debug, Clone)]
pub struct RequestDeleteRows {
    pub row_indices: Vec<usize>,
}

#[derive(Event, Debug, Clone)]
pub struct UpdateCellEvent {
    pub row_index: usize,
    pub column: String,
    pub new_value: CellValue,
}

#[derive(Event, Debug, Clone)]
pub struct RequestClearCells {
    pub row_index: usize,
    pub columns: Vec<String>,
}

#[derive(Event, Debug, Clone)]
pub struct RequestRunTransformation {
    pub transformation: String,
    pub rows: Vec<usize>,
    pub policy: OverwritePolicy,
}

/// Queue one batch per bound transformation over every row, producers first.
/// Rows whose inputs did not change since their last success are skipped.
#[derive(Event, Debug, Clone, Default)]
pub struct RequestRunAll;

/// Cancel running batches; `None` cancels all of them.
#[derive(Event, Debug, Clone, Default)]
pub struct RequestCancelRun {
    pub transformation: Option<String>,
}

/// Sent once per processed row of a running batch.
#[derive(Event, Debug, Clone)]
pub struct RunProgressEvent {
    pub transformation: String,
    pub result: RunResult,
    pub done: usize,
    pub total: usize,
}

#[derive(Event, Debug, Clone)]
pub struct RunCompletedEvent {
    pub result: BatchResult,
}

/// Sent after any accepted change to the active sheet's cells or columns.
#[derive(Event, Debug, Clone)]
pub struct SheetDataModifiedInRegistryEvent;

/// User-facing outcome of a sheet operation.
#[derive(Event, Debug, Clone)]
pub struct SheetOperationFeedback {
    pub message: String,
    pub is_error: bool,
}

impl SheetOperationFeedback {
    pub fn ok(message: impl Into<String>) -> Self {
        SheetOperationFeedback {
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SheetOperationFeedback {
            message: message.into(),
            is_error: true,
        }
    }
}

/// Orderly shutdown: optional backup, then `AppExit`.
#[derive(Event, Debug, Clone)]
pub struct RequestAppExit;
