// src/sheets/error.rs

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Structural errors raised by the column registry, the row store and run
/// request validation. Returning one of these means nothing was changed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SheetError {
    #[error("Column '{0}' already exists.")]
    DuplicateColumn(String),
    #[error("Unknown column '{0}'.")]
    UnknownColumn(String),
    #[error("Column name '{0}' is not valid.")]
    InvalidColumnName(String),
    #[error("Column '{column}' is used by transformation '{transformation}'.")]
    ColumnInUse { column: String, transformation: String },
    #[error("Column '{column}' is already produced by transformation '{bound_to}'.")]
    ColumnConflict { column: String, bound_to: String },
    #[error("Row index {index} out of range ({len} rows).")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Unknown transformation '{0}'.")]
    UnknownTransformation(String),
    #[error("Run request for '{0}' selects no rows.")]
    EmptyRowSet(String),
    #[error("Transformation '{transformation}' declares {expected} {side} column(s), got {actual}.")]
    BindingArity {
        transformation: String,
        side: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("'{0}' is locked by a running batch.")]
    BatchInProgress(String),
    #[error("No sheet is loaded.")]
    NoSheetLoaded,
}

/// Errors surfaced by the persistence adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Cannot read '{path}': {reason}")]
    UnreadableFile { path: PathBuf, reason: String },
    #[error("Invalid sheet file '{path}': {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("Cannot write '{path}': {reason}")]
    Write { path: PathBuf, reason: String },
}

impl PersistenceError {
    pub(crate) fn unreadable(path: &Path, reason: impl ToString) -> Self {
        PersistenceError::UnreadableFile {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn format(path: &Path, reason: impl ToString) -> Self {
        PersistenceError::Format {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: &Path, reason: impl ToString) -> Self {
        PersistenceError::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
