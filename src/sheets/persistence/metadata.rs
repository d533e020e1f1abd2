// src/sheets/persistence/metadata.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::write_atomically;
use crate::sheets::column_registry::TransformationBinding;
use crate::sheets::definitions::ColumnDefinition;
use crate::sheets::error::PersistenceError;
use crate::sheets::sheet::Sheet;

pub const SIDECAR_VERSION: u32 = 1;

fn current_version() -> u32 {
    SIDECAR_VERSION
}

/// Sidecar contents. `row_signatures[i]` belongs to CSV data row `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSidecar {
    #[serde(default = "current_version")]
    pub version: u32,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub bindings: BTreeMap<String, TransformationBinding>,
    #[serde(default)]
    pub row_signatures: Vec<BTreeMap<String, String>>,
}

impl SheetSidecar {
    pub fn from_sheet(sheet: &Sheet) -> Self {
        SheetSidecar {
            version: SIDECAR_VERSION,
            columns: sheet.columns().columns().to_vec(),
            bindings: sheet.columns().bindings().clone(),
            row_signatures: sheet.rows().iter().map(|r| r.signatures().clone()).collect(),
        }
    }
}

/// `jobs.csv` -> `jobs_metadata.json`, next to the data file.
pub fn sidecar_path(data_path: &Path) -> PathBuf {
    let stem = data_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    data_path.with_file_name(format!("{}_metadata.json", stem))
}

/// `Ok(None)` when there is no sidecar.
pub fn read_sidecar(path: &Path) -> Result<Option<SheetSidecar>, PersistenceError> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| PersistenceError::format(path, e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PersistenceError::unreadable(path, e)),
    }
}

pub fn write_sidecar(path: &Path, sidecar: &SheetSidecar) -> Result<(), PersistenceError> {
    write_atomically(path, |file| {
        serde_json::to_writer_pretty(file, sidecar).map_err(|e| PersistenceError::write(path, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_sits_next_to_data_file() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/search/jobs.csv")),
            PathBuf::from("/tmp/search/jobs_metadata.json")
        );
    }

    #[test]
    fn old_sidecar_without_bindings_parses() {
        let parsed: SheetSidecar =
            serde_json::from_str(r#"{"columns": [{"name": "A", "role": "plain"}]}"#).unwrap();
        assert_eq!(parsed.version, SIDECAR_VERSION);
        assert!(parsed.bindings.is_empty());
        assert_eq!(parsed.columns[0], ColumnDefinition::plain("A"));
    }
}
