// src/sheets/persistence/mod.rs
//! File-backed storage for a sheet: a CSV grid plus a JSON sidecar holding
//! what CSV cannot express (column roles and types, bindings, signatures).

pub mod backup;
pub mod csv_store;
pub mod metadata;
pub mod xlsx_export;

#[cfg(test)]
pub(crate) mod memory;

use bevy::log::{info, trace, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::column_registry::ColumnRegistry;
use super::definitions::{parse_canonical, CellValue, ColumnDataType, ColumnDefinition};
use super::error::PersistenceError;
use super::sheet::Sheet;
use metadata::SheetSidecar;

/// Storage contract used by the session for load, explicit save and auto-save.
pub trait SheetPersistence: Send + Sync {
    fn load(&self, path: &Path) -> Result<Sheet, PersistenceError>;
    fn save(&self, path: &Path, sheet: &Sheet) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Excel,
}

pub fn detect_format(path: &Path) -> Result<SheetFormat, PersistenceError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => Ok(SheetFormat::Csv),
        "xlsx" | "xls" => Ok(SheetFormat::Excel),
        other => Err(PersistenceError::format(
            path,
            format!("unsupported file extension '{}' (expected .csv)", other),
        )),
    }
}

/// Default adapter: CSV working file with a `<stem>_metadata.json` sidecar.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvPersistence;

impl SheetPersistence for CsvPersistence {
    fn load(&self, path: &Path) -> Result<Sheet, PersistenceError> {
        if detect_format(path)? == SheetFormat::Excel {
            return Err(PersistenceError::format(
                path,
                "Excel files can only be exported; open the CSV working file instead",
            ));
        }
        let table = csv_store::read_table(path)?;
        let sidecar_path = metadata::sidecar_path(path);
        let sidecar = match metadata::read_sidecar(&sidecar_path) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!("Ignoring sidecar {:?}: {}", sidecar_path, e);
                None
            }
        };
        let sheet = assemble(table, sidecar);
        info!(
            "Loaded sheet {:?}: {} columns, {} rows.",
            path,
            sheet.columns().len(),
            sheet.row_count()
        );
        Ok(sheet)
    }

    fn save(&self, path: &Path, sheet: &Sheet) -> Result<(), PersistenceError> {
        if detect_format(path)? == SheetFormat::Excel {
            return xlsx_export::export_xlsx(sheet, path);
        }
        csv_store::write_table(path, sheet)?;
        metadata::write_sidecar(&metadata::sidecar_path(path), &SheetSidecar::from_sheet(sheet))?;
        trace!("Saved sheet to {:?}.", path);
        Ok(())
    }
}

/// Combines the CSV grid with the sidecar. Header order wins; sidecar entries
/// for absent columns are ignored and columns it does not know are plain with
/// an inferred type.
fn assemble(table: csv_store::CsvTable, sidecar: Option<SheetSidecar>) -> Sheet {
    let (known, bindings, mut signatures) = match sidecar {
        Some(s) => (s.columns, s.bindings, s.row_signatures),
        None => (Vec::new(), BTreeMap::new(), Vec::new()),
    };
    if !signatures.is_empty() && signatures.len() != table.records.len() {
        warn!(
            "Sidecar lists {} rows but the CSV has {}; discarding run signatures.",
            signatures.len(),
            table.records.len()
        );
        signatures.clear();
    }

    let definitions: Vec<ColumnDefinition> = table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| match known.iter().find(|d| &d.name == name) {
            Some(def) => def.clone(),
            None => ColumnDefinition {
                data_type: infer_type(table.records.iter().map(|r| r[idx].as_str())),
                ..ColumnDefinition::plain(name.clone())
            },
        })
        .collect();

    let rows = table
        .records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let values = record
                .iter()
                .zip(&definitions)
                .map(|(field, def)| CellValue::parse_field(field, def.data_type))
                .collect();
            (values, signatures.get(i).cloned().unwrap_or_default())
        })
        .collect();

    Sheet::from_parts(ColumnRegistry::from_parts(definitions, bindings), rows)
}

/// `Number` when every non-empty field is a number written in the form a
/// `Number` cell saves back, and at least one field is present. Anything
/// else stays `Text` so the next save reproduces the file.
fn infer_type<'a>(fields: impl Iterator<Item = &'a str>) -> ColumnDataType {
    let mut seen_value = false;
    for field in fields.filter(|f| !f.is_empty()) {
        if parse_canonical(field).is_none() {
            return ColumnDataType::Text;
        }
        seen_value = true;
    }
    if seen_value {
        ColumnDataType::Number
    } else {
        ColumnDataType::Text
    }
}

/// Writes through a temporary file in the target directory, then renames it
/// over `path`.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<(), PersistenceError>
where
    F: FnOnce(&mut fs::File) -> Result<(), PersistenceError>,
{
    let tmp = tmp_path(path);
    let result = fs::File::create(&tmp)
        .map_err(|e| PersistenceError::write(path, e))
        .and_then(|mut file| {
            write(&mut file)?;
            file.flush().map_err(|e| PersistenceError::write(path, e))?;
            file.sync_all().map_err(|e| PersistenceError::write(path, e))
        })
        .and_then(|_| fs::rename(&tmp, path).map_err(|e| PersistenceError::write(path, e)));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes an empty `Column1`/`Column2` sheet to `path` and returns it.
pub fn create_new_sheet(persistence: &dyn SheetPersistence, path: &Path) -> Result<Sheet, PersistenceError> {
    let sheet = Sheet::with_columns(["Column1", "Column2"])
        .map_err(|e| PersistenceError::write(path, e))?;
    persistence.save(path, &sheet)?;
    info!("Created new sheet at {:?}.", path);
    Ok(sheet)
}

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod persistence_tests;
