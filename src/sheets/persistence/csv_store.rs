// src/sheets/persistence/csv_store.rs
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use super::write_atomically;
use crate::sheets::error::PersistenceError;
use crate::sheets::sheet::Sheet;

/// Raw CSV content. Every record has exactly `headers.len()` fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

pub fn read_table(path: &Path) -> Result<CsvTable, PersistenceError> {
    let file = File::open(path).map_err(|e| PersistenceError::unreadable(path, e))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PersistenceError::format(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut seen = HashSet::new();
    for header in &headers {
        if header.is_empty() {
            return Err(PersistenceError::format(path, "blank column header"));
        }
        if !seen.insert(header.as_str()) {
            return Err(PersistenceError::format(path, format!("duplicate column '{}'", header)));
        }
    }

    let mut records = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PersistenceError::format(path, e))?;
        if record.len() > headers.len() && record.iter().skip(headers.len()).any(|f| !f.is_empty()) {
            return Err(PersistenceError::format(
                path,
                format!("row {} has {} fields for {} columns", line + 1, record.len(), headers.len()),
            ));
        }
        let mut fields: Vec<String> = record.iter().take(headers.len()).map(str::to_string).collect();
        fields.resize(headers.len(), String::new());
        records.push(fields);
    }
    Ok(CsvTable { headers, records })
}

pub fn write_table(path: &Path, sheet: &Sheet) -> Result<(), PersistenceError> {
    write_atomically(path, |file| {
        let mut writer = WriterBuilder::new().from_writer(file);
        writer
            .write_record(sheet.columns().names())
            .map_err(|e| PersistenceError::write(path, e))?;
        for row in sheet.grid() {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .map_err(|e| PersistenceError::write(path, e))?;
        }
        writer.flush().map_err(|e| PersistenceError::write(path, e))
    })
}
