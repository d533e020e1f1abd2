// src/sheets/persistence/xlsx_export.rs
use bevy::log::info;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::io::Write;
use std::path::Path;

use super::write_atomically;
use crate::sheets::definitions::CellValue;
use crate::sheets::error::PersistenceError;
use crate::sheets::sheet::Sheet;

fn build_workbook(sheet: &Sheet) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    let header = Format::new().set_bold();

    for (col, name) in sheet.columns().names().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header)?;
    }
    for (row, values) in sheet.grid().iter().enumerate() {
        let xl_row = (row + 1) as u32;
        for (col, value) in values.iter().enumerate() {
            match value {
                CellValue::Unset => {}
                CellValue::Number(n) => {
                    worksheet.write_number(xl_row, col as u16, *n)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(xl_row, col as u16, s)?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer()
}

/// Writes the sheet's values (no roles or bindings) to an Excel workbook.
pub fn export_xlsx(sheet: &Sheet, path: &Path) -> Result<(), PersistenceError> {
    let bytes = build_workbook(sheet).map_err(|e| PersistenceError::write(path, e))?;
    write_atomically(path, |file| file.write_all(&bytes).map_err(|e| PersistenceError::write(path, e)))?;
    info!("Exported {} rows to {:?}.", sheet.row_count(), path);
    Ok(())
}
