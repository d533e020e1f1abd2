// src/cli/export.rs
use std::path::PathBuf;

use super::CliError;
use crate::sheets::persistence::{xlsx_export, CsvPersistence, SheetPersistence};

pub fn run(file: PathBuf, to: PathBuf) -> Result<(), CliError> {
    let sheet = CsvPersistence.load(&file)?;
    xlsx_export::export_xlsx(&sheet, &to)?;
    println!(
        "Exported {} rows from {} to {}",
        sheet.row_count(),
        file.display(),
        to.display()
    );
    Ok(())
}
