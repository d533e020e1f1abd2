// src/cli/new_sheet.rs
use std::path::PathBuf;

use super::CliError;
use crate::sheets::persistence::{create_new_sheet, CsvPersistence};

pub fn run(file: PathBuf) -> Result<(), CliError> {
    if file.exists() {
        return Err(CliError::Usage(format!("{} already exists.", file.display())));
    }
    create_new_sheet(&CsvPersistence, &file)?;
    println!("Created {}", file.display());
    Ok(())
}
