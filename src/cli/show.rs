// src/cli/show.rs
use std::fmt::Write;
use std::path::PathBuf;

use super::CliError;
use crate::sheets::persistence::{CsvPersistence, SheetPersistence};
use crate::sheets::sheet::Sheet;

const CELL_WIDTH: usize = 24;

fn clip(text: &str) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= CELL_WIDTH {
        flat
    } else {
        let head: String = flat.chars().take(CELL_WIDTH - 1).collect();
        format!("{}…", head)
    }
}

/// Column table, bindings and (up to `limit`) rows as plain text.
pub fn describe(sheet: &Sheet, limit: Option<usize>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Columns ===");
    for (idx, def) in sheet.columns().columns().iter().enumerate() {
        let _ = writeln!(out, "{:<4} {:<28} {:<8} {}", idx, def.name, def.data_type, def.role);
    }

    if !sheet.columns().bindings().is_empty() {
        let _ = writeln!(out, "\n=== Bindings ===");
        for (name, binding) in sheet.columns().bindings() {
            let _ = write!(
                out,
                "{}: [{}] -> [{}]",
                name,
                binding.inputs.join(", "),
                binding.outputs.join(", ")
            );
            if let Some(condition) = &binding.condition {
                let _ = write!(out, " when {:?} on [{}]", condition.kind, condition.columns.join(", "));
            }
            let _ = writeln!(out);
        }
    }

    let shown = limit.unwrap_or(usize::MAX).min(sheet.row_count());
    let _ = writeln!(out, "\n=== Rows ({} of {}) ===", shown, sheet.row_count());
    let header: Vec<String> = sheet.columns().names().map(clip).collect();
    let _ = writeln!(out, "{:<5} {}", "#", pad(&header));
    for row in 0..shown {
        let values: Vec<String> = sheet
            .row_values(row)
            .unwrap_or_default()
            .iter()
            .map(|v| clip(&v.to_string()))
            .collect();
        let _ = writeln!(out, "{:<5} {}", row, pad(&values));
    }
    out
}

fn pad(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| format!("{:<width$}", c, width = CELL_WIDTH))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn run(file: PathBuf, limit: Option<usize>) -> Result<(), CliError> {
    println!("Opening: {}\n", file.display());
    let sheet = CsvPersistence.load(&file)?;
    print!("{}", describe(&sheet, limit));
    Ok(())
}
