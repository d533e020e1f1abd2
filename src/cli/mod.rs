// src/cli/mod.rs
// One-shot commands that work on a sheet file without starting the app

pub mod export;
pub mod list_transformations;
pub mod new_sheet;
pub mod run_batch;
pub mod set_key;
pub mod show;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::settings::SettingsError;
use crate::sheets::error::{PersistenceError, SheetError};

#[derive(Parser)]
#[command(name = "jobsheet")]
#[command(about = "JobSheet - job search tracking sheet with per-row automations", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the built-in transformations and their columns
    ListTransformations,

    /// Print the columns, bindings and rows of a sheet
    Show {
        /// Path to the CSV sheet
        #[arg(long)]
        file: PathBuf,
        /// Only print the first N rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run a transformation over rows of a sheet, saving after every row
    Run {
        /// Path to the CSV sheet
        #[arg(long)]
        file: PathBuf,
        /// Transformation name (see list-transformations)
        #[arg(long)]
        transformation: String,
        /// Rows such as "0,2,5-9" or "all"
        #[arg(long, default_value = "all")]
        rows: String,
        /// Re-run rows whose outputs are already filled
        #[arg(long, conflicts_with = "skip_unchanged")]
        force: bool,
        /// Re-run filled rows only when their inputs changed
        #[arg(long)]
        skip_unchanged: bool,
    },

    /// Run every bound transformation in dependency order, skipping rows
    /// whose inputs did not change since their last success
    RunAll {
        /// Path to the CSV sheet
        #[arg(long)]
        file: PathBuf,
    },

    /// Write an Excel copy of a sheet
    Export {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        to: PathBuf,
    },

    /// Create an empty sheet
    New {
        #[arg(long)]
        file: PathBuf,
    },

    /// Store an API key or password in the OS keyring
    SetKey {
        /// openai, anthropic, deepseek, ollama, scrapfly, reoon, wiza or smtp
        name: String,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("{0}")]
    Usage(String),
    #[error("{failed} row(s) failed.")]
    RowsFailed { failed: usize },
}

pub fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::ListTransformations => list_transformations::run(),
        Commands::Show { file, limit } => show::run(file, limit),
        Commands::Run {
            file,
            transformation,
            rows,
            force,
            skip_unchanged,
        } => run_batch::run(file, transformation, rows, force, skip_unchanged),
        Commands::RunAll { file } => run_batch::run_all(file),
        Commands::Export { file, to } => export::run(file, to),
        Commands::New { file } => new_sheet::run(file),
        Commands::SetKey { name, value } => set_key::run(name, value),
    }
}

/// Parses `"all"` or a comma list of indices and inclusive ranges. Every
/// index must be below `row_count`.
pub fn parse_row_list(raw: &str, row_count: usize) -> Result<Vec<usize>, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("all") {
        return Ok((0..row_count).collect());
    }
    let parse = |s: &str| {
        let index = s
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("'{}' is not a row index", s.trim()))?;
        if index >= row_count {
            return Err(format!("row {} is out of range (sheet has {} rows)", index, row_count));
        }
        Ok(index)
    };
    let mut rows = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse(start)?, parse(end)?);
                if start > end {
                    return Err(format!("range '{}' runs backwards", part.trim()));
                }
                rows.extend(start..=end);
            }
            None => rows.push(parse(part)?),
        }
    }
    rows.sort_unstable();
    rows.dedup();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_lists_accept_ranges_and_all() {
        assert_eq!(parse_row_list("all", 3), Ok(vec![0, 1, 2]));
        assert_eq!(parse_row_list("4, 0-2,1", 10), Ok(vec![0, 1, 2, 4]));
        assert!(parse_row_list("3-1", 10).is_err());
        assert!(parse_row_list("x", 10).is_err());
        assert_eq!(parse_row_list("", 10), Ok(vec![]));
    }

    #[test]
    fn row_lists_stop_at_the_last_row() {
        assert_eq!(parse_row_list("0-4", 5), Ok(vec![0, 1, 2, 3, 4]));
        assert!(parse_row_list("5", 5).is_err());
        assert!(parse_row_list("0-18446744073709551615", 5).is_err());
        assert!(parse_row_list("0", 0).is_err());
    }

    #[test]
    fn run_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "jobsheet", "run", "--file", "a.csv", "--transformation", "scrape", "--force", "--skip-unchanged",
        ]);
        assert!(parsed.is_err());
    }
}
