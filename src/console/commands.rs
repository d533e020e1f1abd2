// src/console/commands.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// One line typed at the interactive prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConsoleCommand {
    /// Open a CSV sheet
    Open { path: PathBuf },
    /// Create an empty sheet and open it
    New { path: PathBuf },
    /// Save now, optionally to a new path
    Save { path: Option<PathBuf> },
    /// Write an Excel copy
    Export { path: PathBuf },
    /// Print the sheet
    Show {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the column list
    Columns,
    /// Add a column at the end
    AddColumn {
        name: String,
        /// Make it an output column of this transformation
        #[arg(long)]
        output_of: Option<String>,
    },
    RenameColumn { old: String, new: String },
    /// Remove a column; --force also drops bindings that use it
    RemoveColumn {
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// Set a column type: text or number
    SetType { column: String, data_type: String },
    /// Map a transformation's inputs and outputs to sheet columns
    Bind {
        transformation: String,
        #[arg(long, value_delimiter = ',')]
        inputs: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        outputs: Vec<String>,
        /// is_empty, is_not_empty, all_not_empty, equals=VALUE or all_equals=VALUE
        #[arg(long, requires = "when_columns")]
        when: Option<String>,
        #[arg(long, value_delimiter = ',')]
        when_columns: Vec<String>,
    },
    Unbind { transformation: String },
    /// Append a row: add-row Column=Value ...
    AddRow { values: Vec<String> },
    /// Copy a row below itself
    DupRow { row: usize },
    /// Delete rows such as "3" or "0,2,5-9"
    DeleteRows { rows: String },
    /// Set one cell
    Set { row: usize, column: String, value: String },
    /// Unset cells of one row
    Clear {
        row: usize,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// List transformations
    Transformations,
    /// Run a transformation in the background
    Run {
        transformation: String,
        #[arg(long, default_value = "all")]
        rows: String,
        #[arg(long, conflicts_with = "skip_unchanged")]
        force: bool,
        #[arg(long)]
        skip_unchanged: bool,
    },
    /// Run every bound transformation over all rows, producers first,
    /// skipping rows whose inputs did not change
    RunAll,
    /// Stop running batches after their current row
    Cancel { transformation: Option<String> },
    /// Re-run the failed rows of the last finished batch
    Retry,
    /// Save, back up and exit
    #[command(alias = "exit")]
    Quit,
}

/// Splits a console line on whitespace, keeping quoted runs together.
pub fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Parses a line into a command. `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let words = split_line(line)?;
    if words.is_empty() {
        return Ok(None);
    }
    ConsoleLine::try_parse_from(words)
        .map(|parsed| Some(parsed.command))
        .map_err(|e| e.to_string())
}
