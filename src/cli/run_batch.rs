// src/cli/run_batch.rs
use std::path::PathBuf;

use super::{parse_row_list, CliError};
use crate::settings::io::load_or_default;
use crate::sheets::resources::SheetSession;
use crate::sheets::runner::{
    CancellationToken, OverwritePolicy, RunRequest, RunStatus, TransformationRunner,
};
use crate::transformations::TransformationRegistry;

pub fn run(
    file: PathBuf,
    transformation: String,
    rows: String,
    force: bool,
    skip_unchanged: bool,
) -> Result<(), CliError> {
    let settings = load_or_default();
    let runner = TransformationRunner::new(TransformationRegistry::with_builtins(&settings));
    let mut session = SheetSession::open_csv(&file)?;

    let rows = parse_row_list(&rows, session.sheet().row_count()).map_err(CliError::Usage)?;
    let policy = if force {
        OverwritePolicy::Force
    } else if skip_unchanged {
        OverwritePolicy::SkipUnchanged
    } else {
        OverwritePolicy::SkipPopulated
    };
    let request = RunRequest::new(transformation, rows).with_policy(policy);
    println!(
        "Running '{}' on {} row(s) of {} ({:?})\n",
        request.transformation,
        request.rows.len(),
        file.display(),
        policy
    );

    let total = request.rows.len();
    let mut done = 0;
    let batch = runner.run(&mut session, &request, &CancellationToken::new(), |result| {
        done += 1;
        println!("[{}/{}] row {:<5} {}", done, total, result.row_index, result.status);
    })?;

    // Flush errors inside the batch leave the session dirty; one last try.
    session.flush()?;

    println!("\n{}", batch.summary);
    for result in &batch.results {
        if let RunStatus::Failed(e) = &result.status {
            println!("  row {}: {}", result.row_index, e);
        }
    }
    if batch.summary.failed > 0 {
        let failed: Vec<String> = batch.failed_rows().iter().map(|r| r.to_string()).collect();
        println!(
            "\nRetry with: jobsheet run --file {} --transformation {} --rows {} --force",
            file.display(),
            batch.transformation,
            failed.join(",")
        );
        return Err(CliError::RowsFailed {
            failed: batch.summary.failed,
        });
    }
    Ok(())
}

pub fn run_all(file: PathBuf) -> Result<(), CliError> {
    let settings = load_or_default();
    let runner = TransformationRunner::new(TransformationRegistry::with_builtins(&settings));
    let mut session = SheetSession::open_csv(&file)?;

    let order: Vec<String> = runner
        .run_all_requests(session.sheet())
        .into_iter()
        .map(|r| r.transformation)
        .collect();
    if order.is_empty() {
        println!("Nothing to run in {}.", file.display());
        return Ok(());
    }
    println!("Running {} on {}\n", order.join(" -> "), file.display());

    let outcomes = runner.run_all(&mut session, &CancellationToken::new(), |name, result| {
        println!("[{}] row {:<5} {}", name, result.row_index, result.status);
    });
    session.flush()?;

    let mut failed = 0;
    println!();
    for (name, outcome) in order.iter().zip(&outcomes) {
        match outcome {
            Ok(batch) => {
                println!("{:<20} {}", name, batch.summary);
                failed += batch.summary.failed;
            }
            Err(e) => println!("{:<20} not started: {}", name, e),
        }
    }
    if failed > 0 {
        return Err(CliError::RowsFailed { failed });
    }
    Ok(())
}
