// src/console/systems.rs
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use std::sync::mpsc::TryRecvError;

use super::commands::{parse_line, ConsoleCommand};
use super::resources::{ConsoleInput, ConsoleState};
use crate::cli::{parse_row_list, show::describe};
use crate::sheets::{
    column_registry::TransformationBinding,
    condition::{parse_condition_kind, RowCondition},
    definitions::{parse_column_data_type, CellMap, CellValue, ColumnRole},
    events::*,
    resources::SheetWorkspace,
    runner::{OverwritePolicy, RunStatus, TransformationRunner},
};

/// Writers for every request the console can issue.
#[derive(SystemParam)]
pub struct ConsoleEventWriters<'w> {
    pub load: EventWriter<'w, RequestLoadSheet>,
    pub create: EventWriter<'w, RequestCreateSheet>,
    pub save: EventWriter<'w, RequestSaveSheet>,
    pub export: EventWriter<'w, RequestExportSheet>,
    pub add_column: EventWriter<'w, RequestAddColumn>,
    pub rename_column: EventWriter<'w, RequestRenameColumn>,
    pub remove_column: EventWriter<'w, RequestRemoveColumn>,
    pub set_type: EventWriter<'w, RequestSetColumnType>,
    pub bind: EventWriter<'w, RequestBindTransformation>,
    pub unbind: EventWriter<'w, RequestUnbindTransformation>,
    pub add_row: EventWriter<'w, AddSheetRowRequest>,
    pub duplicate_row: EventWriter<'w, RequestDuplicateRow>,
    pub delete_rows: EventWriter<'w, RequestDeleteRows>,
    pub update_cell: EventWriter<'w, UpdateCellEvent>,
    pub clear_cells: EventWriter<'w, RequestClearCells>,
    pub run: EventWriter<'w, RequestRunTransformation>,
    pub run_all: EventWriter<'w, RequestRunAll>,
    pub cancel: EventWriter<'w, RequestCancelRun>,
    pub exit: EventWriter<'w, RequestAppExit>,
}

fn row_count(workspace: &SheetWorkspace) -> Result<usize, String> {
    workspace
        .session()
        .map(|s| s.sheet().row_count())
        .map_err(|e| e.to_string())
}

fn parse_assignments(values: &[String]) -> Result<CellMap, String> {
    values
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(column, value)| (column.trim().to_string(), CellValue::text(value)))
                .ok_or_else(|| format!("expected Column=Value, got '{}'", pair))
        })
        .collect()
}

fn parse_condition(when: Option<String>, columns: Vec<String>) -> Result<Option<RowCondition>, String> {
    let Some(raw) = when else {
        return Ok(None);
    };
    let (kind, value) = match raw.split_once('=') {
        Some((kind, value)) => (kind.to_string(), Some(value.to_string())),
        None => (raw.clone(), None),
    };
    let kind = parse_condition_kind(&kind, value.as_deref())
        .ok_or_else(|| format!("unknown condition '{}'", raw))?;
    Ok(Some(RowCondition::new(kind, columns)))
}

/// Turns one command into requests, or prints read-only answers directly.
fn execute(
    command: ConsoleCommand,
    workspace: &SheetWorkspace,
    runner: &TransformationRunner,
    state: &ConsoleState,
    writers: &mut ConsoleEventWriters,
) -> Result<(), String> {
    match command {
        ConsoleCommand::Open { path } => {
            writers.load.write(RequestLoadSheet { path });
        }
        ConsoleCommand::New { path } => {
            writers.create.write(RequestCreateSheet { path });
        }
        ConsoleCommand::Save { path } => {
            writers.save.write(RequestSaveSheet { path });
        }
        ConsoleCommand::Export { path } => {
            writers.export.write(RequestExportSheet { path });
        }
        ConsoleCommand::Show { limit } => {
            let session = workspace.session().map_err(|e| e.to_string())?;
            print!("{}", describe(session.sheet(), limit.or(Some(20))));
        }
        ConsoleCommand::Columns => {
            let session = workspace.session().map_err(|e| e.to_string())?;
            for def in session.sheet().columns().columns() {
                println!("  {:<28} {:<8} {}", def.name, def.data_type, def.role);
            }
        }
        ConsoleCommand::AddColumn { name, output_of } => {
            let role = match output_of {
                Some(transformation) => ColumnRole::Output { transformation },
                None => ColumnRole::Plain,
            };
            writers.add_column.write(RequestAddColumn { name, role });
        }
        ConsoleCommand::RenameColumn { old, new } => {
            writers.rename_column.write(RequestRenameColumn {
                old_name: old,
                new_name: new,
            });
        }
        ConsoleCommand::RemoveColumn { name, force } => {
            writers.remove_column.write(RequestRemoveColumn { name, force });
        }
        ConsoleCommand::SetType { column, data_type } => {
            let data_type = parse_column_data_type(&data_type)
                .ok_or_else(|| format!("unknown type '{}' (text or number)", data_type))?;
            writers.set_type.write(RequestSetColumnType { column, data_type });
        }
        ConsoleCommand::Bind {
            transformation,
            inputs,
            outputs,
            when,
            when_columns,
        } => {
            let unit = runner.registry().get(&transformation).map_err(|e| e.to_string())?;
            // Omitted sides default to the declared column names.
            let inputs = if inputs.is_empty() { unit.inputs().to_vec() } else { inputs };
            let outputs = if outputs.is_empty() { unit.outputs().to_vec() } else { outputs };
            let binding = TransformationBinding {
                inputs,
                outputs,
                condition: parse_condition(when, when_columns)?,
            };
            writers.bind.write(RequestBindTransformation {
                transformation,
                binding,
            });
        }
        ConsoleCommand::Unbind { transformation } => {
            writers.unbind.write(RequestUnbindTransformation { transformation });
        }
        ConsoleCommand::AddRow { values } => {
            writers.add_row.write(AddSheetRowRequest {
                initial_values: parse_assignments(&values)?,
            });
        }
        ConsoleCommand::DupRow { row } => {
            writers.duplicate_row.write(RequestDuplicateRow { row_index: row });
        }
        ConsoleCommand::DeleteRows { rows } => {
            let row_indices = parse_row_list(&rows, row_count(workspace)?)?;
            writers.delete_rows.write(RequestDeleteRows { row_indices });
        }
        ConsoleCommand::Set { row, column, value } => {
            writers.update_cell.write(UpdateCellEvent {
                row_index: row,
                column,
                new_value: CellValue::text(value),
            });
        }
        ConsoleCommand::Clear { row, columns } => {
            writers.clear_cells.write(RequestClearCells {
                row_index: row,
                columns,
            });
        }
        ConsoleCommand::Transformations => {
            for info in runner.list_available_transformations() {
                println!(
                    "  {:<24} [{}] -> [{}]{}",
                    info.name,
                    info.inputs.join(", "),
                    info.outputs.join(", "),
                    if info.idempotent { "" } else { "  (sends on every run)" }
                );
            }
        }
        ConsoleCommand::Run {
            transformation,
            rows,
            force,
            skip_unchanged,
        } => {
            let rows = parse_row_list(&rows, row_count(workspace)?)?;
            let policy = match (force, skip_unchanged) {
                (true, _) => OverwritePolicy::Force,
                (false, true) => OverwritePolicy::SkipUnchanged,
                (false, false) => OverwritePolicy::SkipPopulated,
            };
            writers.run.write(RequestRunTransformation {
                transformation,
                rows,
                policy,
            });
        }
        ConsoleCommand::RunAll => {
            writers.run_all.write(RequestRunAll);
        }
        ConsoleCommand::Cancel { transformation } => {
            writers.cancel.write(RequestCancelRun { transformation });
        }
        ConsoleCommand::Retry => {
            let request = state
                .last_batch
                .as_ref()
                .and_then(|batch| batch.retry_request())
                .ok_or_else(|| "Nothing to retry.".to_string())?;
            writers.run.write(RequestRunTransformation {
                transformation: request.transformation,
                rows: request.rows.into_iter().collect(),
                policy: request.policy,
            });
        }
        ConsoleCommand::Quit => {
            writers.exit.write(RequestAppExit);
        }
    }
    Ok(())
}

/// Drains lines typed since the last frame and dispatches them.
pub fn process_console_input(
    input: Res<ConsoleInput>,
    workspace: Res<SheetWorkspace>,
    runner: Res<TransformationRunner>,
    state: Res<ConsoleState>,
    mut writers: ConsoleEventWriters,
) {
    let Ok(receiver) = input.lines.lock() else {
        error!("Console input channel is poisoned.");
        return;
    };
    loop {
        match receiver.try_recv() {
            Ok(line) => match parse_line(&line) {
                Ok(Some(command)) => {
                    debug!("Console command: {:?}", command);
                    if let Err(message) = execute(command, &workspace, &runner, &state, &mut writers) {
                        println!("error: {}", message);
                    }
                }
                Ok(None) => {}
                Err(message) => println!("{}", message.trim_end()),
            },
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                info!("Console input closed; exiting.");
                writers.exit.write(RequestAppExit);
                break;
            }
        }
    }
}

/// Prints feedback and batch progress, and keeps the last batch for `retry`.
pub fn report_console_feedback(
    mut feedback: EventReader<SheetOperationFeedback>,
    mut progress: EventReader<RunProgressEvent>,
    mut completed: EventReader<RunCompletedEvent>,
    mut state: ResMut<ConsoleState>,
) {
    for event in feedback.read() {
        if event.is_error {
            println!("error: {}", event.message);
        } else {
            println!("{}", event.message);
        }
    }
    for event in progress.read() {
        println!(
            "[{} {}/{}] row {} {}",
            event.transformation, event.done, event.total, event.result.row_index, event.result.status
        );
    }
    for event in completed.read() {
        let batch = &event.result;
        println!("'{}' finished: {}", batch.transformation, batch.summary);
        for result in &batch.results {
            if let RunStatus::Failed(e) = &result.status {
                println!("  row {}: {}", result.row_index, e);
            }
        }
        if let Some(e) = &batch.last_flush_error {
            println!("warning: results are in memory but the last save failed: {}", e);
        }
        if batch.summary.failed > 0 {
            println!("Type 'retry' to re-run the failed rows.");
        }
        state.last_batch = Some(batch.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_and_conditions_parse() {
        let values = parse_assignments(&["CompanyName=Acme".to_string(), "Notes=".to_string()]).unwrap();
        assert_eq!(values.get("CompanyName"), Some(&CellValue::from("Acme")));
        assert_eq!(values.get("Notes"), Some(&CellValue::Unset));
        assert!(parse_assignments(&["oops".to_string()]).is_err());

        let condition = parse_condition(Some("equals=yes".into()), vec!["Apply".into()])
            .unwrap()
            .unwrap();
        assert!(condition.matches([&CellValue::from("yes")]));
        assert_eq!(parse_condition(None, vec![]), Ok(None));
        assert!(parse_condition(Some("sometimes".into()), vec![]).is_err());
    }
}
