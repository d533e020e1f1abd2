// src/sheets/systems/logic.rs
//! Handlers for column, row and cell edit requests against the active session.
//! Each accepted edit marks the session dirty; the auto-save system in
//! `systems::io` persists it later in the frame.

use bevy::prelude::*;
use std::fmt::Display;

use crate::settings::AppSettings;
use crate::sheets::{
    error::SheetError,
    events::{
        AddSheetRowRequest, RequestAddColumn, RequestBindTransformation, RequestClearCells,
        RequestDeleteRows, RequestDuplicateRow, RequestRemoveColumn, RequestRenameColumn,
        RequestSetColumnType, RequestUnbindTransformation, SheetDataModifiedInRegistryEvent,
        SheetOperationFeedback, UpdateCellEvent,
    },
    resources::SheetWorkspace,
    runner::TransformationRunner,
};

/// Sends feedback for one edit and, on success, the modified notification.
fn report<T>(
    result: Result<T, SheetError>,
    success: impl FnOnce(T) -> String,
    feedback: &mut EventWriter<SheetOperationFeedback>,
    modified: &mut EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    match result {
        Ok(value) => {
            let message = success(value);
            info!("{}", message);
            feedback.write(SheetOperationFeedback::ok(message));
            modified.write(SheetDataModifiedInRegistryEvent);
        }
        Err(e) => {
            warn!("Edit rejected: {}", e);
            feedback.write(SheetOperationFeedback::error(e.to_string()));
        }
    }
}

fn quoted(items: &[impl Display]) -> String {
    items
        .iter()
        .map(|i| format!("'{}'", i))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn handle_add_column_request(
    mut events: EventReader<RequestAddColumn>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.add_column(&event.name, event.role.clone()));
        report(
            result,
            |_| format!("Added column '{}'.", event.name),
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_rename_column_request(
    mut events: EventReader<RequestRenameColumn>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.rename_column(&event.old_name, &event.new_name));
        report(
            result,
            |_| format!("Renamed column '{}' to '{}'.", event.old_name, event.new_name),
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_remove_column_request(
    mut events: EventReader<RequestRemoveColumn>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.remove_column(&event.name, event.force));
        report(
            result,
            |dropped| {
                if dropped.is_empty() {
                    format!("Removed column '{}'.", event.name)
                } else {
                    format!(
                        "Removed column '{}' and dropped binding(s) {}.",
                        event.name,
                        quoted(&dropped)
                    )
                }
            },
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_set_column_type_request(
    mut events: EventReader<RequestSetColumnType>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.set_column_type(&event.column, event.data_type));
        report(
            result,
            |_| format!("Column '{}' is now {:?}.", event.column, event.data_type),
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_bind_transformation_request(
    mut events: EventReader<RequestBindTransformation>,
    mut workspace: ResMut<SheetWorkspace>,
    runner: Res<TransformationRunner>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = runner.registry().get(&event.transformation).and_then(|unit| {
            workspace
                .session_mut()
                .and_then(|s| s.bind_transformation(unit.as_ref(), event.binding.clone()))
        });
        report(
            result,
            |_| {
                format!(
                    "Bound '{}': {} -> {}.",
                    event.transformation,
                    quoted(&event.binding.inputs),
                    quoted(&event.binding.outputs)
                )
            },
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_unbind_transformation_request(
    mut events: EventReader<RequestUnbindTransformation>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.unbind_transformation(&event.transformation));
        report(
            result,
            |removed| match removed {
                Some(_) => format!("Unbound '{}'.", event.transformation),
                None => format!("'{}' had no binding.", event.transformation),
            },
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_add_row_request(
    mut events: EventReader<AddSheetRowRequest>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.add_row(event.initial_values.clone()));
        report(
            result,
            |index| format!("Added row {}.", index),
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_duplicate_row_request(
    mut events: EventReader<RequestDuplicateRow>,
    mut workspace: ResMut<SheetWorkspace>,
    settings: Res<AppSettings>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.duplicate_row(event.row_index, &settings.duplicate_reset_columns));
        report(
            result,
            |index| format!("Duplicated row {} as row {}.", event.row_index, index),
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_delete_rows_request(
    mut events: EventReader<RequestDeleteRows>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        if event.row_indices.is_empty() {
            trace!("Skipping delete request: no indices provided.");
            continue;
        }
        let result = workspace
            .session_mut()
            .and_then(|s| s.delete_rows(&event.row_indices));
        report(
            result,
            |count| format!("Deleted {} row(s).", count),
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_cell_update(
    mut events: EventReader<UpdateCellEvent>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.set_cell(event.row_index, &event.column, event.new_value.clone()));
        report(
            result,
            |_| format!("Set row {} '{}'.", event.row_index, event.column),
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}

pub fn handle_clear_cells_request(
    mut events: EventReader<RequestClearCells>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let result = workspace
            .session_mut()
            .and_then(|s| s.clear_cells(event.row_index, &event.columns));
        report(
            result,
            |_| format!("Cleared {} on row {}.", quoted(&event.columns), event.row_index),
            &mut feedback_writer,
            &mut data_modified_writer,
        );
    }
}
