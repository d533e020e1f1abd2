// src/sheets/plugin.rs
use bevy::prelude::*;
use std::sync::Arc;

use super::events::{
    AddSheetRowRequest, RequestAddColumn, RequestAppExit, RequestBindTransformation,
    RequestCancelRun, RequestClearCells, RequestCreateSheet, RequestDeleteRows,
    RequestDuplicateRow, RequestExportSheet, RequestLoadSheet, RequestRemoveColumn,
    RequestRenameColumn, RequestRunAll, RequestRunTransformation, RequestSaveSheet, RequestSetColumnType,
    RequestUnbindTransformation, RunCompletedEvent, RunProgressEvent,
    SheetDataModifiedInRegistryEvent, SheetOperationFeedback, UpdateCellEvent,
};
use super::persistence::CsvPersistence;
use super::resources::{SheetSession, SheetWorkspace};
use super::runner::TransformationRunner;
use super::systems;
use crate::settings::{io::load_or_default, AppSettings};
use crate::transformations::TransformationRegistry;

// Define system sets for ordering
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SheetSystemSet {
    UserInput,      // Systems turning front-end input into requests
    ApplyChanges,   // Systems mutating the active session
    FileOperations, // Systems performing file IO
}

/// Sheet session, edit handlers, batch runner and auto-save for the app.
pub struct SheetsPlugin;

impl Plugin for SheetsPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            Update,
            (
                SheetSystemSet::UserInput,
                SheetSystemSet::ApplyChanges.after(SheetSystemSet::UserInput),
                SheetSystemSet::FileOperations.after(SheetSystemSet::ApplyChanges),
            ),
        );

        // --- Resource Initialization ---
        let settings = load_or_default();
        app.insert_resource(TransformationRunner::new(TransformationRegistry::with_builtins(
            &settings,
        )));
        app.insert_resource(settings);
        app.init_resource::<SheetWorkspace>();

        // --- Event Registration ---
        app.add_event::<RequestLoadSheet>()
            .add_event::<RequestCreateSheet>()
            .add_event::<RequestSaveSheet>()
            .add_event::<RequestExportSheet>()
            .add_event::<RequestAddColumn>()
            .add_event::<RequestRenameColumn>()
            .add_event::<RequestRemoveColumn>()
            .add_event::<RequestSetColumnType>()
            .add_event::<RequestBindTransformation>()
            .add_event::<RequestUnbindTransformation>()
            .add_event::<AddSheetRowRequest>()
            .add_event::<RequestDuplicateRow>()
            .add_event::<RequestDeleteRows>()
            .add_event::<UpdateCellEvent>()
            .add_event::<RequestClearCells>()
            .add_event::<RequestRunTransformation>()
            .add_event::<RequestRunAll>()
            .add_event::<RequestCancelRun>()
            .add_event::<RunProgressEvent>()
            .add_event::<RunCompletedEvent>()
            .add_event::<SheetDataModifiedInRegistryEvent>()
            .add_event::<SheetOperationFeedback>()
            .add_event::<RequestAppExit>();

        app.add_systems(Startup, open_last_used_sheet);

        app.add_systems(
            Update,
            (
                systems::io::handle_load_sheet_request,
                systems::io::handle_create_sheet_request,
                systems::logic::handle_add_column_request,
                systems::logic::handle_rename_column_request,
                systems::logic::handle_remove_column_request,
                systems::logic::handle_set_column_type_request,
                systems::logic::handle_bind_transformation_request,
                systems::logic::handle_unbind_transformation_request,
                systems::logic::handle_add_row_request,
                systems::logic::handle_duplicate_row_request,
                systems::logic::handle_delete_rows_request,
                systems::logic::handle_cell_update,
                systems::logic::handle_clear_cells_request,
                systems::transform::handle_run_all_request,
                systems::transform::advance_run_queue,
                systems::transform::handle_run_transformation_request,
                systems::transform::handle_cancel_run_request,
            )
                .chain()
                .in_set(SheetSystemSet::ApplyChanges),
        );
        app.add_systems(
            Update,
            (
                systems::io::auto_save_dirty_sheet,
                systems::io::handle_save_sheet_request,
                systems::io::handle_export_sheet_request,
                systems::io::handle_app_exit_request,
            )
                .chain()
                .in_set(SheetSystemSet::FileOperations),
        );

        info!("SheetsPlugin initialized.");
    }
}

/// Reopens the last used sheet if the file still exists.
fn open_last_used_sheet(
    settings: Res<AppSettings>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
) {
    let Some(path) = settings.last_used_file.clone() else {
        info!("No last used sheet recorded.");
        return;
    };
    if !path.exists() {
        warn!("Last used sheet {:?} no longer exists.", path);
        return;
    }
    match SheetSession::open(&path, Arc::new(CsvPersistence)) {
        Ok(session) => {
            feedback_writer.write(SheetOperationFeedback::ok(format!(
                "Reopened {:?} ({} rows).",
                path,
                session.sheet().row_count()
            )));
            workspace.session = Some(session);
        }
        Err(e) => {
            error!("Could not reopen last used sheet: {}", e);
            feedback_writer.write(SheetOperationFeedback::error(e.to_string()));
        }
    }
}
