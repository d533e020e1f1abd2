// src/sheets/systems/io.rs
use bevy::app::AppExit;
use bevy::prelude::*;
use std::path::Path;
use std::sync::Arc;

use crate::settings::{io::save_settings_to_file, AppSettings};
use crate::sheets::{
    events::{
        RequestAppExit, RequestCreateSheet, RequestExportSheet, RequestLoadSheet, RequestSaveSheet,
        SheetDataModifiedInRegistryEvent, SheetOperationFeedback,
    },
    persistence::{
        backup, create_new_sheet, detect_format, xlsx_export, CsvPersistence, SheetFormat,
        SheetPersistence,
    },
    resources::{SheetSession, SheetWorkspace},
};

/// Updates the last-used pointer and persists the settings when it changed.
fn remember_last_used(settings: &mut AppSettings, path: &Path) {
    if settings.last_used_file.as_deref() == Some(path) {
        return;
    }
    settings.last_used_file = Some(path.to_path_buf());
    if let Err(e) = save_settings_to_file(settings) {
        error!("Failed to record last used file {:?}: {}", path, e);
    }
}

/// Replaces the active session, cancelling batches that still target the old one.
fn install_session(
    workspace: &mut SheetWorkspace,
    session: SheetSession,
    feedback_writer: &mut EventWriter<SheetOperationFeedback>,
) {
    let cancelled = workspace.runs.len();
    if let Some(mut previous) = workspace.replace_session(session) {
        if let Err(e) = previous.flush() {
            feedback_writer.write(SheetOperationFeedback::error(format!(
                "Unsaved changes of the previous sheet could not be written: {}",
                e
            )));
        }
    }
    if cancelled > 0 {
        warn!("Cancelled {} running batch(es) of the previous sheet.", cancelled);
    }
}

pub fn handle_load_sheet_request(
    mut events: EventReader<RequestLoadSheet>,
    mut workspace: ResMut<SheetWorkspace>,
    mut settings: ResMut<AppSettings>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        match SheetSession::open(&event.path, Arc::new(CsvPersistence)) {
            Ok(session) => {
                let summary = format!(
                    "Opened {:?} ({} columns, {} rows).",
                    event.path,
                    session.sheet().columns().len(),
                    session.sheet().row_count()
                );
                install_session(&mut workspace, session, &mut feedback_writer);
                remember_last_used(&mut settings, &event.path);
                info!("{}", summary);
                feedback_writer.write(SheetOperationFeedback::ok(summary));
                data_modified_writer.write(SheetDataModifiedInRegistryEvent);
            }
            Err(e) => {
                error!("Load failed: {}", e);
                feedback_writer.write(SheetOperationFeedback::error(e.to_string()));
            }
        }
    }
}

pub fn handle_create_sheet_request(
    mut events: EventReader<RequestCreateSheet>,
    mut workspace: ResMut<SheetWorkspace>,
    mut settings: ResMut<AppSettings>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
    mut data_modified_writer: EventWriter<SheetDataModifiedInRegistryEvent>,
) {
    for event in events.read() {
        let persistence: Arc<dyn SheetPersistence> = Arc::new(CsvPersistence);
        match create_new_sheet(persistence.as_ref(), &event.path) {
            Ok(sheet) => {
                let session = SheetSession::new(sheet, Some(event.path.clone()), persistence);
                install_session(&mut workspace, session, &mut feedback_writer);
                remember_last_used(&mut settings, &event.path);
                feedback_writer.write(SheetOperationFeedback::ok(format!(
                    "Created new sheet {:?}.",
                    event.path
                )));
                data_modified_writer.write(SheetDataModifiedInRegistryEvent);
            }
            Err(e) => {
                error!("Create failed: {}", e);
                feedback_writer.write(SheetOperationFeedback::error(e.to_string()));
            }
        }
    }
}

pub fn handle_save_sheet_request(
    mut events: EventReader<RequestSaveSheet>,
    mut workspace: ResMut<SheetWorkspace>,
    mut settings: ResMut<AppSettings>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
) {
    for event in events.read() {
        let session = match workspace.session_mut() {
            Ok(session) => session,
            Err(e) => {
                feedback_writer.write(SheetOperationFeedback::error(e.to_string()));
                continue;
            }
        };
        let Some(target) = event.path.clone().or_else(|| session.path().map(Path::to_path_buf)) else {
            feedback_writer.write(SheetOperationFeedback::error("The sheet has no file yet; give a path."));
            continue;
        };
        if detect_format(&target).ok() == Some(SheetFormat::Excel) {
            feedback_writer.write(SheetOperationFeedback::error(format!(
                "{:?} is an Excel file; use export for .xlsx copies.",
                target
            )));
            continue;
        }
        match session.save_as(&target) {
            Ok(()) => {
                remember_last_used(&mut settings, &target);
                feedback_writer.write(SheetOperationFeedback::ok(format!("Saved {:?}.", target)));
            }
            Err(e) => {
                error!("Save failed: {}", e);
                feedback_writer.write(SheetOperationFeedback::error(e.to_string()));
            }
        }
    }
}

pub fn handle_export_sheet_request(
    mut events: EventReader<RequestExportSheet>,
    workspace: Res<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
) {
    for event in events.read() {
        let result = workspace
            .session()
            .map_err(|e| e.to_string())
            .and_then(|s| xlsx_export::export_xlsx(s.sheet(), &event.path).map_err(|e| e.to_string()));
        match result {
            Ok(()) => {
                feedback_writer.write(SheetOperationFeedback::ok(format!("Exported to {:?}.", event.path)));
            }
            Err(message) => {
                error!("Export failed: {}", message);
                feedback_writer.write(SheetOperationFeedback::error(message));
            }
        }
    }
}

/// Flushes the active session once per frame when it has unsaved edits. A
/// failure is reported once and retried on the next edit.
pub fn auto_save_dirty_sheet(
    mut workspace: ResMut<SheetWorkspace>,
    mut data_modified: EventReader<SheetDataModifiedInRegistryEvent>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
) {
    let edited = data_modified.read().count() > 0;
    let Some(session) = workspace.session.as_mut() else {
        return;
    };
    if !edited || !session.is_dirty() {
        return;
    }
    match session.flush() {
        Ok(true) => trace!("Auto-saved {:?}.", session.path()),
        Ok(false) => {}
        Err(e) => {
            feedback_writer.write(SheetOperationFeedback::error(format!(
                "Auto-save failed, changes kept in memory: {}",
                e
            )));
        }
    }
}

/// Cancels running batches, flushes, writes the exit backup and quits.
pub fn handle_app_exit_request(
    mut request_exit_reader: EventReader<RequestAppExit>,
    mut workspace: ResMut<SheetWorkspace>,
    settings: Res<AppSettings>,
    mut app_exit_writer: EventWriter<AppExit>,
) {
    if request_exit_reader.read().next().is_none() {
        return;
    }
    let cancelled = workspace.cancel_all();
    if cancelled > 0 {
        info!("Cancelled {} running batch(es) before exit.", cancelled);
    }
    if let Some(session) = workspace.session.as_mut() {
        if let Err(e) = session.flush() {
            error!("Final save failed: {}", e);
        }
        if settings.backup_on_exit {
            if let Some(path) = session.path().map(Path::to_path_buf) {
                if let Err(e) = backup::write_backup(&path, session.sheet()) {
                    error!("Backup on exit failed: {}", e);
                }
            }
        }
    }
    app_exit_writer.write(AppExit::Success);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::definitions::CellMap;
    use crate::sheets::persistence::memory::MemoryPersistence;
    use crate::sheets::sheet::Sheet;
    use std::path::PathBuf;

    fn app_with(store: &MemoryPersistence) -> App {
        let mut app = App::new();
        let session = SheetSession::new(
            Sheet::with_columns(["CompanyName"]).unwrap(),
            Some(PathBuf::from("jobs.csv")),
            Arc::new(store.clone()),
        );
        app.insert_resource(SheetWorkspace {
            session: Some(session),
            ..default()
        });
        app.add_event::<SheetDataModifiedInRegistryEvent>()
            .add_event::<SheetOperationFeedback>()
            .add_systems(Update, auto_save_dirty_sheet);
        app
    }

    fn add_row(app: &mut App) {
        {
            let mut workspace = app.world_mut().resource_mut::<SheetWorkspace>();
            workspace.session_mut().unwrap().add_row(CellMap::new()).unwrap();
        }
        app.world_mut().send_event(SheetDataModifiedInRegistryEvent);
    }

    #[test]
    fn edits_in_one_frame_are_saved_once() {
        let store = MemoryPersistence::default();
        let mut app = app_with(&store);
        add_row(&mut app);
        add_row(&mut app);
        app.update();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.saves()[0].row_count(), 2);

        app.update();
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn failed_auto_save_is_reported_and_retried() {
        let store = MemoryPersistence::default();
        let mut app = app_with(&store);
        store.set_failing(true);
        add_row(&mut app);
        app.update();
        assert_eq!(store.save_count(), 0);
        let events = app.world().resource::<Events<SheetOperationFeedback>>();
        assert!(events.get_cursor().read(events).any(|f| f.is_error));

        store.set_failing(false);
        add_row(&mut app);
        app.update();
        assert_eq!(store.saves().last().map(|s| s.row_count()), Some(2));
    }
}
