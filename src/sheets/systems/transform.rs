// src/sheets/systems/transform.rs
//! Runs transformation batches on the Tokio runtime. Each row hops to the
//! main thread to read its inputs, executes on a blocking worker, then hops
//! back to commit, flush and report before the next row starts.

use bevy::prelude::*;
use bevy_tokio_tasks::TokioTasksRuntime;
use std::sync::Arc;

use crate::sheets::{
    events::{
        RequestCancelRun, RequestRunAll, RequestRunTransformation, RunCompletedEvent, RunProgressEvent,
        SheetDataModifiedInRegistryEvent, SheetOperationFeedback,
    },
    resources::SheetWorkspace,
    runner::{CancellationToken, RowStep, RunPlan, RunRequest, RunResult, TransformationRunner},
};
use crate::transformations::TransformationError;

/// Queues the run-all batches. They start one at a time from
/// [`advance_run_queue`], since a consumer may not start while its producer runs.
pub fn handle_run_all_request(
    mut events: EventReader<RequestRunAll>,
    mut workspace: ResMut<SheetWorkspace>,
    runner: Res<TransformationRunner>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
) {
    for _ in events.read() {
        let requests = match workspace.session() {
            Ok(session) => runner.run_all_requests(session.sheet()),
            Err(e) => {
                feedback_writer.write(SheetOperationFeedback::error(e.to_string()));
                continue;
            }
        };
        if requests.is_empty() {
            feedback_writer.write(SheetOperationFeedback::error("Nothing to run."));
            continue;
        }
        let order: Vec<&str> = requests.iter().map(|r| r.transformation.as_str()).collect();
        feedback_writer.write(SheetOperationFeedback::ok(format!("Queued: {}.", order.join(", "))));
        workspace.queued.extend(requests);
    }
}

/// Starts the next queued batch once nothing is running.
pub fn advance_run_queue(
    mut workspace: ResMut<SheetWorkspace>,
    mut run_writer: EventWriter<RequestRunTransformation>,
) {
    if workspace.session.is_none() || !workspace.runs.is_empty() {
        return;
    }
    if let Some(request) = workspace.queued.pop_front() {
        debug!("Starting queued '{}' ({} left).", request.transformation, workspace.queued.len());
        run_writer.write(RequestRunTransformation {
            transformation: request.transformation,
            rows: request.rows.into_iter().collect(),
            policy: request.policy,
        });
    }
}

pub fn handle_run_transformation_request(
    mut events: EventReader<RequestRunTransformation>,
    mut workspace: ResMut<SheetWorkspace>,
    runner: Res<TransformationRunner>,
    runtime: Res<TokioTasksRuntime>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
) {
    for event in events.read() {
        let request = RunRequest::new(event.transformation.clone(), event.rows.iter().copied())
            .with_policy(event.policy);
        let plan = match workspace.session_mut().and_then(|s| runner.plan(s, &request)) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Run request rejected: {}", e);
                feedback_writer.write(SheetOperationFeedback::error(e.to_string()));
                continue;
            }
        };
        let token = CancellationToken::new();
        workspace.runs.insert(plan.run_id(), token.clone());
        feedback_writer.write(SheetOperationFeedback::ok(format!(
            "Started '{}' on {} row(s).",
            event.transformation,
            plan.len()
        )));
        spawn_batch(&runtime, Arc::new(plan), token);
    }
}

fn spawn_batch(runtime: &TokioTasksRuntime, plan: Arc<RunPlan>, token: CancellationToken) {
    runtime.spawn_background_task(move |mut ctx| async move {
        let total = plan.len();
        let name = plan.transformation().name().to_string();
        let mut results: Vec<RunResult> = Vec::with_capacity(total);
        let mut last_flush_error = None;

        for slot in 0..total {
            let result = if token.is_cancelled() {
                plan.cancelled(slot)
            } else {
                let step_plan = Arc::clone(&plan);
                let step = ctx
                    .run_on_main_thread(move |world_ctx| {
                        match world_ctx.world.resource::<SheetWorkspace>().session.as_ref() {
                            Some(session) => step_plan.begin_row(session, slot),
                            None => RowStep::Finished(step_plan.removed(slot)),
                        }
                    })
                    .await;
                match step {
                    RowStep::Finished(result) => result,
                    RowStep::Execute { inputs, signature } => {
                        let unit = Arc::clone(plan.transformation());
                        let outcome = tokio::task::spawn_blocking(move || unit.execute(&inputs))
                            .await
                            .unwrap_or_else(|e| {
                                Err(TransformationError::ExternalService(format!("worker failed: {}", e)))
                            });
                        let commit_plan = Arc::clone(&plan);
                        ctx.run_on_main_thread(move |world_ctx| {
                            let mut workspace = world_ctx.world.resource_mut::<SheetWorkspace>();
                            match workspace.session.as_mut() {
                                Some(session) => commit_plan.commit_row(session, slot, outcome, signature),
                                None => commit_plan.removed(slot),
                            }
                        })
                        .await
                    }
                }
            };

            let progress = RunProgressEvent {
                transformation: name.clone(),
                result: result.clone(),
                done: slot + 1,
                total,
            };
            let flush_error = ctx
                .run_on_main_thread(move |world_ctx| {
                    let flush_error = world_ctx
                        .world
                        .resource_mut::<SheetWorkspace>()
                        .session
                        .as_mut()
                        .and_then(|session| session.flush().err());
                    world_ctx.world.send_event(SheetDataModifiedInRegistryEvent);
                    world_ctx.world.send_event(progress);
                    flush_error
                })
                .await;
            if flush_error.is_some() {
                last_flush_error = flush_error;
            }
            results.push(result);
        }

        let finish_plan = Arc::clone(&plan);
        ctx.run_on_main_thread(move |world_ctx| {
            let batch = {
                let mut workspace = world_ctx.world.resource_mut::<SheetWorkspace>();
                workspace.runs.remove(&finish_plan.run_id());
                finish_plan.finish(workspace.session.as_mut(), results, last_flush_error)
            };
            world_ctx.world.send_event(RunCompletedEvent { result: batch });
        })
        .await;
    });
}

/// Flags running batches to stop after their current row and drops matching
/// queued ones.
pub fn handle_cancel_run_request(
    mut events: EventReader<RequestCancelRun>,
    mut workspace: ResMut<SheetWorkspace>,
    mut feedback_writer: EventWriter<SheetOperationFeedback>,
) {
    for event in events.read() {
        let queued_before = workspace.queued.len();
        match &event.transformation {
            None => workspace.queued.clear(),
            Some(name) => workspace.queued.retain(|r| &r.transformation != name),
        }
        let dropped = queued_before - workspace.queued.len();
        if dropped > 0 {
            info!("Dropped {} queued batch(es).", dropped);
        }
        let targets: Vec<_> = match &event.transformation {
            None => workspace.runs.values().cloned().collect(),
            Some(name) => workspace
                .session
                .as_ref()
                .and_then(|s| s.run_of(name))
                .and_then(|id| workspace.runs.get(&id).cloned())
                .into_iter()
                .collect(),
        };
        if targets.is_empty() {
            if dropped > 0 {
                feedback_writer.write(SheetOperationFeedback::ok(format!(
                    "Dropped {} queued batch(es).",
                    dropped
                )));
                continue;
            }
            feedback_writer.write(SheetOperationFeedback::error("No matching batch is running."));
            continue;
        }
        for token in &targets {
            token.cancel();
        }
        info!("Cancellation requested for {} batch(es).", targets.len());
        feedback_writer.write(SheetOperationFeedback::ok(format!(
            "Cancelling {} batch(es) after the current row.",
            targets.len()
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::column_registry::TransformationBinding;
    use crate::sheets::definitions::{CellMap, CellValue};
    use crate::sheets::persistence::memory::MemoryPersistence;
    use crate::sheets::resources::SheetSession;
    use crate::sheets::runner::RunId;
    use crate::sheets::sheet::Sheet;
    use crate::transformations::testing::StubTransformation;
    use crate::transformations::{Transformation, TransformationRegistry};
    use std::path::PathBuf;

    fn app_with_bindings() -> App {
        let scrape = StubTransformation::new("scrape", &["JobURL"], &["ScrapedText"]);
        let brief = StubTransformation::new("brief", &["ScrapedText"], &["Summary"]);
        let mut sheet = Sheet::with_columns(["JobURL", "ScrapedText"]).unwrap();
        sheet
            .add_row(CellMap::from([("JobURL".to_string(), CellValue::from("http://jobs/0"))]))
            .unwrap();
        for unit in [&scrape, &brief] {
            sheet
                .bind_transformation(unit, TransformationBinding::identity(unit.inputs(), unit.outputs()))
                .unwrap();
        }
        let mut registry = TransformationRegistry::new();
        registry.register(scrape);
        registry.register(brief);

        let mut app = App::new();
        app.insert_resource(SheetWorkspace {
            session: Some(SheetSession::new(
                sheet,
                Some(PathBuf::from("jobs.csv")),
                Arc::new(MemoryPersistence::default()),
            )),
            ..default()
        });
        app.insert_resource(TransformationRunner::new(registry));
        app.add_event::<SheetOperationFeedback>()
            .add_event::<RequestRunAll>()
            .add_event::<RequestRunTransformation>()
            .add_event::<RequestCancelRun>();
        app.add_systems(
            Update,
            (handle_run_all_request, advance_run_queue, handle_cancel_run_request).chain(),
        );
        app
    }

    fn started(app: &App) -> Vec<String> {
        let events = app.world().resource::<Events<RequestRunTransformation>>();
        events.get_cursor().read(events).map(|e| e.transformation.clone()).collect()
    }

    fn queued(app: &App) -> Vec<String> {
        let workspace = app.world().resource::<SheetWorkspace>();
        workspace.queued.iter().map(|r| r.transformation.clone()).collect()
    }

    #[test]
    fn run_all_starts_producers_first_and_waits_for_idle() {
        let mut app = app_with_bindings();
        app.world_mut().send_event(RequestRunAll);
        app.update();
        assert_eq!(started(&app), vec!["scrape"]);
        assert_eq!(queued(&app), vec!["brief"]);

        // a batch is running, so the queue holds
        app.world_mut()
            .resource_mut::<SheetWorkspace>()
            .runs
            .insert(RunId(1), CancellationToken::new());
        app.update();
        assert_eq!(queued(&app), vec!["brief"]);

        app.world_mut().resource_mut::<SheetWorkspace>().runs.clear();
        app.update();
        assert!(queued(&app).is_empty());
        assert_eq!(started(&app), vec!["brief"]);
    }

    #[test]
    fn cancel_all_drops_the_queue() {
        let mut app = app_with_bindings();
        let token = CancellationToken::new();
        app.world_mut()
            .resource_mut::<SheetWorkspace>()
            .runs
            .insert(RunId(1), token.clone());
        app.world_mut().send_event(RequestRunAll);
        app.update();
        assert_eq!(queued(&app), vec!["scrape", "brief"]);

        app.world_mut().send_event(RequestCancelRun::default());
        app.update();
        assert!(queued(&app).is_empty());
        assert!(token.is_cancelled());
    }
}
