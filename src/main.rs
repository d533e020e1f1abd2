// src/main.rs

use bevy::{app::ScheduleRunnerPlugin, log::LogPlugin, prelude::*};
use bevy_tokio_tasks::TokioTasksPlugin;
use clap::Parser;
use std::time::Duration;

mod cli;
mod console;
mod settings;
mod sheets;
mod transformations;

use cli::Cli;
use console::ConsolePlugin;
use sheets::SheetsPlugin;

fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Could not read .env: {}", e);
        }
    }

    let cli = Cli::parse();
    if let Some(command) = cli.command {
        if let Err(e) = cli::dispatch(command) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 30.0))),
        )
        .add_plugins(LogPlugin {
            level: bevy::log::Level::INFO,
            filter: "bevy_tokio_tasks=warn,reqwest=warn,hyper=warn".to_string(),
            ..default()
        })
        .add_plugins(TokioTasksPlugin::default())
        .add_plugins(SheetsPlugin)
        .add_plugins(ConsolePlugin)
        .run();
}
