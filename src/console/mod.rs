// src/console/mod.rs
//! Line-oriented front-end for the headless app: a reader thread forwards
//! stdin lines, and systems turn them into sheet requests.

pub mod commands;
pub mod resources;
pub mod systems;

use bevy::prelude::*;
use std::io::BufRead;
use std::sync::mpsc;
use std::sync::Mutex;

use crate::sheets::plugin::SheetSystemSet;
use resources::{ConsoleInput, ConsoleState};

pub struct ConsolePlugin;

impl Plugin for ConsolePlugin {
    fn build(&self, app: &mut App) {
        let (sender, receiver) = mpsc::channel::<String>();
        let spawned = std::thread::Builder::new()
            .name("console-input".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(line) => {
                            if sender.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to read console input: {}", e);
                            break;
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            error!("Could not start console input thread: {}", e);
        }

        app.insert_resource(ConsoleInput {
            lines: Mutex::new(receiver),
        });
        app.init_resource::<ConsoleState>();
        app.add_systems(
            Update,
            systems::process_console_input.in_set(SheetSystemSet::UserInput),
        );
        app.add_systems(
            Update,
            systems::report_console_feedback.after(SheetSystemSet::FileOperations),
        );
        println!("JobSheet console. Type 'help' for commands.");
        info!("ConsolePlugin initialized.");
    }
}
