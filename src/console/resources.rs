// src/console/resources.rs
use bevy::prelude::Resource;
use std::sync::mpsc::Receiver;
use std::sync::Mutex;

use crate::sheets::runner::BatchResult;

/// Lines read from stdin by the input thread.
#[derive(Resource)]
pub struct ConsoleInput {
    pub lines: Mutex<Receiver<String>>,
}

#[derive(Resource, Default)]
pub struct ConsoleState {
    /// Most recent finished batch, used by `retry`.
    pub last_batch: Option<BatchResult>,
}
