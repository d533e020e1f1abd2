// src/sheets/systems/mod.rs

pub mod io;
pub mod logic;
pub mod transform;
