// src/sheets/mod.rs

pub mod column_registry;
pub mod condition;
pub mod definitions;
pub mod error;
pub mod events;
pub mod persistence;
pub mod plugin;
pub mod resources;
pub mod row_store;
pub mod runner;
pub mod sheet;

pub(crate) mod systems;

pub use definitions::{CellMap, CellValue, ColumnDataType, ColumnRole};
pub use error::{PersistenceError, SheetError};
pub use plugin::SheetsPlugin;
pub use resources::{SheetSession, SheetWorkspace};
pub use runner::{BatchResult, OverwritePolicy, RunRequest, TransformationRunner};
pub use sheet::Sheet;
