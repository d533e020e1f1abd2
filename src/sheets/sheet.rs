// src/sheets/sheet.rs
use bevy::log::{info, warn};
use std::collections::{BTreeMap, HashMap};

use super::column_registry::{ColumnRegistry, TransformationBinding};
use super::definitions::{CellMap, CellValue, ColumnDataType, ColumnRole, RowId};
use super::error::SheetError;
use super::row_store::RowStore;
use crate::transformations::Transformation;

/// Column registry and row store of one sheet, kept structurally consistent:
/// every row holds exactly one cell per registered column.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    columns: ColumnRegistry,
    rows: RowStore,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sheet with the given plain columns and no rows.
    pub fn with_columns<I, S>(names: I) -> Result<Self, SheetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sheet = Sheet::new();
        for name in names {
            sheet.add_column(name.as_ref(), ColumnRole::Plain)?;
        }
        Ok(sheet)
    }

    /// Rebuilds a sheet from persisted rows laid out in registry column order.
    pub(crate) fn from_parts(
        columns: ColumnRegistry,
        rows: Vec<(Vec<CellValue>, BTreeMap<String, String>)>,
    ) -> Self {
        let mut store = RowStore::default();
        for (values, signatures) in rows {
            let mut cells: HashMap<String, CellValue> = HashMap::with_capacity(columns.len());
            let mut values = values.into_iter();
            for def in columns.columns() {
                let value = values.next().unwrap_or_default().normalized_for(def.data_type);
                cells.insert(def.name.clone(), value);
            }
            store.push_with_signatures(cells, signatures);
        }
        Sheet { columns, rows: store }
    }

    pub fn columns(&self) -> &ColumnRegistry {
        &self.columns
    }

    pub fn rows(&self) -> &RowStore {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row_id(&self, index: usize) -> Option<RowId> {
        self.rows.get(index).map(|r| r.id())
    }

    pub fn position_of(&self, id: RowId) -> Option<usize> {
        self.rows.position_of(id)
    }

    // --- Column operations ---

    pub fn add_column(&mut self, name: &str, role: ColumnRole) -> Result<(), SheetError> {
        if let ColumnRole::Output { transformation } = &role {
            if let Some((other, _)) = self
                .columns
                .bindings()
                .iter()
                .find(|(id, b)| *id != transformation && b.outputs.iter().any(|o| o == name))
            {
                return Err(SheetError::ColumnConflict {
                    column: name.to_string(),
                    bound_to: other.clone(),
                });
            }
        }
        self.columns.add_column(name, role)?;
        self.rows.add_column(name);
        Ok(())
    }

    /// Renames a column in the registry, in every row and in every binding.
    /// Validation happens before anything is touched, so a failed rename
    /// leaves the sheet unchanged.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<(), SheetError> {
        self.columns.validate_rename(old, new)?;
        if old == new {
            return Ok(());
        }
        self.columns.apply_rename(old, new);
        self.rows.rename_column(old, new);
        info!("Renamed column '{}' to '{}'.", old, new);
        Ok(())
    }

    /// Removes a column. Returns the transformation bindings dropped with it
    /// (only possible with `force`).
    pub fn remove_column(&mut self, name: &str, force: bool) -> Result<Vec<String>, SheetError> {
        let dropped = self.columns.validate_remove(name, force)?;
        for id in &dropped {
            warn!("Removing column '{}' drops binding of transformation '{}'.", name, id);
            self.rows.forget_transformation(id);
        }
        self.columns.apply_remove(name, &dropped);
        self.rows.remove_column(name);
        Ok(dropped)
    }

    pub fn bind_output(&mut self, column: &str, transformation_id: &str) -> Result<(), SheetError> {
        self.columns.bind_output(column, transformation_id)
    }

    /// Binds `transformation` to sheet columns. The binding must provide one
    /// column per declared input and output.
    pub fn bind_transformation(
        &mut self,
        transformation: &dyn Transformation,
        binding: TransformationBinding,
    ) -> Result<(), SheetError> {
        let name = transformation.name();
        check_arity(name, "input", transformation.inputs().len(), binding.inputs.len())?;
        check_arity(name, "output", transformation.outputs().len(), binding.outputs.len())?;
        self.columns.bind_transformation(name, binding)
    }

    pub fn unbind_transformation(&mut self, transformation_id: &str) -> Option<TransformationBinding> {
        let removed = self.columns.unbind_transformation(transformation_id)?;
        self.rows.forget_transformation(transformation_id);
        Some(removed)
    }

    /// Changes a column's data type and re-normalises its cells.
    pub fn set_column_type(&mut self, column: &str, data_type: ColumnDataType) -> Result<(), SheetError> {
        self.columns.set_data_type(column, data_type)?;
        for index in 0..self.rows.len() {
            if let Some(cell) = self.rows.cell_mut(index, column) {
                *cell = std::mem::take(cell).normalized_for(data_type);
            }
        }
        Ok(())
    }

    /// Creates `column` as an output of `transformation_id` if it does not
    /// exist yet, otherwise claims it.
    pub(crate) fn ensure_output_column(&mut self, column: &str, transformation_id: &str) -> Result<(), SheetError> {
        if self.columns.contains(column) {
            self.columns.bind_output(column, transformation_id)
        } else {
            self.add_column(
                column,
                ColumnRole::Output {
                    transformation: transformation_id.to_string(),
                },
            )
        }
    }

    // --- Row operations ---

    pub fn get_cell(&self, row: usize, column: &str) -> Result<&CellValue, SheetError> {
        self.rows.check_index(row)?;
        self.columns.require(column)?;
        self.rows
            .get(row)
            .and_then(|r| r.cell(column))
            .ok_or_else(|| SheetError::UnknownColumn(column.to_string()))
    }

    pub fn set_cell(&mut self, row: usize, column: &str, value: impl Into<CellValue>) -> Result<(), SheetError> {
        self.rows.check_index(row)?;
        let data_type = self.columns.require(column)?.data_type;
        let cell = self
            .rows
            .cell_mut(row, column)
            .ok_or_else(|| SheetError::UnknownColumn(column.to_string()))?;
        *cell = value.into().normalized_for(data_type);
        Ok(())
    }

    /// Writes several cells of one row. Every column is checked before the
    /// first write, so either all values land or none do.
    pub fn set_cells(&mut self, row: usize, values: Vec<(String, CellValue)>) -> Result<(), SheetError> {
        self.rows.check_index(row)?;
        let mut typed = Vec::with_capacity(values.len());
        for (column, value) in values {
            let data_type = self.columns.require(&column)?.data_type;
            typed.push((column, value.normalized_for(data_type)));
        }
        for (column, value) in typed {
            if let Some(cell) = self.rows.cell_mut(row, &column) {
                *cell = value;
            }
        }
        Ok(())
    }

    /// Appends a row. Columns missing from `initial_values` start unset; keys
    /// that are not registered columns are rejected.
    pub fn add_row(&mut self, initial_values: CellMap) -> Result<usize, SheetError> {
        if let Some(unknown) = initial_values.keys().find(|k| !self.columns.contains(k)) {
            return Err(SheetError::UnknownColumn(unknown.clone()));
        }
        let mut initial_values = initial_values;
        let cells: HashMap<String, CellValue> = self
            .columns
            .columns()
            .iter()
            .map(|def| {
                let value = initial_values
                    .remove(&def.name)
                    .unwrap_or_default()
                    .normalized_for(def.data_type);
                (def.name.clone(), value)
            })
            .collect();
        Ok(self.rows.push(cells))
    }

    /// Copies a row below itself; cells in `reset_columns` start unset in the
    /// copy. Unknown reset names are ignored.
    pub fn duplicate_row(&mut self, row: usize, reset_columns: &[String]) -> Result<usize, SheetError> {
        self.rows.duplicate(row, reset_columns)
    }

    pub fn delete_rows(&mut self, indices: &[usize]) -> Result<usize, SheetError> {
        self.rows.remove_many(indices)
    }

    /// Unsets the listed cells of one row. Every column is checked first.
    pub fn clear_cells(&mut self, row: usize, columns: &[String]) -> Result<(), SheetError> {
        self.rows.check_index(row)?;
        for column in columns {
            self.columns.require(column)?;
        }
        for column in columns {
            if let Some(cell) = self.rows.cell_mut(row, column) {
                *cell = CellValue::Unset;
            }
        }
        Ok(())
    }

    pub(crate) fn set_signature(&mut self, row: usize, transformation_id: &str, signature: String) {
        self.rows.set_signature(row, transformation_id, signature);
    }

    /// Cells of one row in column order.
    pub fn row_values(&self, row: usize) -> Option<Vec<CellValue>> {
        let stored = self.rows.get(row)?;
        Some(
            self.columns
                .names()
                .map(|name| stored.cell(name).cloned().unwrap_or_default())
                .collect(),
        )
    }

    /// All cells, row by row, in column order.
    pub fn grid(&self) -> Vec<Vec<CellValue>> {
        (0..self.rows.len())
            .filter_map(|row| self.row_values(row))
            .collect()
    }
}

fn check_arity(transformation: &str, side: &'static str, expected: usize, actual: usize) -> Result<(), SheetError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SheetError::BindingArity {
            transformation: transformation.to_string(),
            side,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
#[path = "sheet_tests.rs"]
mod sheet_tests;
