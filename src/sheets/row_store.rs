// src/sheets/row_store.rs
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::definitions::{CellValue, RowId};
use super::error::SheetError;

/// One tracked record. Holds a cell for every column of the owning registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: RowId,
    cells: HashMap<String, CellValue>,
    /// Input signature of the last successful run, per transformation id.
    signatures: BTreeMap<String, String>,
}

impl Row {
    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn cell(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.cells.keys()
    }

    pub fn signature(&self, transformation_id: &str) -> Option<&str> {
        self.signatures.get(transformation_id).map(String::as_str)
    }

    pub(crate) fn signatures(&self) -> &BTreeMap<String, String> {
        &self.signatures
    }
}

/// Ordered rows. Structural consistency with the column registry is kept by
/// [`super::sheet::Sheet`], which is the only caller of the mutating methods.
#[derive(Debug, Clone, Default)]
pub struct RowStore {
    rows: Vec<Row>,
    next_id: u64,
}

impl RowStore {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn position_of(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<(), SheetError> {
        if index < self.rows.len() {
            Ok(())
        } else {
            Err(SheetError::IndexOutOfRange {
                index,
                len: self.rows.len(),
            })
        }
    }

    fn allocate_id(&mut self) -> RowId {
        let id = RowId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Appends a row with exactly the given cells and returns its index.
    pub(crate) fn push(&mut self, cells: HashMap<String, CellValue>) -> usize {
        self.push_with_signatures(cells, BTreeMap::new())
    }

    pub(crate) fn push_with_signatures(
        &mut self,
        cells: HashMap<String, CellValue>,
        signatures: BTreeMap<String, String>,
    ) -> usize {
        let id = self.allocate_id();
        self.rows.push(Row { id, cells, signatures });
        self.rows.len() - 1
    }

    /// Inserts a copy of row `index` right below it, with `reset` cells unset.
    pub(crate) fn duplicate(&mut self, index: usize, reset: &[String]) -> Result<usize, SheetError> {
        self.check_index(index)?;
        let id = self.allocate_id();
        let source = &self.rows[index];
        let mut cells = source.cells.clone();
        for column in reset {
            if let Some(cell) = cells.get_mut(column) {
                *cell = CellValue::Unset;
            }
        }
        let copy = Row {
            id,
            cells,
            signatures: source.signatures.clone(),
        };
        self.rows.insert(index + 1, copy);
        Ok(index + 1)
    }

    /// Removes the given rows. All indices are validated first; on error
    /// nothing is removed. Returns how many distinct rows were removed.
    pub(crate) fn remove_many(&mut self, indices: &[usize]) -> Result<usize, SheetError> {
        let unique: BTreeSet<usize> = indices.iter().copied().collect();
        if let Some(&bad) = unique.iter().find(|&&i| i >= self.rows.len()) {
            return Err(SheetError::IndexOutOfRange {
                index: bad,
                len: self.rows.len(),
            });
        }
        for &index in unique.iter().rev() {
            self.rows.remove(index);
        }
        Ok(unique.len())
    }

    pub(crate) fn cell_mut(&mut self, index: usize, column: &str) -> Option<&mut CellValue> {
        self.rows.get_mut(index).and_then(|r| r.cells.get_mut(column))
    }

    pub(crate) fn set_signature(&mut self, index: usize, transformation_id: &str, signature: String) {
        if let Some(row) = self.rows.get_mut(index) {
            row.signatures.insert(transformation_id.to_string(), signature);
        }
    }

    pub(crate) fn add_column(&mut self, name: &str) {
        for row in &mut self.rows {
            row.cells.insert(name.to_string(), CellValue::Unset);
        }
    }

    pub(crate) fn rename_column(&mut self, old: &str, new: &str) {
        for row in &mut self.rows {
            if let Some(value) = row.cells.remove(old) {
                row.cells.insert(new.to_string(), value);
            }
        }
    }

    pub(crate) fn remove_column(&mut self, name: &str) {
        for row in &mut self.rows {
            row.cells.remove(name);
        }
    }

    pub(crate) fn forget_transformation(&mut self, transformation_id: &str) {
        for row in &mut self.rows {
            row.signatures.remove(transformation_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(values: &[&str]) -> RowStore {
        let mut store = RowStore::default();
        for v in values {
            store.push(HashMap::from([("Name".to_string(), CellValue::from(*v))]));
        }
        store
    }

    #[test]
    fn remove_many_is_all_or_nothing() {
        let mut store = store_with(&["a", "b", "c"]);
        assert_eq!(
            store.remove_many(&[0, 5]),
            Err(SheetError::IndexOutOfRange { index: 5, len: 3 })
        );
        assert_eq!(store.len(), 3);
        assert_eq!(store.remove_many(&[2, 0, 0]), Ok(2));
        assert_eq!(store.get(0).unwrap().cell("Name"), Some(&CellValue::from("b")));
    }

    #[test]
    fn duplicate_gets_fresh_id_below_source() {
        let mut store = store_with(&["a", "b"]);
        let original = store.get(0).unwrap().id();
        let idx = store.duplicate(0, &["Name".to_string()]).unwrap();
        assert_eq!(idx, 1);
        assert_ne!(store.get(1).unwrap().id(), original);
        assert_eq!(store.get(1).unwrap().cell("Name"), Some(&CellValue::Unset));
        assert_eq!(store.get(2).unwrap().cell("Name"), Some(&CellValue::from("b")));
        assert_eq!(store.position_of(original), Some(0));
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let mut store = store_with(&["a"]);
        let first = store.get(0).unwrap().id();
        store.remove_many(&[0]).unwrap();
        store.push(HashMap::new());
        assert_ne!(store.get(0).unwrap().id(), first);
        assert_eq!(store.position_of(first), None);
    }
}
