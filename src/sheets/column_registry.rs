// src/sheets/column_registry.rs
use bevy::log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::RowCondition;
use super::definitions::{ColumnDataType, ColumnDefinition, ColumnRole};
use super::error::SheetError;

/// Columns a transformation reads and writes in one sheet. `inputs[i]` feeds
/// the transformation's i-th declared input, `outputs[i]` receives its i-th
/// declared output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationBinding {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<RowCondition>,
}

impl TransformationBinding {
    /// Binding that maps every declared column onto a sheet column of the same name.
    pub fn identity(inputs: &[String], outputs: &[String]) -> Self {
        TransformationBinding {
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            condition: None,
        }
    }

    pub fn references(&self, column: &str) -> bool {
        self.inputs.iter().any(|c| c == column)
            || self.outputs.iter().any(|c| c == column)
            || self
                .condition
                .as_ref()
                .is_some_and(|cond| cond.columns.iter().any(|c| c == column))
    }

    /// Every column the binding touches: inputs, outputs and condition columns.
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .chain(self.condition.iter().flat_map(|c| c.columns.iter()))
    }

    fn rename_column(&mut self, old: &str, new: &str) {
        for column in self
            .inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .filter(|c| c.as_str() == old)
        {
            *column = new.to_string();
        }
        if let Some(condition) = &mut self.condition {
            condition.rename_column(old, new);
        }
    }
}

/// Ordered set of columns plus the transformation bindings that refer to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRegistry {
    columns: Vec<ColumnDefinition>,
    bindings: BTreeMap<String, TransformationBinding>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted parts, dropping bindings whose
    /// columns no longer exist.
    pub(crate) fn from_parts(
        columns: Vec<ColumnDefinition>,
        bindings: BTreeMap<String, TransformationBinding>,
    ) -> Self {
        let mut registry = ColumnRegistry {
            columns,
            bindings: BTreeMap::new(),
        };
        for (id, binding) in bindings {
            let dangling = binding
                .inputs
                .iter()
                .chain(binding.condition.iter().flat_map(|c| c.columns.iter()))
                .find(|c| !registry.contains(c))
                .cloned();
            match dangling {
                Some(column) => debug!(
                    "Dropping binding '{}' on load: column '{}' no longer exists.",
                    id, column
                ),
                None => {
                    registry.bindings.insert(id, binding);
                }
            }
        }
        registry
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&ColumnDefinition, SheetError> {
        self.get(name)
            .ok_or_else(|| SheetError::UnknownColumn(name.to_string()))
    }

    pub fn data_type(&self, name: &str) -> Option<ColumnDataType> {
        self.get(name).map(|c| c.data_type)
    }

    pub fn binding(&self, transformation_id: &str) -> Option<&TransformationBinding> {
        self.bindings.get(transformation_id)
    }

    pub fn bindings(&self) -> &BTreeMap<String, TransformationBinding> {
        &self.bindings
    }

    /// Bound transformation ids, each placed after the bindings that produce
    /// its input or condition columns. Ties and cycles fall back to name order.
    pub fn run_order(&self) -> Vec<&str> {
        let mut pending: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        let mut order = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let waits_on_pending = |id: &str| {
                let binding = &self.bindings[id];
                binding
                    .inputs
                    .iter()
                    .chain(binding.condition.iter().flat_map(|c| c.columns.iter()))
                    .any(|column| {
                        pending.iter().any(|other| {
                            *other != id && self.bindings[*other].outputs.contains(column)
                        })
                    })
            };
            let next = pending.iter().position(|id| !waits_on_pending(*id)).unwrap_or(0);
            order.push(pending.remove(next));
        }
        order
    }

    /// The transformation that owns `column` as an output, if any.
    pub fn producer_of(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(|c| c.role.producer())
    }

    pub(crate) fn validate_new_name(&self, name: &str) -> Result<(), SheetError> {
        if name.trim().is_empty() || name != name.trim() {
            return Err(SheetError::InvalidColumnName(name.to_string()));
        }
        if self.contains(name) {
            return Err(SheetError::DuplicateColumn(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn add_column(&mut self, name: &str, role: ColumnRole) -> Result<(), SheetError> {
        self.validate_new_name(name)?;
        self.columns.push(ColumnDefinition::new(name, role));
        info!("Added column '{}'.", name);
        Ok(())
    }

    pub(crate) fn validate_rename(&self, old: &str, new: &str) -> Result<(), SheetError> {
        self.require(old)?;
        if old == new {
            return Ok(());
        }
        self.validate_new_name(new)
    }

    /// Renames the column and rewrites every binding that refers to it.
    /// Callers validate with [`Self::validate_rename`] first.
    pub(crate) fn apply_rename(&mut self, old: &str, new: &str) {
        if let Some(column) = self.columns.iter_mut().find(|c| c.name == old) {
            column.name = new.to_string();
        }
        for binding in self.bindings.values_mut() {
            binding.rename_column(old, new);
        }
    }

    /// Transformations whose binding (or output role) would be broken by removing `name`.
    pub(crate) fn users_of(&self, name: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, binding)| binding.references(name))
            .map(|(id, _)| id.clone())
            .collect();
        if let Some(producer) = self.producer_of(name) {
            if !users.iter().any(|u| u == producer) {
                users.push(producer.to_string());
            }
        }
        users
    }

    /// Checks that `name` can be removed; with `force`, returns the bindings
    /// that will be dropped alongside it.
    pub(crate) fn validate_remove(&self, name: &str, force: bool) -> Result<Vec<String>, SheetError> {
        self.require(name)?;
        let users = self.users_of(name);
        match users.first() {
            Some(transformation) if !force => Err(SheetError::ColumnInUse {
                column: name.to_string(),
                transformation: transformation.clone(),
            }),
            _ => Ok(users),
        }
    }

    pub(crate) fn apply_remove(&mut self, name: &str, dropped_bindings: &[String]) {
        for id in dropped_bindings {
            self.unbind_transformation(id);
        }
        self.columns.retain(|c| c.name != name);
        info!("Removed column '{}'.", name);
    }

    /// Marks `column` as produced by `transformation_id`.
    pub fn bind_output(&mut self, column: &str, transformation_id: &str) -> Result<(), SheetError> {
        let definition = self
            .columns
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| SheetError::UnknownColumn(column.to_string()))?;
        match &definition.role {
            ColumnRole::Output { transformation } if transformation != transformation_id => {
                Err(SheetError::ColumnConflict {
                    column: column.to_string(),
                    bound_to: transformation.clone(),
                })
            }
            _ => {
                definition.role = ColumnRole::Output {
                    transformation: transformation_id.to_string(),
                };
                Ok(())
            }
        }
    }

    /// Validates a binding for `transformation_id` without changing anything.
    pub(crate) fn validate_binding(
        &self,
        transformation_id: &str,
        binding: &TransformationBinding,
    ) -> Result<(), SheetError> {
        for column in binding
            .inputs
            .iter()
            .chain(binding.condition.iter().flat_map(|c| c.columns.iter()))
        {
            self.require(column)?;
        }
        for column in &binding.outputs {
            if let Some(owner) = self.producer_of(column) {
                if owner != transformation_id {
                    return Err(SheetError::ColumnConflict {
                        column: column.clone(),
                        bound_to: owner.to_string(),
                    });
                }
            }
            if let Some((other, _)) = self
                .bindings
                .iter()
                .find(|(id, b)| id.as_str() != transformation_id && b.outputs.contains(column))
            {
                return Err(SheetError::ColumnConflict {
                    column: column.clone(),
                    bound_to: other.clone(),
                });
            }
        }
        Ok(())
    }

    /// Installs (or replaces) the binding for `transformation_id` and updates
    /// column roles. Output columns that do not exist yet are created by the
    /// runner on the first successful row.
    pub(crate) fn bind_transformation(
        &mut self,
        transformation_id: &str,
        binding: TransformationBinding,
    ) -> Result<(), SheetError> {
        self.validate_binding(transformation_id, &binding)?;
        if self.bindings.contains_key(transformation_id) {
            self.unbind_transformation(transformation_id);
        }
        for column in &binding.outputs {
            if self.contains(column) {
                self.bind_output(column, transformation_id)?;
            }
        }
        for column in &binding.inputs {
            if let Some(def) = self.columns.iter_mut().find(|c| &c.name == column) {
                if def.role == ColumnRole::Plain {
                    def.role = ColumnRole::Input;
                }
            }
        }
        info!(
            "Bound transformation '{}' (inputs: {:?}, outputs: {:?}).",
            transformation_id, binding.inputs, binding.outputs
        );
        self.bindings.insert(transformation_id.to_string(), binding);
        Ok(())
    }

    /// Drops the binding for `transformation_id` and releases the roles it held.
    pub(crate) fn unbind_transformation(&mut self, transformation_id: &str) -> Option<TransformationBinding> {
        let removed = self.bindings.remove(transformation_id)?;
        for def in self.columns.iter_mut() {
            if def.role.producer() == Some(transformation_id) {
                def.role = ColumnRole::Plain;
            }
        }
        for column in &removed.inputs {
            let still_input = self.bindings.values().any(|b| b.inputs.contains(column));
            if let Some(def) = self.columns.iter_mut().find(|c| &c.name == column) {
                if def.role == ColumnRole::Input && !still_input {
                    def.role = ColumnRole::Plain;
                }
            }
        }
        info!("Unbound transformation '{}'.", transformation_id);
        Some(removed)
    }

    pub(crate) fn set_data_type(&mut self, column: &str, data_type: ColumnDataType) -> Result<(), SheetError> {
        let def = self
            .columns
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| SheetError::UnknownColumn(column.to_string()))?;
        def.data_type = data_type;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(names: &[&str]) -> ColumnRegistry {
        let mut reg = ColumnRegistry::new();
        for name in names {
            reg.add_column(name, ColumnRole::Plain).unwrap();
        }
        reg
    }

    fn scrape_binding() -> TransformationBinding {
        TransformationBinding::identity(&["JobURL".to_string()], &["ScrapedText".to_string()])
    }

    #[test]
    fn add_rejects_duplicates_and_blank_names() {
        let mut reg = registry(&["CompanyName"]);
        assert_eq!(
            reg.add_column("CompanyName", ColumnRole::Plain),
            Err(SheetError::DuplicateColumn("CompanyName".into()))
        );
        assert!(matches!(
            reg.add_column("  ", ColumnRole::Plain),
            Err(SheetError::InvalidColumnName(_))
        ));
        // names are case-sensitive
        assert!(reg.add_column("companyname", ColumnRole::Plain).is_ok());
    }

    #[test]
    fn bind_output_conflicts_with_other_producer() {
        let mut reg = registry(&["ScrapedText"]);
        reg.bind_output("ScrapedText", "scrape").unwrap();
        reg.bind_output("ScrapedText", "scrape").unwrap();
        assert_eq!(
            reg.bind_output("ScrapedText", "llm"),
            Err(SheetError::ColumnConflict {
                column: "ScrapedText".into(),
                bound_to: "scrape".into()
            })
        );
        assert_eq!(
            reg.bind_output("Missing", "scrape"),
            Err(SheetError::UnknownColumn("Missing".into()))
        );
    }

    #[test]
    fn binding_marks_roles_and_rename_follows() {
        let mut reg = registry(&["JobURL", "ScrapedText"]);
        reg.bind_transformation("scrape", scrape_binding()).unwrap();
        assert_eq!(reg.get("JobURL").unwrap().role, ColumnRole::Input);
        assert_eq!(reg.producer_of("ScrapedText"), Some("scrape"));

        reg.validate_rename("JobURL", "PostingURL").unwrap();
        reg.apply_rename("JobURL", "PostingURL");
        assert_eq!(reg.binding("scrape").unwrap().inputs, vec!["PostingURL".to_string()]);
    }

    #[test]
    fn binding_requires_existing_inputs() {
        let mut reg = registry(&["ScrapedText"]);
        assert_eq!(
            reg.bind_transformation("scrape", scrape_binding()),
            Err(SheetError::UnknownColumn("JobURL".into()))
        );
        assert!(reg.binding("scrape").is_none());
    }

    #[test]
    fn remove_in_use_requires_force() {
        let mut reg = registry(&["JobURL", "ScrapedText"]);
        reg.bind_transformation("scrape", scrape_binding()).unwrap();
        assert_eq!(
            reg.validate_remove("ScrapedText", false),
            Err(SheetError::ColumnInUse {
                column: "ScrapedText".into(),
                transformation: "scrape".into()
            })
        );
        let dropped = reg.validate_remove("ScrapedText", true).unwrap();
        reg.apply_remove("ScrapedText", &dropped);
        assert!(reg.binding("scrape").is_none());
        assert_eq!(reg.get("JobURL").unwrap().role, ColumnRole::Plain);
        assert!(!reg.contains("ScrapedText"));
    }

    #[test]
    fn run_order_puts_producers_first() {
        let mut reg = registry(&["LinkedIn", "JobURL", "ScrapedText", "Summary", "WizaEmail", "Verdict"]);
        reg.bind_transformation(
            "llm",
            TransformationBinding::identity(&["ScrapedText".to_string()], &["Summary".to_string()]),
        )
        .unwrap();
        reg.bind_transformation(
            "verify",
            TransformationBinding::identity(&["WizaEmail".to_string()], &["Verdict".to_string()]),
        )
        .unwrap();
        reg.bind_transformation("scrape", scrape_binding()).unwrap();
        reg.bind_transformation(
            "wiza",
            TransformationBinding::identity(&["LinkedIn".to_string()], &["WizaEmail".to_string()]),
        )
        .unwrap();

        assert_eq!(reg.run_order(), vec!["scrape", "llm", "wiza", "verify"]);
        assert!(ColumnRegistry::new().run_order().is_empty());
    }

    #[test]
    fn unbind_keeps_inputs_shared_with_other_bindings() {
        let mut reg = registry(&["JobURL", "ScrapedText", "Summary"]);
        reg.bind_transformation("scrape", scrape_binding()).unwrap();
        reg.bind_transformation(
            "llm",
            TransformationBinding::identity(&["JobURL".to_string()], &["Summary".to_string()]),
        )
        .unwrap();
        reg.unbind_transformation("scrape");
        assert_eq!(reg.get("JobURL").unwrap().role, ColumnRole::Input);
        assert_eq!(reg.get("ScrapedText").unwrap().role, ColumnRole::Plain);
        assert_eq!(reg.producer_of("Summary"), Some("llm"));
    }
}
