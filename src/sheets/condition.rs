// src/sheets/condition.rs
use serde::{Deserialize, Serialize};

use super::definitions::CellValue;

/// Row filter attached to a transformation binding. Rows that do not satisfy
/// it are skipped by the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCondition {
    pub kind: ConditionKind,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConditionKind {
    /// Any listed column is empty.
    IsEmpty,
    /// Any listed column is non-empty.
    IsNotEmpty,
    /// Every listed column is non-empty.
    AllNotEmpty,
    /// Any listed column equals the value.
    Equals(String),
    /// Every listed column equals the value.
    AllEquals(String),
}

impl RowCondition {
    pub fn new(kind: ConditionKind, columns: Vec<String>) -> Self {
        RowCondition { kind, columns }
    }

    /// Evaluates the condition against the cleaned values of `columns`, in order.
    /// An empty column list never matches.
    pub fn matches<'a>(&self, values: impl IntoIterator<Item = &'a CellValue>) -> bool {
        let cleaned: Vec<String> = values.into_iter().map(clean).collect();
        if cleaned.is_empty() {
            return false;
        }
        match &self.kind {
            ConditionKind::IsEmpty => cleaned.iter().any(|v| v.is_empty()),
            ConditionKind::IsNotEmpty => cleaned.iter().any(|v| !v.is_empty()),
            ConditionKind::AllNotEmpty => cleaned.iter().all(|v| !v.is_empty()),
            ConditionKind::Equals(expected) => cleaned.iter().any(|v| v == expected.trim()),
            ConditionKind::AllEquals(expected) => cleaned.iter().all(|v| v == expected.trim()),
        }
    }

    pub(crate) fn rename_column(&mut self, old: &str, new: &str) {
        for column in self.columns.iter_mut().filter(|c| c.as_str() == old) {
            *column = new.to_string();
        }
    }
}

fn clean(value: &CellValue) -> String {
    let text = value.to_string();
    let trimmed = text.trim();
    match trimmed {
        "nan" | "None" | "null" => String::new(),
        other => other.to_string(),
    }
}

pub fn parse_condition_kind(raw: &str, value: Option<&str>) -> Option<ConditionKind> {
    match (raw.trim().to_ascii_lowercase().as_str(), value) {
        ("is_empty", _) => Some(ConditionKind::IsEmpty),
        ("is_not_empty", _) => Some(ConditionKind::IsNotEmpty),
        ("all_not_empty", _) => Some(ConditionKind::AllNotEmpty),
        ("equals", Some(v)) => Some(ConditionKind::Equals(v.to_string())),
        ("all_equals", Some(v)) => Some(ConditionKind::AllEquals(v.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::from(*v)).collect()
    }

    #[test]
    fn emptiness_treats_placeholders_as_empty() {
        let cond = RowCondition::new(ConditionKind::IsEmpty, vec!["A".into(), "B".into()]);
        assert!(cond.matches(&cells(&["x", "nan"])));
        assert!(cond.matches(&cells(&["  ", "y"])));
        assert!(!cond.matches(&cells(&["x", "y"])));
    }

    #[test]
    fn all_variants_require_every_column() {
        let cond = RowCondition::new(ConditionKind::AllNotEmpty, vec!["A".into(), "B".into()]);
        assert!(cond.matches(&cells(&["x", "y"])));
        assert!(!cond.matches(&[CellValue::from("x"), CellValue::Unset]));

        let eq = RowCondition::new(ConditionKind::AllEquals("Applied".into()), vec!["S".into()]);
        assert!(eq.matches(&cells(&[" Applied "])));
        assert!(!eq.matches(&cells(&["Rejected"])));
    }

    #[test]
    fn no_columns_never_matches() {
        let cond = RowCondition::new(ConditionKind::IsNotEmpty, Vec::new());
        assert!(!cond.matches(&[]));
    }

    #[test]
    fn parse_requires_value_for_equality() {
        assert_eq!(parse_condition_kind("equals", None), None);
        assert_eq!(
            parse_condition_kind("EQUALS", Some("yes")),
            Some(ConditionKind::Equals("yes".into()))
        );
    }
}
