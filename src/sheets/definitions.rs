// src/sheets/definitions.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value held by a single cell. `Unset` is the "no value" marker used for
/// freshly added columns, cleared cells and empty CSV fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Unset,
    Text(String),
    Number(f64),
}

/// Input/output mapping exchanged with transformations, keyed by column name.
pub type CellMap = BTreeMap<String, CellValue>;

impl CellValue {
    /// Builds a text value, mapping the empty string to `Unset`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            CellValue::Unset
        } else {
            CellValue::Text(value)
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, CellValue::Unset)
    }

    /// Text view of the value, `None` when unset.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Unset => None,
            other => Some(other.to_string()),
        }
    }

    /// Coerces the value to the storage form of a column with `data_type`.
    ///
    /// Numbers in text columns become their shortest decimal text; text in
    /// number columns becomes a number when it parses to a finite value and
    /// stays text otherwise. Writing the result to CSV and parsing it back with
    /// [`CellValue::parse_field`] yields the same value.
    pub fn normalized_for(self, data_type: ColumnDataType) -> Self {
        match (self, data_type) {
            (CellValue::Text(s), _) if s.is_empty() => CellValue::Unset,
            (CellValue::Number(n), _) if !n.is_finite() => CellValue::Text(n.to_string()),
            (CellValue::Number(n), ColumnDataType::Text) => CellValue::Text(n.to_string()),
            (CellValue::Text(s), ColumnDataType::Number) => match parse_finite(&s) {
                Some(n) => CellValue::Number(n),
                None => CellValue::Text(s),
            },
            (value, _) => value,
        }
    }

    /// Parses a raw CSV field for a column of the given type.
    pub fn parse_field(field: &str, data_type: ColumnDataType) -> Self {
        CellValue::text(field).normalized_for(data_type)
    }
}

pub(crate) fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Like [`parse_finite`], but only accepts text that a `Number` cell writes
/// back unchanged. "00123", "+1", "1e3" and IDs past f64 precision fail.
pub(crate) fn parse_canonical(raw: &str) -> Option<f64> {
    parse_finite(raw).filter(|n| CellValue::Number(*n).to_string() == raw)
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Unset => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColumnDataType {
    #[default]
    Text,
    Number,
}

impl fmt::Display for ColumnDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub fn parse_column_data_type(raw: &str) -> Option<ColumnDataType> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "text" | "string" | "str" => Some(ColumnDataType::Text),
        "number" | "float" | "int" | "f64" => Some(ColumnDataType::Number),
        _ => None,
    }
}

/// Role of a column with respect to transformations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ColumnRole {
    #[default]
    Plain,
    Input,
    Output { transformation: String },
}

impl ColumnRole {
    pub fn producer(&self) -> Option<&str> {
        match self {
            ColumnRole::Output { transformation } => Some(transformation.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Plain => write!(f, "plain"),
            ColumnRole::Input => write!(f, "input"),
            ColumnRole::Output { transformation } => write!(f, "output({})", transformation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(flatten)]
    pub role: ColumnRole,
    #[serde(default)]
    pub data_type: ColumnDataType,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, role: ColumnRole) -> Self {
        ColumnDefinition {
            name: name.into(),
            role,
            data_type: ColumnDataType::Text,
        }
    }

    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, ColumnRole::Plain)
    }
}

/// Identity of a row that survives index shifts. Never reused within a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub(crate) u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_unset() {
        assert_eq!(CellValue::text(""), CellValue::Unset);
        assert_eq!(CellValue::from("Acme"), CellValue::Text("Acme".into()));
    }

    #[test]
    fn normalization_follows_column_type() {
        assert_eq!(
            CellValue::Text("42".into()).normalized_for(ColumnDataType::Number),
            CellValue::Number(42.0)
        );
        assert_eq!(
            CellValue::Text("n/a".into()).normalized_for(ColumnDataType::Number),
            CellValue::Text("n/a".into())
        );
        assert_eq!(
            CellValue::Number(7.5).normalized_for(ColumnDataType::Text),
            CellValue::Text("7.5".into())
        );
        assert_eq!(
            CellValue::Number(f64::NAN).normalized_for(ColumnDataType::Number),
            CellValue::Text("NaN".into())
        );
    }

    #[test]
    fn parse_field_matches_display() {
        for value in [
            CellValue::Number(0.1),
            CellValue::Number(1e21),
            CellValue::Number(-3.0),
            CellValue::Text("007".into()),
        ] {
            let dt = match value {
                CellValue::Number(_) => ColumnDataType::Number,
                _ => ColumnDataType::Text,
            };
            assert_eq!(CellValue::parse_field(&value.to_string(), dt), value);
        }
    }

    #[test]
    fn role_serializes_with_tag() {
        let def = ColumnDefinition::new(
            "ScrapedText",
            ColumnRole::Output { transformation: "scrape".into() },
        );
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["role"], "output");
        assert_eq!(json["transformation"], "scrape");
        let back: ColumnDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, def);
    }
}
