// src/transformations/template.rs
use std::collections::BTreeSet;

use crate::sheets::definitions::CellMap;

/// Names of `{{placeholder}}`s in `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let name = after[..end].trim();
        if !name.is_empty() && seen.insert(name.to_string()) {
            found.push(name.to_string());
        }
        rest = &after[end + 2..];
    }
    found
}

/// Replaces every `{{name}}` with the text of `values[name]`. Unknown or unset
/// placeholders render as the empty string.
pub fn render(template: &str, values: &CellMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = values.get(name) {
                    out.push_str(&value.to_string());
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
