// src/transformations/text.rs
//! Transformations computed locally from the row's own values.

use super::{names, require_text, Transformation, TransformationError};
use crate::sheets::definitions::{CellMap, CellValue};

/// `Name` + `Domain` -> `first.last@domain`.
pub struct EmailFromNameDomain {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl EmailFromNameDomain {
    pub fn new() -> Self {
        Self {
            inputs: names(&["Name", "Domain"]),
            outputs: names(&["Email"]),
        }
    }
}

impl Transformation for EmailFromNameDomain {
    fn name(&self) -> &str {
        "email_from_name_domain"
    }

    fn description(&self) -> &str {
        "Combine Name and Domain into an email address"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        let name = require_text(inputs, "Name")?;
        let domain = require_text(inputs, "Domain")?;
        let local: Vec<String> = name.split_whitespace().map(str::to_lowercase).collect();
        let domain = domain.trim_start_matches('@').to_lowercase();
        if domain.contains(char::is_whitespace) {
            return Err(TransformationError::Validation(format!(
                "domain '{}' contains whitespace",
                domain
            )));
        }
        let email = format!("{}@{}", local.join("."), domain);
        Ok(CellMap::from([("Email".to_string(), CellValue::from(email))]))
    }
}

/// Fills a subject/body pair addressed to the row's contact.
pub struct EmailDraft {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl EmailDraft {
    pub fn new() -> Self {
        Self {
            inputs: names(&["RecipientEmail", "RecipientName"]),
            outputs: names(&["EmailSubject", "EmailBody"]),
        }
    }
}

impl Transformation for EmailDraft {
    fn name(&self) -> &str {
        "email_draft"
    }

    fn description(&self) -> &str {
        "Draft a follow-up subject and body for the recipient"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        // The address is only required so drafts are not made for unreachable rows.
        require_text(inputs, "RecipientEmail")?;
        let recipient = require_text(inputs, "RecipientName")?;
        let subject = format!("Hello {}, Quick Follow-Up", recipient);
        let body = format!(
            "Dear {},\n\nI'm reaching out to follow up on our conversation.\n\nBest regards,",
            recipient
        );
        Ok(CellMap::from([
            ("EmailSubject".to_string(), CellValue::from(subject)),
            ("EmailBody".to_string(), CellValue::from(body)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> CellMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CellValue::from(*v)))
            .collect()
    }

    #[test]
    fn email_joins_name_parts_with_dots() {
        let out = EmailFromNameDomain::new()
            .execute(&row(&[("Name", "Ada  Byron King"), ("Domain", "Example.COM")]))
            .unwrap();
        assert_eq!(out["Email"], CellValue::from("ada.byron.king@example.com"));
    }

    #[test]
    fn email_needs_both_inputs() {
        let result = EmailFromNameDomain::new().execute(&row(&[("Name", "Ada")]));
        assert_eq!(result, Err(TransformationError::MissingInput("Domain".into())));
    }

    #[test]
    fn draft_produces_both_outputs() {
        let out = EmailDraft::new()
            .execute(&row(&[("RecipientEmail", "ada@example.com"), ("RecipientName", "Ada")]))
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out["EmailSubject"], CellValue::from("Hello Ada, Quick Follow-Up"));
        assert!(out["EmailBody"].to_string().starts_with("Dear Ada,"));
    }
}
