// src/transformations/verify_email.rs
use bevy::log::info;
use serde::Deserialize;
use std::time::Duration;

use super::http::{check_status, client, with_backoff, Backoff};
use super::{names, require_text, Transformation, TransformationError};
use crate::settings::secrets::{lookup, Secret};
use crate::sheets::definitions::{CellMap, CellValue};

const REOON_URL: &str = "https://emailverifier.reoon.com/api/v1/verify";
const REOON_BACKOFF: Backoff = Backoff::new(5, Duration::from_secs(1));

#[derive(Deserialize)]
struct ReoonResponse {
    status: Option<String>,
}

/// Checks deliverability of `Email` with Reoon's power mode and stores the
/// verdict ("safe", "invalid", "disposable", ...).
pub struct VerifyEmail {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl VerifyEmail {
    pub fn new() -> Self {
        Self {
            inputs: names(&["Email"]),
            outputs: names(&["EmailVerified"]),
        }
    }
}

fn verdict(body: ReoonResponse) -> Result<String, TransformationError> {
    body.status
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TransformationError::Validation("Reoon response has no status".into()))
}

impl Transformation for VerifyEmail {
    fn name(&self) -> &str {
        "verify_email"
    }

    fn description(&self) -> &str {
        "Verify the Email address (Reoon)"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        let email = require_text(inputs, "Email")?;
        let api_key = lookup(Secret::Reoon)
            .ok_or_else(|| TransformationError::ExternalService("Reoon API key is not set".into()))?;
        let http = client()?;
        let status = with_backoff("Reoon", REOON_BACKOFF, || {
            let response = http
                .get(REOON_URL)
                .query(&[("key", api_key.as_str()), ("email", email.as_str()), ("mode", "power")])
                .send()?;
            let body: ReoonResponse = check_status("Reoon", response)?.json()?;
            verdict(body)
        })?;
        info!("[Reoon] {} -> {}", email, status);
        Ok(CellMap::from([("EmailVerified".to_string(), CellValue::from(status))]))
    }
}
