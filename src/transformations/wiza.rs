// src/transformations/wiza.rs
use bevy::log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{check_status, client, with_backoff, Backoff};
use super::{names, require_text, Transformation, TransformationError};
use crate::settings::secrets::{lookup, Secret};
use crate::sheets::definitions::{CellMap, CellValue};

const WIZA_URL: &str = "https://wiza.co/api/individual_reveals";
const WIZA_BACKOFF: Backoff = Backoff::new(5, Duration::from_secs(1));
const POLL_ATTEMPTS: u32 = 10;
const POLL_DELAY: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct RevealEnvelope {
    data: RevealData,
}

#[derive(Deserialize)]
struct RevealData {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    is_complete: bool,
    #[serde(default)]
    email: Option<String>,
}

/// Looks up the work email behind a `LinkedIn` profile URL with a Wiza
/// individual reveal, polling until the reveal completes.
pub struct WizaReveal {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl WizaReveal {
    pub fn new() -> Self {
        Self {
            inputs: names(&["LinkedIn"]),
            outputs: names(&["WizaEmail"]),
        }
    }
}

fn reveal_id(body: RevealEnvelope) -> Result<String, TransformationError> {
    match &body.data.id {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(TransformationError::Validation("Wiza response has no reveal id".into())),
    }
}

/// `None` while the reveal is still running.
fn revealed_email(body: RevealEnvelope) -> Result<Option<String>, TransformationError> {
    if !body.data.is_complete {
        return Ok(None);
    }
    body.data
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .map(Some)
        .ok_or_else(|| TransformationError::Validation("Wiza found no email for this profile".into()))
}

fn create_reveal(http: &Client, api_key: &str, profile_url: &str) -> Result<String, TransformationError> {
    let response = http
        .post(WIZA_URL)
        .bearer_auth(api_key)
        .json(&json!({
            "individual_reveal": { "profile_url": profile_url },
            "enrichment_level": "partial",
        }))
        .send()?;
    reveal_id(check_status("Wiza", response)?.json()?)
}

fn poll_reveal(http: &Client, api_key: &str, id: &str) -> Result<String, TransformationError> {
    for attempt in 1..=POLL_ATTEMPTS {
        let response = http.get(format!("{}/{}", WIZA_URL, id)).bearer_auth(api_key).send()?;
        if let Some(email) = revealed_email(check_status("Wiza", response)?.json()?)? {
            return Ok(email);
        }
        debug!("[Wiza] Reveal {} pending ({}/{}).", id, attempt, POLL_ATTEMPTS);
        std::thread::sleep(POLL_DELAY);
    }
    Err(TransformationError::ExternalService(format!(
        "Wiza reveal {} did not complete in time",
        id
    )))
}

impl Transformation for WizaReveal {
    fn name(&self) -> &str {
        "wiza_reveal"
    }

    fn description(&self) -> &str {
        "Find the email behind a LinkedIn profile (Wiza)"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        let profile_url = require_text(inputs, "LinkedIn")?;
        let api_key = lookup(Secret::Wiza)
            .ok_or_else(|| TransformationError::ExternalService("Wiza API key is not set".into()))?;
        let http = client()?;
        let id = with_backoff("Wiza", WIZA_BACKOFF, || create_reveal(&http, &api_key, &profile_url))?;
        let email = with_backoff("Wiza", WIZA_BACKOFF, || poll_reveal(&http, &api_key, &id))?;
        info!("[Wiza] {} -> {}", profile_url, email);
        Ok(CellMap::from([("WizaEmail".to_string(), CellValue::from(email))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(raw: &str) -> RevealEnvelope {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn reveal_ids_may_be_numbers_or_strings() {
        assert_eq!(reveal_id(envelope(r#"{"data": {"id": 4711}}"#)), Ok("4711".to_string()));
        assert_eq!(reveal_id(envelope(r#"{"data": {"id": "abc"}}"#)), Ok("abc".to_string()));
        assert!(matches!(
            reveal_id(envelope(r#"{"data": {}}"#)),
            Err(TransformationError::Validation(_))
        ));
    }

    #[test]
    fn email_only_once_complete() {
        let pending = envelope(r#"{"data": {"id": 1, "is_complete": false, "email": null}}"#);
        assert_eq!(revealed_email(pending), Ok(None));

        let done = envelope(r#"{"data": {"id": 1, "is_complete": true, "email": " jane@acme.io "}}"#);
        assert_eq!(revealed_email(done), Ok(Some("jane@acme.io".to_string())));

        let empty = envelope(r#"{"data": {"id": 1, "is_complete": true, "email": ""}}"#);
        assert!(matches!(revealed_email(empty), Err(TransformationError::Validation(_))));
    }

    #[test]
    fn blank_profile_is_missing_input() {
        let unit = WizaReveal::new();
        let inputs = CellMap::from([("LinkedIn".to_string(), CellValue::Unset)]);
        assert_eq!(
            unit.execute(&inputs),
            Err(TransformationError::MissingInput("LinkedIn".into()))
        );
    }
}
