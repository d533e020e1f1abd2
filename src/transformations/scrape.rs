// src/transformations/scrape.rs
use bevy::log::{info, warn};
use serde::Deserialize;

use super::http::{check_status, client};
use super::{names, require_text, Transformation, TransformationError};
use crate::settings::secrets::{lookup, Secret};
use crate::settings::ScrapeSettings;
use crate::sheets::definitions::{CellMap, CellValue};

const SCRAPFLY_URL: &str = "https://api.scrapfly.io/scrape";

#[derive(Deserialize)]
struct ScrapflyResponse {
    result: ScrapflyResult,
}

#[derive(Deserialize)]
struct ScrapflyResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    status_code: Option<u16>,
}

/// Fetches the posting behind `JobURL` as plain text through Scrapfly.
pub struct ScrapeTransformation {
    settings: ScrapeSettings,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl ScrapeTransformation {
    pub fn new(settings: ScrapeSettings) -> Self {
        Self {
            settings,
            inputs: names(&["JobURL"]),
            outputs: names(&["ScrapedText"]),
        }
    }

    fn fetch(&self, api_key: &str, url: &str, render_js: bool) -> Result<String, TransformationError> {
        let mut query: Vec<(&str, String)> = vec![
            ("key", api_key.to_string()),
            ("url", url.to_string()),
            ("format", "text".to_string()),
            ("render_js", render_js.to_string()),
            ("cache", "true".to_string()),
            ("retry", "true".to_string()),
        ];
        if let Some(country) = &self.settings.country {
            query.push(("country", country.clone()));
        }
        let response = client()?.get(SCRAPFLY_URL).query(&query).send()?;
        let parsed: ScrapflyResponse = check_status("Scrapfly", response)?.json()?;
        parse_result(parsed.result)
    }
}

fn parse_result(result: ScrapflyResult) -> Result<String, TransformationError> {
    match result.content.map(|c| c.trim().to_string()) {
        Some(text) if result.success && !text.is_empty() => Ok(text),
        _ => Err(TransformationError::ExternalService(format!(
            "Scrapfly reported no content (status {:?})",
            result.status_code
        ))),
    }
}

impl Transformation for ScrapeTransformation {
    fn name(&self) -> &str {
        "scrape"
    }

    fn description(&self) -> &str {
        "Scrape the job posting text at JobURL (Scrapfly)"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        let url = require_text(inputs, "JobURL")?;
        let api_key = lookup(Secret::Scrapfly)
            .ok_or_else(|| TransformationError::ExternalService("Scrapfly API key is not set".into()))?;

        let text = match self.fetch(&api_key, &url, false) {
            Ok(text) => text,
            Err(e) if self.settings.render_js_fallback => {
                warn!("[Scrapfly] Plain fetch of {} failed ({}); retrying with JS rendering.", url, e);
                self.fetch(&api_key, &url, true)?
            }
            Err(e) => return Err(e),
        };
        info!("[Scrapfly] Scraped {} chars from {}", text.len(), url);
        Ok(CellMap::from([("ScrapedText".to_string(), CellValue::from(text))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsuccessful_result_is_external_failure() {
        let parsed: ScrapflyResponse = serde_json::from_str(
            r#"{"result": {"success": false, "status_code": 403, "content": "blocked"}}"#,
        )
        .unwrap();
        assert!(matches!(
            parse_result(parsed.result),
            Err(TransformationError::ExternalService(_))
        ));
    }

    #[test]
    fn content_is_trimmed() {
        let parsed: ScrapflyResponse =
            serde_json::from_str(r#"{"result": {"success": true, "content": "  Rust engineer \n"}}"#)
                .unwrap();
        assert_eq!(parse_result(parsed.result), Ok("Rust engineer".to_string()));
    }

    #[test]
    fn blank_url_fails_before_any_request() {
        let unit = ScrapeTransformation::new(ScrapeSettings::default());
        let inputs = CellMap::from([("JobURL".to_string(), CellValue::Unset)]);
        assert_eq!(
            unit.execute(&inputs),
            Err(TransformationError::MissingInput("JobURL".into()))
        );
    }
}
