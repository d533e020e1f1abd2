// src/transformations/mod.rs
//! Per-row transformation units and the static registry they are looked up in.
//!
//! A transformation only sees the input values it declared and answers with
//! the output values it declared. It never touches the sheet; writing results
//! back is the runner's job.

pub mod followup;
pub mod http;
pub mod llm;
pub mod scrape;
pub mod send_email;
pub mod template;
pub mod text;
pub mod verify_email;
pub mod wiza;

#[cfg(test)]
pub(crate) mod testing;

use bevy::log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::settings::AppSettings;
use crate::sheets::definitions::{CellMap, CellValue};
use crate::sheets::error::SheetError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformationError {
    #[error("Missing input '{0}'.")]
    MissingInput(String),
    #[error("External service failed: {0}")]
    ExternalService(String),
    #[error("Invalid output: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for TransformationError {
    fn from(e: reqwest::Error) -> Self {
        TransformationError::ExternalService(e.to_string())
    }
}

impl From<serde_json::Error> for TransformationError {
    fn from(e: serde_json::Error) -> Self {
        TransformationError::Validation(e.to_string())
    }
}

/// Single-row unit of work. `execute` receives exactly the declared inputs
/// (values may be unset) and must return exactly the declared outputs.
pub trait Transformation: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn inputs(&self) -> &[String];

    fn outputs(&self) -> &[String];

    /// Whether re-running over existing output is harmless.
    fn is_idempotent(&self) -> bool {
        true
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError>;
}

/// Reads a required text input, failing with `MissingInput` when unset.
pub(crate) fn require_text(inputs: &CellMap, column: &str) -> Result<String, TransformationError> {
    inputs
        .get(column)
        .and_then(CellValue::as_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TransformationError::MissingInput(column.to_string()))
}

/// Text of an optional input; unset reads as the empty string.
pub(crate) fn optional_text(inputs: &CellMap, column: &str) -> String {
    inputs
        .get(column)
        .and_then(CellValue::as_text)
        .unwrap_or_default()
}

pub(crate) fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Descriptor returned by `list_available_transformations`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationInfo {
    pub name: String,
    pub description: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub idempotent: bool,
}

/// Name-keyed set of transformations, filled once at startup.
#[derive(Default, Clone)]
pub struct TransformationRegistry {
    units: BTreeMap<String, Arc<dyn Transformation>>,
}

impl TransformationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in unit, configured from `settings`.
    pub fn with_builtins(settings: &AppSettings) -> Self {
        let mut registry = Self::new();
        registry.register(text::EmailFromNameDomain::new());
        registry.register(text::EmailDraft::new());
        registry.register(scrape::ScrapeTransformation::new(settings.scrape.clone()));
        registry.register(llm::LlmTransformation::new(settings.llm.clone()));
        registry.register(followup::FollowupEmails::new(
            settings.followup.clone(),
            settings.llm.ollama_url.clone(),
        ));
        registry.register(verify_email::VerifyEmail::new());
        registry.register(send_email::SendEmail::new(settings.email.clone()));
        registry.register(wiza::WizaReveal::new());
        for named in &settings.llm_transformations {
            if registry.contains(&named.name) {
                warn!("Skipping LLM unit '{}': the name is already taken.", named.name);
                continue;
            }
            registry.register(llm::LlmTransformation::named(named.name.clone(), named.settings.clone()));
        }
        info!("Registered {} transformations.", registry.units.len());
        registry
    }

    /// Adds a unit, replacing any earlier one with the same name.
    pub fn register<T: Transformation + 'static>(&mut self, unit: T) {
        self.units.insert(unit.name().to_string(), Arc::new(unit));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Transformation>, SheetError> {
        self.units
            .get(name)
            .cloned()
            .ok_or_else(|| SheetError::UnknownTransformation(name.to_string()))
    }

    pub fn list_available_transformations(&self) -> Vec<TransformationInfo> {
        self.units
            .values()
            .map(|unit| TransformationInfo {
                name: unit.name().to_string(),
                description: unit.description().to_string(),
                inputs: unit.inputs().to_vec(),
                outputs: unit.outputs().to_vec(),
                idempotent: unit.is_idempotent(),
            })
            .collect()
    }
}
