// src/transformations/llm.rs
use bevy::log::{debug, info};
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{check_status, client, with_backoff, Backoff};
use super::template::{placeholders, render};
use super::{Transformation, TransformationError};
use crate::settings::secrets::{lookup, Secret};
use crate::settings::{LlmProvider, LlmSettings};
use crate::sheets::definitions::{CellMap, CellValue};

const LLM_BACKOFF: Backoff = Backoff::new(3, Duration::from_secs(2));
const TEMPERATURE: f64 = 0.7;
const ANTHROPIC_MAX_TOKENS: u32 = 4000;

/// Chat-completion call against one of the supported providers.
#[derive(Debug, Clone)]
pub struct LlmClient {
    pub provider: LlmProvider,
    pub model: String,
    pub ollama_url: String,
}

impl LlmClient {
    pub fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, TransformationError> {
        let label = format!("{:?}", self.provider);
        with_backoff(&label, LLM_BACKOFF, || self.complete_once(system_prompt, user_prompt))
    }

    fn complete_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String, TransformationError> {
        let http = client()?;
        let label = format!("{:?}", self.provider);
        let request = match self.provider {
            LlmProvider::OpenAi | LlmProvider::DeepSeek => {
                let url = if self.provider == LlmProvider::OpenAi {
                    "https://api.openai.com/v1/chat/completions"
                } else {
                    "https://api.deepseek.com/chat/completions"
                };
                http.post(url).bearer_auth(self.api_key()?).json(&json!({
                    "model": self.model,
                    "temperature": TEMPERATURE,
                    "messages": [
                        { "role": "system", "content": system_prompt },
                        { "role": "user", "content": user_prompt },
                    ],
                }))
            }
            LlmProvider::Anthropic => http
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", self.api_key()?)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": self.model,
                    "system": system_prompt,
                    "max_tokens": ANTHROPIC_MAX_TOKENS,
                    "temperature": TEMPERATURE,
                    "messages": [{ "role": "user", "content": user_prompt }],
                })),
            LlmProvider::Ollama => http
                .post(format!("{}/api/generate", self.ollama_url.trim_end_matches('/')))
                .json(&json!({
                    "model": self.model,
                    "system": system_prompt,
                    "prompt": user_prompt,
                    "stream": false,
                    "options": { "temperature": TEMPERATURE },
                })),
        };
        debug!("[{}] Sending completion request for model {}", label, self.model);
        let body: Value = check_status(&label, request.send()?)?.json()?;
        extract_completion(self.provider, &body)
    }

    fn api_key(&self) -> Result<String, TransformationError> {
        lookup(Secret::LlmKey(self.provider)).ok_or_else(|| {
            TransformationError::ExternalService(format!("No API key configured for {:?}", self.provider))
        })
    }
}

/// Pulls the generated text out of a provider response body.
pub(crate) fn extract_completion(provider: LlmProvider, body: &Value) -> Result<String, TransformationError> {
    let text = match provider {
        LlmProvider::OpenAi | LlmProvider::DeepSeek => body.pointer("/choices/0/message/content"),
        LlmProvider::Anthropic => body.pointer("/content/0/text"),
        LlmProvider::Ollama => body.get("response"),
    }
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty());
    text.map(str::to_string).ok_or_else(|| {
        TransformationError::Validation(format!("{:?} response has no completion text", provider))
    })
}

/// Renders the configured prompts with the row's values and stores the
/// completion. Inputs are the `{{placeholders}}` used by the prompts.
pub struct LlmTransformation {
    name: String,
    settings: LlmSettings,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl LlmTransformation {
    /// The default `llm` unit.
    pub fn new(settings: LlmSettings) -> Self {
        Self::named("llm", settings)
    }

    pub fn named(name: impl Into<String>, settings: LlmSettings) -> Self {
        let mut inputs = placeholders(&settings.system_prompt);
        for name in placeholders(&settings.user_prompt) {
            if !inputs.contains(&name) {
                inputs.push(name);
            }
        }
        let outputs = vec![settings.output_column.clone()];
        Self {
            name: name.into(),
            settings,
            inputs,
            outputs,
        }
    }

    /// System and user prompt filled with the row's values.
    pub(crate) fn prompts(&self, inputs: &CellMap) -> (String, String) {
        (
            render(&self.settings.system_prompt, inputs),
            render(&self.settings.user_prompt, inputs),
        )
    }

    fn client(&self) -> LlmClient {
        LlmClient {
            provider: self.settings.provider,
            model: self.settings.model_name().to_string(),
            ollama_url: self.settings.ollama_url.clone(),
        }
    }
}

impl Transformation for LlmTransformation {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Fill the configured prompts from the row and store the model's answer"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        if !self.inputs.is_empty() && inputs.values().all(CellValue::is_unset) {
            return Err(TransformationError::MissingInput(self.inputs.join(", ")));
        }
        let (system, user) = self.prompts(inputs);
        let answer = self.client().complete(&system, &user)?;
        info!("[{}] Received {} chars.", self.name, answer.len());
        Ok(CellMap::from([(
            self.settings.output_column.clone(),
            CellValue::from(answer),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_come_from_both_prompts() {
        let settings = LlmSettings {
            system_prompt: "You write for {{CompanyName}}.".into(),
            user_prompt: "Summarise {{ScrapedText}} for {{CompanyName}}".into(),
            output_column: "Summary".into(),
            ..LlmSettings::default()
        };
        let unit = LlmTransformation::new(settings);
        assert_eq!(unit.inputs(), &["CompanyName".to_string(), "ScrapedText".to_string()]);
        assert_eq!(unit.outputs(), &["Summary".to_string()]);
    }

    #[test]
    fn named_units_keep_their_own_prompts() {
        let summary = LlmTransformation::named(
            "summarise",
            LlmSettings {
                system_prompt: "Be brief.".into(),
                user_prompt: "Summarise {{ScrapedText}}".into(),
                output_column: "Summary".into(),
                ..LlmSettings::default()
            },
        );
        let pitch = LlmTransformation::named(
            "pitch",
            LlmSettings {
                system_prompt: "You write cover letters.".into(),
                user_prompt: "Pitch me to {{CompanyName}} using {{ScrapedText}}".into(),
                output_column: "Pitch".into(),
                ..LlmSettings::default()
            },
        );
        let row = CellMap::from([
            ("CompanyName".to_string(), CellValue::from("Acme")),
            ("ScrapedText".to_string(), CellValue::from("Rust role")),
        ]);

        assert_eq!(summary.name(), "summarise");
        assert_eq!(pitch.outputs(), &["Pitch".to_string()]);
        assert_eq!(
            summary.prompts(&row),
            ("Be brief.".to_string(), "Summarise Rust role".to_string())
        );
        assert_eq!(
            pitch.prompts(&row),
            (
                "You write cover letters.".to_string(),
                "Pitch me to Acme using Rust role".to_string()
            )
        );
    }

    #[test]
    fn all_unset_inputs_are_missing() {
        let unit = LlmTransformation::new(LlmSettings::default());
        let inputs: CellMap = unit
            .inputs()
            .iter()
            .map(|c| (c.clone(), CellValue::Unset))
            .collect();
        assert!(matches!(
            unit.execute(&inputs),
            Err(TransformationError::MissingInput(_))
        ));
    }

    #[test]
    fn completion_text_per_provider() {
        let openai = json!({ "choices": [{ "message": { "content": " hi " } }] });
        let anthropic = json!({ "content": [{ "type": "text", "text": "hello" }] });
        let ollama = json!({ "response": "hey" });
        assert_eq!(extract_completion(LlmProvider::DeepSeek, &openai), Ok("hi".into()));
        assert_eq!(extract_completion(LlmProvider::Anthropic, &anthropic), Ok("hello".into()));
        assert_eq!(extract_completion(LlmProvider::Ollama, &ollama), Ok("hey".into()));
        assert!(matches!(
            extract_completion(LlmProvider::OpenAi, &ollama),
            Err(TransformationError::Validation(_))
        ));
    }
}
