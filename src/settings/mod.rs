// src/settings/mod.rs
pub mod io;
pub mod secrets;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_RESET_COLUMNS: [&str; 3] = ["SentAt", "FollowUpSentAt", "ApplicationStatus"];

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not determine the configuration directory.")]
    NoConfigDir,
    #[error("Settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
    DeepSeek,
    Ollama,
}

impl LlmProvider {
    pub fn default_model(self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::Anthropic => "claude-3-5-haiku-latest",
            LlmProvider::DeepSeek => "deepseek-chat",
            LlmProvider::Ollama => "llama3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: Option<String>,
    pub system_prompt: String,
    pub user_prompt: String,
    pub output_column: String,
    pub ollama_url: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            model: None,
            system_prompt: "You are a concise assistant helping with a job search.".to_string(),
            user_prompt: "Summarise the following job posting for {{CompanyName}}:\n\n{{ScrapedText}}".to_string(),
            output_column: "LLM_Output".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
        }
    }
}

impl LlmSettings {
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

/// Another `llm` unit with its own prompts, model and output column,
/// registered under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedLlmSettings {
    pub name: String,
    #[serde(flatten)]
    pub settings: LlmSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowupSettings {
    pub provider: LlmProvider,
    pub model: Option<String>,
    /// Extra instructions appended to the built-in follow-up prompt.
    pub template: Option<String>,
    /// Example emails shown to the model.
    pub few_shot: Option<String>,
}

impl Default for FollowupSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            model: None,
            template: None,
            few_shot: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub account: String,
    pub from_name: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            account: String::new(),
            from_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    /// Retry with JavaScript rendering when the plain fetch fails.
    pub render_js_fallback: bool,
    pub country: Option<String>,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            render_js_fallback: true,
            country: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Resource)]
#[serde(default)]
pub struct AppSettings {
    pub last_used_file: Option<PathBuf>,
    pub duplicate_reset_columns: Vec<String>,
    pub backup_on_exit: bool,
    pub llm: LlmSettings,
    /// Extra prompt units, so a sheet can hold several model-written columns.
    pub llm_transformations: Vec<NamedLlmSettings>,
    pub followup: FollowupSettings,
    pub email: EmailSettings,
    pub scrape: ScrapeSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            last_used_file: None,
            duplicate_reset_columns: DEFAULT_RESET_COLUMNS.iter().map(|c| c.to_string()).collect(),
            backup_on_exit: true,
            llm: LlmSettings::default(),
            llm_transformations: Vec::new(),
            followup: FollowupSettings::default(),
            email: EmailSettings::default(),
            scrape: ScrapeSettings::default(),
        }
    }
}
