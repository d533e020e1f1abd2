// src/settings/secrets.rs
use bevy::log::{debug, error, info};

use super::{LlmProvider, SettingsError};

pub const KEYRING_SERVICE_NAME: &str = "jobsheet";

/// A credential the built-in transformations need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Secret {
    LlmKey(LlmProvider),
    Scrapfly,
    Reoon,
    Wiza,
    SmtpPassword,
}

impl Secret {
    pub fn keyring_user(self) -> &'static str {
        match self {
            Secret::LlmKey(LlmProvider::OpenAi) => "openai_api_key",
            Secret::LlmKey(LlmProvider::Anthropic) => "anthropic_api_key",
            Secret::LlmKey(LlmProvider::DeepSeek) => "deepseek_api_key",
            Secret::LlmKey(LlmProvider::Ollama) => "ollama_api_key",
            Secret::Scrapfly => "scrapfly_api_key",
            Secret::Reoon => "reoon_api_key",
            Secret::Wiza => "wiza_api_key",
            Secret::SmtpPassword => "smtp_password",
        }
    }

    /// Short names accepted on the command line.
    pub fn from_name(name: &str) -> Option<Secret> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Secret::LlmKey(LlmProvider::OpenAi)),
            "anthropic" => Some(Secret::LlmKey(LlmProvider::Anthropic)),
            "deepseek" => Some(Secret::LlmKey(LlmProvider::DeepSeek)),
            "ollama" => Some(Secret::LlmKey(LlmProvider::Ollama)),
            "scrapfly" => Some(Secret::Scrapfly),
            "reoon" => Some(Secret::Reoon),
            "wiza" => Some(Secret::Wiza),
            "smtp" => Some(Secret::SmtpPassword),
            _ => None,
        }
    }

    pub fn env_var(self) -> Option<&'static str> {
        match self {
            Secret::LlmKey(LlmProvider::OpenAi) => Some("OPENAI_API_KEY"),
            Secret::LlmKey(LlmProvider::Anthropic) => Some("ANTHROPIC_API_KEY"),
            Secret::LlmKey(LlmProvider::DeepSeek) => Some("DEEPSEEK_API_KEY"),
            Secret::LlmKey(LlmProvider::Ollama) => None,
            Secret::Scrapfly => Some("SCRAPFLY_API_KEY"),
            Secret::Reoon => Some("REOON_API_KEY"),
            Secret::Wiza => Some("WIZA_API_KEY"),
            Secret::SmtpPassword => Some("JOBSHEET_SMTP_PASSWORD"),
        }
    }
}

/// Reads a secret from the OS keyring, then from its environment variable.
/// Lookup happens per call so keys stored while the app runs are picked up.
pub fn lookup(secret: Secret) -> Option<String> {
    match keyring::Entry::new(KEYRING_SERVICE_NAME, secret.keyring_user()) {
        Ok(entry) => match entry.get_password() {
            Ok(value) if !value.is_empty() => return Some(value),
            Ok(_) | Err(keyring::Error::NoEntry) => {
                debug!("No keyring entry for '{}'.", secret.keyring_user());
            }
            Err(e) => {
                error!("Error accessing keyring for '{}': {}", secret.keyring_user(), e);
            }
        },
        Err(e) => {
            error!("Error creating keyring entry '{}': {}", secret.keyring_user(), e);
        }
    }
    secret
        .env_var()
        .and_then(|var| std::env::var(var).ok())
        .filter(|v| !v.trim().is_empty())
}

pub fn store(secret: Secret, value: &str) -> Result<(), SettingsError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE_NAME, secret.keyring_user())?;
    entry.set_password(value)?;
    info!("Stored '{}' in keyring.", secret.keyring_user());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_hosted_provider_has_an_env_fallback() {
        for provider in [LlmProvider::OpenAi, LlmProvider::Anthropic, LlmProvider::DeepSeek] {
            assert!(Secret::LlmKey(provider).env_var().is_some());
        }
        assert_eq!(Secret::LlmKey(LlmProvider::Ollama).env_var(), None);
    }

    #[test]
    fn names_map_to_secrets() {
        assert_eq!(Secret::from_name("Scrapfly"), Some(Secret::Scrapfly));
        assert_eq!(Secret::from_name("smtp"), Some(Secret::SmtpPassword));
        assert_eq!(Secret::from_name("wiza"), Some(Secret::Wiza));
        assert_eq!(Secret::from_name("unknown"), None);
    }
}
