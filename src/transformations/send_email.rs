// src/transformations/send_email.rs
use bevy::log::info;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{names, optional_text, require_text, Transformation, TransformationError};
use crate::settings::secrets::{lookup, Secret};
use crate::settings::EmailSettings;
use crate::sheets::definitions::{CellMap, CellValue};

pub const SENT_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sends the drafted email over SMTP and stamps `SentAt`. Running it twice
/// sends twice.
pub struct SendEmail {
    settings: EmailSettings,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl SendEmail {
    pub fn new(settings: EmailSettings) -> Self {
        Self {
            settings,
            inputs: names(&["Email", "EmailSubject", "EmailBody"]),
            outputs: names(&["SentAt"]),
        }
    }

    fn transport(&self, password: String) -> Result<SmtpTransport, TransformationError> {
        let host = self.settings.smtp_host.as_str();
        let builder = if self.settings.smtp_port == 465 {
            SmtpTransport::relay(host)
        } else {
            SmtpTransport::starttls_relay(host)
        }
        .map_err(|e| TransformationError::ExternalService(format!("SMTP setup for {}: {}", host, e)))?;
        Ok(builder
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(self.settings.account.clone(), password))
            .build())
    }

    fn sender(&self) -> Result<Mailbox, TransformationError> {
        let address = self
            .settings
            .account
            .parse()
            .map_err(|e| TransformationError::ExternalService(format!("sender account: {}", e)))?;
        let name = Some(self.settings.from_name.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        Ok(Mailbox::new(name, address))
    }
}

/// Accepts bare addresses as well as `Name <address>` forms.
pub fn extract_email_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let candidate = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    let candidate = candidate.trim();
    let (local, domain) = candidate.split_once('@')?;
    let valid = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !candidate.contains(char::is_whitespace);
    valid.then(|| candidate.to_string())
}

impl Transformation for SendEmail {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send EmailSubject/EmailBody to Email over SMTP and record SentAt"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn is_idempotent(&self) -> bool {
        false
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        let raw_to = require_text(inputs, "Email")?;
        let to = extract_email_address(&raw_to)
            .ok_or_else(|| TransformationError::Validation(format!("'{}' is not an email address", raw_to)))?;
        let subject = require_text(inputs, "EmailSubject")?;
        let body = optional_text(inputs, "EmailBody");
        if self.settings.account.trim().is_empty() {
            return Err(TransformationError::ExternalService("No email account configured".into()));
        }
        let password = lookup(Secret::SmtpPassword)
            .ok_or_else(|| TransformationError::ExternalService("SMTP password is not set".into()))?;

        let recipient = to
            .parse()
            .map_err(|e| TransformationError::Validation(format!("recipient '{}': {}", to, e)))?;
        let message = Message::builder()
            .from(self.sender()?)
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| TransformationError::Validation(format!("building message: {}", e)))?;

        self.transport(password)?
            .send(&message)
            .map_err(|e| TransformationError::ExternalService(format!("SMTP send to {}: {}", to, e)))?;
        let sent_at = Local::now().format(SENT_AT_FORMAT).to_string();
        info!("Sent email to {} at {}", to, sent_at);
        Ok(CellMap::from([("SentAt".to_string(), CellValue::from(sent_at))]))
    }
}
