// src/transformations/followup.rs
use serde::{Deserialize, Serialize};

use super::llm::LlmClient;
use super::template::render;
use super::{names, Transformation, TransformationError};
use crate::settings::FollowupSettings;
use crate::sheets::definitions::{CellMap, CellValue};

const SYSTEM_PROMPT: &str = r#"You are an executive communications assistant crafting job follow-up emails. Create emails that:
- Maintain a professional yet personable tone
- Reference specific company and job details
- Show enthusiasm without desperation
- Keep under 150 words per email

Return the emails in this exact JSON format, with no surrounding text:
{
    "email1": { "subject": "...", "body": "..." },
    "email2": { "subject": "...", "body": "..." }
}"#;

const USER_PROMPT: &str = r#"Generate two follow-up emails for {{Hiring_Manager_Name}} at {{CompanyName}}.

Context:
- Position: {{Job_Title}} (ID: {{Job_ID}})
- Job description: {{Job_Description}}
- LinkedIn connection message: {{LinkedIn_Intro}}

Email 1 (one week later): enthusiastic check-in, specific interest in the role, availability for questions.
Email 2 (two weeks later): value-add update with a relevant recent achievement.
No markdown."#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEmail {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct FollowupPair {
    email1: DraftEmail,
    email2: DraftEmail,
}

/// Two LLM-written follow-up emails, each stored as a JSON `{subject, body}` string.
pub struct FollowupEmails {
    settings: FollowupSettings,
    ollama_url: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl FollowupEmails {
    pub fn new(settings: FollowupSettings, ollama_url: String) -> Self {
        Self {
            settings,
            ollama_url,
            inputs: names(&[
                "Hiring_Manager_Name",
                "CompanyName",
                "Job_Title",
                "Job_ID",
                "LinkedIn_Intro",
                "Job_Description",
            ]),
            outputs: names(&["FollowUp_Email_1", "FollowUp_Email_2"]),
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = SYSTEM_PROMPT.to_string();
        if let Some(template) = self.settings.template.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            prompt.push_str("\n\nHere is the template you should follow: ");
            prompt.push_str(template);
        }
        if let Some(examples) = self.settings.few_shot.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            prompt.push_str("\n\nHere are some examples of messages that worked in the past: ");
            prompt.push_str(examples);
        }
        prompt
    }
}

/// Parses the model answer, tolerating a fenced ```json block around it.
pub(crate) fn parse_followups(answer: &str) -> Result<(DraftEmail, DraftEmail), TransformationError> {
    let trimmed = answer.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    let pair: FollowupPair = serde_json::from_str(json.trim())?;
    Ok((pair.email1, pair.email2))
}

impl Transformation for FollowupEmails {
    fn name(&self) -> &str {
        "followup_emails"
    }

    fn description(&self) -> &str {
        "Write two follow-up emails for the hiring manager (LLM)"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        super::require_text(inputs, "CompanyName")?;
        let client = LlmClient {
            provider: self.settings.provider,
            model: self
                .settings
                .model
                .clone()
                .unwrap_or_else(|| self.settings.provider.default_model().to_string()),
            ollama_url: self.ollama_url.clone(),
        };
        let answer = client.complete(&self.system_prompt(), &render(USER_PROMPT, inputs))?;
        let (first, second) = parse_followups(&answer)?;
        Ok(CellMap::from([
            ("FollowUp_Email_1".to_string(), CellValue::from(serde_json::to_string(&first)?)),
            ("FollowUp_Email_2".to_string(), CellValue::from(serde_json::to_string(&second)?)),
        ]))
    }
}
