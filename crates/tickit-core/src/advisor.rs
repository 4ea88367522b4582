//! Optional AI assistance: priority suggestions, subtask breakdowns and a
//! short celebratory message when a task is finished.
//!
//! Whether the assistance is available is decided once, when the
//! [`Advisor`] is built. Without a credential every operation fails with
//! [`AdvisorError::MissingCredential`], except
//! [`Advisor::motivational_message`], which always degrades to a fixed
//! string.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::task::Priority;

pub const NO_CREDENTIAL_CHEER: &str = "Great progress!";
pub const FAILURE_CHEER: &str = "Congratulations on finishing the task!";

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("no API key configured; AI features are disabled")]
    MissingCredential,

    #[error("request to the text generation service failed: {0}")]
    Request(String),

    #[error("text generation service answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("text generation service returned an empty response")]
    EmptyResponse,

    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),
}

/// Per-request knobs passed through to the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON body instead of prose.
    pub json_response: bool,
    pub thinking_budget: Option<u32>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, AdvisorError>;
}

#[derive(Clone, Default)]
pub struct Advisor {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl std::fmt::Debug for Advisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advisor")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Advisor {
    pub fn disabled() -> Self {
        Self { generator: None }
    }

    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Builds a Gemini-backed advisor when a credential is configured and a
    /// disabled one otherwise.
    #[tracing::instrument(skip(cfg))]
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let Some(api_key) = cfg.api_key() else {
            warn!("no API key configured; AI features are disabled");
            return Ok(Self::disabled());
        };

        let model = cfg
            .get("advisor.model")
            .unwrap_or_else(|| crate::gemini::DEFAULT_MODEL.to_string());
        let endpoint = cfg
            .get("advisor.endpoint")
            .unwrap_or_else(|| crate::gemini::DEFAULT_ENDPOINT.to_string());
        let timeout = cfg.get_u64("advisor.timeout")?.map(Duration::from_secs);

        let client = GeminiClient::new(api_key, model, endpoint, timeout)?;
        info!(model = %client.model(), "AI features enabled");
        Ok(Self::new(Arc::new(client)))
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, AdvisorError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(AdvisorError::MissingCredential)?;
        generator.generate(prompt, options).await
    }

    /// Suggests a priority. A non-empty answer that is not a known label
    /// falls back to [`Priority::Medium`].
    #[tracing::instrument(skip(self, description))]
    pub async fn suggest_priority(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Priority, AdvisorError> {
        let prompt = priority_prompt(title, description);
        let options = GenerationOptions {
            temperature: Some(0.1),
            json_response: false,
            thinking_budget: Some(0),
        };

        let text = self.generate(&prompt, &options).await.inspect_err(|err| {
            error!(error = %err, "priority suggestion failed");
        })?;

        let suggested = text.trim();
        if suggested.is_empty() {
            error!("priority suggestion came back empty");
            return Err(AdvisorError::EmptyResponse);
        }

        Ok(Priority::from_label(suggested).unwrap_or_else(|| {
            debug!(answer = %suggested, "unrecognised priority label; using Medium");
            Priority::Medium
        }))
    }

    /// Asks for a breakdown of `title` into subtask texts.
    #[tracing::instrument(skip(self))]
    pub async fn generate_subtasks(&self, title: &str) -> Result<Vec<String>, AdvisorError> {
        let prompt = subtasks_prompt(title);
        let options = GenerationOptions {
            temperature: Some(0.2),
            json_response: true,
            thinking_budget: None,
        };

        let result = match self.generate(&prompt, &options).await {
            Ok(text) => parse_subtask_list(&text),
            Err(err) => Err(err),
        };
        if let Err(err) = result.as_ref() {
            error!(error = %err, "subtask generation failed");
        }
        result
    }

    /// Never fails; falls back to a fixed cheer.
    #[tracing::instrument(skip(self))]
    pub async fn motivational_message(&self) -> String {
        if !self.is_enabled() {
            return NO_CREDENTIAL_CHEER.to_string();
        }

        let options = GenerationOptions {
            temperature: Some(1.0),
            json_response: false,
            thinking_budget: None,
        };
        match self.generate(MOTIVATION_PROMPT, &options).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("motivational message came back empty");
                FAILURE_CHEER.to_string()
            }
            Err(err) => {
                error!(error = %err, "motivational message failed");
                FAILURE_CHEER.to_string()
            }
        }
    }
}

const MOTIVATION_PROMPT: &str = "A user just completed one task on their to-do \
list. Write a single short, creative and upbeat message that praises them and \
keeps them motivated.";

fn priority_prompt(title: &str, description: Option<&str>) -> String {
    let details = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("none");
    format!(
        "Analyse the task below and suggest its priority as exactly one of \
         High, Medium or Low. Reply with the priority word only. Example: \
         High\n\nTitle: {title}\nDetails: {details}"
    )
}

fn subtasks_prompt(title: &str) -> String {
    format!(
        "Split the task below into a list of actionable subtasks. Keep each \
         subtask a short string. Return only a JSON array of strings such as \
         [\"subtask 1\", \"subtask 2\"].\n\nTask: {title}"
    )
}

/// Removes a surrounding Markdown code fence (with or without a language
/// tag) and trims the result.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(fence) = Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$") else {
        return trimmed.to_string();
    };
    match fence.captures(trimmed).and_then(|caps| caps.get(2)) {
        Some(body) if !body.as_str().is_empty() => body.as_str().trim().to_string(),
        _ => trimmed.to_string(),
    }
}

/// Parses a response that must be a JSON array of strings.
pub fn parse_subtask_list(raw: &str) -> Result<Vec<String>, AdvisorError> {
    let cleaned = strip_code_fence(raw);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|err| AdvisorError::MalformedResponse(format!("not JSON: {err}")))?;

    let Value::Array(items) = value else {
        return Err(AdvisorError::MalformedResponse(
            "expected a JSON array".to_string(),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(text) => Ok(text),
            other => Err(AdvisorError::MalformedResponse(format!(
                "expected only strings, found {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned answers in order and records the prompts it saw.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        answers: Mutex<VecDeque<Result<String, AdvisorError>>>,
        pub prompts: Mutex<Vec<(String, GenerationOptions)>>,
    }

    impl ScriptedGenerator {
        pub fn with(answers: Vec<Result<String, AdvisorError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            options: &GenerationOptions,
        ) -> Result<String, AdvisorError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push((prompt.to_string(), options.clone()));
            self.answers
                .lock()
                .expect("answers lock")
                .pop_front()
                .unwrap_or_else(|| Err(AdvisorError::Request("script exhausted".into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedGenerator;
    use super::*;

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_fence("```json\n[\"a\",\"b\"]\n```"), r#"["a","b"]"#);
        assert_eq!(strip_code_fence("```\n[1]\n```\n"), "[1]");
        assert_eq!(strip_code_fence("  [\"plain\"] "), r#"["plain"]"#);
    }

    #[test]
    fn parses_fenced_subtask_list() {
        let parsed = parse_subtask_list("```json\n[\"a\",\"b\"]\n```").expect("parse");
        assert_eq!(parsed, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert!(matches!(
            parse_subtask_list(r#"{"steps": ["a"]}"#),
            Err(AdvisorError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_subtask_list(r#"["a", 2]"#),
            Err(AdvisorError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_subtask_list("First, buy a map."),
            Err(AdvisorError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn disabled_advisor_fails_cleanly() {
        let advisor = Advisor::disabled();
        assert!(matches!(
            advisor.suggest_priority("Pay rent", None).await,
            Err(AdvisorError::MissingCredential)
        ));
        assert!(matches!(
            advisor.generate_subtasks("Pay rent").await,
            Err(AdvisorError::MissingCredential)
        ));
        assert_eq!(advisor.motivational_message().await, NO_CREDENTIAL_CHEER);
    }

    #[tokio::test]
    async fn priority_suggestion_parses_and_falls_back() {
        let generator = ScriptedGenerator::with(vec![
            Ok(" High\n".to_string()),
            Ok("Definitely urgent".to_string()),
            Ok("   ".to_string()),
        ]);
        let advisor = Advisor::new(generator.clone());

        assert_eq!(
            advisor.suggest_priority("Fix roof", Some("leaking")).await.expect("high"),
            Priority::High
        );
        assert_eq!(
            advisor.suggest_priority("Fix roof", None).await.expect("fallback"),
            Priority::Medium
        );
        assert!(matches!(
            advisor.suggest_priority("Fix roof", None).await,
            Err(AdvisorError::EmptyResponse)
        ));

        let prompts = generator.prompts.lock().expect("lock");
        assert!(prompts[0].0.contains("Details: leaking"));
        assert!(prompts[1].0.contains("Details: none"));
        assert_eq!(prompts[0].1.thinking_budget, Some(0));
    }

    #[tokio::test]
    async fn subtask_generation_requests_json() {
        let generator = ScriptedGenerator::with(vec![Ok("[\"pack\", \"go\"]".to_string())]);
        let advisor = Advisor::new(generator.clone());
        let subtasks = advisor.generate_subtasks("Move house").await.expect("subtasks");
        assert_eq!(subtasks, vec!["pack".to_string(), "go".to_string()]);
        assert!(generator.prompts.lock().expect("lock")[0].1.json_response);
    }

    #[tokio::test]
    async fn motivation_falls_back_on_failure() {
        let generator = ScriptedGenerator::with(vec![
            Ok("You did it!".to_string()),
            Err(AdvisorError::Status {
                status: 503,
                body: "overloaded".into(),
            }),
            Ok(String::new()),
        ]);
        let advisor = Advisor::new(generator);
        assert_eq!(advisor.motivational_message().await, "You did it!");
        assert_eq!(advisor.motivational_message().await, FAILURE_CHEER);
        assert_eq!(advisor.motivational_message().await, FAILURE_CHEER);
    }
}
