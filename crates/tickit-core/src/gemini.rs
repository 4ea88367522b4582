//! Gemini `generateContent` client.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::advisor::{AdvisorError, GenerationOptions, TextGenerator};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        model: String,
        endpoint: String,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed building HTTP client for text generation")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[tracing::instrument(skip(self, prompt, options), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, AdvisorError> {
        let body = serde_json::to_string(&GenerateRequest::new(prompt, options))
            .map_err(|err| AdvisorError::Request(format!("failed encoding request: {err}")))?;

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "text generation request failed");
                AdvisorError::Request(err.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| AdvisorError::Request(format!("failed reading response: {err}")))?;

        if !status.is_success() {
            return Err(AdvisorError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let text = response_text(&text)?;
        debug!(chars = text.chars().count(), "text generation succeeded");
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str, options: &GenerationOptions) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                response_mime_type: options.json_response.then_some("application/json"),
                thinking_config: options
                    .thinking_budget
                    .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Concatenated text of the first candidate. No candidates means an empty
/// answer, not an error.
fn response_text(body: &str) -> Result<String, AdvisorError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|err| AdvisorError::MalformedResponse(format!("invalid response body: {err}")))?;

    Ok(parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_body_carries_options() {
        let options = GenerationOptions {
            temperature: Some(0.2),
            json_response: true,
            thinking_budget: Some(0),
        };
        let value = serde_json::to_value(GenerateRequest::new("split it", &options))
            .expect("serialize");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "split it");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["generationConfig"]["thinkingConfig"]["thinkingBudget"], 0);
    }

    #[test]
    fn plain_request_omits_unset_options() {
        let value = serde_json::to_value(GenerateRequest::new("hi", &GenerationOptions::default()))
            .expect("serialize");
        assert_eq!(value["generationConfig"], json!({}));
    }

    #[test]
    fn extracts_first_candidate_text() {
        let body = json!({
            "candidates": [
                {"content": {"parts": [{"text": "Hi"}, {"text": "gh"}], "role": "model"}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        })
        .to_string();
        assert_eq!(response_text(&body).expect("text"), "High");
        assert_eq!(response_text("{}").expect("empty"), "");
        assert!(matches!(
            response_text("<html>"),
            Err(AdvisorError::MalformedResponse(_))
        ));
    }

    #[test]
    fn url_joins_endpoint_and_model() {
        let client = GeminiClient::new(
            "key".into(),
            "gemini-test".into(),
            "http://localhost:9/v1beta/".into(),
            None,
        )
        .expect("client");
        assert_eq!(
            client.url(),
            "http://localhost:9/v1beta/models/gemini-test:generateContent"
        );
    }
}
