//! Generation client for the Gemini `generateContent` REST endpoint.

use crate::config::GenerationConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlask_pipeline::{GenerationError, Generator};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct GeminiClient {
    http: reqwest::Client,
    config: GenerationConfig,
}

impl GeminiClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn call(&self, instruction: &str, question: &str) -> Result<String, GenerationError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(GenerationError::MissingApiKey)?;
        let body = build_request(instruction, question).ok_or(GenerationError::EmptyPrompt)?;

        let resp = self
            .http
            .post(self.url())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }
        extract_text(&text)
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, instruction: &str, question: &str) -> Result<String, GenerationError> {
        // failures are logged by the pipeline along with the step that failed
        let res = self.call(instruction, question).await;
        if let Err(e) = &res {
            log::debug!("{} generateContent: {}", self.config.model, e);
        }
        res
    }
}

/// Two-part prompt; empty parts are dropped since the API rejects them.
fn build_request<'a>(instruction: &'a str, question: &'a str) -> Option<GenerateRequest<'a>> {
    let parts: Vec<Part<'a>> = [instruction, question]
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .map(|text| Part { text })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
    })
}

fn extract_text(body: &str) -> Result<String, GenerationError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Transport(format!("invalid response body: {}", e)))?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) => b.error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}
