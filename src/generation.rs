use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationSettings;
use crate::error::{ConfigurationError, GenerationError, GenerationErrorKind};
use crate::model::{FinishReason, GenerationResult};

/// A text-generation backend taking one prompt at one parameter point.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f64,
        top_p: f64,
        max_tokens: u32,
    ) -> Result<GenerationResult, GenerationError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatService {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiChatService {
    pub fn new(settings: &GenerationSettings) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ConfigurationError::InvalidSetting {
                name: "http_client",
                reason: err.to_string(),
            })?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", settings.base_url),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerationService for OpenAiChatService {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f64,
        top_p: f64,
        max_tokens: u32,
    ) -> Result<GenerationResult, GenerationError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            top_p,
            max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                let message = err.to_string();
                GenerationError::new(classify_failure(None, &message), message)
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| GenerationError::other(format!("failed to read response body: {err}")))?;

        if !status.is_success() {
            return Err(GenerationError::new(
                classify_failure(Some(status), &text),
                format!("LLM API error ({status}): {text}"),
            ));
        }

        debug!(status = %status, bytes = text.len(), "chat completion received");
        parse_completion(&text)
    }
}

/// Maps an HTTP status and error body onto a failure kind.
pub fn classify_failure(status: Option<StatusCode>, body: &str) -> GenerationErrorKind {
    let lowered = body.to_lowercase();

    if status == Some(StatusCode::TOO_MANY_REQUESTS) || lowered.contains("rate limit") {
        return GenerationErrorKind::RateLimited;
    }

    if matches!(status, Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN))
        || lowered.contains("api key")
        || lowered.contains("authentication")
    {
        return GenerationErrorKind::AuthFailed;
    }

    GenerationErrorKind::Other
}

fn parse_completion(body: &str) -> Result<GenerationResult, GenerationError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|err| GenerationError::other(format!("malformed completion body: {err}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::other("completion returned no choices"))?;

    let text = choice
        .message
        .and_then(|message| message.content)
        .unwrap_or_default();
    let finish_reason = choice
        .finish_reason
        .as_deref()
        .map(FinishReason::parse)
        .unwrap_or(FinishReason::Stop);

    Ok(GenerationResult {
        text,
        finish_reason,
    })
}
