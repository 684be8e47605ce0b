//! Chat-completion collaborator for classification and reply drafting

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionResponseFormat,
    ChatCompletionResponseFormatType, CreateChatCompletionRequestArgs,
    CreateChatCompletionResponse,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Result, TriageError};

/// One system + user turn sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    /// Ask the provider for a strict JSON object
    pub json_output: bool,
}

/// Trait for chat-completion providers, mockable in tests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generated text of the first choice; empty when the model returned nothing
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        (**self).complete(request).await
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for any OpenAI-compatible chat completions endpoint
///
/// Makes a single attempt per call; rate limits are retried by
/// [`crate::retry`], which needs the HTTP status to recognise them.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(api_base: &str, api_key: &str, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.into(),
        }
    }

    /// Build from config, reading the API key from the configured env var
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            TriageError::ConfigError(format!(
                "LLM API key not found: set the {} environment variable",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(&config.api_base, &api_key, config.model.clone()))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_prompt)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user_prompt)
                .build()?
                .into(),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .temperature(request.temperature);
        if request.json_output {
            args.response_format(ChatCompletionResponseFormat {
                r#type: ChatCompletionResponseFormatType::JsonObject,
            });
        }

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&args.build()?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let error = TriageError::from_llm_response(status.as_u16(), &body);
            warn!("Completion request failed (HTTP {}): {}", status.as_u16(), error);
            return Err(error);
        }

        let response: CreateChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| TriageError::LlmError(format!("Unreadable completion response: {}", e)))?;
        debug!(
            "Completion from {} ({} choices)",
            self.model,
            response.choices.len()
        );

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}
