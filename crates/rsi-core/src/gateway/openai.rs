//! OpenAI-compatible chat completion client

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatMessage, ChatModel, ModelError};
use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat model served over an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    organization: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(
        api_url: &str,
        api_key: &str,
        organization: Option<&str>,
        model: &str,
        temperature: f32,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("rsi-suite/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            organization: organization.map(str::to_string),
            model: model.to_string(),
            temperature,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ModelError> {
        Self::new(
            &config.api_url,
            &config.api_key,
            config.organization.as_deref(),
            &config.model,
            config.temperature,
        )
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        debug!("Chat completion request to {}/chat/completions", self.api_url);

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Chat API error {}: {}", status, message);
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::EmptyCompletion)
    }
}
