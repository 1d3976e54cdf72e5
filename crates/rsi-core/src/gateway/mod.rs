//! Model Gateway
//!
//! The single boundary to the chat-completion model. Every call is a fresh
//! single-turn session: one fixed system turn followed by the caller's
//! messages as user turns. Transient failures are retried here and never
//! surface past this module except as [`GatewayError::ExhaustedRetries`].

pub mod openai;
pub mod retry;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

pub use openai::OpenAiChat;
pub use retry::{Pause, RateGate, RetryPolicy, TokioPause};

/// Message in a chat session
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("completion contained no content")]
    EmptyCompletion,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("model call failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: usize, last_error: String },
}

/// A chat-completion backend
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError>;
}

pub struct ModelGateway {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    policy: RetryPolicy,
    gate: RateGate,
    pause: Arc<dyn Pause>,
}

impl ModelGateway {
    pub fn new(model: Arc<dyn ChatModel>, policy: RetryPolicy) -> Self {
        Self {
            model,
            system_prompt: rsi_prompts::SYSTEM_PROMPT.to_string(),
            gate: RateGate::new(policy.min_interval),
            policy,
            pause: Arc::new(TokioPause),
        }
    }

    /// Replace how backoff waits are performed
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    /// Send `messages` as user turns after the system turn and return the completion
    pub async fn chat(&self, messages: &[String]) -> Result<String, GatewayError> {
        let session: Vec<ChatMessage> = std::iter::once(ChatMessage::system(&self.system_prompt))
            .chain(messages.iter().map(|m| ChatMessage::user(m.as_str())))
            .collect();

        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            self.gate.wait().await;

            match self.model.complete(&session).await {
                Ok(completion) => {
                    debug!("Request: {:?}, completion: {}", session, completion);
                    return Ok(completion);
                }
                Err(e) => {
                    warn!("Model call attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        self.pause.pause(self.policy.backoff()).await;
                    }
                }
            }
        }

        Err(GatewayError::ExhaustedRetries {
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{gateway_with, RecordingPause, ScriptedModel};
    use std::time::Duration;

    #[tokio::test]
    async fn test_session_has_one_system_turn_then_user_turns() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("done".to_string())]));
        let (gateway, _) = gateway_with(model.clone(), RetryPolicy::immediate(5));

        let completion = gateway
            .chat(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(completion, "done");

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        let session = &requests[0];
        assert_eq!(session.len(), 3);
        assert_eq!(session[0].role, "system");
        assert_eq!(session[0].content, rsi_prompts::SYSTEM_PROMPT);
        assert_eq!(session[1], ChatMessage::user("first"));
        assert_eq!(session[2], ChatMessage::user("second"));
    }

    #[tokio::test]
    async fn test_succeeds_on_fifth_attempt_after_four_backoffs() {
        let mut script: Vec<Result<String, ModelError>> =
            (0..4).map(|_| Err(ScriptedModel::transient())).collect();
        script.push(Ok("finally".to_string()));
        let model = Arc::new(ScriptedModel::new(script));
        let pause = Arc::new(RecordingPause::default());
        let policy = RetryPolicy::default().with_min_interval(Duration::ZERO);
        let gateway = ModelGateway::new(model.clone(), policy).with_pause(pause.clone());

        let completion = gateway.chat(&["prompt".to_string()]).await.unwrap();

        assert_eq!(completion, "finally");
        assert_eq!(model.requests().len(), 5);
        assert_eq!(pause.pauses(), vec![Duration::from_secs(12); 4]);
    }

    #[tokio::test]
    async fn test_five_failures_exhaust_retries() {
        let script = (0..5).map(|_| Err(ScriptedModel::transient())).collect();
        let model = Arc::new(ScriptedModel::new(script));
        let (gateway, pause) = gateway_with(model.clone(), RetryPolicy::immediate(5));

        let result = gateway.chat(&["prompt".to_string()]).await;

        match result {
            Err(GatewayError::ExhaustedRetries { attempts, last_error }) => {
                assert_eq!(attempts, 5);
                assert!(last_error.contains("503"));
            }
            Ok(completion) => panic!("expected exhaustion, got {:?}", completion),
        }
        assert_eq!(model.requests().len(), 5);
        assert_eq!(pause.pauses().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_completion_is_retried() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::EmptyCompletion),
            Ok("content".to_string()),
        ]));
        let (gateway, pause) = gateway_with(model, RetryPolicy::immediate(5));

        assert_eq!(gateway.chat(&["p".to_string()]).await.unwrap(), "content");
        assert_eq!(pause.pauses().len(), 1);
    }
}
