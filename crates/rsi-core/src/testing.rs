//! Scripted collaborators for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::gateway::{ChatMessage, ChatModel, ModelError, ModelGateway, Pause, RetryPolicy};

/// Chat model that replays a fixed script of responses and records every session
pub(crate) struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub(crate) fn new(script: Vec<Result<String, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn responding(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub(crate) fn transient() -> ModelError {
        ModelError::Api {
            status: 503,
            message: "service unavailable".to_string(),
        }
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    /// First user turn of every recorded session
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|session| session.get(1).map(|m| m.content.clone()).unwrap_or_default())
            .collect()
    }
}

#[async_trait::async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::transient()))
    }
}

/// Pause that records requested durations instead of sleeping
#[derive(Default)]
pub(crate) struct RecordingPause {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub(crate) fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

pub(crate) fn gateway_with(
    model: Arc<ScriptedModel>,
    policy: RetryPolicy,
) -> (Arc<ModelGateway>, Arc<RecordingPause>) {
    let pause = Arc::new(RecordingPause::default());
    let gateway = ModelGateway::new(model, policy).with_pause(pause.clone());
    (Arc::new(gateway), pause)
}
