//! Artifact Generator
//!
//! Fans one prompt out into N independent requests. Each request is a fresh
//! single-turn exchange; nothing from one response reaches another request.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use rsi_prompts::coding;
use tracing::{debug, warn};

use crate::error::StageError;
use crate::gateway::{GatewayError, ModelGateway};

#[derive(Clone)]
pub struct ArtifactGenerator {
    gateway: Arc<ModelGateway>,
    max_concurrency: usize,
    schema_retries: usize,
}

impl ArtifactGenerator {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self {
            gateway,
            max_concurrency: 1,
            schema_retries: 0,
        }
    }

    /// Allow up to `max_concurrency` requests of one fan-out in flight at once
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Re-ask up to `schema_retries` times when a structured response fails to parse
    pub fn with_schema_retries(mut self, schema_retries: usize) -> Self {
        self.schema_retries = schema_retries;
        self
    }

    /// Issue `count` independent requests carrying `prompt`, results in request order
    pub async fn generate(&self, prompt: &str, count: usize) -> Result<Vec<String>, GatewayError> {
        stream::iter(0..count)
            .map(|slot| async move {
                debug!("Generating artifact {}/{}", slot + 1, count);
                self.gateway.chat(&[prompt.to_string()]).await
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    /// Issue one request and parse the response with `parse`.
    ///
    /// A schema violation triggers a bounded re-ask that quotes the malformed
    /// response and the parse error back to the model.
    pub async fn generate_structured<T, F>(&self, prompt: &str, parse: F) -> Result<T, StageError>
    where
        F: Fn(&str) -> Result<T, StageError>,
    {
        let mut messages = vec![prompt.to_string()];
        let mut corrections = 0;

        loop {
            let response = self.gateway.chat(&messages).await?;
            match parse(&response) {
                Ok(parsed) => return Ok(parsed),
                Err(StageError::SchemaViolation { stage, reason })
                    if corrections < self.schema_retries =>
                {
                    corrections += 1;
                    warn!(
                        "Malformed {} response ({}), asking for a correction ({}/{})",
                        stage, reason, corrections, self.schema_retries
                    );
                    messages = vec![
                        prompt.to_string(),
                        coding::correct_response(&response, &reason),
                    ];
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `count` independent structured requests, results in request order
    pub async fn generate_structured_many<T, F>(
        &self,
        prompt: &str,
        count: usize,
        parse: F,
    ) -> Result<Vec<T>, StageError>
    where
        F: Fn(&str) -> Result<T, StageError>,
    {
        let parse = &parse;
        stream::iter(0..count)
            .map(|_| self.generate_structured(prompt, parse))
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Stage;
    use crate::gateway::{ChatMessage, ChatModel, ModelError, RetryPolicy};
    use crate::parse;
    use crate::testing::{gateway_with, ScriptedModel};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_generate_preserves_length_and_order() {
        for count in 1..=5 {
            let responses: Vec<String> = (0..count).map(|i| format!("artifact {}", i)).collect();
            let refs: Vec<&str> = responses.iter().map(String::as_str).collect();
            let model = Arc::new(ScriptedModel::responding(&refs));
            let (gateway, _) = gateway_with(model.clone(), RetryPolicy::immediate(5));

            let artifacts = ArtifactGenerator::new(gateway)
                .generate("prompt", count)
                .await
                .unwrap();

            assert_eq!(artifacts, responses);
            assert!(model.prompts().iter().all(|p| p == "prompt"));
        }
    }

    #[tokio::test]
    async fn test_each_request_is_a_fresh_single_turn() {
        let model = Arc::new(ScriptedModel::responding(&["a", "b", "c"]));
        let (gateway, _) = gateway_with(model.clone(), RetryPolicy::immediate(5));

        ArtifactGenerator::new(gateway)
            .generate("prompt", 3)
            .await
            .unwrap();

        for session in model.requests() {
            assert_eq!(session.len(), 2);
            assert_eq!(session[1].content, "prompt");
        }
    }

    /// Answers with its arrival number, later arrivals finishing first
    struct ReversedLatencyModel {
        arrivals: AtomicUsize,
        total: usize,
    }

    #[async_trait::async_trait]
    impl ChatModel for ReversedLatencyModel {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ModelError> {
            let arrival = self.arrivals.fetch_add(1, Ordering::SeqCst);
            let delay = (self.total - arrival) as u64 * 10;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(arrival.to_string())
        }
    }

    #[tokio::test]
    async fn test_concurrent_generation_keeps_request_order() {
        let model = Arc::new(ReversedLatencyModel {
            arrivals: AtomicUsize::new(0),
            total: 4,
        });
        let gateway = Arc::new(ModelGateway::new(model, RetryPolicy::immediate(1)));

        let artifacts = ArtifactGenerator::new(gateway)
            .with_max_concurrency(4)
            .generate("prompt", 4)
            .await
            .unwrap();

        assert_eq!(artifacts, vec!["0", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_exhausted_slot_fails_the_batch() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("first".to_string()),
            Err(ScriptedModel::transient()),
            Err(ScriptedModel::transient()),
        ]));
        let (gateway, _) = gateway_with(model.clone(), RetryPolicy::immediate(2));

        let result = ArtifactGenerator::new(gateway).generate("prompt", 3).await;

        assert!(matches!(result, Err(GatewayError::ExhaustedRetries { .. })));
        // The third slot is never requested once the second one failed
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_schema_violation_is_corrected_once() {
        let model = Arc::new(ScriptedModel::responding(&[
            "Sure! Here is the JSON you asked for",
            r#"{"best_evaluation_function_id": 1, "rationale": "covers edge cases"}"#,
        ]));
        let (gateway, _) = gateway_with(model.clone(), RetryPolicy::immediate(5));

        let judgment = ArtifactGenerator::new(gateway)
            .with_schema_retries(1)
            .generate_structured("judge", parse::evaluation_function_verdict)
            .await
            .unwrap();

        assert_eq!(judgment.winner().unwrap().as_str(), "1");
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].len(), 3);
        assert_eq!(requests[1][1].content, "judge");
        assert!(requests[1][2].content.contains("Sure! Here is the JSON"));
    }

    #[tokio::test]
    async fn test_schema_violation_without_retries_fails() {
        let model = Arc::new(ScriptedModel::responding(&["not json"]));
        let (gateway, _) = gateway_with(model.clone(), RetryPolicy::immediate(5));

        let result = ArtifactGenerator::new(gateway)
            .generate_structured("judge", parse::solution_ranking)
            .await;

        match result {
            Err(StageError::SchemaViolation { stage, .. }) => assert_eq!(stage, Stage::Solution),
            other => panic!("expected schema violation, got {:?}", other),
        }
        assert_eq!(model.requests().len(), 1);
    }
}
