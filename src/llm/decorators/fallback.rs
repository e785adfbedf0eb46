use crate::llm::context::CallContext;
use crate::llm::core::{DynModel, Model};
use crate::llm::error::{IndexedFailure, LlmError, ModelError, ModelResult};
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Tries a list of models in order and returns the first success.
///
/// The usage of every failed attempt is folded into the final result. When
/// every model fails, the error names each failure by its index.
pub struct FallbackChain {
    models: Vec<DynModel>,
}

impl FallbackChain {
    /// Builds a chain over `models`, which must not be empty.
    pub fn new(models: Vec<DynModel>) -> Result<Self, LlmError> {
        if models.is_empty() {
            return Err(LlmError::InvalidConfig(
                "fallback chain needs at least one model".to_string(),
            ));
        }
        Ok(Self { models })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[async_trait]
impl Model for FallbackChain {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let mut total_usage = Usage::default();
        let mut failures = Vec::new();

        for (index, model) in self.models.iter().enumerate() {
            match model.respond(ctx, messages).await {
                Ok(response) => {
                    if index > 0 {
                        debug!(index, "Fallback model succeeded");
                    }
                    return Ok(response.including_usage(total_usage));
                }
                Err(err) => {
                    total_usage += err.usage();
                    warn!(index, error = %err.error, "Model in fallback chain failed");
                    failures.push(IndexedFailure {
                        index,
                        error: err.error,
                    });
                    if ctx.is_done() {
                        break;
                    }
                }
            }
        }

        Err(ModelError::new(
            LlmError::AllModelsFailed {
                count: self.models.len(),
                failures,
            },
            total_usage,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingModel;
    use std::sync::Arc;

    #[test]
    fn test_empty_chain_is_rejected() {
        assert!(matches!(FallbackChain::new(Vec::new()), Err(LlmError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = Arc::new(CountingModel::new());
        let second = Arc::new(CountingModel::new());
        let chain = FallbackChain::new(vec![first.clone(), second.clone()]).unwrap();

        let response = chain
            .respond(&CallContext::background(), &[Message::user("hi")])
            .await
            .unwrap();

        assert_eq!(response.primary_message.content, "reply 1");
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_through_and_sums_usage() {
        let first = Arc::new(CountingModel::new().always_fail());
        let second = Arc::new(CountingModel::new());
        let chain = FallbackChain::new(vec![first.clone(), second.clone()]).unwrap();

        let response = chain
            .respond(&CallContext::background(), &[Message::user("hi")])
            .await
            .unwrap();

        assert_eq!(response.primary_message.content, "reply 1");
        assert_eq!(response.usage.failed_calls, 1);
        assert_eq!(response.usage.successful_calls, 1);
    }

    #[tokio::test]
    async fn test_all_failing_reports_every_model() {
        let chain = FallbackChain::new(vec![
            Arc::new(CountingModel::new().always_fail()),
            Arc::new(CountingModel::new().always_fail()),
            Arc::new(CountingModel::new().always_fail()),
        ])
        .unwrap();

        let err = chain
            .respond(&CallContext::background(), &[Message::user("hi")])
            .await
            .unwrap_err();

        assert_eq!(err.usage().failed_calls, 3);
        assert!(err.response.primary_message.content.is_empty());
        match &err.error {
            LlmError::AllModelsFailed { count, failures } => {
                assert_eq!(*count, 3);
                let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
                assert_eq!(indices, vec![0, 1, 2]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let text = err.to_string();
        assert!(text.starts_with("all 3 models in retry chain failed"));
        assert!(text.contains("model 2 failed"));
    }

    #[tokio::test]
    async fn test_stops_when_context_is_cancelled() {
        let ctx = CallContext::background();
        ctx.cancel();
        let second = Arc::new(CountingModel::new());
        let chain = FallbackChain::new(vec![
            Arc::new(CountingModel::new()),
            second.clone(),
        ])
        .unwrap();

        let err = chain.respond(&ctx, &[Message::user("hi")]).await.unwrap_err();

        assert!(err.error.is_cancellation());
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_early_stop_reports_models_tried() {
        let ctx = CallContext::background();
        ctx.cancel();
        let chain = FallbackChain::new(vec![
            Arc::new(CountingModel::new()),
            Arc::new(CountingModel::new()),
            Arc::new(CountingModel::new()),
        ])
        .unwrap();

        let err = chain.respond(&ctx, &[Message::user("hi")]).await.unwrap_err();

        match &err.error {
            LlmError::AllModelsFailed { count, failures } => {
                assert_eq!(*count, 3);
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err
            .to_string()
            .contains("1 of 3 models in retry chain failed before the call ended"));
    }
}
