use crate::llm::config::TwoStageReasonConfig;
use crate::llm::context::CallContext;
use crate::llm::core::{Model, ModelResponse};
use crate::llm::error::{LlmError, ModelResult};
use crate::llm::message::{Message, Role};
use async_trait::async_trait;
use tracing::debug;

/// Simulates a reasoning model by chaining two ordinary ones.
///
/// The `reasoner` sees the conversation behind a system instruction asking it
/// to think about the task. Its reply becomes a [`Role::Reasoning`] message
/// appended to the conversation the `answerer` receives. The returned
/// auxiliary messages are the reasoner's own auxiliaries, then the reasoning
/// message, then the answerer's auxiliaries.
///
/// Most backends reject the reasoning role, so the answerer is usually wrapped
/// in a [`RoleRemapper`](super::RoleRemapper).
pub struct TwoStageReason<R: Model, A: Model> {
    reasoner: R,
    answerer: A,
    config: TwoStageReasonConfig,
}

impl<R: Model, A: Model> TwoStageReason<R, A> {
    pub fn new(reasoner: R, answerer: A) -> Self {
        Self::with_config(reasoner, answerer, TwoStageReasonConfig::default())
    }

    pub fn with_config(reasoner: R, answerer: A, config: TwoStageReasonConfig) -> Self {
        Self {
            reasoner,
            answerer,
            config,
        }
    }
}

#[async_trait]
impl<R: Model, A: Model> Model for TwoStageReason<R, A> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let mut reasoner_input = Vec::with_capacity(messages.len() + 1);
        reasoner_input.push(Message::system(self.config.reasoning_prompt.clone()));
        reasoner_input.extend_from_slice(messages);

        let reasoned = self
            .reasoner
            .respond(ctx, &reasoner_input)
            .await
            .map_err(|err| err.only_usage().map_error(|e| LlmError::Reasoner(Box::new(e))))?;

        let reasoning = reasoned.primary_message.relabeled(Role::Reasoning);
        debug!(reasoning_chars = reasoning.content.len(), "Reasoner produced reasoning");

        let mut answerer_input = Vec::with_capacity(messages.len() + 1);
        answerer_input.extend_from_slice(messages);
        answerer_input.push(reasoning.clone());

        let answered = self
            .answerer
            .respond(ctx, &answerer_input)
            .await
            .map_err(|err| {
                err.only_usage()
                    .including_usage(reasoned.usage)
                    .map_error(|e| LlmError::Answerer(Box::new(e)))
            })?;

        let mut auxiliary_messages = reasoned.auxiliary_messages;
        auxiliary_messages.push(reasoning);
        auxiliary_messages.extend(answered.auxiliary_messages);

        Ok(ModelResponse {
            primary_message: answered.primary_message,
            auxiliary_messages,
            usage: reasoned.usage + answered.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingModel, ScriptedModel};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reasoning_is_appended_for_answerer() {
        let reasoner = Arc::new(ScriptedModel::new().on("what is 2+2?", "add two and two"));
        let answerer = Arc::new(ScriptedModel::new().on("add two and two", "4"));
        let model = TwoStageReason::new(reasoner.clone(), answerer.clone());

        let response = model
            .respond(&CallContext::background(), &[Message::user("what is 2+2?")])
            .await
            .unwrap();

        assert_eq!(response.primary_message.content, "4");
        assert_eq!(response.auxiliary_messages, vec![Message::reasoning("add two and two")]);
        assert_eq!(response.usage.successful_calls, 2);

        let seen_by_reasoner = &reasoner.conversations()[0];
        assert_eq!(seen_by_reasoner[0].role, Role::System);
        assert_eq!(seen_by_reasoner[1], Message::user("what is 2+2?"));

        let seen_by_answerer = &answerer.conversations()[0];
        assert_eq!(
            seen_by_answerer,
            &vec![Message::user("what is 2+2?"), Message::reasoning("add two and two")]
        );
    }

    #[tokio::test]
    async fn test_reasoner_failure_skips_answerer() {
        let answerer = Arc::new(CountingModel::new());
        let model = TwoStageReason::new(CountingModel::new().always_fail(), answerer.clone());

        let err = model
            .respond(&CallContext::background(), &[Message::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err.error, LlmError::Reasoner(_)));
        assert!(err.to_string().starts_with("failed to call reasoning model"));
        assert_eq!(err.usage().failed_calls, 1);
        assert_eq!(answerer.calls(), 0);
    }

    #[tokio::test]
    async fn test_answerer_failure_keeps_both_usages() {
        let model = TwoStageReason::new(CountingModel::new(), CountingModel::new().always_fail());

        let err = model
            .respond(&CallContext::background(), &[Message::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err.error, LlmError::Answerer(_)));
        assert_eq!(err.usage().successful_calls, 1);
        assert_eq!(err.usage().failed_calls, 1);
        assert_eq!(err.usage().input_tokens, 10);
    }

    #[tokio::test]
    async fn test_custom_prompt_reaches_reasoner() {
        let reasoner = Arc::new(ScriptedModel::new().on("q", "r"));
        let answerer = ScriptedModel::new().on("r", "a");
        let model = TwoStageReason::with_config(
            reasoner.clone(),
            answerer,
            TwoStageReasonConfig {
                reasoning_prompt: "think hard".to_string(),
            },
        );
        model
            .respond(&CallContext::background(), &[Message::user("q")])
            .await
            .unwrap();
        assert_eq!(reasoner.conversations()[0][0], Message::system("think hard"));
    }
}
