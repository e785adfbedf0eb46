use crate::llm::context::CallContext;
use crate::llm::core::DynModel;
use crate::llm::usage::Usage;
use crate::pipeline::encoder::Encoder;
use crate::pipeline::error::{PipelineError, PipelineErrorKind};
use crate::pipeline::parser::{Parser, Validator};
use crate::pipeline::{Pipeline, run_once};
use async_trait::async_trait;

/// Encodes, calls the model once and parses the reply. No retries.
pub struct OneShotPipeline<T, U> {
    encoder: Box<dyn Encoder<T>>,
    parser: Box<dyn Parser<U>>,
    validator: Option<Box<dyn Validator<T, U>>>,
    model: DynModel,
}

impl<T, U> OneShotPipeline<T, U> {
    pub fn new(
        encoder: impl Encoder<T> + 'static,
        parser: impl Parser<U> + 'static,
        model: DynModel,
    ) -> Self {
        Self {
            encoder: Box::new(encoder),
            parser: Box::new(parser),
            validator: None,
            model,
        }
    }

    pub fn with_validator(mut self, validator: impl Validator<T, U> + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }
}

#[async_trait]
impl<T, U> Pipeline<T, U> for OneShotPipeline<T, U>
where
    T: Send + Sync,
    U: Send,
{
    async fn call(&self, ctx: &CallContext, input: &T) -> Result<(U, Usage), PipelineError> {
        let messages = self
            .encoder
            .build_input_messages(input)
            .map_err(|err| PipelineError::new(PipelineErrorKind::Encode(err), Usage::default()))?;
        let attempt = run_once(
            ctx,
            &self.model,
            &messages,
            input,
            &*self.parser,
            self.validator.as_deref(),
        )
        .await;
        match attempt.outcome {
            Ok(output) => Ok((output, attempt.usage)),
            Err(kind) => Err(PipelineError::new(kind, attempt.usage)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::LlmError;
    use crate::pipeline::encoder::FixedEncoder;
    use crate::pipeline::error::ParseError;
    use crate::pipeline::parser::{JsonParser, RawParser};
    use crate::testing::{CountingModel, ScriptedModel};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ping_pong() {
        let model = Arc::new(ScriptedModel::new().on("ping", "pong"));
        let pipeline = OneShotPipeline::new(FixedEncoder::new("1234"), RawParser, model.clone());

        let (output, usage) = pipeline
            .call(&CallContext::background(), &"ping".to_string())
            .await
            .unwrap();

        assert_eq!(output, "pong");
        assert_eq!(usage.successful_calls, 1);
        assert_eq!(model.conversations()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_reply_is_not_retried() {
        let model = Arc::new(ScriptedModel::new().on("q", "no json here"));
        let pipeline = OneShotPipeline::new(
            FixedEncoder::new("answer in json"),
            JsonParser::<serde_json::Value>::new(),
            model.clone(),
        );

        let err = pipeline
            .call(&CallContext::background(), &"q".to_string())
            .await
            .unwrap_err();

        assert!(err.is_invalid_response());
        assert!(matches!(err.kind, PipelineErrorKind::Parse(ParseError::Invalid(_))));
        assert_eq!(err.usage.successful_calls, 1);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_keeps_usage() {
        let pipeline = OneShotPipeline::new(
            FixedEncoder::new("sys"),
            RawParser,
            Arc::new(CountingModel::new().always_fail()),
        );

        let err = pipeline
            .call(&CallContext::background(), &"q".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err.kind, PipelineErrorKind::Model(LlmError::PromptError(_))));
        assert_eq!(err.usage.failed_calls, 1);
        assert!(err.to_string().starts_with("failed to get model response"));
    }

    #[tokio::test]
    async fn test_validator_failure() {
        let pipeline = OneShotPipeline::<String, String>::new(
            FixedEncoder::new("sys"),
            RawParser,
            Arc::new(ScriptedModel::new().on("q", "short")),
        )
        .with_validator(|_input: &String, output: &String| {
            if output.len() > 10 {
                Ok(())
            } else {
                Err(ParseError::invalid("reply too short"))
            }
        });

        let err = pipeline
            .call(&CallContext::background(), &"q".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err.kind, PipelineErrorKind::Validate(_)));
        assert_eq!(err.to_string(), "failed to validate model response: reply too short");
    }
}
