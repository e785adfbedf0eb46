use crate::llm::context::CallContext;
use crate::llm::core::DynModel;
use crate::llm::error::LlmError;
use crate::llm::usage::Usage;
use crate::pipeline::encoder::Encoder;
use crate::pipeline::error::{PipelineError, PipelineErrorKind};
use crate::pipeline::parser::{Parser, Validator};
use crate::pipeline::{Pipeline, run_once};
use async_trait::async_trait;
use tracing::debug;

/// Asks each model in turn until one produces a valid reply.
///
/// Every model gets a fresh conversation from the encoder; nothing is carried
/// over from earlier candidates. Only invalid replies move on to the next
/// model. Any other failure ends the call, so a typical use is a cached model
/// followed by the same model without the cache.
pub struct FallbackPipeline<T, U> {
    encoder: Box<dyn Encoder<T>>,
    parser: Box<dyn Parser<U>>,
    validator: Option<Box<dyn Validator<T, U>>>,
    models: Vec<DynModel>,
}

impl<T, U> FallbackPipeline<T, U> {
    pub fn new(
        encoder: impl Encoder<T> + 'static,
        parser: impl Parser<U> + 'static,
        models: Vec<DynModel>,
    ) -> Result<Self, LlmError> {
        if models.is_empty() {
            return Err(LlmError::InvalidConfig(
                "fallback pipeline needs at least one model".to_string(),
            ));
        }
        Ok(Self {
            encoder: Box::new(encoder),
            parser: Box::new(parser),
            validator: None,
            models,
        })
    }

    pub fn with_validator(mut self, validator: impl Validator<T, U> + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }
}

#[async_trait]
impl<T, U> Pipeline<T, U> for FallbackPipeline<T, U>
where
    T: Send + Sync,
    U: Send,
{
    async fn call(&self, ctx: &CallContext, input: &T) -> Result<(U, Usage), PipelineError> {
        let mut total_usage = Usage::default();
        let mut errors = Vec::new();

        for (index, model) in self.models.iter().enumerate() {
            let messages = self.encoder.build_input_messages(input).map_err(|err| {
                PipelineError::new(PipelineErrorKind::Encode(err), total_usage)
            })?;
            let attempt = run_once(
                ctx,
                model,
                &messages,
                input,
                &*self.parser,
                self.validator.as_deref(),
            )
            .await;
            total_usage += attempt.usage;

            match attempt.outcome {
                Ok(output) => return Ok((output, total_usage)),
                Err(kind) if kind.is_invalid_response() => {
                    debug!(index, error = %kind, "Model produced an invalid reply, trying next");
                    errors.push(kind);
                }
                Err(kind) => return Err(PipelineError::new(kind, total_usage)),
            }
        }

        Err(PipelineError::new(
            PipelineErrorKind::AllModelsInvalid {
                count: self.models.len(),
                errors,
            },
            total_usage,
        ))
    }
}
