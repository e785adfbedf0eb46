use crate::llm::context::CallContext;
use crate::llm::core::DynModel;
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use crate::pipeline::encoder::Encoder;
use crate::pipeline::error::{PipelineError, PipelineErrorKind};
use crate::pipeline::feedback::{FeedbackConfig, FeedbackGenerator};
use crate::pipeline::parser::{Parser, Validator};
use crate::pipeline::{Pipeline, run_once};
use async_trait::async_trait;
use tracing::debug;

/// Retries invalid replies by telling the model what was wrong.
///
/// The conversation only ever grows: after each invalid reply the reply
/// itself and a feedback message are appended before the next attempt.
/// Model failures, fatal parse errors and encoder errors end the call at
/// once; transient backend failures belong to a
/// [`Retry`](crate::llm::decorators::Retry) decorator beneath the model.
pub struct FeedbackPipeline<T, U> {
    encoder: Box<dyn Encoder<T>>,
    parser: Box<dyn Parser<U>>,
    validator: Option<Box<dyn Validator<T, U>>>,
    feedback: Box<dyn FeedbackGenerator>,
    model: DynModel,
    config: FeedbackConfig,
}

impl<T, U> FeedbackPipeline<T, U> {
    pub fn new(
        encoder: impl Encoder<T> + 'static,
        parser: impl Parser<U> + 'static,
        feedback: impl FeedbackGenerator + 'static,
        model: DynModel,
        config: FeedbackConfig,
    ) -> Self {
        Self {
            encoder: Box::new(encoder),
            parser: Box::new(parser),
            validator: None,
            feedback: Box::new(feedback),
            model,
            config,
        }
    }

    pub fn with_validator(mut self, validator: impl Validator<T, U> + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }
}

#[async_trait]
impl<T, U> Pipeline<T, U> for FeedbackPipeline<T, U>
where
    T: Send + Sync,
    U: Send,
{
    async fn call(&self, ctx: &CallContext, input: &T) -> Result<(U, Usage), PipelineError> {
        let mut history = self
            .encoder
            .build_input_messages(input)
            .map_err(|err| PipelineError::new(PipelineErrorKind::Encode(err), Usage::default()))?;
        let attempts = self.config.max_retries.saturating_add(1);
        let mut total_usage = Usage::default();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = run_once(
                ctx,
                &self.model,
                &history,
                input,
                &*self.parser,
                self.validator.as_deref(),
            )
            .await;
            total_usage += result.usage;

            let err = match result.outcome {
                Ok(output) => return Ok((output, total_usage)),
                Err(PipelineErrorKind::Parse(err) | PipelineErrorKind::Validate(err))
                    if err.is_invalid_response() =>
                {
                    err
                }
                Err(kind) => return Err(PipelineError::new(kind, total_usage)),
            };

            let feedback = self.feedback.format_feedback(&result.reply, &err);
            history.push(result.reply);
            history.push(Message::new(self.config.feedback_role, feedback));

            if attempt >= attempts {
                debug!(attempts, history_len = history.len(), "Model never produced a valid reply");
                return Err(PipelineError::new(
                    PipelineErrorKind::RetriesExhausted { attempts, last: err },
                    total_usage,
                ));
            }
            debug!(attempt, attempts, error = %err, "Model reply was invalid, sending feedback");
        }
    }
}
