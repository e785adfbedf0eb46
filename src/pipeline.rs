//! # Typed Pipelines
//!
//! A pipeline turns a typed input into a typed output by way of a model:
//!
//! 1. an [`Encoder`] builds the opening messages,
//! 2. the model replies,
//! 3. a [`Parser`] turns the reply text into the output, and an optional
//!    [`Validator`] checks it against the input.
//!
//! Parsers and validators classify their failures as
//! [`ParseError::Invalid`] (the model might fix it) or [`ParseError::Fatal`].
//! Three variants differ in what they do with an invalid reply:
//!
//! - [`OneShotPipeline`] gives up.
//! - [`FeedbackPipeline`] appends the reply and a [`FeedbackGenerator`]
//!   message to the conversation and asks again.
//! - [`FallbackPipeline`] asks the next model from scratch.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use loomstack::llm::{CallContext, Role};
//! use loomstack::pipeline::{
//!     ErrStringFeedback, FeedbackConfig, FeedbackPipeline, FixedEncoder, JsonParser, Pipeline,
//! };
//!
//! let pipeline = FeedbackPipeline::new(
//!     FixedEncoder::new("Reply with a JSON object {\"total\": <number>}"),
//!     JsonParser::<Sum>::new(),
//!     ErrStringFeedback,
//!     model,
//!     FeedbackConfig::new(Role::User, 2),
//! );
//! let (sum, usage) = pipeline.call(&CallContext::background(), &"2+2".to_string()).await?;
//! ```

pub mod encoder;
pub mod error;
pub mod fallback;
pub mod feedback;
pub mod feedback_loop;
pub mod one_shot;
pub mod parser;

pub use encoder::{Encoder, FixedEncoder, SequentialEncoder, TemplateEncoder};
pub use error::{EncodeError, InvalidResponse, ParseError, PipelineError, PipelineErrorKind};
pub use fallback::FallbackPipeline;
pub use feedback::{ErrStringFeedback, FeedbackConfig, FeedbackGenerator};
pub use feedback_loop::FeedbackPipeline;
pub use one_shot::OneShotPipeline;
pub use parser::{
    JsonParser, Parser, RawParser, SubstringParser, ValidatingParser, Validator, substring_after,
    substring_json_object,
};

use crate::llm::context::CallContext;
use crate::llm::core::{DynModel, Model};
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns a `T` into a `U` using a model.
#[async_trait]
pub trait Pipeline<T, U>: Send + Sync {
    /// Runs the pipeline, returning the output with the usage of every model
    /// call it made.
    async fn call(&self, ctx: &CallContext, input: &T) -> Result<(U, Usage), PipelineError>;
}

#[async_trait]
impl<T, U, P> Pipeline<T, U> for Arc<P>
where
    T: Send + Sync,
    U: Send,
    P: Pipeline<T, U> + ?Sized,
{
    async fn call(&self, ctx: &CallContext, input: &T) -> Result<(U, Usage), PipelineError> {
        (**self).call(ctx, input).await
    }
}

/// One model call followed by parsing and validation.
pub(crate) struct Attempt<U> {
    /// The model's reply; empty if the model call failed.
    pub(crate) reply: Message,
    pub(crate) usage: Usage,
    pub(crate) outcome: Result<U, PipelineErrorKind>,
}

pub(crate) async fn run_once<T, U>(
    ctx: &CallContext,
    model: &DynModel,
    messages: &[Message],
    input: &T,
    parser: &dyn Parser<U>,
    validator: Option<&dyn Validator<T, U>>,
) -> Attempt<U> {
    let response = match model.respond(ctx, messages).await {
        Ok(response) => response,
        Err(err) => {
            let (response, error) = err.into_parts();
            return Attempt {
                reply: Message::default(),
                usage: response.usage,
                outcome: Err(PipelineErrorKind::Model(error)),
            };
        }
    };

    let outcome = match parser.parse_response_text(&response.primary_message.content) {
        Ok(output) => match validator.map(|v| v.validate_parsed_response(input, &output)) {
            Some(Err(err)) => Err(PipelineErrorKind::Validate(err)),
            _ => Ok(output),
        },
        Err(err) => Err(PipelineErrorKind::Parse(err)),
    };
    Attempt {
        reply: response.primary_message,
        usage: response.usage,
        outcome,
    }
}
