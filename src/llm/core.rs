use crate::llm::context::CallContext;
use crate::llm::error::ModelResult;
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use async_trait::async_trait;
use std::sync::Arc;

/// What a model produced for one call to [`Model::respond`].
///
/// `usage` may be the sum of several backend calls when the response came
/// through decorators such as retry, fallback or two-stage reasoning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    /// The reply to the input messages.
    pub primary_message: Message,
    /// Extra messages produced along the way, e.g. reasoning.
    pub auxiliary_messages: Vec<Message>,
    /// What producing this response cost.
    pub usage: Usage,
}

impl ModelResponse {
    pub fn new(primary_message: Message, usage: Usage) -> Self {
        Self {
            primary_message,
            auxiliary_messages: Vec::new(),
            usage,
        }
    }

    /// A response with no messages, used to report usage on error paths.
    pub fn from_usage(usage: Usage) -> Self {
        Self {
            usage,
            ..Self::default()
        }
    }

    pub fn with_auxiliary(mut self, auxiliary_messages: Vec<Message>) -> Self {
        self.auxiliary_messages = auxiliary_messages;
        self
    }

    /// Projects this response down to its usage.
    pub fn only_usage(&self) -> Self {
        Self::from_usage(self.usage)
    }

    /// Returns this response with `usage` added to its own.
    ///
    /// Threads the cost of earlier attempts through to the final response.
    pub fn including_usage(mut self, usage: Usage) -> Self {
        self.usage += usage;
        self
    }
}

/// A trait that defines the contract for any model the stack can call.
///
/// This is the seam between provider adapters and the rest of the crate:
/// every backend adapter implements it, and every decorator both implements it
/// and wraps another implementation of it.
///
/// # Examples
///
/// ```rust
/// use loomstack::llm::{CallContext, Message, Model, ModelResponse, ModelResult, Usage};
/// use async_trait::async_trait;
///
/// struct EchoModel;
///
/// #[async_trait]
/// impl Model for EchoModel {
///     async fn respond(&self, _ctx: &CallContext, messages: &[Message]) -> ModelResult {
///         let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
///         Ok(ModelResponse::new(Message::assistant(last), Usage::success(0, 0)))
///     }
/// }
/// ```
///
/// # Contract
///
/// Implementations must:
///
/// 1. Leave `messages` untouched (they only ever receive a shared slice).
/// 2. Report usage on every path, including failures, through
///    [`ModelError::response`](crate::llm::ModelError).
/// 3. Return promptly with a cancellation error once `ctx` is done instead of
///    waiting for work whose result nobody will read.
///
/// # Thread Safety
///
/// The trait requires `Send + Sync` and takes `&self` so that one decorated
/// model can be shared between concurrent call chains behind an `Arc`.
#[async_trait]
pub trait Model: Send + Sync {
    /// Responds to a conversation.
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult;
}

#[async_trait]
impl<M: Model + ?Sized> Model for Arc<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        (**self).respond(ctx, messages).await
    }
}

#[async_trait]
impl<M: Model + ?Sized> Model for Box<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        (**self).respond(ctx, messages).await
    }
}

/// A shared, type-erased model.
pub type DynModel = Arc<dyn Model>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_usage_drops_messages() {
        let response = ModelResponse::new(Message::assistant("hello"), Usage::success(3, 4))
            .with_auxiliary(vec![Message::reasoning("because")]);
        let projected = response.only_usage();
        assert!(projected.auxiliary_messages.is_empty());
        assert_eq!(projected.primary_message, Message::default());
        assert_eq!(projected.usage, response.usage);
    }

    #[test]
    fn test_including_usage_sums() {
        let response = ModelResponse::new(Message::assistant("hello"), Usage::success(3, 4))
            .including_usage(Usage::failure());
        assert_eq!(response.usage.successful_calls, 1);
        assert_eq!(response.usage.failed_calls, 1);
        assert_eq!(response.primary_message.content, "hello");
    }
}
