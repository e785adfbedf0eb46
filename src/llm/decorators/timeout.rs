use crate::llm::config::TimeoutConfig;
use crate::llm::context::CallContext;
use crate::llm::core::Model;
use crate::llm::error::ModelResult;
use crate::llm::message::Message;
use async_trait::async_trait;

/// Gives every call a deadline `timeout` after it starts.
///
/// The inner model receives a derived context; if the caller's own deadline
/// is earlier, that one still governs. The derived context is cancelled when
/// the call returns, successful or not.
///
/// This only signals. An inner model that ignores its context is not
/// interrupted.
pub struct Timeout<M: Model> {
    inner: M,
    config: TimeoutConfig,
}

impl<M: Model> Timeout<M> {
    pub fn new(inner: M, config: TimeoutConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<M: Model> Model for Timeout<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let timeout_ctx = ctx.with_timeout(self.config.timeout);
        let _release = timeout_ctx.drop_guard();
        self.inner.respond(&timeout_ctx, messages).await
    }
}
