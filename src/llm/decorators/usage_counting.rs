use crate::llm::context::CallContext;
use crate::llm::core::Model;
use crate::llm::error::ModelResult;
use crate::llm::message::Message;
use crate::llm::usage::UsageCounter;
use async_trait::async_trait;
use std::sync::Arc;

/// Adds the usage of every call, successful or not, to a shared counter.
///
/// The result passes through unchanged.
pub struct UsageCounting<M: Model> {
    inner: M,
    counter: Arc<UsageCounter>,
}

impl<M: Model> UsageCounting<M> {
    pub fn new(inner: M, counter: Arc<UsageCounter>) -> Self {
        Self { inner, counter }
    }

    pub fn counter(&self) -> &Arc<UsageCounter> {
        &self.counter
    }
}

#[async_trait]
impl<M: Model> Model for UsageCounting<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let result = self.inner.respond(ctx, messages).await;
        let usage = match &result {
            Ok(response) => response.usage,
            Err(err) => err.usage(),
        };
        self.counter.add(usage);
        result
    }
}
