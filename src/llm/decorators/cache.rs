use crate::llm::cache::ModelResponseCache;
use crate::llm::config::CacheConfig;
use crate::llm::context::CallContext;
use crate::llm::core::{Model, ModelResponse};
use crate::llm::error::{LlmError, ModelError, ModelResult};
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Serves repeated conversations from a [`ModelResponseCache`].
///
/// A hit costs nothing: it returns the stored messages with zero usage and
/// never reaches the inner model. A miss calls the inner model and stores the
/// result if, and only if, the call succeeded.
///
/// A failed write is reported as [`LlmError::CacheWrite`], but the
/// [`ModelError`] still carries the complete successful response so callers
/// can keep it.
pub struct Cache<M: Model> {
    inner: M,
    store: Arc<dyn ModelResponseCache>,
    config: CacheConfig,
}

impl<M: Model> Cache<M> {
    pub fn new(inner: M, store: Arc<dyn ModelResponseCache>, config: CacheConfig) -> Self {
        Self {
            inner,
            store,
            config,
        }
    }

    pub fn salt(&self) -> &str {
        &self.config.salt
    }
}

#[async_trait]
impl<M: Model> Model for Cache<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let cached = self
            .store
            .get_cached_response(ctx, &self.config.salt, messages)
            .await
            .map_err(|err| ModelError::new(LlmError::CacheRead(err), Usage::default()))?;
        if let Some(hit) = cached {
            debug!(messages = messages.len(), "Cache hit");
            return Ok(ModelResponse {
                primary_message: hit.primary_message,
                auxiliary_messages: hit.auxiliary_messages,
                usage: Usage::default(),
            });
        }

        debug!(messages = messages.len(), "Cache miss, calling inner model");
        let response = self
            .inner
            .respond(ctx, messages)
            .await
            .map_err(ModelError::only_usage)?;

        if let Err(err) = self
            .store
            .set_cached_response(
                ctx,
                &self.config.salt,
                messages,
                &response.auxiliary_messages,
                &response.primary_message,
            )
            .await
        {
            warn!(error = %err, "Failed to store model response in cache");
            return Err(ModelError::with_response(LlmError::CacheWrite(err), response));
        }
        Ok(response)
    }
}
