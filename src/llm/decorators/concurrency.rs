use crate::llm::config::ConcurrencyConfig;
use crate::llm::context::CallContext;
use crate::llm::core::Model;
use crate::llm::error::{LlmError, ModelError, ModelResult};
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

/// A shareable pool of call permits.
///
/// Cloning the limiter shares the pool, so several decorated models (for
/// example one per backend configuration) can draw on one budget.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// A limiter allowing up to `capacity` concurrent calls.
    pub fn new(capacity: usize) -> Result<Self, LlmError> {
        if capacity == 0 {
            return Err(LlmError::InvalidConfig(
                "concurrency limit must allow at least one call".to_string(),
            ));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// A limiter allowing one call at a time.
    pub fn one() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            capacity: 1,
        }
    }

    pub fn from_config(config: &ConcurrencyConfig) -> Result<Self, LlmError> {
        Self::new(config.max_concurrent)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Runs at most `capacity` calls to the inner model at once.
///
/// Waiting for a permit gives up when the call context is done. Waiters are
/// not guaranteed to be admitted in arrival order.
pub struct ConcurrencyLimit<M: Model> {
    inner: M,
    limiter: ConcurrencyLimiter,
}

impl<M: Model> ConcurrencyLimit<M> {
    pub fn new(inner: M, limiter: ConcurrencyLimiter) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<M: Model> Model for ConcurrencyLimit<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let _permit = ctx
            .run(self.limiter.permits.acquire())
            .await
            .map_err(|err| ModelError::new(err, Usage::default()))?
            .map_err(|_| {
                ModelError::new(
                    LlmError::InvalidConfig("concurrency limiter was closed".to_string()),
                    Usage::default(),
                )
            })?;
        trace!(available = self.limiter.available(), "Acquired call permit");
        self.inner.respond(ctx, messages).await
    }
}
