use crate::llm::config::RateLimitConfig;
use crate::llm::context::CallContext;
use crate::llm::core::Model;
use crate::llm::error::{LlmError, ModelError, ModelResult};
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Spaces out the starts of calls to the inner model by at least
/// `min_interval`. Calls are admitted one at a time in the order they reach
/// the limiter; how long each call then runs is not limited.
pub struct RateLimit<M: Model> {
    inner: M,
    config: RateLimitConfig,
    next_slot: Mutex<Instant>,
}

impl<M: Model> RateLimit<M> {
    pub fn new(inner: M, config: RateLimitConfig) -> Self {
        Self {
            inner,
            config,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    async fn wait_for_slot(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        if *next_slot > now {
            trace!(wait_ms = (*next_slot - now).as_millis() as u64, "Waiting for rate limit slot");
            tokio::time::sleep_until(*next_slot).await;
        }
        *next_slot = Instant::now() + self.config.min_interval;
    }
}

#[async_trait]
impl<M: Model> Model for RateLimit<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        ctx.run(self.wait_for_slot()).await.map_err(|err| {
            ModelError::new(LlmError::RateLimit(Box::new(err)), Usage::default())
        })?;
        self.inner.respond(ctx, messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingModel;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let model = RateLimit::new(
            CountingModel::new(),
            RateLimitConfig {
                min_interval: Duration::from_secs(1),
            },
        );
        let start = Instant::now();
        model
            .respond(&CallContext::background(), &[Message::user("hi")])
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_spaced_out() {
        let backend = Arc::new(CountingModel::new());
        let model = RateLimit::new(backend.clone(), RateLimitConfig::per(2, Duration::from_secs(1)));
        let start = Instant::now();
        for _ in 0..5 {
            model
                .respond(&CallContext::background(), &[Message::user("hi")])
                .await
                .unwrap();
        }
        assert_eq!(backend.calls(), 5);
        // Four gaps of 500ms each.
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(start.elapsed() < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_with_context() {
        let backend = Arc::new(CountingModel::new());
        let model = RateLimit::new(
            backend.clone(),
            RateLimitConfig {
                min_interval: Duration::from_secs(60),
            },
        );
        model
            .respond(&CallContext::background(), &[Message::user("first")])
            .await
            .unwrap();

        let ctx = CallContext::background().with_timeout(Duration::from_secs(1));
        let err = model.respond(&ctx, &[Message::user("second")]).await.unwrap_err();
        assert!(matches!(err.error, LlmError::RateLimit(_)));
        assert!(err.error.is_cancellation());
        assert_eq!(backend.calls(), 1);
    }
}
