//! # Model Retry Decorator
//!
//! This module provides bounded retry for model calls. Unlike the pipeline's
//! feedback loop, which retries only when a reply could not be parsed, the
//! retry decorator re-sends the *same* conversation after *any* failure of
//! the inner model.
//!
//! ## Behavior
//!
//! - **Bounded**: `max_retries + 1` attempts in total; `max_retries = 0`
//!   still makes one attempt
//! - **Fixed Delay**: a constant pause between attempts, none after the last,
//!   no jitter
//! - **Usage Accounting**: the usage of every attempt, failed or not, is
//!   folded into the returned response or error
//! - **Cancelable**: the pause between attempts ends early when the call
//!   context is done
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use loomstack::llm::decorators::Retry;
//! use loomstack::llm::{CallContext, Message, Model, RetryConfig};
//! use std::time::Duration;
//!
//! let base = /* any Model */;
//! let model = Retry::new(base, RetryConfig::new(3, Duration::from_millis(500)));
//!
//! let response = model
//!     .respond(&CallContext::background(), &[Message::user("Hello!")])
//!     .await?;
//! ```

use crate::llm::config::RetryConfig;
use crate::llm::context::CallContext;
use crate::llm::core::Model;
use crate::llm::error::{LlmError, ModelError, ModelResult};
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use async_trait::async_trait;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, warn};

/// A wrapper for a model that adds bounded retry with a fixed delay.
pub struct Retry<M: Model> {
    inner: M,
    config: RetryConfig,
}

impl<M: Model> Retry<M> {
    /// Creates a new `Retry` decorator.
    ///
    /// # Arguments
    ///
    /// * `inner` - The model to wrap
    /// * `config` - Retry count and delay
    pub fn new(inner: M, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Total number of attempts a call may make.
    pub fn max_attempts(&self) -> usize {
        self.config.max_retries.saturating_add(1)
    }
}

#[async_trait]
impl<M: Model> Model for Retry<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let max_attempts = self.max_attempts();
        let mut delays = FixedInterval::new(self.config.delay).take(self.config.max_retries);
        let mut total_usage = Usage::default();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.inner.respond(ctx, messages).await {
                Ok(response) => return Ok(response.including_usage(total_usage)),
                Err(err) => err,
            };
            total_usage += err.usage();
            let last = err.error;

            // No point re-sending once the caller has given up.
            if let Some(cause) = ctx.error() {
                return Err(interrupted(attempt, last, cause, total_usage));
            }

            let Some(delay) = delays.next() else {
                warn!(attempts = attempt, error = %last, "Model call failed on every attempt");
                return Err(exhausted(attempt, last, total_usage));
            };

            debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last,
                "Model call failed, retrying"
            );
            if !delay.is_zero() {
                if let Err(cause) = ctx.sleep(delay).await {
                    return Err(interrupted(attempt, last, cause, total_usage));
                }
            }
        }
    }
}

fn exhausted(attempts: usize, last: LlmError, usage: Usage) -> ModelError {
    ModelError::new(
        LlmError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        },
        usage,
    )
}

/// Keeps the backend failure as `last`; the context error only explains why
/// no further attempt was made. A backend that already reported the
/// cancellation itself is plain exhaustion.
fn interrupted(attempts: usize, last: LlmError, cause: LlmError, usage: Usage) -> ModelError {
    if last.is_cancellation() {
        return exhausted(attempts, last, usage);
    }
    ModelError::new(
        LlmError::RetryInterrupted {
            attempts,
            last: Box::new(last),
            cause: Box::new(cause),
        },
        usage,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingModel, SlowModel};
    use std::sync::Arc;
    use std::time::Duration;

    fn hello() -> Vec<Message> {
        vec![Message::user("hello")]
    }

    #[tokio::test]
    async fn test_no_retry_on_success() {
        let backend = Arc::new(CountingModel::new());
        let model = Retry::new(backend.clone(), RetryConfig::immediate(3));

        let result = model.respond(&CallContext::background(), &hello()).await;

        assert!(result.is_ok());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_success_after_failures_sums_usage() {
        let backend = Arc::new(CountingModel::new().fail_first(2));
        let model = Retry::new(backend.clone(), RetryConfig::immediate(3));

        let response = model.respond(&CallContext::background(), &hello()).await.unwrap();

        assert_eq!(response.primary_message.content, "reply 3");
        assert_eq!(backend.calls(), 3); // 2 failed + 1 success
        assert_eq!(response.usage.failed_calls, 2);
        assert_eq!(response.usage.successful_calls, 1);
        assert_eq!(response.usage.input_tokens, 10);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_retries_plus_one_calls() {
        let backend = Arc::new(CountingModel::new().always_fail());
        let model = Retry::new(backend.clone(), RetryConfig::immediate(3));

        let err = model.respond(&CallContext::background(), &hello()).await.unwrap_err();

        assert_eq!(backend.calls(), 4); // 1 initial call + 3 retries
        assert_eq!(err.usage().failed_calls, 4);
        match err.error {
            LlmError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last.to_string(), "Failed to prompt the model: failure 4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let backend = Arc::new(CountingModel::new().always_fail());
        let model = Retry::new(backend.clone(), RetryConfig::disabled());

        assert!(model.respond(&CallContext::background(), &hello()).await.is_err());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_attempts() {
        let backend = Arc::new(CountingModel::new().always_fail());
        let model = Retry::new(backend.clone(), RetryConfig::new(2, Duration::from_secs(5)));

        let start = tokio::time::Instant::now();
        let _ = model.respond(&CallContext::background(), &hello()).await;

        assert_eq!(backend.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_delay() {
        let backend = Arc::new(CountingModel::new().always_fail());
        let model = Retry::new(backend.clone(), RetryConfig::new(10, Duration::from_secs(60)));
        let ctx = CallContext::background().with_timeout(Duration::from_secs(1));

        let err = model.respond(&ctx, &hello()).await.unwrap_err();

        assert_eq!(backend.calls(), 1);
        assert!(err.error.is_cancellation());
        match &err.error {
            LlmError::RetryInterrupted { attempts, last, cause } => {
                assert_eq!(*attempts, 1);
                assert_eq!(last.to_string(), "Failed to prompt the model: failure 1");
                assert!(matches!(**cause, LlmError::DeadlineExceeded));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("failure 1"));
        assert_eq!(err.usage().failed_calls, 1);
    }

    #[test]
    fn test_huge_retry_count_does_not_overflow() {
        let model = Retry::new(CountingModel::new(), RetryConfig::immediate(usize::MAX));
        assert_eq!(model.max_attempts(), usize::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_once_context_is_done() {
        let model = Retry::new(
            SlowModel::new(Duration::from_secs(30), "late"),
            RetryConfig::immediate(5),
        );
        let ctx = CallContext::background().with_timeout(Duration::from_secs(1));

        let err = model.respond(&ctx, &hello()).await.unwrap_err();

        assert!(matches!(err.error, LlmError::RetriesExhausted { attempts: 1, .. }));
        assert!(err.error.is_cancellation());
    }
}
