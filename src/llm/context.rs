//! Cancellation and deadlines for model calls.
//!
//! A [`CallContext`] is passed by reference through every decorator down to the
//! backend adapter. It combines a [`CancellationToken`] with an optional
//! deadline; deriving a child never extends the parent's deadline, and
//! cancelling a parent cancels every context derived from it.

use crate::llm::error::LlmError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context governed by an existing token, e.g. one owned by a shutdown handler.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derives a context that is cancelled with this one but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child whose deadline is `timeout` from now, or this
    /// context's deadline if that is earlier.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Derives a child with the earlier of `deadline` and this context's deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns a guard that cancels this context when dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// The reason this context is done, or `None` while it is still live.
    pub fn error(&self) -> Option<LlmError> {
        if self.token.is_cancelled() {
            return Some(LlmError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(LlmError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> LlmError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => LlmError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => LlmError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                LlmError::Cancelled
            }
        }
    }

    /// Drives `fut` to completion unless the context finishes first.
    ///
    /// When the context wins, `fut` is dropped without being polled again.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, LlmError> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = fut => Ok(output),
        }
    }

    /// Sleeps for `duration`, returning early with an error if the context finishes.
    pub async fn sleep(&self, duration: Duration) -> Result<(), LlmError> {
        self.run(tokio::time::sleep(duration)).await
    }
}
