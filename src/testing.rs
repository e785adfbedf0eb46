//! Deterministic models for exercising decorators, pipelines and agents
//! without a backend.

use crate::llm::{CallContext, LlmError, Message, Model, ModelError, ModelResponse, ModelResult, Usage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Replies from a script keyed by the content of the last input message.
///
/// Each key maps to a queue of replies consumed in order. A request with no
/// reply left fails, as does any call while forced failures remain.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<HashMap<String, VecDeque<String>>>,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `reply` for requests whose last message is `request`.
    pub fn on(self, request: &str, reply: &str) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(request.to_string())
            .or_default()
            .push_back(reply.to_string());
        self
    }

    /// Makes the next `n` calls fail before any script is consulted.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every conversation this model has been called with, in call order.
    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        if let Some(err) = ctx.error() {
            return Err(ModelError::new(err, Usage::default()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(messages.to_vec());

        let forced = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Err(ModelError::new(
                LlmError::PromptError("deliberate fail".to_string()),
                Usage::failure(),
            ));
        }

        let request = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let reply = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(&request)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => Ok(ModelResponse::new(
                Message::assistant(reply),
                Usage::success(messages.len() as u64, 1),
            )),
            None => Err(ModelError::new(
                LlmError::PromptError(format!("no responses left for request '{request}'")),
                Usage::failure(),
            )),
        }
    }
}

/// Replies `reply N` on its N-th call, so every raw call is distinguishable.
#[derive(Debug, Default)]
pub struct CountingModel {
    calls: AtomicUsize,
    fail_first: usize,
    always_fail: bool,
}

impl CountingModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `n` calls, then succeeds.
    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn always_fail(mut self) -> Self {
        self.always_fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Model for CountingModel {
    async fn respond(&self, ctx: &CallContext, _messages: &[Message]) -> ModelResult {
        if let Some(err) = ctx.error() {
            return Err(ModelError::new(err, Usage::default()));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.always_fail || n <= self.fail_first {
            return Err(ModelError::new(
                LlmError::PromptError(format!("failure {n}")),
                Usage::failure(),
            ));
        }
        Ok(ModelResponse::new(
            Message::assistant(format!("reply {n}")),
            Usage::success(10, 5),
        ))
    }
}

/// Waits before replying, giving up as soon as the context is done.
#[derive(Debug, Clone)]
pub struct SlowModel {
    delay: Duration,
    reply: String,
}

impl SlowModel {
    pub fn new(delay: Duration, reply: &str) -> Self {
        Self {
            delay,
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl Model for SlowModel {
    async fn respond(&self, ctx: &CallContext, _messages: &[Message]) -> ModelResult {
        match ctx.sleep(self.delay).await {
            Ok(()) => Ok(ModelResponse::new(
                Message::assistant(self.reply.clone()),
                Usage::success(1, 1),
            )),
            Err(err) => Err(ModelError::new(err, Usage::failure())),
        }
    }
}
