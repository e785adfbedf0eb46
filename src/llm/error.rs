use crate::llm::cache::CacheError;
use crate::llm::core::ModelResponse;
use crate::llm::decorators::logging::LogError;
use crate::llm::usage::Usage;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// A custom error type for model operations.
///
/// Every variant is fatal to the typed pipeline: the only recoverable
/// failure class is [`ParseError::Invalid`](crate::pipeline::ParseError::Invalid),
/// which is introduced by parsers and validators and never by a model.
#[derive(Error, Debug)]
pub enum LlmError {
    /// An error occurred while prompting the backend.
    ///
    /// Provider adapters wrap the underlying failure here so that every
    /// backend reports errors in the same shape.
    #[error("Failed to prompt the model: {0}")]
    PromptError(String),
    /// The call context was cancelled before the call completed.
    #[error("model call was cancelled")]
    Cancelled,
    /// The call context's deadline passed before the call completed.
    #[error("model call deadline exceeded")]
    DeadlineExceeded,
    #[error("failed to query cache: {0}")]
    CacheRead(#[source] CacheError),
    #[error("failed to set cache: {0}")]
    CacheWrite(#[source] CacheError),
    #[error("could not get model response after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: Box<LlmError>,
    },
    /// The call context ended while waiting to retry. `last` is the backend
    /// failure that prompted the retry; `cause` is the context error.
    #[error("retry interrupted after {attempts} attempts ({cause}): {last}")]
    RetryInterrupted {
        attempts: usize,
        #[source]
        last: Box<LlmError>,
        cause: Box<LlmError>,
    },
    /// `count` is the length of the chain; `failures` holds one entry per
    /// model actually tried, which is fewer when the call context ended early.
    #[error("{}", describe_chain_failure(.count, .failures))]
    AllModelsFailed {
        count: usize,
        failures: Vec<IndexedFailure>,
    },
    #[error("failed to call reasoning model: {0}")]
    Reasoner(#[source] Box<LlmError>),
    #[error("failed to call final response model: {0}")]
    Answerer(#[source] Box<LlmError>),
    #[error("failed to wait for rate limiter: {0}")]
    RateLimit(#[source] Box<LlmError>),
    #[error("failed to execute logging: {0}")]
    Logging(#[source] LogError),
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

impl LlmError {
    /// Returns true when the error was caused by the call context finishing,
    /// at any depth of wrapping.
    pub fn is_cancellation(&self) -> bool {
        match self {
            LlmError::Cancelled | LlmError::DeadlineExceeded => true,
            LlmError::RetriesExhausted { last, .. } => last.is_cancellation(),
            LlmError::RetryInterrupted { .. } => true,
            LlmError::Reasoner(inner) | LlmError::Answerer(inner) | LlmError::RateLimit(inner) => {
                inner.is_cancellation()
            }
            LlmError::AllModelsFailed { failures, .. } => failures
                .last()
                .is_some_and(|failure| failure.error.is_cancellation()),
            _ => false,
        }
    }
}

/// One failed candidate of a fallback chain.
#[derive(Error, Debug)]
#[error("model {index} failed: {error}")]
pub struct IndexedFailure {
    pub index: usize,
    #[source]
    pub error: LlmError,
}

fn describe_chain_failure(count: &usize, failures: &[IndexedFailure]) -> String {
    let joined = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    if failures.len() == *count {
        format!("all {count} models in retry chain failed: {joined}")
    } else {
        format!(
            "{} of {count} models in retry chain failed before the call ended: {joined}",
            failures.len()
        )
    }
}

/// The failure half of [`ModelResult`].
///
/// A failed call still reports what it cost: `response.usage` holds the usage
/// accumulated by every backend attempt made on the way to the failure.
/// The messages are normally empty; the exception is a failed cache write,
/// where `response` is the successful model response that could not be stored.
#[derive(Debug)]
pub struct ModelError {
    pub response: ModelResponse,
    pub error: LlmError,
}

impl ModelError {
    /// A failure that carries only usage.
    pub fn new(error: LlmError, usage: Usage) -> Self {
        Self {
            response: ModelResponse::from_usage(usage),
            error,
        }
    }

    /// A failure that still carries a complete response.
    pub fn with_response(error: LlmError, response: ModelResponse) -> Self {
        Self { response, error }
    }

    pub fn usage(&self) -> Usage {
        self.response.usage
    }

    /// Replaces the error, keeping the response and usage.
    pub fn map_error(self, f: impl FnOnce(LlmError) -> LlmError) -> Self {
        Self {
            response: self.response,
            error: f(self.error),
        }
    }

    /// Drops any messages, keeping only usage.
    pub fn only_usage(self) -> Self {
        Self {
            response: self.response.only_usage(),
            error: self.error,
        }
    }

    pub fn including_usage(self, usage: Usage) -> Self {
        Self {
            response: self.response.including_usage(usage),
            error: self.error,
        }
    }

    pub fn into_parts(self) -> (ModelResponse, LlmError) {
        (self.response, self.error)
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl StdError for ModelError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

impl From<ModelError> for LlmError {
    fn from(err: ModelError) -> Self {
        err.error
    }
}

/// The outcome of a single [`Model::respond`](crate::llm::Model::respond) call.
pub type ModelResult = Result<ModelResponse, ModelError>;
