use crate::llm::message::{Message, Role};
use crate::pipeline::error::ParseError;

/// Writes the corrective message sent back to the model after an invalid reply.
pub trait FeedbackGenerator: Send + Sync {
    fn format_feedback(&self, reply: &Message, err: &ParseError) -> String;
}

impl<F> FeedbackGenerator for F
where
    F: Fn(&Message, &ParseError) -> String + Send + Sync,
{
    fn format_feedback(&self, reply: &Message, err: &ParseError) -> String {
        self(reply, err)
    }
}

/// Uses the error text itself as the feedback.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrStringFeedback;

impl FeedbackGenerator for ErrStringFeedback {
    fn format_feedback(&self, _reply: &Message, err: &ParseError) -> String {
        err.to_string()
    }
}

/// Configuration for the feedback loop.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackConfig {
    /// Role of the injected feedback messages.
    pub feedback_role: Role,
    /// Extra attempts after the first; the model is called at most
    /// `max_retries + 1` times.
    pub max_retries: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            feedback_role: Role::User,
            max_retries: 2,
        }
    }
}

impl FeedbackConfig {
    pub fn new(feedback_role: Role, max_retries: usize) -> Self {
        Self {
            feedback_role,
            max_retries,
        }
    }
}
