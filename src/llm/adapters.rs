use crate::llm::context::CallContext;
use crate::llm::core::{Model, ModelResponse};
use crate::llm::error::{LlmError, ModelError, ModelResult};
use crate::llm::message::{Message, Role};
use crate::llm::usage::Usage;
use async_trait::async_trait;
use rig::agent::Agent as RigAgent;
use rig::completion::{Chat, CompletionModel, Message as RigMessage};
use tracing::{debug, warn};

/// Adapter implementations for third-party LLM providers.
///
/// Implementation of the `Model` trait for `rig::Agent`.
///
/// This adapter allows any `rig::Agent` to be used as the base of a decorator
/// stack. The `rig` library provides agents that can interact with various
/// providers like OpenAI, Anthropic, Google Gemini, and others.
///
/// The last message of the conversation becomes the prompt and the rest the
/// chat history. Rig histories only know user and assistant turns, so system,
/// developer and reasoning messages are sent as user turns labelled with
/// their role; an agent's own preamble remains the place for its fixed system
/// prompt. Images are not forwarded.
///
/// Rig's chat interface does not expose token counts, so usage records only
/// whether the call succeeded.
///
/// # Example
///
/// ```rust,ignore
/// use loomstack::llm::{CallContext, Message, Model};
/// use rig::{providers::openai, client::CompletionClient};
///
/// let openai_client = openai::Client::from_env();
/// let agent = openai_client
///     .agent("gpt-4")
///     .preamble("You are a helpful assistant")
///     .build();
///
/// let response = agent
///     .respond(&CallContext::background(), &[Message::user("Hello!")])
///     .await?;
/// ```
#[async_trait]
impl<M> Model for RigAgent<M>
where
    M: CompletionModel,
{
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let Some((last, earlier)) = messages.split_last() else {
            return Err(ModelError::new(
                LlmError::PromptError("no messages to send".to_string()),
                Usage::default(),
            ));
        };
        if messages.iter().any(|m| !m.images.is_empty()) {
            warn!("Rig adapter does not forward image attachments");
        }

        let prompt = to_rig_message(last);
        let history: Vec<RigMessage> = earlier.iter().map(to_rig_message).collect();

        match ctx.run(async { self.chat(prompt, history).await }).await {
            Ok(Ok(reply)) => Ok(ModelResponse::new(
                Message::assistant(reply),
                Usage {
                    successful_calls: 1,
                    ..Usage::default()
                },
            )),
            Ok(Err(e)) => {
                debug!(error = %e, "Rig agent error");
                Err(ModelError::new(LlmError::PromptError(e.to_string()), Usage::failure()))
            }
            Err(cancelled) => Err(ModelError::new(cancelled, Usage::failure())),
        }
    }
}

fn to_rig_message(message: &Message) -> RigMessage {
    match message.role {
        Role::User => RigMessage::user(message.content.clone()),
        Role::Assistant => RigMessage::assistant(message.content.clone()),
        Role::System | Role::Developer | Role::Reasoning => {
            RigMessage::user(format!("[{}]\n{}", message.role, message.content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_chat_roles_are_labelled_user_turns() {
        let converted = to_rig_message(&Message::system("be brief"));
        assert_eq!(converted, RigMessage::user("[system]\nbe brief"));
    }

    #[test]
    fn test_chat_roles_map_directly() {
        assert_eq!(to_rig_message(&Message::user("hi")), RigMessage::user("hi"));
        assert_eq!(
            to_rig_message(&Message::assistant("hello")),
            RigMessage::assistant("hello")
        );
    }
}
