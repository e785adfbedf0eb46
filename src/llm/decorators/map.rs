use crate::llm::config::RoleRemapConfig;
use crate::llm::context::CallContext;
use crate::llm::core::Model;
use crate::llm::error::ModelResult;
use crate::llm::message::{Message, Role};
use async_trait::async_trait;

/// A rewrite of the conversation applied before the inner model sees it.
///
/// Any `Fn(&[Message]) -> Vec<Message>` closure is a mapping.
pub trait MessageMap: Send + Sync {
    fn map_messages(&self, messages: &[Message]) -> Vec<Message>;
}

impl<F> MessageMap for F
where
    F: Fn(&[Message]) -> Vec<Message> + Send + Sync,
{
    fn map_messages(&self, messages: &[Message]) -> Vec<Message> {
        self(messages)
    }
}

/// Rewrites the conversation before passing it to the inner model.
///
/// The mapping receives the caller's messages and returns a new list; the
/// caller's conversation is never touched.
pub struct MapMessages<M: Model, F: MessageMap> {
    inner: M,
    map: F,
}

impl<M: Model, F: MessageMap> MapMessages<M, F> {
    pub fn new(inner: M, map: F) -> Self {
        Self { inner, map }
    }
}

#[async_trait]
impl<M: Model, F: MessageMap> Model for MapMessages<M, F> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let mapped = self.map.map_messages(messages);
        self.inner.respond(ctx, &mapped).await
    }
}

/// The mapping behind [`RoleRemapper`].
pub struct ReasoningRemap {
    config: RoleRemapConfig,
}

impl MessageMap for ReasoningRemap {
    fn map_messages(&self, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .map(|message| match message.role {
                Role::Reasoning => Message {
                    role: self.config.target_role,
                    content: format!("{}{}", self.config.prefix, message.content),
                    images: message.images.clone(),
                },
                _ => message.clone(),
            })
            .collect()
    }
}

/// Rewrites every [`Role::Reasoning`] message into the configured role with
/// the configured prefix, for backends that have no reasoning role. Other
/// messages pass through unchanged.
pub struct RoleRemapper<M: Model> {
    mapped: MapMessages<M, ReasoningRemap>,
}

impl<M: Model> RoleRemapper<M> {
    /// Remaps reasoning into a system message with the default prefix.
    pub fn new(inner: M) -> Self {
        Self::with_config(inner, RoleRemapConfig::default())
    }

    pub fn with_config(inner: M, config: RoleRemapConfig) -> Self {
        Self {
            mapped: MapMessages::new(inner, ReasoningRemap { config }),
        }
    }
}

#[async_trait]
impl<M: Model> Model for RoleRemapper<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        self.mapped.respond(ctx, messages).await
    }
}
