use crate::llm::message::{Message, Role};
use crate::pipeline::error::EncodeError;
use handlebars::{Handlebars, handlebars_helper, no_escape};
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Turns a typed input into the opening messages of a conversation.
pub trait Encoder<T>: Send + Sync {
    fn build_input_messages(&self, input: &T) -> Result<Vec<Message>, EncodeError>;
}

impl<T, E: Encoder<T> + ?Sized> Encoder<T> for Box<E> {
    fn build_input_messages(&self, input: &T) -> Result<Vec<Message>, EncodeError> {
        (**self).build_input_messages(input)
    }
}

/// A fixed system prompt followed by the input text as the user message.
#[derive(Debug, Clone)]
pub struct FixedEncoder {
    system_prompt: String,
}

impl FixedEncoder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for FixedEncoder {
    fn build_input_messages(&self, input: &T) -> Result<Vec<Message>, EncodeError> {
        Ok(vec![
            Message::system(self.system_prompt.clone()),
            Message::user(input.as_ref()),
        ])
    }
}

const SYSTEM_TEMPLATE: &str = "system";
const USER_TEMPLATE: &str = "user";

/// Renders a system and a user message from handlebars templates.
///
/// The input is serialized to JSON and exposed to both templates. An empty
/// template produces no message. Output is not HTML-escaped, and the
/// `verbatim` helper renders any value as compact JSON:
///
/// ```text
/// Summarise these records: {{verbatim records}}
/// ```
pub struct TemplateEncoder<T> {
    handlebars: Handlebars<'static>,
    has_system: bool,
    has_user: bool,
    _input: PhantomData<fn(&T)>,
}

impl<T: Serialize> TemplateEncoder<T> {
    pub fn new(system_template: &str, user_template: &str) -> Result<Self, EncodeError> {
        let mut handlebars = Handlebars::new();
        handlebars_helper!(verbatim: |v: Value| v.to_string());
        handlebars.register_escape_fn(no_escape);
        handlebars.register_helper("verbatim", Box::new(verbatim));

        let has_system = !system_template.is_empty();
        if has_system {
            handlebars
                .register_template_string(SYSTEM_TEMPLATE, system_template)
                .map_err(|source| EncodeError::Template {
                    part: SYSTEM_TEMPLATE,
                    source: Box::new(source),
                })?;
        }
        let has_user = !user_template.is_empty();
        if has_user {
            handlebars
                .register_template_string(USER_TEMPLATE, user_template)
                .map_err(|source| EncodeError::Template {
                    part: USER_TEMPLATE,
                    source: Box::new(source),
                })?;
        }

        Ok(Self {
            handlebars,
            has_system,
            has_user,
            _input: PhantomData,
        })
    }

    fn render(&self, part: &'static str, data: &Value) -> Result<String, EncodeError> {
        self.handlebars
            .render(part, data)
            .map_err(|source| EncodeError::Render {
                part,
                source: Box::new(source),
            })
    }
}

impl<T: Serialize> Encoder<T> for TemplateEncoder<T> {
    fn build_input_messages(&self, input: &T) -> Result<Vec<Message>, EncodeError> {
        let data = serde_json::to_value(input)?;
        let mut messages = Vec::with_capacity(2);
        if self.has_system {
            messages.push(Message::new(Role::System, self.render(SYSTEM_TEMPLATE, &data)?));
        }
        if self.has_user {
            messages.push(Message::new(Role::User, self.render(USER_TEMPLATE, &data)?));
        }
        Ok(messages)
    }
}

/// Concatenates the messages of several encoders, in order.
///
/// Useful for a templated prompt followed by a history the caller keeps.
pub struct SequentialEncoder<T> {
    encoders: Vec<Box<dyn Encoder<T>>>,
}

impl<T> SequentialEncoder<T> {
    pub fn new(encoders: Vec<Box<dyn Encoder<T>>>) -> Self {
        Self { encoders }
    }
}

impl<T> Encoder<T> for SequentialEncoder<T> {
    fn build_input_messages(&self, input: &T) -> Result<Vec<Message>, EncodeError> {
        let mut messages = Vec::new();
        for encoder in &self.encoders {
            messages.extend(encoder.build_input_messages(input)?);
        }
        Ok(messages)
    }
}
