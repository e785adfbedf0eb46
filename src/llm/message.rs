use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The author of a [`Message`].
///
/// This is not 1:1 with any provider's roles: `Reasoning` has no native
/// counterpart on most backends and is usually rewritten by
/// [`RoleRemapper`](crate::llm::decorators::RoleRemapper) before it reaches one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[default]
    Assistant,
    Reasoning,
    Developer,
}

impl Role {
    /// The canonical lowercase name of the role.
    ///
    /// This string is part of the cache key, so it must never change.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Reasoning => "reasoning",
            Role::Developer => "developer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An already-encoded image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// MIME type of `data`, e.g. `image/png`.
    pub mime: String,
    /// The encoded image bytes.
    pub data: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self::new("image/png", data)
    }

    /// Renders the image as a `data:` URL with standard base64 encoding.
    pub fn to_base64_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.data))
    }
}

/// A single text message to or from a model.
///
/// Once a message has been placed in a conversation it is treated as an
/// immutable value; decorators that need a different role or content build a
/// new message instead of editing the original.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self::new(Role::Reasoning, content)
    }

    pub fn developer(content: impl Into<String>) -> Self {
        Self::new(Role::Developer, content)
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    /// Returns a copy of this message carrying a different role.
    pub fn relabeled(&self, role: Role) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }
}
