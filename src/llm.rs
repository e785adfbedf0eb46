//! The `llm` module defines the [`Model`] contract and everything layered on it:
//! messages, usage accounting, call contexts, decorators and response caches.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod context;
pub mod core;
pub mod decorators;
pub mod error;
pub mod factory;
pub mod message;
pub mod usage;

pub use cache::{CacheError, CachedResponse, FileCache, InMemoryCache, ModelResponseCache, hash_messages};
pub use config::{
    CacheConfig, ConcurrencyConfig, ConfigError, RateLimitConfig, RetryConfig, RoleRemapConfig,
    StackConfig, TimeoutConfig, TwoStageReasonConfig,
};
pub use context::CallContext;
pub use self::core::{DynModel, Model, ModelResponse};
pub use error::{IndexedFailure, LlmError, ModelError, ModelResult};
pub use factory::ModelFactory;
pub use message::{ImageAttachment, Message, Role};
pub use usage::{Usage, UsageCounter};
