//! Backing stores for the [`Cache`](crate::llm::decorators::Cache) decorator.
//!
//! A store maps `hash_messages(salt, inputs)` to the messages a model
//! produced for those inputs. Two stores are provided: [`InMemoryCache`] for a
//! single process, and [`FileCache`], which keeps the same map in memory and
//! rewrites a JSON file after every insert.

use crate::llm::context::CallContext;
use crate::llm::message::Message;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// A stored model response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub auxiliary_messages: Vec<Message>,
    pub primary_message: Message,
}

impl CachedResponse {
    /// Flattens the entry to the stored form: auxiliary messages followed by the primary one.
    pub fn to_stored(&self) -> Vec<Message> {
        let mut stored = self.auxiliary_messages.clone();
        stored.push(self.primary_message.clone());
        stored
    }

    /// Rebuilds an entry from its stored form.
    pub fn from_stored(mut stored: Vec<Message>) -> Result<Self, CacheError> {
        let primary_message = stored
            .pop()
            .ok_or_else(|| CacheError::Corrupt("cached messages have 0 length".to_string()))?;
        Ok(Self {
            auxiliary_messages: stored,
            primary_message,
        })
    }
}

/// The contract every cache backing store implements.
///
/// A miss is `Ok(None)`; `Err` is reserved for the store itself failing.
#[async_trait]
pub trait ModelResponseCache: Send + Sync {
    async fn get_cached_response(
        &self,
        ctx: &CallContext,
        salt: &str,
        inputs: &[Message],
    ) -> Result<Option<CachedResponse>, CacheError>;

    async fn set_cached_response(
        &self,
        ctx: &CallContext,
        salt: &str,
        inputs: &[Message],
        auxiliary_messages: &[Message],
        primary_message: &Message,
    ) -> Result<(), CacheError>;
}

/// Derives the cache key for a conversation.
///
/// The key is the hex SHA-256 of `salt`, the literal `Messages`, then for each
/// message its role name, its content and each image's base64 data URL.
/// Changing this order invalidates every stored entry.
pub fn hash_messages(salt: &str, inputs: &[Message]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"Messages");
    for message in inputs {
        hasher.update(message.role.as_str().as_bytes());
        hasher.update(message.content.as_bytes());
        for image in &message.images {
            hasher.update(image.to_base64_data_url().as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// A process-local cache backed by a mutex-protected map.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    responses: Mutex<HashMap<String, CachedResponse>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ModelResponseCache for InMemoryCache {
    async fn get_cached_response(
        &self,
        _ctx: &CallContext,
        salt: &str,
        inputs: &[Message],
    ) -> Result<Option<CachedResponse>, CacheError> {
        let key = hash_messages(salt, inputs);
        let responses = self
            .responses
            .lock()
            .map_err(|_| CacheError::Backend("cache lock poisoned".to_string()))?;
        Ok(responses.get(&key).cloned())
    }

    async fn set_cached_response(
        &self,
        _ctx: &CallContext,
        salt: &str,
        inputs: &[Message],
        auxiliary_messages: &[Message],
        primary_message: &Message,
    ) -> Result<(), CacheError> {
        let key = hash_messages(salt, inputs);
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| CacheError::Backend("cache lock poisoned".to_string()))?;
        responses.insert(
            key,
            CachedResponse {
                auxiliary_messages: auxiliary_messages.to_vec(),
                primary_message: primary_message.clone(),
            },
        );
        Ok(())
    }
}

/// An in-memory cache persisted to a JSON file.
///
/// The file holds an object from key to the stored message list. It is read
/// once by [`FileCache::open`] and rewritten in full after every insert.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    responses: TokioMutex<HashMap<String, Vec<Message>>>,
}

impl FileCache {
    /// Opens the cache at `path`. A missing file is an empty cache.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let responses = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), entries = responses.len(), "Opened file cache");
        Ok(Self {
            path,
            responses: TokioMutex::new(responses),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ModelResponseCache for FileCache {
    async fn get_cached_response(
        &self,
        _ctx: &CallContext,
        salt: &str,
        inputs: &[Message],
    ) -> Result<Option<CachedResponse>, CacheError> {
        let key = hash_messages(salt, inputs);
        let responses = self.responses.lock().await;
        responses
            .get(&key)
            .cloned()
            .map(CachedResponse::from_stored)
            .transpose()
    }

    async fn set_cached_response(
        &self,
        _ctx: &CallContext,
        salt: &str,
        inputs: &[Message],
        auxiliary_messages: &[Message],
        primary_message: &Message,
    ) -> Result<(), CacheError> {
        let key = hash_messages(salt, inputs);
        let entry = CachedResponse {
            auxiliary_messages: auxiliary_messages.to_vec(),
            primary_message: primary_message.clone(),
        };
        // Held across the write so the file always reflects the latest insert.
        let mut responses = self.responses.lock().await;
        responses.insert(key, entry.to_stored());
        let bytes = serde_json::to_vec(&*responses)?;
        fs::write(&self.path, bytes).await?;
        Ok(())
    }
}
