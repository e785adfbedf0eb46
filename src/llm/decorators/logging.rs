//! # Call Logging
//!
//! The [`Logging`] decorator produces one [`ModelCallRecord`] per call and
//! hands it to a [`ModelLogger`]. Two sinks are provided:
//!
//! - [`JsonModelLogger`] writes one JSON object per line to any async writer.
//! - [`TracingModelLogger`] emits a `model_call` event through `tracing`.
//!
//! Every logged call runs inside a `model_call` span carrying a fresh
//! `call_id`, so events from the decorators underneath can be correlated.

use crate::llm::context::CallContext;
use crate::llm::core::{Model, ModelResponse};
use crate::llm::error::{LlmError, ModelError, ModelResult};
use crate::llm::message::Message;
use crate::llm::usage::Usage;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to write log record: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode log record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Everything known about one finished call.
#[derive(Debug, Clone, Copy)]
pub struct ModelCallRecord<'a> {
    pub messages: &'a [Message],
    pub auxiliary_messages: &'a [Message],
    pub primary_message: &'a Message,
    pub usage: Usage,
    pub error: Option<&'a LlmError>,
    pub duration: Duration,
}

impl<'a> ModelCallRecord<'a> {
    fn from_result(
        messages: &'a [Message],
        response: &'a ModelResponse,
        error: Option<&'a LlmError>,
        duration: Duration,
    ) -> Self {
        Self {
            messages,
            auxiliary_messages: &response.auxiliary_messages,
            primary_message: &response.primary_message,
            usage: response.usage,
            error,
            duration,
        }
    }

    /// The record in the line-oriented JSON shape written by [`JsonModelLogger`].
    pub fn to_json(&self) -> Value {
        let mut record = json!({
            "messages": self.messages.iter().map(message_json).collect::<Vec<_>>(),
            "aux_responses": self.auxiliary_messages.iter().map(message_json).collect::<Vec<_>>(),
            "final_response": message_json(self.primary_message),
            "usage": {
                "input_tokens": self.usage.input_tokens,
                "output_tokens": self.usage.output_tokens,
            },
            "duration": humantime::format_duration(self.duration).to_string(),
        });
        if let (Some(error), Value::Object(fields)) = (self.error, &mut record) {
            fields.insert("error".to_string(), Value::String(error.to_string()));
        }
        record
    }
}

fn message_json(message: &Message) -> Value {
    json!({
        "role": message.role.as_str(),
        "content": message.content,
        "num_images": message.images.len(),
    })
}

/// A destination for call records.
#[async_trait]
pub trait ModelLogger: Send + Sync {
    async fn log(&self, record: &ModelCallRecord<'_>) -> Result<(), LogError>;
}

/// Writes each record as a single JSON line, e.g. to a `tokio::fs::File`.
///
/// The line is encoded before the writer is locked and written in one
/// `write_all`, so concurrent calls never interleave.
pub struct JsonModelLogger<W: AsyncWrite + Unpin + Send> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonModelLogger<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ModelLogger for JsonModelLogger<W> {
    async fn log(&self, record: &ModelCallRecord<'_>) -> Result<(), LogError> {
        let mut line = serde_json::to_vec(&record.to_json())?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Emits each record as a `model_call` tracing event.
#[derive(Debug, Clone, Default)]
pub struct TracingModelLogger {
    include_messages: bool,
}

impl TracingModelLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also attach the input and output messages to every event.
    pub fn with_messages(mut self) -> Self {
        self.include_messages = true;
        self
    }
}

#[async_trait]
impl ModelLogger for TracingModelLogger {
    async fn log(&self, record: &ModelCallRecord<'_>) -> Result<(), LogError> {
        let duration = humantime::format_duration(record.duration);
        let error = record.error.map(tracing::field::display);
        if self.include_messages {
            info!(
                input_tokens = record.usage.input_tokens,
                output_tokens = record.usage.output_tokens,
                %duration,
                error,
                messages = ?record.messages,
                aux_responses = ?record.auxiliary_messages,
                final_response = ?record.primary_message,
                "model_call"
            );
        } else {
            info!(
                input_tokens = record.usage.input_tokens,
                output_tokens = record.usage.output_tokens,
                %duration,
                error,
                "model_call"
            );
        }
        Ok(())
    }
}

/// Logs every call to the inner model.
///
/// If the call succeeded but logging failed, the call fails with
/// [`LlmError::Logging`] and still carries the response. If the call itself
/// failed, its error is returned and the logging failure is only traced.
pub struct Logging<M: Model> {
    inner: M,
    logger: Arc<dyn ModelLogger>,
}

impl<M: Model> Logging<M> {
    pub fn new(inner: M, logger: Arc<dyn ModelLogger>) -> Self {
        Self { inner, logger }
    }
}

#[async_trait]
impl<M: Model> Model for Logging<M> {
    async fn respond(&self, ctx: &CallContext, messages: &[Message]) -> ModelResult {
        let span = info_span!("model_call", call_id = %Uuid::new_v4());
        async move {
            let started = Instant::now();
            let result = self.inner.respond(ctx, messages).await;
            let duration = started.elapsed();

            match result {
                Ok(response) => {
                    let record = ModelCallRecord::from_result(messages, &response, None, duration);
                    match self.logger.log(&record).await {
                        Ok(()) => Ok(response),
                        Err(err) => Err(ModelError::with_response(LlmError::Logging(err), response)),
                    }
                }
                Err(err) => {
                    let record = ModelCallRecord::from_result(
                        messages,
                        &err.response,
                        Some(&err.error),
                        duration,
                    );
                    if let Err(log_err) = self.logger.log(&record).await {
                        warn!(error = %log_err, "Failed to log failed model call");
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}
