use crate::llm::error::LlmError;
use crate::llm::usage::Usage;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A reply that could be corrected by telling the model what was wrong.
///
/// This is the only failure class the feedback loop retries on.
#[derive(Debug)]
pub struct InvalidResponse {
    message: String,
    source: Option<BoxError>,
}

impl InvalidResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for InvalidResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for InvalidResponse {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Outcome of a failed parse or validation.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The reply was malformed; the model may fix it given feedback.
    #[error(transparent)]
    Invalid(#[from] InvalidResponse),
    /// Anything else. Never retried.
    #[error(transparent)]
    Fatal(BoxError),
}

impl ParseError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ParseError::Invalid(InvalidResponse::new(message))
    }

    pub fn fatal(err: impl Into<BoxError>) -> Self {
        ParseError::Fatal(err.into())
    }

    pub fn is_invalid_response(&self) -> bool {
        matches!(self, ParseError::Invalid(_))
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid {part} template: {source}")]
    Template {
        part: &'static str,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
    #[error("failed to render {part} template: {source}")]
    Render {
        part: &'static str,
        #[source]
        source: Box<handlebars::RenderError>,
    },
    #[error("failed to serialize encoder input: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Why a pipeline call failed.
#[derive(Error, Debug)]
pub enum PipelineErrorKind {
    #[error("failed to build input messages: {0}")]
    Encode(#[source] EncodeError),
    #[error("failed to get model response: {0}")]
    Model(#[source] LlmError),
    #[error("failed to parse model response: {0}")]
    Parse(#[source] ParseError),
    #[error("failed to validate model response: {0}")]
    Validate(#[source] ParseError),
    #[error("model failed to produce a valid response after trying {attempts} times: {last}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: ParseError,
    },
    #[error("all models failed to produce valid outputs: {}", join_kinds(.errors))]
    AllModelsInvalid {
        count: usize,
        errors: Vec<PipelineErrorKind>,
    },
}

fn join_kinds(errors: &[PipelineErrorKind]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl PipelineErrorKind {
    /// True when the failure came from a reply the model could have gotten
    /// right, as opposed to a broken model call, encoder or parser.
    pub fn is_invalid_response(&self) -> bool {
        match self {
            PipelineErrorKind::Parse(err) | PipelineErrorKind::Validate(err) => {
                err.is_invalid_response()
            }
            PipelineErrorKind::RetriesExhausted { .. } | PipelineErrorKind::AllModelsInvalid { .. } => {
                true
            }
            PipelineErrorKind::Encode(_) | PipelineErrorKind::Model(_) => false,
        }
    }
}

/// A failed pipeline call, with the usage spent before it failed.
#[derive(Debug)]
pub struct PipelineError {
    pub usage: Usage,
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    pub fn new(kind: PipelineErrorKind, usage: Usage) -> Self {
        Self { usage, kind }
    }

    pub fn is_invalid_response(&self) -> bool {
        self.kind.is_invalid_response()
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl StdError for PipelineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.kind.source()
    }
}
