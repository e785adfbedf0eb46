use crate::pipeline::error::{InvalidResponse, ParseError};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Turns the text of a model reply into a typed value.
///
/// Return [`ParseError::Invalid`] when the model could fix the reply if told
/// what was wrong, and [`ParseError::Fatal`] for anything else.
pub trait Parser<U>: Send + Sync {
    fn parse_response_text(&self, response: &str) -> Result<U, ParseError>;
}

impl<U, P: Parser<U> + ?Sized> Parser<U> for Box<P> {
    fn parse_response_text(&self, response: &str) -> Result<U, ParseError> {
        (**self).parse_response_text(response)
    }
}

/// Checks a parsed value against the input that produced it.
pub trait Validator<T, U>: Send + Sync {
    fn validate_parsed_response(&self, input: &T, output: &U) -> Result<(), ParseError>;
}

impl<T, U, F> Validator<T, U> for F
where
    F: Fn(&T, &U) -> Result<(), ParseError> + Send + Sync,
{
    fn validate_parsed_response(&self, input: &T, output: &U) -> Result<(), ParseError> {
        self(input, output)
    }
}

/// Returns the reply unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawParser;

impl Parser<String> for RawParser {
    fn parse_response_text(&self, response: &str) -> Result<String, ParseError> {
        Ok(response.to_string())
    }
}

/// Deserializes the JSON object spanning the first `{` to the last `}`.
///
/// Text around the object, such as a preamble or a Markdown fence, is
/// ignored. A missing object or one that does not deserialize into `U` is an
/// invalid response.
pub struct JsonParser<U> {
    _output: PhantomData<fn() -> U>,
}

impl<U> JsonParser<U> {
    pub fn new() -> Self {
        Self {
            _output: PhantomData,
        }
    }
}

impl<U> Default for JsonParser<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: DeserializeOwned> Parser<U> for JsonParser<U> {
    fn parse_response_text(&self, response: &str) -> Result<U, ParseError> {
        let object = json_object_span(response)
            .ok_or_else(|| ParseError::invalid("response did not contain a json object"))?;
        serde_json::from_str(object).map_err(|err| {
            InvalidResponse::with_source("llm returned an invalid json object", err).into()
        })
    }
}

fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Feeds only part of the reply to another parser.
///
/// A failure to extract the part is always an invalid response.
pub struct SubstringParser<U, P, F>
where
    P: Parser<U>,
    F: Fn(&str) -> Result<String, InvalidResponse> + Send + Sync,
{
    parser: P,
    substring: F,
    _output: PhantomData<fn() -> U>,
}

impl<U, P, F> SubstringParser<U, P, F>
where
    P: Parser<U>,
    F: Fn(&str) -> Result<String, InvalidResponse> + Send + Sync,
{
    pub fn new(parser: P, substring: F) -> Self {
        Self {
            parser,
            substring,
            _output: PhantomData,
        }
    }
}

impl<U, P, F> Parser<U> for SubstringParser<U, P, F>
where
    P: Parser<U>,
    F: Fn(&str) -> Result<String, InvalidResponse> + Send + Sync,
{
    fn parse_response_text(&self, response: &str) -> Result<U, ParseError> {
        let part = (self.substring)(response)?;
        self.parser.parse_response_text(&part)
    }
}

/// Parses only the text after the last occurrence of `separator`, or the
/// whole reply when it does not occur.
pub fn substring_after<U, P: Parser<U>>(
    parser: P,
    separator: impl Into<String>,
) -> impl Parser<U> {
    let separator = separator.into();
    SubstringParser::new(parser, move |response: &str| {
        let part = match response.rfind(separator.as_str()) {
            Some(index) => &response[index + separator.len()..],
            None => response,
        };
        Ok::<_, InvalidResponse>(part.to_string())
    })
}

/// Parses only the text from the first `{` to the last `}` inclusive.
pub fn substring_json_object<U, P: Parser<U>>(parser: P) -> impl Parser<U> {
    SubstringParser::new(parser, |response: &str| {
        json_object_span(response)
            .map(str::to_string)
            .ok_or_else(|| {
                InvalidResponse::new("response did not contain an opening and closing curly brace")
            })
    })
}

/// Runs a check on every successfully parsed value; a failed check is an
/// invalid response carrying the check's message.
pub struct ValidatingParser<U, P, F>
where
    P: Parser<U>,
    F: Fn(&U) -> Result<(), String> + Send + Sync,
{
    parser: P,
    check: F,
    _output: PhantomData<fn() -> U>,
}

impl<U, P, F> ValidatingParser<U, P, F>
where
    P: Parser<U>,
    F: Fn(&U) -> Result<(), String> + Send + Sync,
{
    pub fn new(parser: P, check: F) -> Self {
        Self {
            parser,
            check,
            _output: PhantomData,
        }
    }
}

impl<U, P, F> Parser<U> for ValidatingParser<U, P, F>
where
    P: Parser<U>,
    F: Fn(&U) -> Result<(), String> + Send + Sync,
{
    fn parse_response_text(&self, response: &str) -> Result<U, ParseError> {
        let value = self.parser.parse_response_text(response)?;
        (self.check)(&value).map_err(ParseError::invalid)?;
        Ok(value)
    }
}
