//! Embedding request inputs and engine output handling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Output format requested from the engine's embedding call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingFormat {
    /// Plain text, one vector per line.
    #[default]
    #[serde(rename = "")]
    Text,
    /// `[[...],[...]]`
    #[serde(rename = "array")]
    Array,
    /// OpenAI-style `{"object":"list","data":[...]}`.
    #[serde(rename = "json")]
    Json,
    /// `json` plus a cosine similarity matrix.
    #[serde(rename = "json+")]
    JsonPlus,
}

impl EmbeddingFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "",
            Self::Array => "array",
            Self::Json => "json",
            Self::JsonPlus => "json+",
        }
    }
}

impl fmt::Display for EmbeddingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::Text),
            "array" => Ok(Self::Array),
            "json" => Ok(Self::Json),
            "json+" => Ok(Self::JsonPlus),
            other => Err(format!(
                "unknown embedding output format '{other}' (expected '', array, json or json+)"
            )),
        }
    }
}

/// Errors produced while validating inputs or reading engine output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    /// The request's `input` was neither a string nor a list of strings.
    #[error("invalid input type")]
    InvalidInput,

    /// The engine returned something other than an array of float vectors.
    #[error("{0}")]
    Malformed(String),

    /// The engine returned a different number of vectors than inputs.
    #[error("{got} != {expected}")]
    CountMismatch { got: usize, expected: usize },
}

/// Embedding input as supplied by a client: one string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedInput {
    Single(String),
    Many(Vec<String>),
}

impl EmbedInput {
    /// Resolve a raw JSON `input` field.
    ///
    /// An absent or `null` input resolves to `None`. Any other type, or a list
    /// containing a non-string element, is rejected.
    pub fn from_json(value: Option<Value>) -> Result<Option<Self>, EmbeddingError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(Self::Single(s))),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    _ => Err(EmbeddingError::InvalidInput),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(|inputs| Some(Self::Many(inputs))),
            Some(_) => Err(EmbeddingError::InvalidInput),
        }
    }

    /// Flatten into the list of prompts to embed. An empty single string
    /// yields no prompts.
    pub fn into_inputs(self) -> Vec<String> {
        match self {
            Self::Single(s) if s.is_empty() => Vec::new(),
            Self::Single(s) => vec![s],
            Self::Many(items) => items,
        }
    }
}

/// Join prompts into the single string the engine embeds in one call.
pub fn join_inputs(inputs: &[String], separator: &str) -> String {
    inputs.join(separator)
}

/// Parse the engine's `array` output and check it has one vector per input.
pub fn parse_vectors(raw: &str, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let vectors: Vec<Vec<f32>> = serde_json::from_str(raw.trim())
        .map_err(|e| EmbeddingError::Malformed(e.to_string().trim().to_string()))?;
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            got: vectors.len(),
            expected,
        });
    }
    Ok(vectors)
}
