//! Ollama API request and response types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use llamago_core::ChatMessage;

/// Plain-text body of `GET /`.
pub const ROOT_RESPONSE: &str = "Llamago is running";

// ── Keep-alive ─────────────────────────────────────────────────────────

/// How long a client asks the model to stay loaded.
///
/// Numbers are seconds. Strings use Go duration syntax (`"5m"`, `"1h30m"`,
/// `"0s"`). Negative values mean "forever" and are stored as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawKeepAlive")]
pub struct KeepAlive(pub Option<Duration>);

impl KeepAlive {
    /// True for an explicit zero, the unload signal.
    pub fn is_zero(self) -> bool {
        self.0.is_some_and(|d| d.as_secs() == 0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKeepAlive {
    Seconds(f64),
    Text(String),
}

impl TryFrom<RawKeepAlive> for KeepAlive {
    type Error = String;

    fn try_from(raw: RawKeepAlive) -> Result<Self, Self::Error> {
        match raw {
            RawKeepAlive::Seconds(secs) if secs < 0.0 => Ok(Self(None)),
            RawKeepAlive::Seconds(secs) => Duration::try_from_secs_f64(secs)
                .map(|d| Self(Some(d)))
                .map_err(|e| e.to_string()),
            RawKeepAlive::Text(text) => parse_go_duration(&text).map(Self),
        }
    }
}

/// Parse a Go `time.ParseDuration` string. Negative durations yield `None`.
fn parse_go_duration(text: &str) -> Result<Option<Duration>, String> {
    let invalid = || format!("time: invalid duration \"{text}\"");

    let (negative, mut rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if rest == "0" {
        return Ok(Some(Duration::ZERO));
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        total += value * scale;
        rest = &rest[unit_len..];
    }

    if negative && total > 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(total)
        .map(Some)
        .map_err(|_| invalid())
}

// ── Requests ───────────────────────────────────────────────────────────

/// `POST /api/generate`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub suffix: String,
    pub system: String,
    pub template: String,
    pub context: Vec<i64>,
    /// Absent means stream.
    pub stream: Option<bool>,
    pub raw: bool,
    pub images: Vec<String>,
    pub keep_alive: Option<KeepAlive>,
    pub format: Option<serde_json::Value>,
    pub options: Option<serde_json::Value>,
    pub think: Option<bool>,
}

/// `POST /api/chat`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: Option<bool>,
    pub keep_alive: Option<KeepAlive>,
    pub format: Option<serde_json::Value>,
    pub options: Option<serde_json::Value>,
    pub tools: Option<serde_json::Value>,
    pub think: Option<bool>,
}

/// `POST /api/embed`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbedRequest {
    pub model: String,
    /// A string or a list of strings; resolved by the handler.
    pub input: Option<serde_json::Value>,
    pub truncate: Option<bool>,
    pub keep_alive: Option<KeepAlive>,
    pub options: Option<serde_json::Value>,
}

/// `POST /api/embeddings`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingRequest {
    pub model: String,
    pub prompt: String,
    pub keep_alive: Option<KeepAlive>,
    pub options: Option<serde_json::Value>,
}

/// `POST /api/show`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShowRequest {
    pub model: String,
    pub name: String,
}

impl ShowRequest {
    /// `model`, falling back to the legacy `name` field.
    pub fn effective_model(&self) -> &str {
        if self.model.is_empty() {
            &self.name
        } else {
            &self.model
        }
    }
}

// ── Responses ──────────────────────────────────────────────────────────

const fn is_zero(n: &u64) -> bool {
    *n == 0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub response: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Nanoseconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_duration: u64,
    /// Nanoseconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub load_duration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub message: ChatMessage,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_duration: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub load_duration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub model: String,
    pub embeddings: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_duration: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub load_duration: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub prompt_eval_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDetails {
    pub format: String,
    pub family: String,
    pub parameter_size: String,
    pub quantization_level: String,
}

/// Entry of `GET /api/ps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessModel {
    pub name: String,
    pub model: String,
    pub size: u64,
    pub digest: String,
    pub details: ModelDetails,
    pub expires_at: DateTime<Utc>,
    pub size_vram: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub models: Vec<ProcessModel>,
}

/// Entry of `GET /api/list` and `GET /api/tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListModel {
    pub name: String,
    pub model: String,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub digest: String,
    pub details: ModelDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub models: Vec<ListModel>,
}
