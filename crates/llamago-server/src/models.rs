//! OpenAI-compatible request/response types for the `/v1/` routes.
//!
//! Only the fields the engine can act on are modelled. Sampling options
//! (`temperature`, `max_tokens`, `stop`, ...) and other unknown fields in a
//! request are ignored; the engine runs with its configured settings.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use llamago_core::ChatMessage;

use crate::ollama_models::ListResponse;

/// Fingerprint reported on every completion object.
pub const SYSTEM_FINGERPRINT: &str = "fp_llamago";

// =============================================================================
// Chat Completion Types
// =============================================================================

/// Request to /v1/chat/completions.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// One SSE event of a streamed chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatMessage,
    pub finish_reason: Option<String>,
}

impl ChatCompletionResponse {
    pub fn new(model: String, content: String, finish_reason: String) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            object: "chat.completion".to_string(),
            created: Utc::now().timestamp(),
            model,
            system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::new("assistant", content),
                finish_reason: Some(finish_reason),
            }],
            usage: Usage::default(),
        }
    }

    /// The same completion as a single streaming chunk.
    pub fn into_chunk(self) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id,
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model,
            system_fingerprint: self.system_fingerprint,
            choices: self
                .choices
                .into_iter()
                .map(|c| ChatChunkChoice {
                    index: c.index,
                    delta: c.message,
                    finish_reason: c.finish_reason,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Legacy Completion Types
// =============================================================================

/// Request to /v1/completions.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub stream: bool,
}

/// Response (and streaming chunk) of /v1/completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
    pub index: u32,
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    pub fn new(model: String, text: String, finish_reason: String) -> Self {
        Self {
            id: format!("cmpl-{}", uuid::Uuid::new_v4().simple()),
            object: "text_completion".to_string(),
            created: Utc::now().timestamp(),
            model,
            system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
            choices: vec![CompletionChoice {
                text,
                index: 0,
                finish_reason: Some(finish_reason),
            }],
            usage: Some(Usage::default()),
        }
    }

    /// Streaming chunks carry no usage block.
    pub fn into_chunk(mut self) -> Self {
        self.usage = None;
        self
    }
}

// =============================================================================
// Embedding Types
// =============================================================================

/// Request to /v1/embeddings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    pub object: String,
    pub data: Vec<EmbeddingObject>,
    pub model: String,
    pub usage: EmbeddingUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingObject {
    pub object: String,
    pub embedding: Vec<f32>,
    pub index: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

impl EmbeddingsResponse {
    pub fn new(model: String, embeddings: Vec<Vec<f32>>, prompt_tokens: u64) -> Self {
        Self {
            object: "list".to_string(),
            data: embeddings
                .into_iter()
                .enumerate()
                .map(|(index, embedding)| EmbeddingObject {
                    object: "embedding".to_string(),
                    embedding,
                    index,
                })
                .collect(),
            model,
            usage: EmbeddingUsage {
                prompt_tokens,
                total_tokens: prompt_tokens,
            },
        }
    }
}

/// Token usage statistics. The engine does not report counts, so these
/// stay zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// =============================================================================
// Models Endpoint Types
// =============================================================================

/// Response from /v1/models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl From<ListResponse> for ModelsResponse {
    fn from(list: ListResponse) -> Self {
        Self {
            object: "list".to_string(),
            data: list
                .models
                .into_iter()
                .map(|m| ModelInfo {
                    id: m.name,
                    object: "model".to_string(),
                    created: m.modified_at.timestamp(),
                    owned_by: "library".to_string(),
                })
                .collect(),
        }
    }
}
