//! Wire types for the inference server API
//!
//! Request and response bodies for the three endpoints: `/api/tags`
//! (model listing), `/api/chat` (streaming chat completion, one JSON
//! record per line) and `/api/generate` (single-shot captioning).

use crate::util::types::{ModelDescriptor, Role};
use serde::{Deserialize, Serialize};

/// One message of the chat context as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of a streaming chat-completion request.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

/// One newline-delimited record of the chat response stream.
///
/// Intermediate records carry a `message.content` fragment; the
/// terminal record has `done: true` and usually no content.
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
}

/// Body of a single-shot captioning request.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub images: Vec<&'a str>,
    pub stream: bool,
}

/// Response of a single-shot captioning request.
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

/// Response of the model listing endpoint.
#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    pub models: Vec<ModelDescriptor>,
}
