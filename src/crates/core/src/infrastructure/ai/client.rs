//! HTTP client for the inference server
//!
//! Thin transport layer over the server's three operations. No retry
//! policy: failures surface to the caller unchanged.

use std::time::Duration;

use log::debug;
use reqwest::{Client, Response};

use super::types::{ChatMessage, ChatRequest, GenerateRequest, GenerateResponse, TagsResponse};
use crate::util::errors::TransportError;
use crate::util::types::ModelDescriptor;

/// Default address of a locally hosted inference server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for a locally hosted inference server.
pub struct InferenceClient {
    http: Client,
    base_url: String,
}

impl InferenceClient {
    /// Create a client for the given base URL.
    ///
    /// Generation can take minutes on local hardware, so only the
    /// connect phase carries a timeout; reads are bounded by the caller
    /// through cancellation.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(300))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .expect("default TLS backend available");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query the server for its available models.
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError> {
        let url = format!("{}/api/tags", self.base_url);
        debug!("listing models from {}", url);

        let response = self.http.get(&url).send().await?;
        let response = check_status(response).await?;
        let tags: TagsResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(tags.models)
    }

    /// Run a single-shot image captioning request and return the
    /// generated description.
    pub async fn caption_image(
        &self,
        model: &str,
        prompt: &str,
        image_b64: &str,
    ) -> Result<String, TransportError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            images: vec![image_b64],
            stream: false,
        };
        debug!("captioning image via {} (model {})", url, model);

        let response = self.http.post(&url).json(&request).send().await?;
        let response = check_status(response).await?;
        let generated: GenerateResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(generated.response)
    }

    /// Open a streaming chat-completion request seeded with the given
    /// context.
    ///
    /// The initial HTTP status is checked before any body bytes are
    /// read; the returned response's body is the raw record stream for
    /// [`handle_chat_stream`](super::stream_handler::handle_chat_stream).
    pub async fn open_chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Response, TransportError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model,
            messages,
            stream: true,
        };
        debug!(
            "opening chat stream via {} (model {}, {} context messages)",
            url,
            model,
            messages.len()
        );

        let response = self.http.post(&url).json(&request).send().await?;
        check_status(response).await
    }
}

/// Turn a non-success status into a `TransportError`, reading the body
/// for the error message the way the server reports failures.
async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("failed to read error response: {}", e));
    Err(TransportError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let client = InferenceClient::new("http://localhost:11434/");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }
}
