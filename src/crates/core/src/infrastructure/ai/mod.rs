//! Inference server access
//!
//! Provides the HTTP client for the three server operations and the
//! streaming response handler that turns the chat byte stream into an
//! accumulated assistant message.

pub mod client;
pub mod stream_handler;
pub mod types;

pub use client::InferenceClient;
pub use stream_handler::{handle_chat_stream, ChatStreamDecoder, StreamOutcome, StreamProgress};
pub use types::{ChatChunk, ChatMessage};
