//! Error types shared across the core crate

use thiserror::Error;

/// Failure talking to the inference server.
///
/// Malformed records inside an otherwise healthy chat stream are not
/// represented here: they are skipped and logged by the stream handler.
/// A user-initiated abort is not an error either, it settles as
/// [`crate::StreamOutcome::Aborted`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level failure (connect, send, or mid-body read).
    #[error("inference server request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success HTTP status.
    #[error("inference server returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// A single-shot response body did not match the expected shape.
    #[error("failed to decode inference server response: {0}")]
    Decode(#[from] serde_json::Error),
}
