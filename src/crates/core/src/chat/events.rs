//! Events emitted by the chat engine toward the UI adapter
//!
//! The UI renders exclusively from these; it never reaches into the
//! engine's state while a turn is running.

use crate::infrastructure::ai::stream_handler::StreamProgress;
use crate::util::types::ModelDescriptor;

/// How one send settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The full assistant message arrived.
    Completed,
    /// The user stopped generation mid-stream.
    Aborted,
    /// Transport or captioning failed; a placeholder message was
    /// recorded instead of assistant text.
    Failed,
}

/// Notification from the engine to the UI adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Result of a model listing request.
    Models(Vec<ModelDescriptor>),
    /// The chat model changed; history has been cleared.
    ModelChanged { name: String },
    /// The vision model changed.
    VisionModelChanged { name: String },
    /// A send began; the UI should record the user turn and disable
    /// further sends until `TurnFinished`.
    TurnStarted { user_text: String, has_image: bool },
    /// A content fragment arrived.
    Progress(StreamProgress),
    /// The turn settled; `text` is what was recorded as the assistant
    /// turn (accumulated text or a placeholder).
    TurnFinished { outcome: TurnOutcome, text: String },
    /// A failure outside a turn (e.g. model listing).
    Error { message: String },
}
