//! Session layer
//!
//! Bounded conversation history and the in-progress assistant turn.

pub mod history;

pub use history::{ConversationHistory, DEFAULT_HISTORY_CAP};
