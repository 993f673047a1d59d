//! Bounded conversation history
//!
//! An ordered log of finalized turns plus at most one in-progress
//! assistant turn. The finalized log is the exact context window
//! re-sent to the server on the next send, so insertion order is
//! significant and never rearranged.

use std::collections::VecDeque;

use crate::infrastructure::ai::types::ChatMessage;
use crate::util::types::Turn;

/// How many finalized turns are retained before FIFO eviction.
pub const DEFAULT_HISTORY_CAP: usize = 10;

/// Ordered, capped log of conversation turns.
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    cap: usize,
    /// Text of the single in-progress assistant turn, if one exists.
    /// Does not count toward the cap until finalized.
    draft: Option<String>,
}

impl ConversationHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            cap: cap.max(1),
            draft: None,
        }
    }

    /// Add a finalized turn, evicting the oldest turn when the cap
    /// would be exceeded.
    pub fn push_turn(&mut self, turn: Turn) {
        while self.turns.len() >= self.cap {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Create the in-progress assistant turn if absent.
    pub fn begin_assistant_turn(&mut self) {
        if self.draft.is_none() {
            self.draft = Some(String::new());
        }
    }

    /// Overwrite the in-progress assistant turn's text with the latest
    /// accumulated stream state, creating the turn if needed.
    pub fn update_assistant_turn(&mut self, text: impl Into<String>) {
        self.draft = Some(text.into());
    }

    /// Freeze the in-progress turn into a normal turn, subject to the
    /// cap/eviction rule. No-op if no turn is in progress.
    pub fn finalize_assistant_turn(&mut self) {
        if let Some(text) = self.draft.take() {
            self.push_turn(Turn::assistant(text));
        }
    }

    /// Clear all turns and any in-progress turn (used on model switch).
    pub fn reset(&mut self) {
        self.turns.clear();
        self.draft = None;
    }

    /// The finalized turns, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Text of the in-progress assistant turn, if one exists.
    pub fn assistant_draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    /// The finalized history as wire messages, in order. The next chat
    /// request is exactly this sequence plus the new user message.
    pub fn context(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|turn| ChatMessage::new(turn.role, turn.text.clone()))
            .collect()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}
