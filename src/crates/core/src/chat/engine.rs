//! Chat engine
//!
//! The explicit session object owning the transport client, the bounded
//! history and the current model selection. Drives one turn at a time;
//! progress and settlement flow to the UI adapter over an unbounded
//! event channel. Cancellation is an explicit per-call token created by
//! the caller, not shared engine state.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{info, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::chat::events::{ChatEvent, TurnOutcome};
use crate::config::ChatConfig;
use crate::infrastructure::ai::client::InferenceClient;
use crate::infrastructure::ai::stream_handler::{handle_chat_stream, StreamOutcome};
use crate::infrastructure::ai::types::ChatMessage;
use crate::session::history::ConversationHistory;
use crate::util::errors::TransportError;
use crate::util::types::{Role, Turn};

/// Recorded in place of assistant text when transport or captioning
/// fails mid-turn.
pub const ERROR_PLACEHOLDER: &str = "Error generating response";

/// Recorded in place of assistant text when the user stops generation.
pub const ABORT_PLACEHOLDER: &str = "Response aborted by user";

/// One chat session against one inference server.
pub struct ChatEngine {
    client: InferenceClient,
    history: ConversationHistory,
    model: String,
    vision_model: String,
    events: UnboundedSender<ChatEvent>,
}

/// Result of the image preprocessing hand-off.
enum CaptionStep {
    NoImage,
    Caption(String),
    Failed(TransportError),
    Aborted,
}

impl ChatEngine {
    pub fn new(config: &ChatConfig, events: UnboundedSender<ChatEvent>) -> Self {
        Self {
            client: InferenceClient::new(config.base_url.as_str()),
            history: ConversationHistory::new(config.history_cap),
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            events,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn vision_model(&self) -> &str {
        &self.vision_model
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Switch the chat model. Context from the previous model does not
    /// carry over, so the history is cleared.
    pub fn select_model(&mut self, name: impl Into<String>) {
        self.model = name.into();
        self.history.reset();
        info!("switched chat model to {}", self.model);
        let _ = self.events.send(ChatEvent::ModelChanged {
            name: self.model.clone(),
        });
    }

    /// Switch the model used for image captioning.
    pub fn select_vision_model(&mut self, name: impl Into<String>) {
        self.vision_model = name.into();
        info!("switched vision model to {}", self.vision_model);
        let _ = self.events.send(ChatEvent::VisionModelChanged {
            name: self.vision_model.clone(),
        });
    }

    /// Ask the server for its model listing and report it as an event.
    pub async fn refresh_models(&self) {
        match self.client.list_models().await {
            Ok(models) => {
                let _ = self.events.send(ChatEvent::Models(models));
            }
            Err(e) => {
                warn!("model listing failed: {}", e);
                let _ = self.events.send(ChatEvent::Error {
                    message: format!("model listing failed: {}", e),
                });
            }
        }
    }

    /// Run one full turn: optional captioning hand-off, streaming chat
    /// completion, history bookkeeping, settlement.
    ///
    /// Every path settles the turn: the user turn (original text, not
    /// the composite prompt) and a finalized assistant turn (streamed
    /// text or a placeholder) are recorded before this returns.
    pub async fn send_message(
        &mut self,
        text: &str,
        image: Option<&[u8]>,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let image_b64 = image.map(|bytes| BASE64.encode(bytes));
        let _ = self.events.send(ChatEvent::TurnStarted {
            user_text: text.to_string(),
            has_image: image_b64.is_some(),
        });

        let caption = self.caption_step(text, image_b64.as_deref(), &cancel).await;
        let outbound_text = match caption {
            CaptionStep::NoImage => text.to_string(),
            CaptionStep::Caption(caption) => composite_prompt(text, &caption),
            CaptionStep::Failed(e) => {
                warn!("image captioning failed: {}", e);
                self.record_user_turn(text, image_b64);
                return self.settle_turn(TurnOutcome::Failed);
            }
            CaptionStep::Aborted => {
                self.record_user_turn(text, image_b64);
                return self.settle_turn(TurnOutcome::Aborted);
            }
        };

        // The request context is exactly the finalized history plus the
        // new user message (composite when an image is attached).
        let mut messages = self.history.context();
        messages.push(ChatMessage::new(Role::User, outbound_text));
        self.record_user_turn(text, image_b64);

        let opened = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.client.open_chat_stream(&self.model, &messages) => Some(result),
        };
        let response = match opened {
            None => return self.settle_turn(TurnOutcome::Aborted),
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                warn!("chat request failed: {}", e);
                return self.settle_turn(TurnOutcome::Failed);
            }
        };

        let history = &mut self.history;
        let events = &self.events;
        let drained = handle_chat_stream(response, &cancel, |progress| {
            history.update_assistant_turn(progress.text.clone());
            let _ = events.send(ChatEvent::Progress(progress));
        })
        .await;

        match drained {
            Ok(StreamOutcome::Completed(full_text)) => {
                self.history.update_assistant_turn(full_text);
                self.settle_turn(TurnOutcome::Completed)
            }
            Ok(StreamOutcome::Aborted) => self.settle_turn(TurnOutcome::Aborted),
            Err(e) => {
                warn!("chat stream failed: {}", e);
                self.settle_turn(TurnOutcome::Failed)
            }
        }
    }

    async fn caption_step(
        &self,
        text: &str,
        image_b64: Option<&str>,
        cancel: &CancellationToken,
    ) -> CaptionStep {
        let Some(b64) = image_b64 else {
            return CaptionStep::NoImage;
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.client.caption_image(&self.vision_model, text, b64) => Some(result),
        };
        match result {
            None => CaptionStep::Aborted,
            Some(Ok(caption)) => CaptionStep::Caption(caption),
            Some(Err(e)) => CaptionStep::Failed(e),
        }
    }

    /// Record the displayed user turn and open the in-progress
    /// assistant turn.
    fn record_user_turn(&mut self, text: &str, image_b64: Option<String>) {
        self.history.push_turn(Turn {
            role: Role::User,
            text: text.to_string(),
            image: image_b64,
        });
        self.history.begin_assistant_turn();
    }

    /// Finalize the in-progress assistant turn for the given outcome
    /// and notify the UI. Placeholders keep history consistent: an
    /// aborted or failed turn is never left looking like a complete
    /// assistant message.
    fn settle_turn(&mut self, outcome: TurnOutcome) -> TurnOutcome {
        match outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::Aborted => self.history.update_assistant_turn(ABORT_PLACEHOLDER),
            TurnOutcome::Failed => self.history.update_assistant_turn(ERROR_PLACEHOLDER),
        }

        let text = self
            .history
            .assistant_draft()
            .unwrap_or_default()
            .to_string();
        self.history.finalize_assistant_turn();
        let _ = self.events.send(ChatEvent::TurnFinished { outcome, text });
        outcome
    }
}

/// The prompt actually sent to the chat endpoint when an image is
/// attached: the typed text with the caption result embedded.
fn composite_prompt(text: &str, caption: &str) -> String {
    format!(
        "User uploaded an image with prompt: \"{}\", answer the prompt with this info \"{}\"",
        text, caption
    )
}
