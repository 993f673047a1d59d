//! Engine worker
//!
//! Owns the chat engine and serializes UI commands onto it, so all
//! conversation state is touched from exactly one task. Results flow
//! back to the UI through the engine's event channel.

use skiff_core::ChatEngine;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// A UI action mapped onto one core operation.
#[derive(Debug)]
pub enum Command {
    Send {
        text: String,
        image: Option<Vec<u8>>,
        cancel: CancellationToken,
    },
    SelectModel(String),
    SelectVisionModel(String),
    ListModels,
}

pub async fn run(mut engine: ChatEngine, mut commands: UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Send {
                text,
                image,
                cancel,
            } => {
                engine.send_message(&text, image.as_deref(), cancel).await;
            }
            Command::SelectModel(name) => engine.select_model(name),
            Command::SelectVisionModel(name) => engine.select_vision_model(name),
            Command::ListModels => engine.refresh_models().await,
        }
    }
}
