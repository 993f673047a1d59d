//! Application state and event loop
//!
//! The UI adapter: translates key events into engine commands and
//! renders exclusively from engine events. Send is disabled while a
//! generation is in flight; Esc cancels the active request.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use skiff_core::{ChatConfig, ChatEvent, ModelDescriptor, Role, StreamProgress, TurnOutcome};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::ui;
use crate::worker::Command;

/// One rendered message bubble.
#[derive(Debug, Clone)]
pub struct DisplayMessage {
    pub role: Role,
    pub text: String,
    pub has_image: bool,
}

/// Friendly labels for the bundled model ids.
pub fn model_display_name(id: &str) -> &str {
    match id {
        "llama3.1" => "Llama 3.1",
        "llama2-uncensored" => "Llama 2 Uncensored",
        "deepseek-coder-v2:lite" => "Deepseek Coder",
        other => other,
    }
}

/// Either a terminal key or an engine notification.
pub enum AppEvent {
    Input(KeyEvent),
    Chat(ChatEvent),
}

pub struct App {
    pub input: String,
    pub messages: Vec<DisplayMessage>,
    pub models: Vec<ModelDescriptor>,
    pub model: String,
    pub vision_model: String,
    pub pending_assistant: Option<String>,
    pub last_progress: Option<StreamProgress>,
    pub pending_image: Option<Vec<u8>>,
    pub generating: bool,
    pub status: Option<String>,
    pub quit: bool,
    active_cancel: Option<CancellationToken>,
    tx_cmd: UnboundedSender<Command>,
}

impl App {
    pub fn new(config: &ChatConfig, tx_cmd: UnboundedSender<Command>) -> Self {
        Self {
            input: String::new(),
            messages: Vec::new(),
            models: Vec::new(),
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            pending_assistant: None,
            last_progress: None,
            pending_image: None,
            generating: false,
            status: None,
            quit: false,
            active_cancel: None,
            tx_cmd,
        }
    }

    pub async fn run(
        mut self,
        mut terminal: ui::Tui,
        rx_events: UnboundedReceiver<ChatEvent>,
    ) -> Result<()> {
        let (tx_app, rx_app) = mpsc::unbounded_channel();
        spawn_input_thread(tx_app.clone());
        spawn_event_forwarder(rx_events, tx_app);

        let result = self.event_loop(&mut terminal, rx_app).await;
        ui::restore_terminal(terminal)?;
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut ui::Tui,
        mut rx_app: UnboundedReceiver<AppEvent>,
    ) -> Result<()> {
        terminal.draw(|frame| ui::draw(frame, self))?;

        while let Some(event) = rx_app.recv().await {
            match event {
                AppEvent::Input(key) => self.handle_key(key),
                AppEvent::Chat(event) => self.apply_chat_event(event),
            }
            terminal.draw(|frame| ui::draw(frame, self))?;
            if self.quit {
                break;
            }
        }
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quit = true;
            }
            KeyCode::Esc => self.stop_generation(),
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    /// Cancel the active request, if any. The handle stays in place
    /// until the engine reports the turn as settled.
    fn stop_generation(&mut self) {
        if let Some(cancel) = &self.active_cancel {
            cancel.cancel();
            self.status = Some("stopping...".to_string());
        }
    }

    fn submit(&mut self) {
        let line = self.input.trim().to_string();
        if line.is_empty() {
            return;
        }

        if let Some(command) = line.strip_prefix('/') {
            self.input.clear();
            self.run_slash_command(command);
            return;
        }

        // Send control is disabled while a generation is active.
        if self.generating {
            return;
        }
        self.input.clear();

        let cancel = CancellationToken::new();
        self.active_cancel = Some(cancel.clone());
        self.generating = true;
        self.status = None;
        let _ = self.tx_cmd.send(Command::Send {
            text: line,
            image: self.pending_image.take(),
            cancel,
        });
    }

    fn run_slash_command(&mut self, command: &str) {
        let (name, rest) = match command.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match (name, rest) {
            ("models", _) => {
                let _ = self.tx_cmd.send(Command::ListModels);
            }
            ("model", "") => {
                self.status = Some(if self.models.is_empty() {
                    "usage: /model <name> (try /models first)".to_string()
                } else {
                    let names: Vec<&str> = self.models.iter().map(|m| m.name.as_str()).collect();
                    format!("available: {}", names.join(", "))
                });
            }
            ("vision", "") | ("image", "") => {
                self.status = Some(format!("usage: /{} <value>", name));
            }
            ("model", rest) => {
                let _ = self.tx_cmd.send(Command::SelectModel(rest.to_string()));
            }
            ("vision", rest) => {
                let _ = self.tx_cmd.send(Command::SelectVisionModel(rest.to_string()));
            }
            ("image", path) => match std::fs::read(path) {
                Ok(bytes) => {
                    self.status = Some(format!("attached {} ({} bytes)", path, bytes.len()));
                    self.pending_image = Some(bytes);
                }
                Err(e) => {
                    self.status = Some(format!("could not read {}: {}", path, e));
                }
            },
            _ => {
                self.status = Some(format!("unknown command: /{}", name));
            }
        }
    }

    pub fn apply_chat_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Models(models) => {
                self.status = Some(format!("{} models available", models.len()));
                self.models = models;
            }
            ChatEvent::ModelChanged { name } => {
                // History was cleared with the model switch.
                self.messages.clear();
                self.status = Some(format!("chatting with {}", model_display_name(&name)));
                self.model = name;
            }
            ChatEvent::VisionModelChanged { name } => {
                self.status = Some(format!("captioning with {}", name));
                self.vision_model = name;
            }
            ChatEvent::TurnStarted {
                user_text,
                has_image,
            } => {
                self.messages.push(DisplayMessage {
                    role: Role::User,
                    text: user_text,
                    has_image,
                });
                self.pending_assistant = Some(String::new());
            }
            ChatEvent::Progress(progress) => {
                self.pending_assistant = Some(progress.text.clone());
                self.last_progress = Some(progress);
            }
            ChatEvent::TurnFinished { outcome, text } => {
                self.messages.push(DisplayMessage {
                    role: Role::Assistant,
                    text,
                    has_image: false,
                });
                self.pending_assistant = None;
                self.last_progress = None;
                self.generating = false;
                self.active_cancel = None;
                self.status = match outcome {
                    TurnOutcome::Completed => None,
                    TurnOutcome::Aborted => Some("generation stopped".to_string()),
                    TurnOutcome::Failed => Some("generation failed, see log".to_string()),
                };
            }
            ChatEvent::Error { message } => {
                self.status = Some(message);
            }
        }
    }
}

/// Blocking reader for terminal events, forwarded into the async loop.
fn spawn_input_thread(tx_app: UnboundedSender<AppEvent>) {
    std::thread::spawn(move || loop {
        match crossterm::event::read() {
            Ok(crossterm::event::Event::Key(key)) => {
                if tx_app.send(AppEvent::Input(key)).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    });
}

fn spawn_event_forwarder(
    mut rx_events: UnboundedReceiver<ChatEvent>,
    tx_app: UnboundedSender<AppEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx_events.recv().await {
            if tx_app.send(AppEvent::Chat(event)).is_err() {
                break;
            }
        }
    });
}
