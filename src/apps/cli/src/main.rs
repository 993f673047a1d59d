//! Skiff CLI entry point
//!
//! Wires config, logging, the engine worker and the terminal UI.

mod app;
mod ui;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use skiff_core::{ChatConfig, ChatEngine};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::worker::Command;

#[derive(Parser, Debug)]
#[command(name = "skiff", version, about = "Terminal chat client for local inference servers")]
struct Args {
    /// Inference server base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Chat model (overrides the config file)
    #[arg(long)]
    model: Option<String>,

    /// Vision model used for image captioning (overrides the config file)
    #[arg(long)]
    vision_model: Option<String>,

    /// Config file path (default: <config-dir>/skiff/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Logs go to a file: stdout belongs to the TUI. The subscriber's log
/// bridge also picks up the core crate's `log` records.
fn init_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("skiff");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_file = std::fs::File::create(log_dir.join("skiff.log"))
        .with_context(|| format!("failed to open log file in {}", log_dir.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_config(args: &Args) -> Result<ChatConfig> {
    let path = args.config.clone().or_else(ChatConfig::default_path);
    let mut config = match &path {
        Some(path) => ChatConfig::load(path)
            .with_context(|| format!("malformed config file {}", path.display()))?,
        None => ChatConfig::default(),
    };

    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(vision_model) = &args.vision_model {
        config.vision_model = vision_model.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;
    tracing::info!("skiff {} starting", skiff_core::VERSION);
    let config = load_config(&args)?;

    let (tx_cmd, rx_cmd) = mpsc::unbounded_channel::<Command>();
    let (tx_events, rx_events) = mpsc::unbounded_channel();

    let engine = ChatEngine::new(&config, tx_events);
    let engine_task = tokio::spawn(worker::run(engine, rx_cmd));

    // Populate the model picker up front.
    let _ = tx_cmd.send(Command::ListModels);

    let terminal = ui::init_terminal().context("failed to initialize terminal")?;
    let result = App::new(&config, tx_cmd).run(terminal, rx_events).await;

    engine_task.abort();
    result
}
