// Skiff Core Library - UI-agnostic chat client logic
// Layered architecture: Util -> Infrastructure -> Session -> Chat

pub mod chat; // Chat layer - engine orchestrating one turn at a time, UI events
pub mod config; // Configuration - TOML file + defaults
pub mod infrastructure; // Infrastructure layer - inference client, stream handling
pub mod session; // Session layer - bounded conversation history
pub mod util; // Utility layer - shared types, errors

// Export main types
pub use util::errors::TransportError;
pub use util::types::{ModelDescriptor, Role, Turn};

// Export infrastructure components
pub use infrastructure::ai::{
    handle_chat_stream, ChatStreamDecoder, InferenceClient, StreamOutcome, StreamProgress,
};

// Export session components
pub use session::{ConversationHistory, DEFAULT_HISTORY_CAP};

// Export chat layer components
pub use chat::{ChatEngine, ChatEvent, TurnOutcome, ERROR_PLACEHOLDER, ABORT_PLACEHOLDER};

// Export configuration
pub use config::ChatConfig;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
