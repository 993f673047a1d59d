//! Chat layer
//!
//! The engine that drives one conversation turn at a time, and the
//! event vocabulary it shares with the UI adapter.

pub mod engine;
pub mod events;

pub use engine::{ChatEngine, ABORT_PLACEHOLDER, ERROR_PLACEHOLDER};
pub use events::{ChatEvent, TurnOutcome};
