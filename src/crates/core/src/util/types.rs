//! Core data model
//!
//! The conversation-facing types shared by the session layer, the chat
//! engine and the UI adapter.

use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One finalized message in the conversation.
///
/// `image` holds the base64 payload of an attachment for display
/// purposes; it is never re-sent to the chat endpoint (the image's
/// content reaches the model through the captioning hand-off instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub image: Option<String>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image: None,
        }
    }

    pub fn user_with_image(text: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image: Some(image.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            image: None,
        }
    }
}

/// One entry of the server's model listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}
