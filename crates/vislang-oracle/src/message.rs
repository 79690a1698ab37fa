//! Conversation types shared by every text-oracle call site
//!
//! A [`ChatRequest`] carries the full conversation for one invocation; the
//! caller receives an [`Exchange`] back and threads it forward explicitly.

use serde::{Deserialize, Serialize};

/// Speaker of a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction preamble
    System,
    /// Requester (including corrective turns)
    User,
    /// Oracle output replayed into the conversation
    Assistant,
}

impl Role {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One follow-up turn appended after the initial system/user pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker
    pub role: Role,
    /// Text content
    pub content: String,
}

impl Turn {
    /// User turn
    #[inline]
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant turn
    #[inline]
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// PNG image attached to the user instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledImage {
    /// Caption sent before the image
    pub label: String,
    /// PNG bytes
    #[serde(skip)]
    pub png: Vec<u8>,
}

impl LabeledImage {
    /// Create labelled image
    #[inline]
    #[must_use]
    pub fn new(label: impl Into<String>, png: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            png,
        }
    }

    /// `data:` URL with base64 payload
    #[must_use]
    pub fn data_url(&self) -> String {
        use base64::Engine as _;
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }
}

/// Everything sent in one text-oracle invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// System instruction
    pub system: String,
    /// User instruction
    pub user: String,
    /// Prior assistant attempts and corrective turns
    pub turns: Vec<Turn>,
    /// Images attached to the user instruction
    pub images: Vec<LabeledImage>,
}

impl ChatRequest {
    /// Create request from system and user instructions
    #[inline]
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            turns: Vec::new(),
            images: Vec::new(),
        }
    }

    /// With follow-up turns
    #[inline]
    #[must_use]
    pub fn with_turns(mut self, turns: Vec<Turn>) -> Self {
        self.turns = turns;
        self
    }

    /// With images
    #[inline]
    #[must_use]
    pub fn with_images(mut self, images: Vec<LabeledImage>) -> Self {
        self.images = images;
        self
    }
}

/// A request and the raw text that came back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// What was sent
    pub request: ChatRequest,
    /// What was received
    pub response: String,
}
