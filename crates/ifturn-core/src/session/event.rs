use crate::error::Result;
use crate::keys::{KeyToken, encode_key};
use serde::{Deserialize, Serialize};

/// One input event sent to the interpreter for a single turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnInputEvent {
    /// First turn of a game: no state is restored.
    Init,
    /// A line of text, or a file name when the game shows a file prompt.
    Line { text: String },
    Character { key: KeyToken },
}

impl TurnInputEvent {
    pub fn line(text: impl Into<String>) -> Self {
        Self::Line { text: text.into() }
    }

    /// Encodes `key` through the character encoder.
    pub fn character(key: &str) -> Result<Self> {
        Ok(Self::Character {
            key: encode_key(key)?,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TurnInputEvent::Init => "init",
            TurnInputEvent::Line { .. } => "line",
            TurnInputEvent::Character { .. } => "character",
        }
    }

    /// The command as it would be recorded in `last_command`.
    pub fn command_text(&self) -> Option<String> {
        match self {
            TurnInputEvent::Init => None,
            TurnInputEvent::Line { text } => Some(text.clone()),
            TurnInputEvent::Character { key } => Some(key.as_protocol_value()),
        }
    }
}

/// A turn as requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub event: TurnInputEvent,
    /// When set, the turn only runs if the stored generation matches.
    #[serde(default)]
    pub expected_generation: Option<u64>,
}

impl TurnRequest {
    pub fn new(event: TurnInputEvent) -> Self {
        Self {
            event,
            expected_generation: None,
        }
    }

    pub fn expecting(mut self, generation: u64) -> Self {
        self.expected_generation = Some(generation);
        self
    }
}

impl From<TurnInputEvent> for TurnRequest {
    fn from(event: TurnInputEvent) -> Self {
        Self::new(event)
    }
}
