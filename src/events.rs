use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display};
use uuid::Uuid;

/// Who wrote a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn display_name(&self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Assistant => "Assistant",
        }
    }

    /// Outgoing entries are the ones typed locally.
    pub fn is_outgoing(&self) -> bool {
        matches!(self, Speaker::User)
    }
}

/// Identifies one user prompt and the placeholder waiting for its answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Progress of an in-flight exchange, sent from the request task to the owner
/// of the conversation.
#[derive(Debug)]
pub enum ExchangeEvent {
    /// Streamed text fragment for the placeholder of `id`
    Delta { id: RequestId, text: String },

    /// The call finished, one way or the other
    Completed {
        id: RequestId,
        outcome: Result<String, ModelError>,
    },
}

/// TUI-specific events (keyboard, resize, animation tick)
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Paste event
    Paste(String),

    /// Terminal resize
    Resize(u16, u16),

    /// Periodic redraw, also used to drain finished exchanges
    Tick,
}
