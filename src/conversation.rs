//! In-memory conversation and per-request placeholder bookkeeping

use crate::config::Texts;
use crate::error::ModelError;
use crate::events::{RequestId, Speaker};
use chrono::{DateTime, Local};
use std::collections::HashMap;

/// A single entry in the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub speaker: Speaker,
    pub text: String,
    pub sent_at: DateTime<Local>,
    /// Placeholder still waiting for its answer
    pub pending: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text, false)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, text, false)
    }

    fn placeholder(text: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, text, true)
    }

    fn new(speaker: Speaker, text: impl Into<String>, pending: bool) -> Self {
        Self {
            speaker,
            text: text.into(),
            sent_at: Local::now(),
            pending,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingSlot {
    index: usize,
    /// At least one streamed fragment replaced the placeholder text
    streamed: bool,
}

/// Ordered message list. Entries are only appended; a pending placeholder is
/// the one entry that may change, and only through its own `RequestId`.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    pending: HashMap<RequestId, PendingSlot>,
    texts: Texts,
}

impl Conversation {
    pub fn new(texts: Texts) -> Self {
        Self {
            messages: Vec::new(),
            pending: HashMap::new(),
            texts,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of placeholders still waiting
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Append a settled message, returning its index
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Append the user's text and a placeholder for the answer.
    ///
    /// Blank input changes nothing and returns `None`. Otherwise returns the
    /// id the answer must be delivered under, and the prompt to send.
    pub fn begin_exchange(&mut self, text: &str) -> Option<(RequestId, String)> {
        if text.trim().is_empty() {
            return None;
        }

        let id = RequestId::new();
        self.push(Message::user(text));
        let index = self.push(Message::placeholder(self.texts.pending.clone()));
        self.pending.insert(
            id,
            PendingSlot {
                index,
                streamed: false,
            },
        );

        Some((id, text.to_string()))
    }

    /// Grow the placeholder of `id` with a streamed fragment. It stays pending.
    pub fn apply_delta(&mut self, id: RequestId, delta: &str) -> bool {
        let Some(slot) = self.pending.get_mut(&id) else {
            return false;
        };
        let message = &mut self.messages[slot.index];
        if !slot.streamed {
            message.text.clear();
            slot.streamed = true;
        }
        message.text.push_str(delta);
        true
    }

    /// Settle the placeholder of `id` with the call's outcome.
    ///
    /// Returns false when `id` has no placeholder (already settled, or dropped
    /// by `clear`); the conversation is left untouched in that case.
    pub fn resolve(&mut self, id: RequestId, outcome: &Result<String, ModelError>) -> bool {
        let Some(slot) = self.pending.remove(&id) else {
            return false;
        };

        let text = match outcome {
            Ok(text) if text.trim().is_empty() => self.texts.empty.clone(),
            Ok(text) => text.clone(),
            Err(_) => self.texts.error.clone(),
        };

        let message = &mut self.messages[slot.index];
        message.text = text;
        message.pending = false;
        true
    }

    /// Drop every entry and forget outstanding placeholders
    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending.clear();
    }
}
