//! Terminal chat client for generative-language models.
//!
//! [`ConversationController`] owns the message list and the in-flight
//! requests; [`GeminiClient`] is the default [`GenerativeModel`].

pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod events;
pub mod llm;
pub mod streaming;
pub mod tui;
pub mod ui;

pub use config::{Config, Texts};
pub use controller::ConversationController;
pub use conversation::{Conversation, Message};
pub use error::ModelError;
pub use events::{ExchangeEvent, RequestId, Speaker};
pub use llm::{ClientSettings, GeminiClient, GenerativeModel};
