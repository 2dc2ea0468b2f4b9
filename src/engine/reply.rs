//! Outbound messages and the transport seam
//!
//! The engine only ever talks to a [`Transport`]; Telegram is one
//! implementation, the recording transport in tests is another.

use async_trait::async_trait;

use crate::core::error::TransportError;
use crate::engine::event::{CallbackAction, ChatId};

/// Inline button carrying a typed action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: CallbackAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// A message to send: text plus optional keyboard rows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.keyboard.push(row);
        }
        self
    }

    pub fn with_button(self, label: impl Into<String>, action: CallbackAction) -> Self {
        self.with_row(vec![Button::new(label, action)])
    }

    pub fn has_keyboard(&self) -> bool {
        !self.keyboard.is_empty()
    }

    /// All actions offered by the keyboard, row by row
    pub fn actions(&self) -> impl Iterator<Item = &CallbackAction> {
        self.keyboard.iter().flatten().map(|b| &b.action)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::text(text)
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::text(text)
    }
}

/// Outbound side of the messaging transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, chat: ChatId, reply: &Reply) -> Result<(), TransportError>;
}

/// Sends replies in order. Failures are logged and not retried; the rest still go out.
pub async fn send_all(transport: &dyn Transport, chat: ChatId, replies: &[Reply]) -> usize {
    let mut delivered = 0;
    for reply in replies {
        match transport.send(chat, reply).await {
            Ok(()) => delivered += 1,
            Err(e) => log::warn!("Reply not delivered: {}", e),
        }
    }
    delivered
}
