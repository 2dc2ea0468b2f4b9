//! Transport that records every reply instead of sending it

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use loyalty_bot::core::TransportError;
use loyalty_bot::engine::{CallbackAction, ChatId, Reply, Transport};

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ChatId, Reply)>>,
    failing: Mutex<HashSet<ChatId>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send to `chat` fails from now on (the attempt is still recorded)
    pub async fn fail_for(&self, chat: ChatId) {
        self.failing.lock().await.insert(chat);
    }

    pub async fn all(&self) -> Vec<(ChatId, Reply)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, chat: ChatId) -> Vec<Reply> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub async fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.sent_to(chat).await.into_iter().map(|r| r.text).collect()
    }

    pub async fn last_to(&self, chat: ChatId) -> Option<Reply> {
        self.sent_to(chat).await.pop()
    }

    pub async fn last_text(&self, chat: ChatId) -> String {
        self.last_to(chat).await.map(|r| r.text).unwrap_or_default()
    }

    /// Whether the last reply to `chat` offers `action`
    pub async fn last_offers(&self, chat: ChatId, action: &CallbackAction) -> bool {
        self.last_to(chat)
            .await
            .is_some_and(|r| r.actions().any(|a| a == action))
    }

    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, chat: ChatId, reply: &Reply) -> Result<(), TransportError> {
        self.sent.lock().await.push((chat, reply.clone()));
        if self.failing.lock().await.contains(&chat) {
            return Err(TransportError::new(chat.0, "chat unreachable"));
        }
        Ok(())
    }
}
