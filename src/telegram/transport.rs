//! Outbound Telegram: replies with inline keyboards, admin notifications

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::core::error::TransportError;
use crate::engine::event::ChatId;
use crate::engine::reply::{Reply, Transport};
use crate::scheduler::Notifier;

/// Converts the reply keyboard into Telegram inline buttons; `None` without one.
pub fn keyboard_markup(reply: &Reply) -> Option<InlineKeyboardMarkup> {
    if !reply.has_keyboard() {
        return None;
    }
    let rows: Vec<Vec<InlineKeyboardButton>> = reply
        .keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.action.token()))
                .collect()
        })
        .collect();
    Some(InlineKeyboardMarkup::new(rows))
}

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, chat: ChatId, reply: &Reply) -> Result<(), TransportError> {
        let request = self.bot.send_message(teloxide::types::ChatId(chat.0), reply.text.clone());
        let result = match keyboard_markup(reply) {
            Some(markup) => request.reply_markup(markup).await,
            None => request.await,
        };
        result
            .map(|_| ())
            .map_err(|e| TransportError::new(chat.0, e.to_string()))
    }
}

/// Delivers scheduler output to one chat, normally the admin's
pub struct TelegramNotifier {
    bot: Bot,
    chat: ChatId,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat: ChatId) -> Self {
        Self { bot, chat }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(teloxide::types::ChatId(self.chat.0), message)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::new(self.chat.0, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::event::CallbackAction;

    #[test]
    fn test_keyboard_rows_carry_tokens() {
        assert!(keyboard_markup(&Reply::text("plain")).is_none());

        let reply = Reply::text("menu")
            .with_button("Назад", CallbackAction::BackToStart)
            .with_button("Карта", CallbackAction::ManageClient(5));
        let markup = keyboard_markup(&reply).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "Карта");
    }
}
