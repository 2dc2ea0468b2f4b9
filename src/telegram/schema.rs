//! Dispatcher schema: Telegram updates in, [`Event`]s out
//!
//! The schema does no business work. It turns each update into an event,
//! answers callback queries so the button spinner stops, and hands the event
//! to the receive loop over a channel.

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Message};
use tokio::sync::mpsc;

use crate::engine::event::{CallbackAction, ChatId, Event, UserId};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type EventSender = mpsc::UnboundedSender<Event>;

/// Creates the dispatcher schema feeding `events`.
pub fn schema(events: EventSender) -> UpdateHandler<HandlerError> {
    let events_messages = events.clone();
    let events_callbacks = events;

    dptree::entry()
        .branch(message_handler(events_messages))
        .branch(callback_handler(events_callbacks))
}

fn forward(events: &EventSender, event: Event) {
    if events.send(event).is_err() {
        log::debug!("Receive loop is gone, update dropped");
    }
}

/// Text messages become `Command` or `Text` events; other media is ignored.
fn message_handler(events: EventSender) -> UpdateHandler<HandlerError> {
    Update::filter_message().endpoint(move |update: Update, msg: Message| {
        let events = events.clone();
        async move {
            let Some(text) = msg.text() else {
                return Ok(());
            };
            let Some(user) = msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()) else {
                return Ok(());
            };
            let event = Event::from_message(u64::from(update.id.0), ChatId(msg.chat.id.0), UserId(user), text);
            forward(&events, event);
            Ok(())
        }
    })
}

fn callback_handler(events: EventSender) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, update: Update, q: CallbackQuery| {
        let events = events.clone();
        async move {
            if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
                log::warn!("Failed to answer callback query: {}", e);
            }

            let Ok(user) = i64::try_from(q.from.id.0) else {
                return Ok(());
            };
            // Without the originating message the press came from a private chat
            let chat = q.message.as_ref().map(|m| m.chat().id.0).unwrap_or(user);
            let action = CallbackAction::parse(q.data.as_deref().unwrap_or_default());

            let mut event = Event::callback(ChatId(chat), UserId(user), action).with_update_id(u64::from(update.id.0));
            if let Some(message) = q.message.as_ref() {
                event = event.with_message_ref(message.id().0);
            }
            forward(&events, event);
            Ok(())
        }
    })
}
