//! Telegram transport: update intake, outbound messages, admin notifier

pub mod bot;
pub mod schema;
pub mod transport;

pub use bot::{create_bot, setup_bot_commands};
pub use schema::{schema, EventSender, HandlerError};
pub use transport::{TelegramNotifier, TelegramTransport};
