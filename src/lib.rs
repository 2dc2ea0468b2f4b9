//! Loyalty bot - Telegram assistant for a coffee-shop loyalty program
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, input validation
//! - `engine`: events, sessions, workflow definitions, the router and per-chat lanes
//! - `workflows`: registration, staff onboarding, points and purchase conversations
//! - `handlers`: single-shot commands and menu buttons
//! - `services`: business collaborator traits and the in-memory store
//! - `storage`: SQLite implementation of the collaborators
//! - `scheduler`: birthday bonuses and admin notifications
//! - `telegram`: teloxide intake and outbound transport
//! - `lifecycle`: start-up and graceful shutdown

pub mod cli;
pub mod core;
pub mod engine;
pub mod handlers;
pub mod lifecycle;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod telegram;
pub mod workflows;

pub use core::{config, AppError, AppResult};
pub use engine::{Event, Router};
pub use lifecycle::BotController;
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
