//! Commands, menus and buttons outside the workflows

pub mod callbacks;
pub mod commands;
pub mod menus;

pub use callbacks::catch_all;
pub use commands::{registry, WORKFLOW_COMMANDS};

pub const NOTHING_TO_CANCEL: &str = "ℹ️ Нет активной операции.";
