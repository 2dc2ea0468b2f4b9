//! Single-shot handlers: the command registry and the catch-all callback handler

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::core::error::AppResult;
use crate::engine::event::{CallbackAction, ChatId, Event, UserId};
use crate::engine::reply::Reply;
use crate::services::Services;

/// What a command or catch-all handler receives
#[derive(Clone)]
pub struct HandlerContext {
    pub event: Event,
    pub services: Arc<Services>,
}

impl HandlerContext {
    pub fn chat(&self) -> ChatId {
        self.event.chat
    }

    pub fn user(&self) -> UserId {
        self.event.user
    }

    pub fn args(&self) -> &str {
        self.event.command_args()
    }
}

pub type CommandFn = Arc<dyn Fn(HandlerContext) -> BoxFuture<'static, AppResult<Vec<Reply>>> + Send + Sync>;

pub fn command_fn<F, Fut>(f: F) -> CommandFn
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Vec<Reply>>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

struct RegisteredCommand {
    description: &'static str,
    handler: CommandFn,
}

/// Static command name → handler map. Filled at start-up, read-only afterwards.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, RegisteredCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &'static str, description: &'static str, handler: CommandFn) -> Self {
        if self
            .commands
            .insert(name, RegisteredCommand { description, handler })
            .is_some()
        {
            log::warn!("Command /{} registered twice, keeping the last handler", name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&CommandFn> {
        self.commands.get(name).map(|c| &c.handler)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// `(name, description)` pairs in name order
    pub fn descriptions(&self) -> Vec<(&'static str, &'static str)> {
        self.commands.iter().map(|(name, c)| (*name, c.description)).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Result of the catch-all handler. `NoOp` is the documented outcome for
/// buttons nobody owns: nothing is sent and nothing is logged as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Replied(Vec<Reply>),
    NoOp,
}

pub type CatchAllFn =
    Arc<dyn Fn(HandlerContext, CallbackAction) -> BoxFuture<'static, AppResult<CallbackResult>> + Send + Sync>;

pub fn catch_all_fn<F, Fut>(f: F) -> CatchAllFn
where
    F: Fn(HandlerContext, CallbackAction) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<CallbackResult>> + Send + 'static,
{
    Arc::new(move |ctx, action| Box::pin(f(ctx, action)))
}
