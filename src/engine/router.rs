//! Event router
//!
//! Every inbound event goes through [`Router::dispatch`]. Priority, first
//! match wins:
//!
//! 1. workflows with an active session in the chat (step handler, then
//!    fallback, then re-entry through an entry point)
//! 2. workflow entry points, which open a new session (dropped again if the
//!    entry step fails)
//! 3. the command registry
//! 4. the catch-all callback handler
//! 5. nothing (ignored)
//!
//! Dispatch never fails. Business rejections go back to the user as text,
//! everything else goes through [`ErrorContainment`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::Mutex;

use crate::core::error::{AppError, AppResult, ErrorKind};
use crate::engine::commands::{CallbackResult, CatchAllFn, CommandRegistry, HandlerContext};
use crate::engine::containment::{ErrorContainment, ErrorRecord};
use crate::engine::event::{ChatId, Event, Payload};
use crate::engine::reply::{send_all, Reply, Transport};
use crate::engine::session::{Session, SessionStore};
use crate::engine::workflow::{Step, StepContext, StepFn, Transition, WorkflowDefinition, WorkflowKind};
use crate::services::Services;

/// Shown when an idle session is dropped by the optional timeout
pub const SESSION_EXPIRED_NOTICE: &str = "⌛ Предыдущая операция отменена из-за неактивности.";

/// What happened to an event. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A workflow step ran; `step` is where the session is now, `None` if it ended
    Workflow { kind: WorkflowKind, step: Option<Step> },
    Command { name: String },
    Callback { handled: bool },
    Ignored,
    Failed { kind: ErrorKind },
}

pub struct Router {
    workflows: Vec<WorkflowDefinition>,
    commands: CommandRegistry,
    catch_all: CatchAllFn,
    sessions: Arc<SessionStore>,
    services: Arc<Services>,
    transport: Arc<dyn Transport>,
    containment: ErrorContainment,
    chat_locks: DashMap<ChatId, Arc<Mutex<()>>>,
    session_timeout: Option<Duration>,
}

impl Router {
    /// Builds the fixed priority table. Workflows are tried in the given order.
    pub fn new(
        workflows: Vec<WorkflowDefinition>,
        commands: CommandRegistry,
        catch_all: CatchAllFn,
        services: Arc<Services>,
        transport: Arc<dyn Transport>,
    ) -> AppResult<Self> {
        for (i, def) in workflows.iter().enumerate() {
            def.validate()?;
            if workflows[..i].iter().any(|other| other.kind == def.kind) {
                return Err(AppError::internal(format!("workflow {} defined twice", def.kind)));
            }
        }

        Ok(Self {
            workflows,
            commands,
            catch_all,
            sessions: Arc::new(SessionStore::new()),
            services,
            containment: ErrorContainment::new(Arc::clone(&transport)),
            transport,
            chat_locks: DashMap::new(),
            session_timeout: None,
        })
    }

    /// Drops sessions idle for longer than `timeout`, with a notice to the chat.
    pub fn with_session_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn workflow_kinds(&self) -> Vec<WorkflowKind> {
        self.workflows.iter().map(|w| w.kind).collect()
    }

    /// Routes one event. Events for the same chat are serialised here.
    pub async fn dispatch(&self, event: Event) -> Dispatched {
        let lock = self.chat_lock(event.chat);
        let outcome = {
            let _guard = lock.lock().await;
            AssertUnwindSafe(self.route(&event)).catch_unwind().await
        };
        drop(lock);
        self.chat_locks
            .remove_if(&event.chat, |_, lock| Arc::strong_count(lock) == 1);

        match outcome {
            Ok(Ok(dispatched)) => {
                log::debug!("update {} in chat {}: {:?}", event.update_id, event.chat, dispatched);
                dispatched
            }
            Ok(Err(AppError::Business(rejection))) => {
                log::info!(
                    "Rejected update {} in chat {}: {}",
                    event.update_id,
                    event.chat,
                    rejection
                );
                send_all(self.transport.as_ref(), event.chat, &[Reply::text(rejection.to_string())]).await;
                Dispatched::Failed {
                    kind: ErrorKind::Business,
                }
            }
            Ok(Err(err)) => {
                let record = ErrorRecord::from_error(&event, &err);
                self.containment.contain(&record).await;
                Dispatched::Failed { kind: record.kind }
            }
            Err(panic) => {
                let record = ErrorRecord::from_panic(&event, panic.as_ref());
                self.containment.contain(&record).await;
                Dispatched::Failed { kind: ErrorKind::Panic }
            }
        }
    }

    fn chat_lock(&self, chat: ChatId) -> Arc<Mutex<()>> {
        Arc::clone(self.chat_locks.entry(chat).or_default().value())
    }

    async fn route(&self, event: &Event) -> AppResult<Dispatched> {
        let chat = event.chat;

        for def in &self.workflows {
            let Some(session) = self.live_session(def.kind, chat).await else {
                continue;
            };

            if let Some(handler) = def.find_step(session.step, event) {
                return self.run_step(def, session, handler, event).await;
            }
            if let Some(handler) = def.find_fallback(event) {
                return self.run_fallback(def, session, handler, event).await;
            }
            if let Some(handler) = def.find_entry(event) {
                log::debug!("{} re-entered in chat {} at {}", def.kind, chat, session.step);
                return self.run_step(def, session, handler, event).await;
            }
        }

        for def in &self.workflows {
            if self.sessions.contains(def.kind, chat) {
                continue;
            }
            if let Some(handler) = def.find_entry(event) {
                let session = self.sessions.begin(def.kind, chat, def.initial);
                log::info!("{} started in chat {} by user {}", def.kind, chat, event.user);
                return self.run_entry(def, session, handler, event).await;
            }
        }

        match &event.payload {
            Payload::Command { name, .. } => {
                if let Some(handler) = self.commands.get(name) {
                    let replies = handler(self.handler_context(event)).await?;
                    send_all(self.transport.as_ref(), chat, &replies).await;
                    return Ok(Dispatched::Command { name: name.clone() });
                }
                Ok(Dispatched::Ignored)
            }
            Payload::Callback { action, .. } => {
                match (self.catch_all)(self.handler_context(event), action.clone()).await? {
                    CallbackResult::Replied(replies) => {
                        send_all(self.transport.as_ref(), chat, &replies).await;
                        Ok(Dispatched::Callback { handled: true })
                    }
                    CallbackResult::NoOp => {
                        log::debug!("No handler for button {:?} in chat {}", action, chat);
                        Ok(Dispatched::Callback { handled: false })
                    }
                }
            }
            Payload::Text { .. } => Ok(Dispatched::Ignored),
        }
    }

    /// The session for `(kind, chat)`, unless the optional timeout discards it.
    async fn live_session(&self, kind: WorkflowKind, chat: ChatId) -> Option<Session> {
        if let Some(timeout) = self.session_timeout {
            if let Some(expired) = self.sessions.expire(kind, chat, timeout) {
                log::info!(
                    "{} in chat {} expired at {} after {}s idle",
                    kind,
                    chat,
                    expired.step,
                    expired.idle_for().as_secs()
                );
                send_all(self.transport.as_ref(), chat, &[Reply::text(SESSION_EXPIRED_NOTICE)]).await;
                return None;
            }
        }
        self.sessions.get(kind, chat)
    }

    /// Runs a step and applies its transition. On error the store is left untouched.
    async fn run_step(
        &self,
        def: &WorkflowDefinition,
        session: Session,
        handler: &StepFn,
        event: &Event,
    ) -> AppResult<Dispatched> {
        let chat = event.chat;
        let ctx = StepContext {
            event: event.clone(),
            step: session.step,
            draft: session.draft,
            services: Arc::clone(&self.services),
        };
        let outcome = handler(ctx).await?;

        let now_at = match outcome.transition {
            Transition::Advance(step, draft) => {
                def.check_advance(step, &draft)?;
                if !self.sessions.advance(def.kind, chat, step, draft) {
                    return Err(AppError::internal(format!("{} session in chat {} vanished", def.kind, chat)));
                }
                log::debug!("{} in chat {}: {} -> {}", def.kind, chat, session.step, step);
                Some(step)
            }
            Transition::Stay => {
                self.sessions.touch(def.kind, chat);
                Some(session.step)
            }
            Transition::Finish => {
                self.sessions.end(def.kind, chat);
                log::info!("{} finished in chat {}", def.kind, chat);
                None
            }
        };

        send_all(self.transport.as_ref(), chat, &outcome.replies).await;
        Ok(Dispatched::Workflow {
            kind: def.kind,
            step: now_at,
        })
    }

    /// Runs the entry step of a session opened by this event. If the step fails
    /// or panics the new session is removed again before the error goes on.
    async fn run_entry(
        &self,
        def: &WorkflowDefinition,
        session: Session,
        handler: &StepFn,
        event: &Event,
    ) -> AppResult<Dispatched> {
        match AssertUnwindSafe(self.run_step(def, session, handler, event))
            .catch_unwind()
            .await
        {
            Ok(Ok(dispatched)) => Ok(dispatched),
            Ok(Err(err)) => {
                self.sessions.end(def.kind, event.chat);
                log::debug!("{} entry failed in chat {}, session dropped", def.kind, event.chat);
                Err(err)
            }
            Err(panic) => {
                self.sessions.end(def.kind, event.chat);
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Tears the session down first; whatever the fallback returns, nothing is kept.
    async fn run_fallback(
        &self,
        def: &WorkflowDefinition,
        session: Session,
        handler: &StepFn,
        event: &Event,
    ) -> AppResult<Dispatched> {
        self.sessions.end(def.kind, event.chat);
        log::info!(
            "{} cancelled in chat {} at {} ({} draft keys discarded)",
            def.kind,
            event.chat,
            session.step,
            session.draft.len()
        );

        let ctx = StepContext {
            event: event.clone(),
            step: session.step,
            draft: session.draft,
            services: Arc::clone(&self.services),
        };
        let outcome = handler(ctx).await?;
        send_all(self.transport.as_ref(), event.chat, &outcome.replies).await;

        Ok(Dispatched::Workflow {
            kind: def.kind,
            step: None,
        })
    }

    fn handler_context(&self, event: &Event) -> HandlerContext {
        HandlerContext {
            event: event.clone(),
            services: Arc::clone(&self.services),
        }
    }
}
