//! Conversation sessions and the keyed session store
//!
//! A session is the live progress of one workflow in one chat. The store is
//! the only place sessions live; callers always get clones, never references,
//! so nothing is held across an `.await`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use strum::{AsRefStr, Display};
use tokio::time::Instant;

use crate::core::error::{AppError, AppResult};
use crate::engine::event::{ChatId, StaffRole};
use crate::engine::workflow::{Step, WorkflowKind};

/// Keys of the per-session scratch space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DraftKey {
    FullName,
    Phone,
    BirthDate,
    ClientId,
    ClientName,
    Amount,
    PurchaseAmount,
    PointsToRedeem,
    Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftValue {
    Text(String),
    Number(i64),
    Date(NaiveDate),
    Role(StaffRole),
}

/// Accumulated multi-step input. Discarded as a whole on cancel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    values: BTreeMap<DraftKey, DraftValue>,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: DraftKey, value: DraftValue) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn with_text(self, key: DraftKey, value: impl Into<String>) -> Self {
        self.with(key, DraftValue::Text(value.into()))
    }

    pub fn with_number(self, key: DraftKey, value: i64) -> Self {
        self.with(key, DraftValue::Number(value))
    }

    pub fn with_date(self, key: DraftKey, value: NaiveDate) -> Self {
        self.with(key, DraftValue::Date(value))
    }

    pub fn with_role(self, key: DraftKey, value: StaffRole) -> Self {
        self.with(key, DraftValue::Role(value))
    }

    pub fn contains(&self, key: DraftKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn get(&self, key: DraftKey) -> Option<&DraftValue> {
        self.values.get(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = DraftKey> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn text(&self, key: DraftKey) -> AppResult<&str> {
        match self.values.get(&key) {
            Some(DraftValue::Text(value)) => Ok(value),
            other => Err(missing(key, other)),
        }
    }

    pub fn number(&self, key: DraftKey) -> AppResult<i64> {
        match self.values.get(&key) {
            Some(DraftValue::Number(value)) => Ok(*value),
            other => Err(missing(key, other)),
        }
    }

    pub fn date(&self, key: DraftKey) -> AppResult<NaiveDate> {
        match self.values.get(&key) {
            Some(DraftValue::Date(value)) => Ok(*value),
            other => Err(missing(key, other)),
        }
    }

    pub fn role(&self, key: DraftKey) -> AppResult<StaffRole> {
        match self.values.get(&key) {
            Some(DraftValue::Role(value)) => Ok(*value),
            other => Err(missing(key, other)),
        }
    }
}

fn missing(key: DraftKey, found: Option<&DraftValue>) -> AppError {
    match found {
        None => AppError::internal(format!("draft key `{}` is missing", key)),
        Some(value) => AppError::internal(format!("draft key `{}` holds {:?}", key, value)),
    }
}

/// Live progress of one workflow in one chat
#[derive(Debug, Clone)]
pub struct Session {
    pub kind: WorkflowKind,
    pub chat: ChatId,
    pub step: Step,
    pub draft: Draft,
    pub started_at: Instant,
    pub last_activity: Instant,
}

impl Session {
    fn new(kind: WorkflowKind, chat: ChatId, step: Step) -> Self {
        let now = Instant::now();
        Self {
            kind,
            chat,
            step,
            draft: Draft::new(),
            started_at: now,
            last_activity: now,
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Sessions keyed by `(workflow, chat)`. At most one per key.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<(WorkflowKind, ChatId), Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: WorkflowKind, chat: ChatId) -> Option<Session> {
        self.sessions.get(&(kind, chat)).map(|s| s.clone())
    }

    pub fn contains(&self, kind: WorkflowKind, chat: ChatId) -> bool {
        self.sessions.contains_key(&(kind, chat))
    }

    /// Opens a session in `initial`. An existing session for the key is kept and returned.
    pub fn begin(&self, kind: WorkflowKind, chat: ChatId, initial: Step) -> Session {
        self.sessions
            .entry((kind, chat))
            .or_insert_with(|| Session::new(kind, chat, initial))
            .clone()
    }

    /// Moves an existing session to `step` with `draft`. Returns false if the session is gone.
    pub fn advance(&self, kind: WorkflowKind, chat: ChatId, step: Step, draft: Draft) -> bool {
        match self.sessions.get_mut(&(kind, chat)) {
            Some(mut session) => {
                session.step = step;
                session.draft = draft;
                session.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn touch(&self, kind: WorkflowKind, chat: ChatId) {
        if let Some(mut session) = self.sessions.get_mut(&(kind, chat)) {
            session.last_activity = Instant::now();
        }
    }

    pub fn end(&self, kind: WorkflowKind, chat: ChatId) -> Option<Session> {
        self.sessions.remove(&(kind, chat)).map(|(_, session)| session)
    }

    /// Removes the session if it has been idle longer than `timeout`.
    pub fn expire(&self, kind: WorkflowKind, chat: ChatId, timeout: Duration) -> Option<Session> {
        self.sessions
            .remove_if(&(kind, chat), |_, session| session.idle_for() > timeout)
            .map(|(_, session)| session)
    }

    /// Workflows with an active session in `chat`
    pub fn active_in(&self, chat: ChatId) -> Vec<WorkflowKind> {
        self.sessions
            .iter()
            .filter(|entry| entry.key().1 == chat)
            .map(|entry| entry.key().0)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
