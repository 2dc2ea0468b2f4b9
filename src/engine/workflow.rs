//! Workflow definitions: states, matchers, step functions
//!
//! A [`WorkflowDefinition`] is built once at start-up and never mutated. The
//! router consults it to decide which step function an event goes to; the
//! step function decides the transition through [`StepOutcome`].

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use strum::{AsRefStr, Display, EnumIter};

use crate::core::error::{AppError, AppResult};
use crate::engine::event::{CallbackAction, ChatId, Event, Payload, UserId};
use crate::engine::reply::Reply;
use crate::engine::session::{Draft, DraftKey};
use crate::services::Services;

/// The six workflows the bot runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowKind {
    Registration,
    SelfRegistration,
    StaffOnboarding,
    AddPoints,
    SpendPoints,
    Purchase,
}

/// Conversation states. Each workflow declares the subset it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Step {
    Name,
    Phone,
    BirthDate,
    SelectClient,
    Amount,
    PurchaseAmount,
    PointsToRedeem,
    Role,
    Confirm,
}

/// Decides whether an event is meant for a handler
#[derive(Clone, Copy)]
pub enum Matcher {
    /// `/name`
    Command(&'static str),
    /// Free text, commands excluded
    Text,
    /// Button press accepted by the predicate
    Action(fn(&CallbackAction) -> bool),
}

impl Matcher {
    pub fn matches(&self, event: &Event) -> bool {
        match (self, &event.payload) {
            (Matcher::Command(expected), Payload::Command { name, .. }) => name == expected,
            (Matcher::Text, Payload::Text { .. }) => true,
            (Matcher::Action(accepts), Payload::Callback { action, .. }) => accepts(action),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::Command(name) => write!(f, "Command(/{})", name),
            Matcher::Text => write!(f, "Text"),
            Matcher::Action(_) => write!(f, "Action(..)"),
        }
    }
}

/// What a step function receives. Owns everything so the future is `'static`.
#[derive(Clone)]
pub struct StepContext {
    pub event: Event,
    pub step: Step,
    pub draft: Draft,
    pub services: Arc<Services>,
}

impl StepContext {
    pub fn chat(&self) -> ChatId {
        self.event.chat
    }

    pub fn user(&self) -> UserId {
        self.event.user
    }

    /// Trimmed message text, if the event is a text message
    pub fn text(&self) -> Option<&str> {
        self.event.text_content().map(str::trim)
    }

    pub fn action(&self) -> Option<&CallbackAction> {
        self.event.action()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move to a declared step with the new draft
    Advance(Step, Draft),
    /// Keep step and draft as they are (re-prompt)
    Stay,
    /// Tear the session down
    Finish,
}

/// Result of a step function: a transition plus replies to send after it is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub transition: Transition,
    pub replies: Vec<Reply>,
}

impl StepOutcome {
    pub fn advance(step: Step, draft: Draft) -> Self {
        Self {
            transition: Transition::Advance(step, draft),
            replies: Vec::new(),
        }
    }

    pub fn stay() -> Self {
        Self {
            transition: Transition::Stay,
            replies: Vec::new(),
        }
    }

    pub fn finish() -> Self {
        Self {
            transition: Transition::Finish,
            replies: Vec::new(),
        }
    }

    pub fn reply(mut self, reply: impl Into<Reply>) -> Self {
        self.replies.push(reply.into());
        self
    }
}

pub type StepFn = Arc<dyn Fn(StepContext) -> BoxFuture<'static, AppResult<StepOutcome>> + Send + Sync>;

/// Wraps an `async fn(StepContext) -> AppResult<StepOutcome>` as a [`StepFn`].
pub fn step_fn<F, Fut>(f: F) -> StepFn
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<StepOutcome>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// A declared state: its required draft keys and the handlers it accepts
pub struct StateSpec {
    pub step: Step,
    pub requires: &'static [DraftKey],
    pub handlers: Vec<(Matcher, StepFn)>,
}

/// Static descriptor of one workflow
pub struct WorkflowDefinition {
    pub kind: WorkflowKind,
    pub initial: Step,
    pub entry_points: Vec<(Matcher, StepFn)>,
    pub states: Vec<StateSpec>,
    pub fallbacks: Vec<(Matcher, StepFn)>,
}

impl WorkflowDefinition {
    pub fn new(kind: WorkflowKind, initial: Step) -> Self {
        Self {
            kind,
            initial,
            entry_points: Vec::new(),
            states: Vec::new(),
            fallbacks: Vec::new(),
        }
    }

    pub fn entry(mut self, matcher: Matcher, handler: StepFn) -> Self {
        self.entry_points.push((matcher, handler));
        self
    }

    pub fn state(mut self, step: Step, requires: &'static [DraftKey], handlers: Vec<(Matcher, StepFn)>) -> Self {
        self.states.push(StateSpec {
            step,
            requires,
            handlers,
        });
        self
    }

    pub fn fallback(mut self, matcher: Matcher, handler: StepFn) -> Self {
        self.fallbacks.push((matcher, handler));
        self
    }

    pub fn declares(&self, step: Step) -> bool {
        self.states.iter().any(|s| s.step == step)
    }

    pub fn state_spec(&self, step: Step) -> Option<&StateSpec> {
        self.states.iter().find(|s| s.step == step)
    }

    pub fn find_entry(&self, event: &Event) -> Option<&StepFn> {
        first_match(&self.entry_points, event)
    }

    pub fn find_step(&self, step: Step, event: &Event) -> Option<&StepFn> {
        self.state_spec(step).and_then(|spec| first_match(&spec.handlers, event))
    }

    pub fn find_fallback(&self, event: &Event) -> Option<&StepFn> {
        first_match(&self.fallbacks, event)
    }

    /// Structural checks run once when the router is built.
    pub fn validate(&self) -> AppResult<()> {
        let initial = self.state_spec(self.initial).ok_or_else(|| {
            AppError::internal(format!("{}: initial step {} is not declared", self.kind, self.initial))
        })?;
        if !initial.requires.is_empty() {
            return Err(AppError::internal(format!(
                "{}: initial step {} cannot require draft keys",
                self.kind, self.initial
            )));
        }
        if self.entry_points.is_empty() {
            return Err(AppError::internal(format!("{}: no entry points", self.kind)));
        }
        Ok(())
    }

    /// Refuses an advance to an undeclared step or with required keys missing.
    pub fn check_advance(&self, step: Step, draft: &Draft) -> AppResult<()> {
        let spec = self
            .state_spec(step)
            .ok_or_else(|| AppError::internal(format!("{}: step {} is not declared", self.kind, step)))?;

        let missing: Vec<String> = spec
            .requires
            .iter()
            .filter(|key| !draft.contains(**key))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::internal(format!(
                "{}: step {} requires {}",
                self.kind,
                step,
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

fn first_match<'a>(handlers: &'a [(Matcher, StepFn)], event: &Event) -> Option<&'a StepFn> {
    handlers.iter().find(|(m, _)| m.matches(event)).map(|(_, f)| f)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_ctx: StepContext) -> AppResult<StepOutcome> {
        Ok(StepOutcome::stay())
    }

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new(WorkflowKind::AddPoints, Step::SelectClient)
            .entry(Matcher::Command("add_points"), step_fn(noop))
            .state(Step::SelectClient, &[], vec![(Matcher::Text, step_fn(noop))])
            .state(Step::Amount, &[DraftKey::ClientId], vec![(Matcher::Text, step_fn(noop))])
            .fallback(Matcher::Command("cancel"), step_fn(noop))
    }

    #[test]
    fn test_matchers() {
        let chat = ChatId(1);
        let user = UserId(1);
        assert!(Matcher::Command("cancel").matches(&Event::command(chat, user, "cancel", "")));
        assert!(!Matcher::Command("cancel").matches(&Event::text(chat, user, "cancel")));
        assert!(Matcher::Text.matches(&Event::text(chat, user, "50")));
        assert!(!Matcher::Text.matches(&Event::command(chat, user, "start", "")));

        let is_cancel = Matcher::Action(|a| matches!(a, CallbackAction::Cancel));
        assert!(is_cancel.matches(&Event::callback(chat, user, CallbackAction::Cancel)));
        assert!(!is_cancel.matches(&Event::callback(chat, user, CallbackAction::Confirm)));
    }

    #[test]
    fn test_check_advance_enforces_declared_steps_and_keys() {
        let def = definition();
        assert!(def.validate().is_ok());

        assert!(def.check_advance(Step::Amount, &Draft::new()).is_err());
        assert!(def
            .check_advance(Step::Amount, &Draft::new().with_number(DraftKey::ClientId, 1))
            .is_ok());
        assert!(def.check_advance(Step::Role, &Draft::new()).is_err());
    }

    #[test]
    fn test_validate_rejects_undeclared_initial_step() {
        let def = WorkflowDefinition::new(WorkflowKind::Purchase, Step::SelectClient)
            .entry(Matcher::Command("purchase"), step_fn(noop));
        assert!(def.validate().is_err());
    }
}
