//! The six conversation workflows and what they share
//!
//! [`definitions`] returns them in router priority order. Every workflow has
//! the same fallbacks: `/cancel` and the cancel button.

pub mod points;
pub mod purchase;
pub mod registration;
pub mod staff;

use crate::core::error::{AppResult, BusinessError};
use crate::engine::event::CallbackAction;
use crate::engine::reply::{Button, Reply};
use crate::engine::workflow::{step_fn, Matcher, StepContext, StepOutcome, WorkflowDefinition};

pub const CANCELLED: &str = "❌ Операция отменена. Введённые данные не сохранены.";

/// All workflows, in the order the router tries them
pub fn definitions() -> Vec<WorkflowDefinition> {
    vec![
        registration::staff_definition(),
        registration::self_definition(),
        staff::definition(),
        points::add_definition(),
        points::spend_definition(),
        purchase::definition(),
    ]
}

pub(crate) fn with_cancel_fallbacks(def: WorkflowDefinition) -> WorkflowDefinition {
    def.fallback(Matcher::Command("cancel"), step_fn(cancelled))
        .fallback(Matcher::Action(|a| matches!(a, CallbackAction::Cancel)), step_fn(cancelled))
}

/// Neutral acknowledgement once the session is already gone
async fn cancelled(_ctx: StepContext) -> AppResult<StepOutcome> {
    Ok(StepOutcome::finish().reply(
        Reply::text(CANCELLED).with_button("🏠 В начало", CallbackAction::BackToStart),
    ))
}

pub(crate) fn cancel_row() -> Vec<Button> {
    vec![Button::new("❌ Отмена", CallbackAction::Cancel)]
}

pub(crate) fn prompt(text: impl Into<String>) -> Reply {
    Reply::text(text).with_row(cancel_row())
}

pub(crate) fn confirm_prompt(text: impl Into<String>, confirm: CallbackAction, cancel: CallbackAction) -> Reply {
    Reply::text(text).with_row(vec![
        Button::new("✅ Подтвердить", confirm),
        Button::new("❌ Отменить", cancel),
    ])
}

/// Entry steps of staff-only workflows end here for everyone else
pub(crate) fn access_denied() -> StepOutcome {
    StepOutcome::finish().reply(BusinessError::AccessDenied.to_string())
}

/// Re-prompt for a confirm step that got neither a button nor yes/no
pub(crate) fn confirm_hint() -> StepOutcome {
    StepOutcome::stay().reply("👆 Подтвердите операцию кнопкой выше или ответьте «да» / «нет».")
}

pub(crate) fn finished_cancelled() -> StepOutcome {
    StepOutcome::finish().reply(CANCELLED)
}
