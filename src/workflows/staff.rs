//! Staff onboarding, admin only
//!
//! `Name → Phone → Role → Confirm`. The role comes from buttons only; typed
//! text on that step is answered with the keyboard again.

use strum::IntoEnumIterator;

use crate::core::error::AppResult;
use crate::core::validation::{parse_confirmation, validate_full_name, validate_phone};
use crate::engine::event::{CallbackAction, StaffRole};
use crate::engine::reply::{Button, Reply};
use crate::engine::session::{Draft, DraftKey};
use crate::engine::workflow::{step_fn, Matcher, Step, StepContext, StepOutcome, WorkflowDefinition, WorkflowKind};
use crate::services::StaffMember;
use crate::workflows::{
    access_denied, cancel_row, confirm_hint, confirm_prompt, finished_cancelled, prompt, with_cancel_fallbacks,
};

const PHONE_REQUIRES: &[DraftKey] = &[DraftKey::FullName];
const ROLE_REQUIRES: &[DraftKey] = &[DraftKey::FullName, DraftKey::Phone];
const CONFIRM_REQUIRES: &[DraftKey] = &[DraftKey::FullName, DraftKey::Phone, DraftKey::Role];

pub fn definition() -> WorkflowDefinition {
    let def = WorkflowDefinition::new(WorkflowKind::StaffOnboarding, Step::Name)
        .entry(Matcher::Action(|a| matches!(a, CallbackAction::AddStaff)), step_fn(start))
        .state(Step::Name, &[], vec![(Matcher::Text, step_fn(enter_name))])
        .state(Step::Phone, PHONE_REQUIRES, vec![(Matcher::Text, step_fn(enter_phone))])
        .state(
            Step::Role,
            ROLE_REQUIRES,
            vec![
                (Matcher::Action(|a| matches!(a, CallbackAction::Role(_))), step_fn(choose_role)),
                (Matcher::Text, step_fn(role_hint)),
            ],
        )
        .state(
            Step::Confirm,
            CONFIRM_REQUIRES,
            vec![
                (Matcher::Action(|a| matches!(a, CallbackAction::Confirm)), step_fn(commit)),
                (Matcher::Text, step_fn(confirm_by_text)),
            ],
        );
    with_cancel_fallbacks(def)
}

fn role_keyboard(text: impl Into<String>) -> Reply {
    let roles = StaffRole::iter()
        .map(|role| Button::new(role.label(), CallbackAction::Role(role)))
        .collect();
    Reply::text(text).with_row(roles).with_row(cancel_row())
}

async fn start(ctx: StepContext) -> AppResult<StepOutcome> {
    if ctx.services.role_of(ctx.user()).await? != Some(StaffRole::Admin) {
        return Ok(access_denied());
    }
    Ok(StepOutcome::advance(Step::Name, Draft::new())
        .reply(prompt("👥 Новый сотрудник\n\nВведите ФИО сотрудника:")))
}

async fn enter_name(ctx: StepContext) -> AppResult<StepOutcome> {
    match validate_full_name(ctx.text().unwrap_or_default()) {
        Ok(name) => {
            let draft = ctx.draft.with_text(DraftKey::FullName, name);
            Ok(StepOutcome::advance(Step::Phone, draft).reply(prompt("📱 Введите телефон сотрудника:")))
        }
        Err(_) => Ok(StepOutcome::stay().reply(prompt("⚠️ Введите имя и фамилию буквами, минимум два слова."))),
    }
}

async fn enter_phone(ctx: StepContext) -> AppResult<StepOutcome> {
    match validate_phone(ctx.text().unwrap_or_default()) {
        Ok(phone) => {
            let draft = ctx.draft.with_text(DraftKey::Phone, phone);
            Ok(StepOutcome::advance(Step::Role, draft).reply(role_keyboard("🎭 Выберите роль сотрудника:")))
        }
        Err(_) => Ok(StepOutcome::stay().reply(prompt(
            "⚠️ Неверный формат телефона. Введите номер в формате +7XXXXXXXXXX:",
        ))),
    }
}

async fn choose_role(ctx: StepContext) -> AppResult<StepOutcome> {
    let Some(CallbackAction::Role(role)) = ctx.action().cloned() else {
        return role_hint(ctx).await;
    };

    let summary = format!(
        "📋 Новый сотрудник:\n\n👤 {}\n📱 {}\n🎭 {}\n\nДобавить?",
        ctx.draft.text(DraftKey::FullName)?,
        ctx.draft.text(DraftKey::Phone)?,
        role.label()
    );
    let draft = ctx.draft.with_role(DraftKey::Role, role);
    Ok(StepOutcome::advance(Step::Confirm, draft).reply(confirm_prompt(
        summary,
        CallbackAction::Confirm,
        CallbackAction::Cancel,
    )))
}

async fn role_hint(_ctx: StepContext) -> AppResult<StepOutcome> {
    Ok(StepOutcome::stay().reply(role_keyboard("👆 Роль выбирается только кнопкой:")))
}

async fn confirm_by_text(ctx: StepContext) -> AppResult<StepOutcome> {
    let answer = ctx.text().and_then(parse_confirmation);
    match answer {
        Some(true) => commit(ctx).await,
        Some(false) => Ok(finished_cancelled()),
        None => Ok(confirm_hint()),
    }
}

async fn commit(ctx: StepContext) -> AppResult<StepOutcome> {
    let member = StaffMember {
        telegram_id: None,
        full_name: ctx.draft.text(DraftKey::FullName)?.to_string(),
        phone: ctx.draft.text(DraftKey::Phone)?.to_string(),
        role: ctx.draft.role(DraftKey::Role)?,
    };
    ctx.services.staff.add_staff(member.clone()).await?;

    ctx.services.notifications.push(format!(
        "👥 Добавлен сотрудник: {} ({}), роль: {}",
        member.full_name,
        member.phone,
        member.role.label()
    ));
    log::info!("Staff member {} added as {}", member.phone, member.role);

    Ok(StepOutcome::finish().reply(
        Reply::text(format!(
            "✅ Сотрудник {} добавлен.\n\nЧтобы войти, сотрудник отправляет боту:\n/staff {}",
            member.full_name, member.phone
        ))
        .with_button("🏠 В начало", CallbackAction::BackToStart),
    ))
}
