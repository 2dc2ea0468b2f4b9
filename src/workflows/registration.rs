//! Client registration, by staff or by the client themselves
//!
//! `Name → Phone → BirthDate → Confirm`. Both variants share the steps; they
//! differ in who may start them, which buttons confirm, and whether the new
//! client is linked to the caller's Telegram account.

use crate::core::error::{AppResult, BusinessError};
use crate::core::validation::{parse_birth_date, validate_full_name, validate_phone};
use crate::engine::event::CallbackAction;
use crate::engine::reply::Reply;
use crate::engine::session::{Draft, DraftKey};
use crate::engine::workflow::{step_fn, Matcher, Step, StepContext, StepOutcome, WorkflowDefinition, WorkflowKind};
use crate::services::NewClient;
use crate::workflows::{access_denied, confirm_prompt, finished_cancelled, prompt, with_cancel_fallbacks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// A staff member registers a client at the counter
    Staff,
    /// A client registers from their own chat
    SelfService,
}

impl Mode {
    fn confirm_action(&self) -> CallbackAction {
        match self {
            Mode::Staff => CallbackAction::ConfirmRegistration,
            Mode::SelfService => CallbackAction::ConfirmSelfRegistration,
        }
    }

    fn cancel_action(&self) -> CallbackAction {
        match self {
            Mode::Staff => CallbackAction::CancelRegistration,
            Mode::SelfService => CallbackAction::CancelSelfRegistration,
        }
    }
}

const NAME_REQUIRES: &[DraftKey] = &[];
const PHONE_REQUIRES: &[DraftKey] = &[DraftKey::FullName];
const BIRTH_DATE_REQUIRES: &[DraftKey] = &[DraftKey::FullName, DraftKey::Phone];
const CONFIRM_REQUIRES: &[DraftKey] = &[DraftKey::FullName, DraftKey::Phone, DraftKey::BirthDate];

pub fn staff_definition() -> WorkflowDefinition {
    definition(WorkflowKind::Registration, Mode::Staff)
        .entry(
            Matcher::Action(|a| matches!(a, CallbackAction::RegisterClient)),
            step_fn(|ctx| start(ctx, Mode::Staff)),
        )
        .state(
            Step::Confirm,
            CONFIRM_REQUIRES,
            vec![
                (
                    Matcher::Action(|a| matches!(a, CallbackAction::ConfirmRegistration)),
                    step_fn(|ctx| confirm(ctx, Mode::Staff)),
                ),
                (
                    Matcher::Action(|a| matches!(a, CallbackAction::CancelRegistration)),
                    step_fn(decline),
                ),
                (Matcher::Text, step_fn(confirm_by_text_hint)),
            ],
        )
}

pub fn self_definition() -> WorkflowDefinition {
    definition(WorkflowKind::SelfRegistration, Mode::SelfService)
        .entry(
            Matcher::Action(|a| matches!(a, CallbackAction::RegisterSelf)),
            step_fn(|ctx| start(ctx, Mode::SelfService)),
        )
        .state(
            Step::Confirm,
            CONFIRM_REQUIRES,
            vec![
                (
                    Matcher::Action(|a| matches!(a, CallbackAction::ConfirmSelfRegistration)),
                    step_fn(|ctx| confirm(ctx, Mode::SelfService)),
                ),
                (
                    Matcher::Action(|a| matches!(a, CallbackAction::CancelSelfRegistration)),
                    step_fn(decline),
                ),
                (Matcher::Text, step_fn(confirm_by_text_hint)),
            ],
        )
}

fn definition(kind: WorkflowKind, mode: Mode) -> WorkflowDefinition {
    let def = WorkflowDefinition::new(kind, Step::Name)
        .state(Step::Name, NAME_REQUIRES, vec![(Matcher::Text, step_fn(enter_name))])
        .state(Step::Phone, PHONE_REQUIRES, vec![(Matcher::Text, step_fn(enter_phone))])
        .state(
            Step::BirthDate,
            BIRTH_DATE_REQUIRES,
            vec![(Matcher::Text, step_fn(move |ctx| enter_birth_date(ctx, mode)))],
        );
    with_cancel_fallbacks(def)
}

/// Entry step. Pressing the entry button again mid-way starts over with an empty draft.
async fn start(ctx: StepContext, mode: Mode) -> AppResult<StepOutcome> {
    match mode {
        Mode::Staff => {
            if ctx.services.role_of(ctx.user()).await?.is_none() {
                return Ok(access_denied());
            }
            Ok(StepOutcome::advance(Step::Name, Draft::new()).reply(prompt("👤 Регистрация нового клиента\n\nВведите ФИО клиента (например: Иван Петров):")))
        }
        Mode::SelfService => {
            if let Some(client) = ctx.services.clients.find_by_telegram(ctx.user().0).await? {
                return Ok(StepOutcome::finish().reply(format!(
                    "ℹ️ Вы уже зарегистрированы.\n\n💳 Карта: {}\n💰 Баланс: {} баллов",
                    client.card_number, client.balance
                )));
            }
            Ok(StepOutcome::advance(Step::Name, Draft::new()).reply(prompt("👋 Регистрация в программе лояльности\n\nКак вас зовут? Введите имя и фамилию:")))
        }
    }
}

async fn enter_name(ctx: StepContext) -> AppResult<StepOutcome> {
    let raw = ctx.text().unwrap_or_default();
    match validate_full_name(raw) {
        Ok(name) => {
            let draft = ctx.draft.with_text(DraftKey::FullName, name);
            Ok(StepOutcome::advance(Step::Phone, draft).reply(prompt("📱 Введите номер телефона (например: +7 999 123-45-67):")))
        }
        Err(_) => Ok(StepOutcome::stay().reply(prompt(
            "⚠️ Введите имя и фамилию буквами, минимум два слова.",
        ))),
    }
}

async fn enter_phone(ctx: StepContext) -> AppResult<StepOutcome> {
    let raw = ctx.text().unwrap_or_default();
    let phone = match validate_phone(raw) {
        Ok(phone) => phone,
        Err(_) => {
            return Ok(StepOutcome::stay().reply(prompt(
                "⚠️ Неверный формат телефона. Введите номер в формате +7XXXXXXXXXX:",
            )))
        }
    };
    if ctx.services.clients.find_by_phone(&phone).await?.is_some() {
        return Err(BusinessError::DuplicatePhone(phone).into());
    }

    let draft = ctx.draft.with_text(DraftKey::Phone, phone);
    Ok(StepOutcome::advance(Step::BirthDate, draft).reply(prompt("🎂 Введите дату рождения в формате ДД.ММ.ГГГГ:")))
}

async fn enter_birth_date(ctx: StepContext, mode: Mode) -> AppResult<StepOutcome> {
    let raw = ctx.text().unwrap_or_default();
    let today = ctx.services.settings.today();
    let birth_date = match parse_birth_date(raw, today) {
        Ok(date) => date,
        Err(_) => {
            return Ok(StepOutcome::stay().reply(prompt(
                "⚠️ Не удалось распознать дату. Введите дату рождения в формате ДД.ММ.ГГГГ (например: 15.03.1990):",
            )))
        }
    };

    let draft = ctx.draft.with_date(DraftKey::BirthDate, birth_date);
    let summary = format!(
        "📋 Проверьте данные:\n\n👤 {}\n📱 {}\n🎂 {}\n\nВсё верно?",
        draft.text(DraftKey::FullName)?,
        draft.text(DraftKey::Phone)?,
        birth_date.format("%d.%m.%Y")
    );
    Ok(StepOutcome::advance(Step::Confirm, draft).reply(confirm_prompt(
        summary,
        mode.confirm_action(),
        mode.cancel_action(),
    )))
}

async fn confirm(ctx: StepContext, mode: Mode) -> AppResult<StepOutcome> {
    let services = &ctx.services;
    let telegram_id = match mode {
        Mode::Staff => None,
        Mode::SelfService => Some(ctx.user().0),
    };
    let new_client = NewClient {
        full_name: ctx.draft.text(DraftKey::FullName)?.to_string(),
        phone: ctx.draft.text(DraftKey::Phone)?.to_string(),
        birth_date: Some(ctx.draft.date(DraftKey::BirthDate)?),
        telegram_id,
        welcome_bonus: services.settings.registration_bonus.max(0),
    };

    let bonus = new_client.welcome_bonus;
    let client = services.clients.register(new_client, services.settings.today()).await?;

    let source = match mode {
        Mode::Staff => format!("сотрудником {}", ctx.user()),
        Mode::SelfService => "самостоятельно".to_string(),
    };
    services.notifications.push(format!(
        "🆕 Новый клиент: {} ({}), карта {}, зарегистрирован {}",
        client.full_name, client.phone, client.card_number, source
    ));
    log::info!("Client {} registered ({:?})", client.card_number, mode);

    let mut text = format!(
        "✅ Регистрация завершена!\n\n👤 {}\n💳 Карта: {}\n💰 Баланс: {} баллов",
        client.full_name, client.card_number, client.balance
    );
    if bonus > 0 {
        text.push_str(&format!("\n\n🎁 Начислен приветственный бонус: {} баллов", bonus));
    }
    Ok(StepOutcome::finish().reply(Reply::text(text).with_button("🏠 В начало", CallbackAction::BackToStart)))
}

async fn decline(_ctx: StepContext) -> AppResult<StepOutcome> {
    Ok(finished_cancelled())
}

async fn confirm_by_text_hint(_ctx: StepContext) -> AppResult<StepOutcome> {
    Ok(crate::workflows::confirm_hint())
}
