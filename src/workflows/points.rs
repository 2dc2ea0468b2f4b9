//! Manual point issuance and spending
//!
//! `SelectClient → Amount → Confirm`. A client button (`add_points_<id>`)
//! preselects the client and lands directly on `Amount`.

use crate::core::error::{AppResult, BusinessError};
use crate::core::validation::{parse_amount, parse_confirmation};
use crate::engine::event::CallbackAction;
use crate::engine::reply::Reply;
use crate::engine::session::{Draft, DraftKey};
use crate::engine::workflow::{step_fn, Matcher, Step, StepContext, StepOutcome, WorkflowDefinition, WorkflowKind};
use crate::services::{Client, TransactionKind};
use crate::workflows::{
    access_denied, confirm_hint, confirm_prompt, finished_cancelled, prompt, with_cancel_fallbacks,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Add,
    Spend,
}

impl Operation {
    fn kind(&self) -> WorkflowKind {
        match self {
            Operation::Add => WorkflowKind::AddPoints,
            Operation::Spend => WorkflowKind::SpendPoints,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Operation::Add => "➕ Начисление баллов",
            Operation::Spend => "➖ Списание баллов",
        }
    }
}

const AMOUNT_REQUIRES: &[DraftKey] = &[DraftKey::ClientId, DraftKey::ClientName];
const CONFIRM_REQUIRES: &[DraftKey] = &[DraftKey::ClientId, DraftKey::ClientName, DraftKey::Amount];

pub fn add_definition() -> WorkflowDefinition {
    definition(Operation::Add)
        .entry(Matcher::Command("add_points"), step_fn(|ctx| start(ctx, Operation::Add)))
        .entry(
            Matcher::Action(|a| matches!(a, CallbackAction::AddPointsFor(_))),
            step_fn(|ctx| start(ctx, Operation::Add)),
        )
}

pub fn spend_definition() -> WorkflowDefinition {
    definition(Operation::Spend)
        .entry(Matcher::Command("spend_points"), step_fn(|ctx| start(ctx, Operation::Spend)))
        .entry(
            Matcher::Action(|a| matches!(a, CallbackAction::SpendPointsFor(_))),
            step_fn(|ctx| start(ctx, Operation::Spend)),
        )
}

fn definition(op: Operation) -> WorkflowDefinition {
    let def = WorkflowDefinition::new(op.kind(), Step::SelectClient)
        .state(
            Step::SelectClient,
            &[],
            vec![(Matcher::Text, step_fn(move |ctx| select_client(ctx, op)))],
        )
        .state(
            Step::Amount,
            AMOUNT_REQUIRES,
            vec![(Matcher::Text, step_fn(move |ctx| enter_amount(ctx, op)))],
        )
        .state(
            Step::Confirm,
            CONFIRM_REQUIRES,
            vec![
                (
                    Matcher::Action(|a| matches!(a, CallbackAction::Confirm)),
                    step_fn(move |ctx| commit(ctx, op)),
                ),
                (Matcher::Text, step_fn(move |ctx| confirm_by_text(ctx, op))),
            ],
        );
    with_cancel_fallbacks(def)
}

/// Entry step. The command asks for a client; a client button skips that.
async fn start(ctx: StepContext, op: Operation) -> AppResult<StepOutcome> {
    if ctx.services.role_of(ctx.user()).await?.is_none() {
        return Ok(access_denied());
    }

    let preselected = match ctx.action() {
        Some(CallbackAction::AddPointsFor(id)) | Some(CallbackAction::SpendPointsFor(id)) => Some(*id),
        _ => None,
    };
    match preselected {
        Some(id) => {
            let client = ctx
                .services
                .clients
                .find_by_id(id)
                .await?
                .ok_or_else(|| BusinessError::ClientNotFound(crate::services::card_number(id)))?;
            Ok(client_selected(client, op))
        }
        None => Ok(StepOutcome::advance(Step::SelectClient, Draft::new()).reply(prompt(format!(
            "{}\n\n🔍 Введите телефон или номер карты клиента:",
            op.title()
        )))),
    }
}

fn client_selected(client: Client, op: Operation) -> StepOutcome {
    let draft = Draft::new()
        .with_number(DraftKey::ClientId, client.id)
        .with_text(DraftKey::ClientName, client.full_name.clone());
    let question = match op {
        Operation::Add => "Сколько баллов начислить?",
        Operation::Spend => "Сколько баллов списать?",
    };
    StepOutcome::advance(Step::Amount, draft).reply(prompt(format!(
        "👤 {} ({})\n💰 Баланс: {} баллов\n\n{}",
        client.full_name, client.card_number, client.balance, question
    )))
}

async fn select_client(ctx: StepContext, op: Operation) -> AppResult<StepOutcome> {
    let query = ctx.text().unwrap_or_default();
    match ctx.services.resolve_client(query).await? {
        Some(client) => Ok(client_selected(client, op)),
        None => Ok(StepOutcome::stay().reply(prompt(format!(
            "🔍 Клиент «{}» не найден. Проверьте телефон или номер карты и попробуйте ещё раз:",
            query
        )))),
    }
}

async fn enter_amount(ctx: StepContext, op: Operation) -> AppResult<StepOutcome> {
    let raw = ctx.text().unwrap_or_default();
    let amount = match parse_amount(raw) {
        Ok(amount) => amount,
        Err(_) => {
            return Ok(StepOutcome::stay().reply(prompt(
                "⚠️ Введите целое положительное число баллов:",
            )))
        }
    };

    let client_name = ctx.draft.text(DraftKey::ClientName)?.to_string();
    let verb = match op {
        Operation::Add => "Начислить",
        Operation::Spend => "Списать",
    };
    let draft = ctx.draft.with_number(DraftKey::Amount, amount);
    Ok(StepOutcome::advance(Step::Confirm, draft).reply(confirm_prompt(
        format!("{} {} баллов клиенту {}?", verb, amount, client_name),
        CallbackAction::Confirm,
        CallbackAction::Cancel,
    )))
}

async fn confirm_by_text(ctx: StepContext, op: Operation) -> AppResult<StepOutcome> {
    let answer = ctx.text().and_then(parse_confirmation);
    match answer {
        Some(true) => commit(ctx, op).await,
        Some(false) => Ok(finished_cancelled()),
        None => Ok(confirm_hint()),
    }
}

async fn commit(ctx: StepContext, op: Operation) -> AppResult<StepOutcome> {
    let client_id = ctx.draft.number(DraftKey::ClientId)?;
    let client_name = ctx.draft.text(DraftKey::ClientName)?;
    let amount = ctx.draft.number(DraftKey::Amount)?;
    let ledger = &ctx.services.ledger;

    let (balance, text) = match op {
        Operation::Add => {
            let balance = ledger
                .add_points(client_id, amount, ctx.user(), TransactionKind::Manual)
                .await?;
            (balance, format!("✅ Начислено {} баллов клиенту {}", amount, client_name))
        }
        Operation::Spend => {
            let balance = ledger.spend_points(client_id, amount, ctx.user()).await?;
            (balance, format!("✅ Списано {} баллов у клиента {}", amount, client_name))
        }
    };
    log::info!("{:?} {} points for client {} by {}", op, amount, client_id, ctx.user());

    Ok(StepOutcome::finish().reply(
        Reply::text(format!("{}\n💰 Новый баланс: {} баллов", text, balance))
            .with_button("🏠 В начало", CallbackAction::BackToStart),
    ))
}
