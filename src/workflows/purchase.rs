//! Purchase checkout
//!
//! `SelectClient → PurchaseAmount → PointsToRedeem → Confirm`. The ledger
//! checks the redemption before `Confirm` becomes reachable; a rejection keeps
//! the session on `PointsToRedeem`.

use crate::core::error::AppResult;
use crate::core::validation::{parse_amount, parse_confirmation, parse_points_to_redeem};
use crate::engine::event::CallbackAction;
use crate::engine::reply::Reply;
use crate::engine::session::{Draft, DraftKey};
use crate::engine::workflow::{step_fn, Matcher, Step, StepContext, StepOutcome, WorkflowDefinition, WorkflowKind};
use crate::services::{accrual, redemption_limit};
use crate::workflows::{
    access_denied, confirm_hint, confirm_prompt, finished_cancelled, prompt, with_cancel_fallbacks,
};

const PURCHASE_AMOUNT_REQUIRES: &[DraftKey] = &[DraftKey::ClientId, DraftKey::ClientName];
const POINTS_REQUIRES: &[DraftKey] = &[DraftKey::ClientId, DraftKey::ClientName, DraftKey::PurchaseAmount];
const CONFIRM_REQUIRES: &[DraftKey] = &[
    DraftKey::ClientId,
    DraftKey::ClientName,
    DraftKey::PurchaseAmount,
    DraftKey::PointsToRedeem,
];

pub fn definition() -> WorkflowDefinition {
    let def = WorkflowDefinition::new(WorkflowKind::Purchase, Step::SelectClient)
        .entry(Matcher::Command("purchase"), step_fn(start))
        .state(Step::SelectClient, &[], vec![(Matcher::Text, step_fn(select_client))])
        .state(
            Step::PurchaseAmount,
            PURCHASE_AMOUNT_REQUIRES,
            vec![(Matcher::Text, step_fn(enter_purchase_amount))],
        )
        .state(
            Step::PointsToRedeem,
            POINTS_REQUIRES,
            vec![(Matcher::Text, step_fn(enter_points_to_redeem))],
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

async fn start(ctx: StepContext) -> AppResult<StepOutcome> {
    if ctx.services.role_of(ctx.user()).await?.is_none() {
        return Ok(access_denied());
    }
    Ok(StepOutcome::advance(Step::SelectClient, Draft::new()).reply(prompt(
        "🛒 Оформление покупки\n\n🔍 Введите телефон или номер карты клиента:",
    )))
}

async fn select_client(ctx: StepContext) -> AppResult<StepOutcome> {
    let query = ctx.text().unwrap_or_default();
    let Some(client) = ctx.services.resolve_client(query).await? else {
        return Ok(StepOutcome::stay().reply(prompt(format!(
            "🔍 Клиент «{}» не найден. Проверьте телефон или номер карты и попробуйте ещё раз:",
            query
        ))));
    };

    let draft = Draft::new()
        .with_number(DraftKey::ClientId, client.id)
        .with_text(DraftKey::ClientName, client.full_name.clone());
    Ok(StepOutcome::advance(Step::PurchaseAmount, draft).reply(prompt(format!(
        "👤 {} ({})\n💰 Баланс: {} баллов\n\n💵 Введите сумму покупки в рублях:",
        client.full_name, client.card_number, client.balance
    ))))
}

async fn enter_purchase_amount(ctx: StepContext) -> AppResult<StepOutcome> {
    let Ok(amount) = parse_amount(ctx.text().unwrap_or_default()) else {
        return Ok(StepOutcome::stay().reply(prompt("⚠️ Введите сумму покупки целым положительным числом:")));
    };

    let client_id = ctx.draft.number(DraftKey::ClientId)?;
    let balance = ctx
        .services
        .clients
        .find_by_id(client_id)
        .await?
        .map(|c| c.balance)
        .unwrap_or_default();
    let max_points = balance.min(redemption_limit(amount));

    let draft = ctx.draft.with_number(DraftKey::PurchaseAmount, amount);
    Ok(StepOutcome::advance(Step::PointsToRedeem, draft).reply(prompt(format!(
        "🎯 Сколько баллов списать? От 0 до {} (баланс: {}).\nВведите 0, чтобы не списывать.",
        max_points, balance
    ))))
}

async fn enter_points_to_redeem(ctx: StepContext) -> AppResult<StepOutcome> {
    let Ok(points) = parse_points_to_redeem(ctx.text().unwrap_or_default()) else {
        return Ok(StepOutcome::stay().reply(prompt("⚠️ Введите количество баллов целым числом (0 или больше):")));
    };

    let client_id = ctx.draft.number(DraftKey::ClientId)?;
    let amount = ctx.draft.number(DraftKey::PurchaseAmount)?;
    ctx.services.ledger.check_redeemable(client_id, amount, points).await?;

    let percent = ctx.services.settings.purchase_accrual_percent;
    let summary = format!(
        "🧾 Покупка для {}\n\n💵 Сумма: {} ₽\n🎯 Списать баллов: {}\n💳 К оплате: {} ₽\n🎁 Будет начислено: {} баллов\n\nПодтвердить?",
        ctx.draft.text(DraftKey::ClientName)?,
        amount,
        points,
        amount - points,
        accrual(amount, points, percent)
    );
    let draft = ctx.draft.with_number(DraftKey::PointsToRedeem, points);
    Ok(StepOutcome::advance(Step::Confirm, draft).reply(confirm_prompt(
        summary,
        CallbackAction::Confirm,
        CallbackAction::Cancel,
    )))
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
    let client_id = ctx.draft.number(DraftKey::ClientId)?;
    let amount = ctx.draft.number(DraftKey::PurchaseAmount)?;
    let points = ctx.draft.number(DraftKey::PointsToRedeem)?;
    let percent = ctx.services.settings.purchase_accrual_percent;

    let receipt = ctx
        .services
        .ledger
        .record_purchase(client_id, amount, points, percent, ctx.user())
        .await?;
    log::info!(
        "Purchase for client {}: amount={} redeemed={} accrued={}",
        client_id,
        receipt.amount,
        receipt.redeemed,
        receipt.accrued
    );

    Ok(StepOutcome::finish().reply(
        Reply::text(format!(
            "✅ Покупка оформлена!\n\n💵 Сумма: {} ₽\n🎯 Списано: {} баллов\n🎁 Начислено: {} баллов\n💰 Баланс: {} баллов",
            receipt.amount, receipt.redeemed, receipt.accrued, receipt.balance
        ))
        .with_button("🏠 В начало", CallbackAction::BackToStart),
    ))
}
