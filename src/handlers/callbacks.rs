//! Catch-all for buttons no workflow claimed
//!
//! Stale workflow buttons (confirm after the session ended, a role button
//! outside onboarding) get a short notice. Tokens that decoded to
//! `Unknown` are a silent no-op.

use crate::core::error::{AppResult, BusinessError};
use crate::engine::commands::{catch_all_fn, CallbackResult, CatchAllFn, HandlerContext};
use crate::engine::event::{AdminAction, CallbackAction, StatsView};
use crate::engine::reply::Reply;
use crate::handlers::commands::{client_dump, start_menu};
use crate::handlers::menus::{self, LIST_LIMIT};
use crate::handlers::NOTHING_TO_CANCEL;
use crate::services::{birthday_summary, card_number, StatsPeriod};

pub const STALE_BUTTON: &str = "⌛ Эта операция уже завершена. Начните заново из меню.";

pub fn catch_all() -> CatchAllFn {
    catch_all_fn(handle)
}

fn replied(reply: Reply) -> AppResult<CallbackResult> {
    Ok(CallbackResult::Replied(vec![reply]))
}

async fn handle(ctx: HandlerContext, action: CallbackAction) -> AppResult<CallbackResult> {
    use CallbackAction::*;

    let services = &ctx.services;
    match action {
        Unknown(token) => {
            log::debug!("Unknown button token {:?} from user {}", token, ctx.user());
            Ok(CallbackResult::NoOp)
        }

        Cancel => replied(Reply::text(NOTHING_TO_CANCEL)),
        RegisterClient
        | RegisterSelf
        | AddStaff
        | ConfirmRegistration
        | CancelRegistration
        | ConfirmSelfRegistration
        | CancelSelfRegistration
        | Confirm
        | Role(_)
        | AddPointsFor(_)
        | SpendPointsFor(_) => replied(Reply::text(STALE_BUTTON)),

        BackToStart => replied(start_menu(&ctx).await?),
        AboutLoyalty => {
            let settings = &services.settings;
            replied(menus::about(
                settings.registration_bonus,
                settings.birthday_bonus,
                settings.purchase_accrual_percent,
            ))
        }
        SearchClient => {
            services.require_staff(ctx.user()).await?;
            replied(Reply::text(
                "🔍 Отправьте /search и имя, телефон или номер карты клиента.\nНапример: /search +79991234567",
            ))
        }

        BonusOperations => {
            services.require_staff(ctx.user()).await?;
            replied(menus::bonus_operations())
        }
        StartAddPoints => {
            services.require_staff(ctx.user()).await?;
            replied(Reply::text(
                "➕ Отправьте /add_points или откройте карточку клиента через /search.",
            ))
        }
        StartSpendPoints => {
            services.require_staff(ctx.user()).await?;
            replied(Reply::text(
                "➖ Отправьте /spend_points или откройте карточку клиента через /search.",
            ))
        }
        StartPurchase => {
            services.require_staff(ctx.user()).await?;
            replied(Reply::text("🛒 Отправьте /purchase, чтобы оформить покупку."))
        }

        ManageClients => {
            services.require_manager(ctx.user()).await?;
            replied(menus::manage_clients())
        }
        ListAllClients => {
            services.require_manager(ctx.user()).await?;
            let clients = services.clients.list(LIST_LIMIT).await?;
            replied(menus::client_list("📋 Клиенты", &clients))
        }
        ManageClient(id) => {
            services.require_staff(ctx.user()).await?;
            let client = services
                .clients
                .find_by_id(id)
                .await?
                .ok_or_else(|| BusinessError::ClientNotFound(card_number(id)))?;
            replied(menus::client_card(&client))
        }

        Statistics => {
            services.require_manager(ctx.user()).await?;
            replied(menus::stats_menu())
        }
        Stats(view) => {
            services.require_manager(ctx.user()).await?;
            replied(stats_view(&ctx, view).await?)
        }

        Admin(admin) => {
            services.require_admin(ctx.user()).await?;
            replied(admin_action(&ctx, admin).await?)
        }
        SendBirthdayBonuses => {
            services.require_manager(ctx.user()).await?;
            replied(birthday_check(&ctx).await?)
        }

        ConfirmDelete(id) => {
            services.require_manager(ctx.user()).await?;
            if !services.clients.delete(id).await? {
                return Err(BusinessError::ClientNotFound(card_number(id)).into());
            }
            log::info!("Client {} deleted by {}", card_number(id), ctx.user());
            services
                .notifications
                .push(format!("🗑 Клиент {} удалён сотрудником {}", card_number(id), ctx.user()));
            replied(Reply::text(format!("✅ Клиент {} удалён.", card_number(id))))
        }
        CancelDelete => replied(Reply::text("↩️ Удаление отменено.")),
    }
}

async fn stats_view(ctx: &HandlerContext, view: StatsView) -> AppResult<Reply> {
    let services = &ctx.services;
    match menus::stats_period(view) {
        Some(period) => {
            let summary = services.stats.summary(period, services.settings.today()).await?;
            Ok(menus::stats_summary(period, &summary))
        }
        None => Ok(menus::top_clients(&services.stats.top_clients(10).await?)),
    }
}

async fn admin_action(ctx: &HandlerContext, action: AdminAction) -> AppResult<Reply> {
    let services = &ctx.services;
    match action {
        AdminAction::StaffManagement => Ok(menus::admin_panel()),
        AdminAction::ListStaff => Ok(menus::staff_list(&services.staff.list_staff().await?)),
        AdminAction::AdminStats => {
            let summary = services
                .stats
                .summary(StatsPeriod::Month, services.settings.today())
                .await?;
            let staff = services.staff.list_staff().await?;
            let reply = menus::stats_summary(StatsPeriod::Month, &summary);
            Ok(Reply {
                text: format!("{}\n👔 Сотрудников: {}", reply.text, staff.len()),
                ..reply
            })
        }
        AdminAction::ForceBirthdayCheck => birthday_check(ctx).await,
        AdminAction::Promotions => Ok(menus::promotions(&services.settings)),
        AdminAction::SystemSettings => Ok(menus::system_settings(&services.settings)),
        AdminAction::BackupData => {
            log::info!("Client backup requested by {}", ctx.user());
            client_dump(services).await
        }
    }
}

async fn birthday_check(ctx: &HandlerContext) -> AppResult<Reply> {
    let awards = ctx.services.award_birthdays().await?;
    Ok(Reply::text(
        birthday_summary(&awards).unwrap_or_else(|| "🎂 Сегодня бонусы начислять некому.".to_string()),
    ))
}
