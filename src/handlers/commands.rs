//! Single-shot slash commands
//!
//! Workflow commands (`/add_points`, `/spend_points`, `/purchase`, `/cancel`
//! inside a workflow) never get here: the router hands them to the
//! workflows first.

use indoc::indoc;

use crate::core::error::{AppResult, BusinessError};
use crate::core::validation::validate_phone;
use crate::engine::commands::{command_fn, CommandRegistry, HandlerContext};
use crate::engine::event::StaffRole;
use crate::engine::reply::Reply;
use crate::handlers::{menus, NOTHING_TO_CANCEL};
use crate::services::{parse_card_number, Services, StatsPeriod};

/// Commands handled by workflows, listed for `/help` and the bot command menu
pub const WORKFLOW_COMMANDS: &[(&str, &str)] = &[
    ("add_points", "Начислить баллы клиенту"),
    ("spend_points", "Списать баллы клиента"),
    ("purchase", "Оформить покупку"),
];

const SEARCH_LIMIT: usize = 10;
const EXPORT_LIMIT: usize = 10_000;

pub fn registry() -> CommandRegistry {
    CommandRegistry::new()
        .register("start", "Главное меню", command_fn(start))
        .register("help", "Справка по командам", command_fn(help))
        .register("cancel", "Отменить текущую операцию", command_fn(cancel))
        .register("balance", "Мой баланс", command_fn(balance))
        .register("search", "Найти клиента: /search <имя, телефон или карта>", command_fn(search))
        .register("delete_client", "Удалить клиента: /delete_client <карта>", command_fn(delete_client))
        .register("stats", "Статистика", command_fn(stats))
        .register("admin", "Администрирование", command_fn(admin))
        .register("staff", "Вход сотрудника: /staff <телефон>", command_fn(staff))
        .register("export", "Выгрузка клиентов", command_fn(export))
}

/// Main menu by who is asking: staff, a registered client, or a guest.
pub async fn start_menu(ctx: &HandlerContext) -> AppResult<Reply> {
    if let Some(role) = ctx.services.role_of(ctx.user()).await? {
        return Ok(menus::staff_menu(role));
    }
    Ok(match ctx.services.clients.find_by_telegram(ctx.user().0).await? {
        Some(client) => menus::client_menu(&client),
        None => menus::guest_menu(),
    })
}

async fn start(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    Ok(vec![start_menu(&ctx).await?])
}

async fn help(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    let mut text = String::from(indoc! {"
        📖 Команды:

        /start - Главное меню
        /balance - Мой баланс
    "});
    if let Some(role) = ctx.services.role_of(ctx.user()).await? {
        text.push_str("/search <запрос> - Найти клиента\n");
        for (name, description) in WORKFLOW_COMMANDS {
            text.push_str(&format!("/{} - {}\n", name, description));
        }
        text.push_str("/cancel - Отменить текущую операцию\n");
        if role.can_manage() {
            text.push_str("/stats - Статистика\n/delete_client <карта> - Удалить клиента\n/export - Выгрузка клиентов\n");
        }
        if role == StaffRole::Admin {
            text.push_str("/admin - Администрирование\n");
        }
    } else {
        text.push_str("/staff <телефон> - Вход для сотрудников\n");
    }
    Ok(vec![Reply::text(text)])
}

async fn cancel(_ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    Ok(vec![Reply::text(NOTHING_TO_CANCEL)])
}

async fn balance(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    let reply = match ctx.services.clients.find_by_telegram(ctx.user().0).await? {
        Some(client) => Reply::text(format!(
            "💳 Карта: {}\n💰 Баланс: {} баллов",
            client.card_number, client.balance
        )),
        None => menus::guest_menu(),
    };
    Ok(vec![reply])
}

async fn search(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    ctx.services.require_staff(ctx.user()).await?;
    let query = ctx.args().trim();
    if query.is_empty() {
        return Ok(vec![Reply::text(
            "🔍 Укажите запрос: /search <имя, телефон или номер карты>",
        )]);
    }

    if let Some(client) = ctx.services.resolve_client(query).await? {
        return Ok(vec![menus::client_card(&client)]);
    }
    let found = ctx.services.clients.search(query, SEARCH_LIMIT).await?;
    Ok(vec![menus::client_list(&format!("🔍 Результаты по «{}»", query), &found)])
}

async fn delete_client(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    ctx.services.require_manager(ctx.user()).await?;
    let Some(id) = parse_card_number(ctx.args()) else {
        return Ok(vec![Reply::text("🗑 Укажите номер карты: /delete_client LC000042")]);
    };
    let client = ctx
        .services
        .clients
        .find_by_id(id)
        .await?
        .ok_or_else(|| BusinessError::ClientNotFound(ctx.args().to_string()))?;
    Ok(vec![menus::delete_confirmation(&client)])
}

async fn stats(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    ctx.services.require_manager(ctx.user()).await?;
    let today = ctx.services.settings.today();
    let summary = ctx.services.stats.summary(StatsPeriod::Today, today).await?;
    Ok(vec![menus::stats_summary(StatsPeriod::Today, &summary), menus::stats_menu()])
}

async fn admin(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    ctx.services.require_admin(ctx.user()).await?;
    Ok(vec![menus::admin_panel()])
}

/// Links the caller's account to the staff record the admin created for their phone.
async fn staff(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    if let Some(role) = ctx.services.role_of(ctx.user()).await? {
        return Ok(vec![menus::staff_menu(role)]);
    }
    let Ok(phone) = validate_phone(ctx.args()) else {
        return Ok(vec![Reply::text(
            "📱 Укажите телефон, который вы сообщили администратору: /staff +7XXXXXXXXXX",
        )]);
    };

    match ctx.services.staff.link_telegram(&phone, ctx.user()).await? {
        Some(role) => {
            log::info!("Staff member {} linked to user {}", phone, ctx.user());
            ctx.services
                .notifications
                .push(format!("🔑 Сотрудник {} вошёл в бота ({})", phone, role.label()));
            Ok(vec![menus::staff_menu(role)])
        }
        None => Err(BusinessError::AccessDenied.into()),
    }
}

async fn export(ctx: HandlerContext) -> AppResult<Vec<Reply>> {
    ctx.services.require_manager(ctx.user()).await?;
    Ok(vec![client_dump(&ctx.services).await?])
}

/// Semicolon-separated client dump, newest first
pub(crate) async fn client_dump(services: &Services) -> AppResult<Reply> {
    let clients = services.clients.list(EXPORT_LIMIT).await?;
    if clients.is_empty() {
        return Ok(Reply::text("📤 Клиентов пока нет."));
    }

    let mut csv = String::from("card;full_name;phone;birth_date;balance;registered_on\n");
    for client in &clients {
        csv.push_str(&format!(
            "{};{};{};{};{};{}\n",
            client.card_number,
            client.full_name,
            client.phone,
            client.birth_date.map(|d| d.to_string()).unwrap_or_default(),
            client.balance,
            client.registered_on
        ));
    }
    Ok(Reply::text(format!("📤 Клиенты ({}):\n\n{}", clients.len(), csv)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_every_command() {
        let registry = registry();
        for name in [
            "start",
            "help",
            "cancel",
            "balance",
            "search",
            "delete_client",
            "stats",
            "admin",
            "staff",
            "export",
        ] {
            assert!(registry.contains(name), "/{} is not registered", name);
        }
        // Workflow commands belong to the workflows
        assert!(!registry.contains("add_points"));
        assert!(!registry.contains("purchase"));
    }
}
