//! Menus and formatted screens shared by commands and buttons

use strum::IntoEnumIterator;

use crate::engine::event::{AdminAction, CallbackAction, StaffRole, StatsView};
use crate::engine::reply::{Button, Reply};
use crate::services::{BusinessSettings, Client, StaffMember, StatsPeriod, StatsSummary, MAX_REDEEM_PERCENT};

/// Clients shown per list screen
pub const LIST_LIMIT: usize = 20;

fn back_row() -> Vec<Button> {
    vec![Button::new("🏠 В начало", CallbackAction::BackToStart)]
}

/// Main menu for a staff member; managers and admins get more rows.
pub fn staff_menu(role: StaffRole) -> Reply {
    let mut reply = Reply::text(format!("👋 Вы вошли как {}.\n\nВыберите действие:", role.label()))
        .with_button("👤 Зарегистрировать клиента", CallbackAction::RegisterClient)
        .with_button("💳 Операции с баллами", CallbackAction::BonusOperations)
        .with_button("🔍 Найти клиента", CallbackAction::SearchClient);
    if role.can_manage() {
        reply = reply.with_row(vec![
            Button::new("👥 Клиенты", CallbackAction::ManageClients),
            Button::new("📊 Статистика", CallbackAction::Statistics),
        ]);
    }
    if role == StaffRole::Admin {
        reply = reply.with_button("⚙️ Администрирование", CallbackAction::Admin(AdminAction::StaffManagement));
    }
    reply
}

pub fn client_menu(client: &Client) -> Reply {
    Reply::text(format!(
        "👋 {}!\n\n💳 Ваша карта: {}\n💰 Баланс: {} баллов",
        client.full_name, client.card_number, client.balance
    ))
    .with_button("ℹ️ О программе", CallbackAction::AboutLoyalty)
}

pub fn guest_menu() -> Reply {
    Reply::text("👋 Добро пожаловать в программу лояльности!\n\nЗарегистрируйтесь, чтобы копить баллы.")
        .with_button("📝 Зарегистрироваться", CallbackAction::RegisterSelf)
        .with_button("ℹ️ О программе", CallbackAction::AboutLoyalty)
}

pub fn about(registration_bonus: i64, birthday_bonus: i64, accrual_percent: u8) -> Reply {
    let mut text = String::from("ℹ️ Программа лояльности\n");
    text.push_str(&format!("\n• С каждой покупки возвращается {}% баллами", accrual_percent));
    text.push_str(&format!(
        "\n• Баллами можно оплатить до {}% покупки",
        MAX_REDEEM_PERCENT
    ));
    if registration_bonus > 0 {
        text.push_str(&format!("\n• За регистрацию: {} баллов", registration_bonus));
    }
    if birthday_bonus > 0 {
        text.push_str(&format!("\n• В день рождения: {} баллов", birthday_bonus));
    }
    Reply::text(text).with_row(back_row())
}

pub fn bonus_operations() -> Reply {
    Reply::text("💳 Операции с баллами:")
        .with_row(vec![
            Button::new("➕ Начислить", CallbackAction::StartAddPoints),
            Button::new("➖ Списать", CallbackAction::StartSpendPoints),
        ])
        .with_button("🛒 Покупка", CallbackAction::StartPurchase)
        .with_row(back_row())
}

pub fn manage_clients() -> Reply {
    Reply::text("👥 Управление клиентами:")
        .with_button("📋 Все клиенты", CallbackAction::ListAllClients)
        .with_button("🔍 Найти клиента", CallbackAction::SearchClient)
        .with_row(back_row())
}

/// One button per client, opening the client card
pub fn client_list(title: &str, clients: &[Client]) -> Reply {
    if clients.is_empty() {
        return Reply::text(format!("{}\n\nКлиенты не найдены.", title)).with_row(back_row());
    }
    let mut reply = Reply::text(format!("{} ({}):", title, clients.len()));
    for client in clients {
        reply = reply.with_button(
            format!("{} · {} · {} б.", client.card_number, client.full_name, client.balance),
            CallbackAction::ManageClient(client.id),
        );
    }
    reply.with_row(back_row())
}

pub fn client_card(client: &Client) -> Reply {
    let birth = client
        .birth_date
        .map(|d| d.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "не указана".to_string());
    Reply::text(format!(
        "👤 {}\n💳 {}\n📱 {}\n🎂 {}\n📅 С нами с {}\n💰 Баланс: {} баллов",
        client.full_name,
        client.card_number,
        client.phone,
        birth,
        client.registered_on.format("%d.%m.%Y"),
        client.balance
    ))
    .with_row(vec![
        Button::new("➕ Начислить", CallbackAction::AddPointsFor(client.id)),
        Button::new("➖ Списать", CallbackAction::SpendPointsFor(client.id)),
    ])
    .with_row(back_row())
}

pub fn delete_confirmation(client: &Client) -> Reply {
    Reply::text(format!(
        "🗑 Удалить клиента {} ({})?\nБаланс {} баллов и история операций будут удалены.",
        client.full_name, client.card_number, client.balance
    ))
    .with_row(vec![
        Button::new("🗑 Удалить", CallbackAction::ConfirmDelete(client.id)),
        Button::new("↩️ Оставить", CallbackAction::CancelDelete),
    ])
}

pub fn stats_menu() -> Reply {
    let row = |views: &[StatsView]| {
        views
            .iter()
            .map(|v| Button::new(stats_view_label(*v), CallbackAction::Stats(*v)))
            .collect::<Vec<_>>()
    };
    let views: Vec<StatsView> = StatsView::iter().collect();
    let (periods, rest) = views.split_at(3.min(views.len()));
    Reply::text("📊 Статистика:")
        .with_row(row(periods))
        .with_row(row(rest))
        .with_button("🎂 Начислить бонусы именинникам", CallbackAction::SendBirthdayBonuses)
        .with_row(back_row())
}

fn stats_view_label(view: StatsView) -> &'static str {
    match view {
        StatsView::Today => "Сегодня",
        StatsView::Week => "Неделя",
        StatsView::Month => "Месяц",
        StatsView::TopClients => "🏆 Топ клиентов",
    }
}

pub fn stats_summary(period: StatsPeriod, summary: &StatsSummary) -> Reply {
    Reply::text(format!(
        "📊 Статистика {}\n\n👥 Всего клиентов: {}\n🆕 Новых: {}\n➕ Начислено баллов: {}\n➖ Списано баллов: {}\n🛒 Покупок: {}\n💵 Выручка: {} ₽",
        period.title(),
        summary.total_clients,
        summary.new_clients,
        summary.points_added,
        summary.points_spent,
        summary.purchases,
        summary.revenue
    ))
    .with_row(vec![Button::new("⬅️ К статистике", CallbackAction::Statistics)])
}

pub fn top_clients(clients: &[Client]) -> Reply {
    let mut text = String::from("🏆 Топ клиентов по балансу\n");
    if clients.is_empty() {
        text.push_str("\nПока нет клиентов.");
    }
    for (place, client) in clients.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} ({}) · {} б.",
            place + 1,
            client.full_name,
            client.card_number,
            client.balance
        ));
    }
    Reply::text(text).with_row(vec![Button::new("⬅️ К статистике", CallbackAction::Statistics)])
}

pub fn admin_panel() -> Reply {
    Reply::text("⚙️ Администрирование:")
        .with_row(vec![
            Button::new("👥 Добавить сотрудника", CallbackAction::AddStaff),
            Button::new("📋 Сотрудники", CallbackAction::Admin(AdminAction::ListStaff)),
        ])
        .with_button("📊 Сводка", CallbackAction::Admin(AdminAction::AdminStats))
        .with_button(
            "🎂 Проверить дни рождения",
            CallbackAction::Admin(AdminAction::ForceBirthdayCheck),
        )
        .with_row(vec![
            Button::new("🎉 Акции", CallbackAction::Admin(AdminAction::Promotions)),
            Button::new("🔧 Настройки", CallbackAction::Admin(AdminAction::SystemSettings)),
        ])
        .with_button("💾 Резервная копия", CallbackAction::Admin(AdminAction::BackupData))
        .with_row(back_row())
}

fn admin_back_row() -> Vec<Button> {
    vec![Button::new(
        "⬅️ Назад",
        CallbackAction::Admin(AdminAction::StaffManagement),
    )]
}

/// Bonus rules currently in force. Separate promotions are not configurable.
pub fn promotions(settings: &BusinessSettings) -> Reply {
    let mut text = String::from("🎉 Действующие акции:\n");
    text.push_str(&format!("\n• Кешбэк {}% с каждой покупки", settings.purchase_accrual_percent));
    if settings.registration_bonus > 0 {
        text.push_str(&format!("\n• Приветственный бонус: {} баллов", settings.registration_bonus));
    }
    if settings.birthday_bonus > 0 {
        text.push_str(&format!("\n• Бонус в день рождения: {} баллов", settings.birthday_bonus));
    }
    text.push_str("\n\nИзменить условия можно в конфигурации бота.");
    Reply::text(text).with_row(admin_back_row())
}

/// Read-only view of the running configuration
pub fn system_settings(settings: &BusinessSettings) -> Reply {
    Reply::text(format!(
        "🔧 Настройки системы:\n\n🕐 Часовой пояс: UTC{}\n🎁 За регистрацию: {} баллов\n🎂 В день рождения: {} баллов\n💸 Кешбэк: {}%\n💳 Оплата баллами: до {}% покупки\n👑 Администратор: {}",
        settings.timezone,
        settings.registration_bonus,
        settings.birthday_bonus,
        settings.purchase_accrual_percent,
        MAX_REDEEM_PERCENT,
        settings.admin_id
    ))
    .with_row(admin_back_row())
}

pub fn staff_list(staff: &[StaffMember]) -> Reply {
    let mut text = format!("👥 Сотрудники ({}):\n", staff.len());
    for member in staff {
        let linked = if member.telegram_id.is_some() { "✅" } else { "⏳" };
        text.push_str(&format!(
            "\n{} {} · {} · {}",
            linked,
            member.full_name,
            member.phone,
            member.role.label()
        ));
    }
    Reply::text(text).with_row(admin_back_row())
}

/// Maps a statistics button to its period; `None` for the top-clients view.
pub fn stats_period(view: StatsView) -> Option<StatsPeriod> {
    match view {
        StatsView::Today => Some(StatsPeriod::Today),
        StatsView::Week => Some(StatsPeriod::Week),
        StatsView::Month => Some(StatsPeriod::Month),
        StatsView::TopClients => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_menu_depends_on_role() {
        let barista = staff_menu(StaffRole::Barista);
        assert!(!barista.actions().any(|a| *a == CallbackAction::Statistics));

        let manager = staff_menu(StaffRole::Manager);
        assert!(manager.actions().any(|a| *a == CallbackAction::Statistics));
        assert!(!manager
            .actions()
            .any(|a| matches!(a, CallbackAction::Admin(_))));

        let admin = staff_menu(StaffRole::Admin);
        assert!(admin
            .actions()
            .any(|a| *a == CallbackAction::Admin(AdminAction::StaffManagement)));
    }

    #[test]
    fn test_admin_panel_offers_every_admin_action() {
        let panel = admin_panel();
        for action in AdminAction::iter().filter(|a| *a != AdminAction::StaffManagement) {
            assert!(
                panel.actions().any(|a| *a == CallbackAction::Admin(action)),
                "{} missing",
                action
            );
        }
    }

    #[test]
    fn test_stats_menu_offers_every_view() {
        let menu = stats_menu();
        for view in StatsView::iter() {
            assert!(menu.actions().any(|a| *a == CallbackAction::Stats(view)), "{} missing", view);
        }
    }
}
