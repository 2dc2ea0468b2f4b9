//! Business collaborators
//!
//! Step functions and handlers reach clients, balances, staff and statistics
//! only through the traits here. [`memory::MemoryStore`] implements them in
//! process; [`crate::storage::SqliteStore`] implements them on SQLite.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, FixedOffset, NaiveDate, Utc};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio::sync::{mpsc, Mutex};

use crate::core::config::Config;
use crate::core::error::{AppResult, BusinessError};
use crate::core::validation::validate_phone;
use crate::engine::event::{StaffRole, UserId};

/// At most this share of a purchase can be paid with points
pub const MAX_REDEEM_PERCENT: i64 = 50;

/// Minimum gap between two birthday bonuses for the same client
pub const BIRTHDAY_BONUS_COOLDOWN_DAYS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: i64,
    pub card_number: String,
    pub full_name: String,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub telegram_id: Option<i64>,
    pub balance: i64,
    pub registered_on: NaiveDate,
    pub last_birthday_bonus: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    pub full_name: String,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub telegram_id: Option<i64>,
    /// Welcome points, credited in the same write as the client record
    pub welcome_bonus: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffMember {
    pub telegram_id: Option<i64>,
    pub full_name: String,
    pub phone: String,
    pub role: StaffRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub client_id: i64,
    pub amount: i64,
    pub redeemed: i64,
    pub accrued: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthdayAward {
    pub client_id: i64,
    pub full_name: String,
    pub points: i64,
    pub balance: i64,
}

/// Why a balance changed. Stored as its snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransactionKind {
    Manual,
    Spend,
    Registration,
    Birthday,
    PurchaseAccrual,
    PurchaseRedeem,
}

impl TransactionKind {
    pub fn is_credit(&self) -> bool {
        !matches!(self, TransactionKind::Spend | TransactionKind::PurchaseRedeem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum StatsPeriod {
    Today,
    Week,
    Month,
}

impl StatsPeriod {
    /// First day included in the period
    pub fn since(&self, today: NaiveDate) -> NaiveDate {
        match self {
            StatsPeriod::Today => today,
            StatsPeriod::Week => today - ChronoDuration::days(6),
            StatsPeriod::Month => today - ChronoDuration::days(29),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StatsPeriod::Today => "за сегодня",
            StatsPeriod::Week => "за неделю",
            StatsPeriod::Month => "за месяц",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSummary {
    pub total_clients: i64,
    pub new_clients: i64,
    pub points_added: i64,
    pub points_spent: i64,
    pub purchases: i64,
    pub revenue: i64,
}

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Client>>;
    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<Client>>;
    async fn find_by_telegram(&self, telegram_id: i64) -> AppResult<Option<Client>>;
    /// Case-insensitive match on name, phone or card number
    async fn search(&self, query: &str, limit: usize) -> AppResult<Vec<Client>>;
    /// Fails with `DuplicatePhone` when the phone is taken. A positive
    /// `welcome_bonus` is credited as a registration transaction; either both
    /// are stored or neither is.
    async fn register(&self, client: NewClient, today: NaiveDate) -> AppResult<Client>;
    async fn list(&self, limit: usize) -> AppResult<Vec<Client>>;
    async fn delete(&self, id: i64) -> AppResult<bool>;
}

#[async_trait]
pub trait PointsLedger: Send + Sync {
    /// Credits points and returns the new balance
    async fn add_points(&self, client_id: i64, points: i64, staff: UserId, kind: TransactionKind) -> AppResult<i64>;
    /// Fails with `InsufficientBalance`; returns the new balance
    async fn spend_points(&self, client_id: i64, points: i64, staff: UserId) -> AppResult<i64>;
    /// Checks a redemption against the balance and the per-purchase limit
    async fn check_redeemable(&self, client_id: i64, purchase_amount: i64, points: i64) -> AppResult<()>;
    async fn record_purchase(
        &self,
        client_id: i64,
        amount: i64,
        redeem: i64,
        accrual_percent: u8,
        staff: UserId,
    ) -> AppResult<PurchaseReceipt>;
    /// Credits every client whose birthday is `today` and who has not had a bonus recently
    async fn award_birthday_bonuses(&self, today: NaiveDate, bonus: i64) -> AppResult<Vec<BirthdayAward>>;
}

#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn role_of(&self, user: UserId) -> AppResult<Option<StaffRole>>;
    async fn add_staff(&self, member: StaffMember) -> AppResult<()>;
    async fn list_staff(&self) -> AppResult<Vec<StaffMember>>;
    /// Binds the staff record with `phone` to a Telegram account; `None` if no such record
    async fn link_telegram(&self, phone: &str, user: UserId) -> AppResult<Option<StaffRole>>;
}

#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn summary(&self, period: StatsPeriod, today: NaiveDate) -> AppResult<StatsSummary>;
    async fn top_clients(&self, limit: usize) -> AppResult<Vec<Client>>;
}

/// Admin notifications waiting for the notification task
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<String>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn push(&self, message: impl Into<String>) {
        // The queue owns its receiver, so the channel never closes
        let _ = self.tx.send(message.into());
    }

    /// Takes everything queued so far, oldest first
    pub async fn drain(&self) -> Vec<String> {
        let mut rx = self.rx.lock().await;
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Read-only business settings derived from the configuration
#[derive(Debug, Clone)]
pub struct BusinessSettings {
    pub admin_id: i64,
    pub registration_bonus: i64,
    pub birthday_bonus: i64,
    pub timezone: FixedOffset,
    pub purchase_accrual_percent: u8,
}

impl BusinessSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            admin_id: config.admin_id,
            registration_bonus: config.registration_bonus,
            birthday_bonus: config.birthday_bonus,
            timezone: config.timezone,
            purchase_accrual_percent: config.purchase_accrual_percent,
        }
    }

    /// Current date in the configured zone
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

/// Everything a step function or handler may call
pub struct Services {
    pub clients: Arc<dyn ClientDirectory>,
    pub ledger: Arc<dyn PointsLedger>,
    pub staff: Arc<dyn StaffDirectory>,
    pub stats: Arc<dyn StatsProvider>,
    pub notifications: NotificationQueue,
    pub settings: BusinessSettings,
}

impl Services {
    /// Builds the bundle from one value implementing every collaborator trait.
    pub fn from_store<S>(store: Arc<S>, settings: BusinessSettings) -> Self
    where
        S: ClientDirectory + PointsLedger + StaffDirectory + StatsProvider + 'static,
    {
        Self {
            clients: store.clone(),
            ledger: store.clone(),
            staff: store.clone(),
            stats: store,
            notifications: NotificationQueue::new(),
            settings,
        }
    }

    /// The configured admin is always an admin, whatever the staff table says.
    pub async fn role_of(&self, user: UserId) -> AppResult<Option<StaffRole>> {
        if user.0 == self.settings.admin_id {
            return Ok(Some(StaffRole::Admin));
        }
        self.staff.role_of(user).await
    }

    pub async fn require_staff(&self, user: UserId) -> AppResult<StaffRole> {
        self.role_of(user).await?.ok_or_else(|| BusinessError::AccessDenied.into())
    }

    pub async fn require_manager(&self, user: UserId) -> AppResult<StaffRole> {
        match self.role_of(user).await? {
            Some(role) if role.can_manage() => Ok(role),
            _ => Err(BusinessError::AccessDenied.into()),
        }
    }

    pub async fn require_admin(&self, user: UserId) -> AppResult<()> {
        match self.role_of(user).await? {
            Some(StaffRole::Admin) => Ok(()),
            _ => Err(BusinessError::AccessDenied.into()),
        }
    }

    /// Runs the birthday award for today in the configured zone.
    pub async fn award_birthdays(&self) -> AppResult<Vec<BirthdayAward>> {
        let today = self.settings.today();
        let awards = self
            .ledger
            .award_birthday_bonuses(today, self.settings.birthday_bonus)
            .await?;
        log::info!("Birthday check for {}: {} client(s) awarded", today, awards.len());
        Ok(awards)
    }

    /// Looks a client up by phone, card number (`LC000042`) or numeric id.
    pub async fn resolve_client(&self, query: &str) -> AppResult<Option<Client>> {
        let query = query.trim();
        if let Ok(phone) = validate_phone(query) {
            if let Some(client) = self.clients.find_by_phone(&phone).await? {
                return Ok(Some(client));
            }
        }
        if let Some(id) = parse_card_number(query) {
            return self.clients.find_by_id(id).await;
        }
        Ok(None)
    }
}

pub fn card_number(id: i64) -> String {
    format!("LC{:06}", id)
}

/// `LC000042`, `lc42` or `42` → 42
pub fn parse_card_number(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("LC")
        .or_else(|| raw.strip_prefix("lc"))
        .unwrap_or(raw);
    digits.parse::<i64>().ok().filter(|id| *id > 0)
}

/// Most points a purchase of `amount` can absorb
pub fn redemption_limit(amount: i64) -> i64 {
    amount * MAX_REDEEM_PERCENT / 100
}

/// Validates a redemption against `balance` and the per-purchase limit.
pub fn check_redemption(balance: i64, amount: i64, points: i64) -> Result<(), BusinessError> {
    if points > balance {
        return Err(BusinessError::InsufficientBalance {
            available: balance,
            requested: points,
        });
    }
    let limit = redemption_limit(amount);
    if points > limit {
        return Err(BusinessError::RedemptionLimit { limit });
    }
    Ok(())
}

/// Points accrued on the part of the purchase paid with money
pub fn accrual(amount: i64, redeemed: i64, percent: u8) -> i64 {
    (amount - redeemed).max(0) * i64::from(percent) / 100
}

/// Feb 29 birthdays are celebrated on Feb 28 in non-leap years
pub fn is_birthday(birth: NaiveDate, today: NaiveDate) -> bool {
    if birth.month() == 2 && birth.day() == 29 && NaiveDate::from_ymd_opt(today.year(), 2, 29).is_none() {
        return today.month() == 2 && today.day() == 28;
    }
    birth.month() == today.month() && birth.day() == today.day()
}

/// Admin-facing summary of a birthday run; `None` when nobody was awarded
pub fn birthday_summary(awards: &[BirthdayAward]) -> Option<String> {
    if awards.is_empty() {
        return None;
    }
    let mut text = format!("🎂 Бонусы ко дню рождения начислены: {}\n", awards.len());
    for award in awards {
        text.push_str(&format!(
            "\n• {} ({}): +{}, баланс {}",
            award.full_name,
            card_number(award.client_id),
            award.points,
            award.balance
        ));
    }
    Some(text)
}

pub fn birthday_bonus_due(last: Option<NaiveDate>, today: NaiveDate) -> bool {
    match last {
        None => true,
        Some(last) => (today - last).num_days() >= BIRTHDAY_BONUS_COOLDOWN_DAYS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_card_numbers() {
        assert_eq!(card_number(42), "LC000042");
        assert_eq!(parse_card_number("LC000042"), Some(42));
        assert_eq!(parse_card_number("42"), Some(42));
        assert_eq!(parse_card_number("0"), None);
        assert_eq!(parse_card_number("Иван"), None);
    }

    #[test]
    fn test_redemption_rules() {
        assert!(check_redemption(100, 400, 100).is_ok());
        assert_eq!(
            check_redemption(30, 400, 50),
            Err(BusinessError::InsufficientBalance {
                available: 30,
                requested: 50
            })
        );
        assert_eq!(
            check_redemption(500, 100, 60),
            Err(BusinessError::RedemptionLimit { limit: 50 })
        );
        assert_eq!(accrual(400, 100, 5), 15);
        assert_eq!(accrual(100, 0, 0), 0);
    }

    #[test]
    fn test_birthday_rules() {
        assert!(is_birthday(date(1990, 3, 15), date(2024, 3, 15)));
        assert!(!is_birthday(date(1990, 3, 15), date(2024, 3, 16)));
        assert!(is_birthday(date(2000, 2, 29), date(2023, 2, 28)));
        assert!(!is_birthday(date(2000, 2, 29), date(2024, 2, 28)));
        assert!(is_birthday(date(2000, 2, 29), date(2024, 2, 29)));

        assert!(birthday_bonus_due(None, date(2024, 3, 15)));
        assert!(!birthday_bonus_due(Some(date(2024, 3, 15)), date(2024, 3, 15)));
        assert!(birthday_bonus_due(Some(date(2023, 3, 15)), date(2024, 3, 15)));
    }

    #[test]
    fn test_birthday_summary_lists_awards() {
        assert_eq!(birthday_summary(&[]), None);
        let summary = birthday_summary(&[BirthdayAward {
            client_id: 7,
            full_name: "Анна Смирнова".to_string(),
            points: 10,
            balance: 25,
        }])
        .unwrap();
        assert!(summary.contains("LC000007"));
        assert!(summary.contains("+10"));
    }

    #[tokio::test]
    async fn test_notification_queue_drains_in_order() {
        let queue = NotificationQueue::new();
        queue.push("first");
        queue.push(String::from("second"));

        assert_eq!(queue.drain().await, vec!["first", "second"]);
        assert!(queue.drain().await.is_empty());
    }
}
