//! Router fixtures over the in-memory store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Offset, Utc};

use loyalty_bot::core::AppResult;
use loyalty_bot::engine::event::StaffRole;
use loyalty_bot::engine::{CallbackAction, ChatId, Dispatched, Event, Router, UserId};
use loyalty_bot::handlers;
use loyalty_bot::services::memory::MemoryStore;
use loyalty_bot::services::{
    BirthdayAward, BusinessSettings, Client, ClientDirectory, NewClient, PointsLedger,
    PurchaseReceipt, Services, StaffDirectory, StaffMember, StatsPeriod, StatsProvider, StatsSummary,
    TransactionKind,
};
use loyalty_bot::workflows;

use super::transport::RecordingTransport;

pub const ADMIN: UserId = UserId(1);
pub const BARISTA: UserId = UserId(100);
pub const MANAGER: UserId = UserId(200);
pub const GUEST: UserId = UserId(900);

/// Private chats share the user's id
pub fn chat_of(user: UserId) -> ChatId {
    ChatId(user.0)
}

pub fn settings() -> BusinessSettings {
    BusinessSettings {
        admin_id: ADMIN.0,
        registration_bonus: 0,
        birthday_bonus: 10,
        timezone: Utc.fix(),
        purchase_accrual_percent: 5,
    }
}

pub struct TestBot {
    pub router: Arc<Router>,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<MemoryStore>,
    pub services: Arc<Services>,
}

#[allow(dead_code)]
impl TestBot {
    /// Router over a fresh store with one barista and one manager
    pub async fn new() -> Self {
        Self::with_services(|store| Services::from_store(store, settings())).await
    }

    /// Same, with the ledger replaced by one built over the store
    pub async fn with_ledger(make: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn PointsLedger>) -> Self {
        Self::with_services(|store| Services {
            ledger: make(Arc::clone(&store)),
            ..Services::from_store(store, settings())
        })
        .await
    }

    /// Same, with the staff directory replaced by one built over the store
    pub async fn with_staff(make: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn StaffDirectory>) -> Self {
        Self::with_services(|store| Services {
            staff: make(Arc::clone(&store)),
            ..Services::from_store(store, settings())
        })
        .await
    }

    /// Same, with the statistics provider replaced
    pub async fn with_stats(stats: Arc<dyn StatsProvider>) -> Self {
        Self::with_services(|store| Services {
            stats,
            ..Services::from_store(store, settings())
        })
        .await
    }

    /// Same, with different business settings
    pub async fn with_settings(settings: BusinessSettings) -> Self {
        Self::with_services(|store| Services::from_store(store, settings)).await
    }

    /// Same, with idle sessions dropped after `timeout`
    pub async fn with_session_timeout(timeout: Duration) -> Self {
        let store = Arc::new(MemoryStore::default());
        let services = Services::from_store(Arc::clone(&store), settings());
        Self::build(store, services, Some(timeout)).await
    }

    pub async fn with_services(make: impl FnOnce(Arc<MemoryStore>) -> Services) -> Self {
        let store = Arc::new(MemoryStore::default());
        let services = make(Arc::clone(&store));
        Self::build(store, services, None).await
    }

    async fn build(store: Arc<MemoryStore>, services: Services, session_timeout: Option<Duration>) -> Self {
        for (user, name, phone, role) in [
            (BARISTA, "Олег Бариста", "+79990000100", StaffRole::Barista),
            (MANAGER, "Мария Менеджер", "+79990000200", StaffRole::Manager),
        ] {
            store
                .add_staff(StaffMember {
                    telegram_id: Some(user.0),
                    full_name: name.to_string(),
                    phone: phone.to_string(),
                    role,
                })
                .await
                .unwrap();
        }

        let services = Arc::new(services);
        let transport = Arc::new(RecordingTransport::new());
        let router = Router::new(
            workflows::definitions(),
            handlers::registry(),
            handlers::catch_all(),
            Arc::clone(&services),
            transport.clone(),
        )
        .unwrap()
        .with_session_timeout(session_timeout);

        Self {
            router: Arc::new(router),
            transport,
            store,
            services,
        }
    }

    pub async fn text(&self, user: UserId, text: &str) -> Dispatched {
        self.router
            .dispatch(Event::from_message(0, chat_of(user), user, text))
            .await
    }

    pub async fn press(&self, user: UserId, action: CallbackAction) -> Dispatched {
        self.router
            .dispatch(Event::callback(chat_of(user), user, action))
            .await
    }

    pub async fn client(&self, name: &str, phone: &str, balance: i64) -> Client {
        let client = self
            .store
            .register(
                NewClient {
                    full_name: name.to_string(),
                    phone: phone.to_string(),
                    birth_date: NaiveDate::from_ymd_opt(1990, 3, 15),
                    telegram_id: None,
                    welcome_bonus: 0,
                },
                self.services.settings.today(),
            )
            .await
            .unwrap();
        self.store.set_balance(client.id, balance).await;
        self.store.find_by_id(client.id).await.unwrap().unwrap()
    }

    pub async fn balance(&self, client_id: i64) -> i64 {
        self.store.find_by_id(client_id).await.unwrap().unwrap().balance
    }
}

/// Ledger whose writes fail like a broken database; reads go to the store
pub struct FailingLedger {
    pub inner: Arc<MemoryStore>,
}

fn storage_failure() -> loyalty_bot::AppError {
    rusqlite::Error::QueryReturnedNoRows.into()
}

#[async_trait]
impl PointsLedger for FailingLedger {
    async fn add_points(&self, _client_id: i64, _points: i64, _staff: UserId, _kind: TransactionKind) -> AppResult<i64> {
        Err(storage_failure())
    }

    async fn spend_points(&self, _client_id: i64, _points: i64, _staff: UserId) -> AppResult<i64> {
        Err(storage_failure())
    }

    async fn check_redeemable(&self, client_id: i64, purchase_amount: i64, points: i64) -> AppResult<()> {
        self.inner.check_redeemable(client_id, purchase_amount, points).await
    }

    async fn record_purchase(
        &self,
        _client_id: i64,
        _amount: i64,
        _redeem: i64,
        _accrual_percent: u8,
        _staff: UserId,
    ) -> AppResult<PurchaseReceipt> {
        Err(storage_failure())
    }

    async fn award_birthday_bonuses(&self, _today: NaiveDate, _bonus: i64) -> AppResult<Vec<BirthdayAward>> {
        Err(storage_failure())
    }
}

/// Statistics provider that panics, for containment tests
pub struct PanickingStats;

#[async_trait]
impl StatsProvider for PanickingStats {
    async fn summary(&self, _period: StatsPeriod, _today: NaiveDate) -> AppResult<StatsSummary> {
        panic!("statistics exploded");
    }

    async fn top_clients(&self, _limit: usize) -> AppResult<Vec<Client>> {
        panic!("statistics exploded");
    }
}

/// Staff directory whose first `failures` role lookups fail like a broken database
pub struct FlakyStaff {
    pub inner: Arc<MemoryStore>,
    pub failures: AtomicUsize,
}

impl FlakyStaff {
    pub fn new(inner: Arc<MemoryStore>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl StaffDirectory for FlakyStaff {
    async fn role_of(&self, user: UserId) -> AppResult<Option<StaffRole>> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(storage_failure());
        }
        self.inner.role_of(user).await
    }

    async fn add_staff(&self, member: StaffMember) -> AppResult<()> {
        self.inner.add_staff(member).await
    }

    async fn list_staff(&self) -> AppResult<Vec<StaffMember>> {
        self.inner.list_staff().await
    }

    async fn link_telegram(&self, phone: &str, user: UserId) -> AppResult<Option<StaffRole>> {
        self.inner.link_telegram(phone, user).await
    }
}
