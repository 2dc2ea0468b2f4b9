//! In-process collaborator used by tests and `run --in-memory`

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use tokio::sync::Mutex;

use super::{
    accrual, birthday_bonus_due, card_number, check_redemption, is_birthday, BirthdayAward, Client, ClientDirectory,
    NewClient, PointsLedger, PurchaseReceipt, StaffDirectory, StaffMember, StatsPeriod, StatsProvider, StatsSummary,
    TransactionKind,
};
use crate::core::error::{AppResult, BusinessError};
use crate::engine::event::{StaffRole, UserId};

#[derive(Debug, Clone)]
struct Transaction {
    client_id: i64,
    points: i64,
    kind: TransactionKind,
    purchase_amount: Option<i64>,
    on: NaiveDate,
}

#[derive(Debug, Default)]
struct State {
    clients: BTreeMap<i64, Client>,
    next_id: i64,
    staff: Vec<StaffMember>,
    transactions: Vec<Transaction>,
}

impl State {
    fn client_mut(&mut self, id: i64) -> Result<&mut Client, BusinessError> {
        self.clients
            .get_mut(&id)
            .ok_or_else(|| BusinessError::ClientNotFound(card_number(id)))
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    timezone: FixedOffset,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl MemoryStore {
    pub fn new(timezone: FixedOffset) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
            timezone,
        }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Sets a balance directly, bypassing the ledger. Returns false for unknown ids.
    pub async fn set_balance(&self, client_id: i64, balance: i64) -> bool {
        let mut state = self.state.lock().await;
        match state.clients.get_mut(&client_id) {
            Some(client) => {
                client.balance = balance;
                true
            }
            None => false,
        }
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    fn credit(state: &mut State, client_id: i64, points: i64, kind: TransactionKind, on: NaiveDate) -> AppResult<i64> {
        let client = state.client_mut(client_id)?;
        client.balance += points;
        let balance = client.balance;
        state.transactions.push(Transaction {
            client_id,
            points,
            kind,
            purchase_amount: None,
            on,
        });
        Ok(balance)
    }
}

#[async_trait]
impl ClientDirectory for MemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Client>> {
        Ok(self.state.lock().await.clients.get(&id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<Client>> {
        let state = self.state.lock().await;
        Ok(state.clients.values().find(|c| c.phone == phone).cloned())
    }

    async fn find_by_telegram(&self, telegram_id: i64) -> AppResult<Option<Client>> {
        let state = self.state.lock().await;
        Ok(state
            .clients
            .values()
            .find(|c| c.telegram_id == Some(telegram_id))
            .cloned())
    }

    async fn search(&self, query: &str, limit: usize) -> AppResult<Vec<Client>> {
        let needle = query.trim().to_lowercase();
        let state = self.state.lock().await;
        Ok(state
            .clients
            .values()
            .filter(|c| {
                c.full_name.to_lowercase().contains(&needle)
                    || c.phone.contains(&needle)
                    || c.card_number.to_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn register(&self, client: NewClient, today: NaiveDate) -> AppResult<Client> {
        let mut state = self.state.lock().await;
        if state.clients.values().any(|c| c.phone == client.phone) {
            return Err(BusinessError::DuplicatePhone(client.phone).into());
        }

        let id = state.next_id;
        state.next_id += 1;
        let mut record = Client {
            id,
            card_number: card_number(id),
            full_name: client.full_name,
            phone: client.phone,
            birth_date: client.birth_date,
            telegram_id: client.telegram_id,
            balance: 0,
            registered_on: today,
            last_birthday_bonus: None,
        };
        state.clients.insert(id, record.clone());
        if client.welcome_bonus > 0 {
            record.balance = Self::credit(&mut state, id, client.welcome_bonus, TransactionKind::Registration, today)?;
        }
        Ok(record)
    }

    async fn list(&self, limit: usize) -> AppResult<Vec<Client>> {
        let state = self.state.lock().await;
        Ok(state.clients.values().rev().take(limit).cloned().collect())
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let removed = state.clients.remove(&id).is_some();
        if removed {
            state.transactions.retain(|t| t.client_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl PointsLedger for MemoryStore {
    async fn add_points(&self, client_id: i64, points: i64, _staff: UserId, kind: TransactionKind) -> AppResult<i64> {
        let today = self.today();
        let mut state = self.state.lock().await;
        Self::credit(&mut state, client_id, points, kind, today)
    }

    async fn spend_points(&self, client_id: i64, points: i64, _staff: UserId) -> AppResult<i64> {
        let today = self.today();
        let mut state = self.state.lock().await;
        let client = state.client_mut(client_id)?;
        if client.balance < points {
            return Err(BusinessError::InsufficientBalance {
                available: client.balance,
                requested: points,
            }
            .into());
        }
        client.balance -= points;
        let balance = client.balance;
        state.transactions.push(Transaction {
            client_id,
            points,
            kind: TransactionKind::Spend,
            purchase_amount: None,
            on: today,
        });
        Ok(balance)
    }

    async fn check_redeemable(&self, client_id: i64, purchase_amount: i64, points: i64) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let client = state.client_mut(client_id)?;
        check_redemption(client.balance, purchase_amount, points)?;
        Ok(())
    }

    async fn record_purchase(
        &self,
        client_id: i64,
        amount: i64,
        redeem: i64,
        accrual_percent: u8,
        _staff: UserId,
    ) -> AppResult<PurchaseReceipt> {
        let today = self.today();
        let mut state = self.state.lock().await;
        let client = state.client_mut(client_id)?;
        check_redemption(client.balance, amount, redeem)?;

        let accrued = accrual(amount, redeem, accrual_percent);
        client.balance = client.balance - redeem + accrued;
        let balance = client.balance;

        state.transactions.push(Transaction {
            client_id,
            points: redeem,
            kind: TransactionKind::PurchaseRedeem,
            purchase_amount: Some(amount),
            on: today,
        });
        if accrued > 0 {
            state.transactions.push(Transaction {
                client_id,
                points: accrued,
                kind: TransactionKind::PurchaseAccrual,
                purchase_amount: None,
                on: today,
            });
        }

        Ok(PurchaseReceipt {
            client_id,
            amount,
            redeemed: redeem,
            accrued,
            balance,
        })
    }

    async fn award_birthday_bonuses(&self, today: NaiveDate, bonus: i64) -> AppResult<Vec<BirthdayAward>> {
        let mut state = self.state.lock().await;
        let due: Vec<i64> = state
            .clients
            .values()
            .filter(|c| c.birth_date.is_some_and(|b| is_birthday(b, today)))
            .filter(|c| birthday_bonus_due(c.last_birthday_bonus, today))
            .map(|c| c.id)
            .collect();

        let mut awards = Vec::with_capacity(due.len());
        for id in due {
            let balance = Self::credit(&mut state, id, bonus, TransactionKind::Birthday, today)?;
            let client = state.client_mut(id)?;
            client.last_birthday_bonus = Some(today);
            awards.push(BirthdayAward {
                client_id: id,
                full_name: client.full_name.clone(),
                points: bonus,
                balance,
            });
        }
        Ok(awards)
    }
}

#[async_trait]
impl StaffDirectory for MemoryStore {
    async fn role_of(&self, user: UserId) -> AppResult<Option<StaffRole>> {
        let state = self.state.lock().await;
        Ok(state
            .staff
            .iter()
            .find(|m| m.telegram_id == Some(user.0))
            .map(|m| m.role))
    }

    async fn add_staff(&self, member: StaffMember) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.staff.iter().any(|m| m.phone == member.phone) {
            return Err(BusinessError::DuplicatePhone(member.phone).into());
        }
        state.staff.push(member);
        Ok(())
    }

    async fn list_staff(&self) -> AppResult<Vec<StaffMember>> {
        Ok(self.state.lock().await.staff.clone())
    }

    async fn link_telegram(&self, phone: &str, user: UserId) -> AppResult<Option<StaffRole>> {
        let mut state = self.state.lock().await;
        Ok(state.staff.iter_mut().find(|m| m.phone == phone).map(|member| {
            member.telegram_id = Some(user.0);
            member.role
        }))
    }
}

#[async_trait]
impl StatsProvider for MemoryStore {
    async fn summary(&self, period: StatsPeriod, today: NaiveDate) -> AppResult<StatsSummary> {
        let since = period.since(today);
        let state = self.state.lock().await;
        let in_period = |on: NaiveDate| on >= since && on <= today;

        let mut summary = StatsSummary {
            total_clients: state.clients.len() as i64,
            new_clients: state.clients.values().filter(|c| in_period(c.registered_on)).count() as i64,
            ..StatsSummary::default()
        };
        for t in state.transactions.iter().filter(|t| in_period(t.on)) {
            if t.kind.is_credit() {
                summary.points_added += t.points;
            } else {
                summary.points_spent += t.points;
            }
            if let Some(amount) = t.purchase_amount {
                summary.purchases += 1;
                summary.revenue += amount;
            }
        }
        Ok(summary)
    }

    async fn top_clients(&self, limit: usize) -> AppResult<Vec<Client>> {
        let state = self.state.lock().await;
        let mut clients: Vec<Client> = state.clients.values().cloned().collect();
        clients.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.id.cmp(&b.id)));
        clients.truncate(limit);
        Ok(clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_client(phone: &str, birth: Option<NaiveDate>) -> NewClient {
        NewClient {
            full_name: "Иван Петров".to_string(),
            phone: phone.to_string(),
            birth_date: birth,
            telegram_id: None,
            welcome_bonus: 0,
        }
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_phone() {
        let store = MemoryStore::default();
        let today = date(2024, 6, 1);
        let client = store.register(new_client("+79990000001", None), today).await.unwrap();
        assert_eq!(client.card_number, "LC000001");

        let err = store
            .register(new_client("+79990000001", None), today)
            .await
            .unwrap_err();
        assert!(err.is_business());
    }

    #[tokio::test]
    async fn test_register_credits_welcome_bonus_once() {
        let store = MemoryStore::default();
        let today = date(2024, 6, 1);
        let with_bonus = || NewClient {
            welcome_bonus: 50,
            ..new_client("+79990000001", None)
        };

        let client = store.register(with_bonus(), today).await.unwrap();
        assert_eq!(client.balance, 50);
        assert_eq!(store.transaction_count().await, 1);

        assert!(store.register(with_bonus(), today).await.is_err());
        assert_eq!(store.transaction_count().await, 1);
        assert_eq!(store.find_by_id(client.id).await.unwrap().unwrap().balance, 50);
    }

    #[tokio::test]
    async fn test_spend_checks_balance() {
        let store = MemoryStore::default();
        let client = store
            .register(new_client("+79990000001", None), date(2024, 6, 1))
            .await
            .unwrap();
        store.add_points(client.id, 30, UserId(1), TransactionKind::Manual).await.unwrap();

        let err = store.spend_points(client.id, 50, UserId(1)).await.unwrap_err();
        assert!(err.to_string().contains("Доступно: 30"));
        assert_eq!(store.spend_points(client.id, 20, UserId(1)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_purchase_redeems_and_accrues() {
        let store = MemoryStore::default();
        let client = store
            .register(new_client("+79990000001", None), date(2024, 6, 1))
            .await
            .unwrap();
        store.set_balance(client.id, 100).await;

        let receipt = store.record_purchase(client.id, 400, 100, 5, UserId(1)).await.unwrap();
        assert_eq!(receipt.accrued, 15);
        assert_eq!(receipt.balance, 15);
    }

    #[tokio::test]
    async fn test_birthday_award_is_once_per_year() {
        let store = MemoryStore::default();
        let today = date(2024, 3, 15);
        store
            .register(new_client("+79990000001", Some(date(1990, 3, 15))), today)
            .await
            .unwrap();
        store
            .register(new_client("+79990000002", Some(date(1990, 4, 1))), today)
            .await
            .unwrap();

        let awards = store.award_birthday_bonuses(today, 10).await.unwrap();
        assert_eq!(awards.len(), 1);
        assert_eq!(awards[0].balance, 10);
        assert!(store.award_birthday_bonuses(today, 10).await.unwrap().is_empty());
    }
}
