//! SQLite-backed collaborators
//!
//! Each trait method takes a pooled connection on the blocking pool, so slow
//! disk I/O never stalls the chat lanes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::core::error::{AppResult, BusinessError};
use crate::engine::event::{StaffRole, UserId};
use crate::services::{
    accrual, birthday_bonus_due, card_number, check_redemption, is_birthday, BirthdayAward, Client, ClientDirectory,
    NewClient, PointsLedger, PurchaseReceipt, StaffDirectory, StaffMember, StatsPeriod, StatsProvider, StatsSummary,
    TransactionKind,
};
use crate::storage::db::{get_connection, DbConnection, DbPool};

const CLIENT_COLUMNS: &str =
    "id, full_name, phone, birth_date, telegram_id, balance, registered_on, last_birthday_bonus";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteStore {
    pool: Arc<DbPool>,
    timezone: FixedOffset,
}

impl SqliteStore {
    pub fn new(pool: Arc<DbPool>, timezone: FixedOffset) -> Self {
        Self { pool, timezone }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut DbConnection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            f(&mut conn)
        })
        .await?
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    let id: i64 = row.get(0)?;
    let registered_on = date_column(row, 6)?.ok_or(rusqlite::Error::InvalidColumnType(
        6,
        "registered_on".to_string(),
        Type::Null,
    ))?;
    Ok(Client {
        id,
        card_number: card_number(id),
        full_name: row.get(1)?,
        phone: row.get(2)?,
        birth_date: date_column(row, 3)?,
        telegram_id: row.get(4)?,
        balance: row.get(5)?,
        registered_on,
        last_birthday_bonus: date_column(row, 7)?,
    })
}

fn client_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Client>> {
    conn.query_row(
        &format!("SELECT {} FROM clients WHERE id = ?1", CLIENT_COLUMNS),
        params![id],
        client_from_row,
    )
    .optional()
}

fn require_client(conn: &Connection, id: i64) -> AppResult<Client> {
    client_by_id(conn, id)?.ok_or_else(|| BusinessError::ClientNotFound(card_number(id)).into())
}

fn query_clients(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<Vec<Client>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, client_from_row)?;
    rows.collect()
}

fn insert_transaction(
    conn: &Connection,
    client_id: i64,
    points: i64,
    kind: TransactionKind,
    purchase_amount: Option<i64>,
    staff: Option<UserId>,
    on: NaiveDate,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO point_transactions (client_id, points, kind, purchase_amount, staff_id, created_on)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            client_id,
            points,
            kind.as_ref(),
            purchase_amount,
            staff.map(|s| s.0),
            format_date(on)
        ],
    )?;
    Ok(())
}

fn set_balance(conn: &Connection, client_id: i64, balance: i64) -> rusqlite::Result<()> {
    conn.execute("UPDATE clients SET balance = ?1 WHERE id = ?2", params![balance, client_id])?;
    Ok(())
}

#[async_trait]
impl ClientDirectory for SqliteStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Client>> {
        self.with_conn(move |conn| Ok(client_by_id(conn, id)?)).await
    }

    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<Client>> {
        let phone = phone.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM clients WHERE phone = ?1", CLIENT_COLUMNS),
                    params![phone],
                    client_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn find_by_telegram(&self, telegram_id: i64) -> AppResult<Option<Client>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM clients WHERE telegram_id = ?1", CLIENT_COLUMNS),
                    params![telegram_id],
                    client_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn search(&self, query: &str, limit: usize) -> AppResult<Vec<Client>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        let by_id = crate::services::parse_card_number(query).unwrap_or(-1);
        self.with_conn(move |conn| {
            Ok(query_clients(
                conn,
                &format!(
                    "SELECT {} FROM clients
                     WHERE lower(full_name) LIKE ?1 OR phone LIKE ?1 OR id = ?2
                     ORDER BY id LIMIT ?3",
                    CLIENT_COLUMNS
                ),
                params![pattern, by_id, limit as i64],
            )?)
        })
        .await
    }

    async fn register(&self, client: NewClient, today: NaiveDate) -> AppResult<Client> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM clients WHERE phone = ?1)",
                params![client.phone],
                |row| row.get(0),
            )?;
            if taken {
                return Err(BusinessError::DuplicatePhone(client.phone).into());
            }

            tx.execute(
                "INSERT INTO clients (full_name, phone, birth_date, telegram_id, registered_on)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    client.full_name,
                    client.phone,
                    client.birth_date.map(format_date),
                    client.telegram_id,
                    format_date(today)
                ],
            )?;
            let id = tx.last_insert_rowid();
            if client.welcome_bonus > 0 {
                set_balance(&tx, id, client.welcome_bonus)?;
                insert_transaction(&tx, id, client.welcome_bonus, TransactionKind::Registration, None, None, today)?;
            }
            let record = require_client(&tx, id)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn list(&self, limit: usize) -> AppResult<Vec<Client>> {
        self.with_conn(move |conn| {
            Ok(query_clients(
                conn,
                &format!("SELECT {} FROM clients ORDER BY id DESC LIMIT ?1", CLIENT_COLUMNS),
                params![limit as i64],
            )?)
        })
        .await
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        self.with_conn(move |conn| Ok(conn.execute("DELETE FROM clients WHERE id = ?1", params![id])? > 0))
            .await
    }
}

#[async_trait]
impl PointsLedger for SqliteStore {
    async fn add_points(&self, client_id: i64, points: i64, staff: UserId, kind: TransactionKind) -> AppResult<i64> {
        let today = self.today();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let client = require_client(&tx, client_id)?;
            let balance = client.balance + points;
            set_balance(&tx, client_id, balance)?;
            insert_transaction(&tx, client_id, points, kind, None, Some(staff), today)?;
            tx.commit()?;
            Ok(balance)
        })
        .await
    }

    async fn spend_points(&self, client_id: i64, points: i64, staff: UserId) -> AppResult<i64> {
        let today = self.today();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let client = require_client(&tx, client_id)?;
            if client.balance < points {
                return Err(BusinessError::InsufficientBalance {
                    available: client.balance,
                    requested: points,
                }
                .into());
            }
            let balance = client.balance - points;
            set_balance(&tx, client_id, balance)?;
            insert_transaction(&tx, client_id, points, TransactionKind::Spend, None, Some(staff), today)?;
            tx.commit()?;
            Ok(balance)
        })
        .await
    }

    async fn check_redeemable(&self, client_id: i64, purchase_amount: i64, points: i64) -> AppResult<()> {
        self.with_conn(move |conn| {
            let client = require_client(conn, client_id)?;
            check_redemption(client.balance, purchase_amount, points)?;
            Ok(())
        })
        .await
    }

    async fn record_purchase(
        &self,
        client_id: i64,
        amount: i64,
        redeem: i64,
        accrual_percent: u8,
        staff: UserId,
    ) -> AppResult<PurchaseReceipt> {
        let today = self.today();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let client = require_client(&tx, client_id)?;
            check_redemption(client.balance, amount, redeem)?;

            let accrued = accrual(amount, redeem, accrual_percent);
            let balance = client.balance - redeem + accrued;
            set_balance(&tx, client_id, balance)?;
            insert_transaction(
                &tx,
                client_id,
                redeem,
                TransactionKind::PurchaseRedeem,
                Some(amount),
                Some(staff),
                today,
            )?;
            if accrued > 0 {
                insert_transaction(
                    &tx,
                    client_id,
                    accrued,
                    TransactionKind::PurchaseAccrual,
                    None,
                    Some(staff),
                    today,
                )?;
            }
            tx.commit()?;

            Ok(PurchaseReceipt {
                client_id,
                amount,
                redeemed: redeem,
                accrued,
                balance,
            })
        })
        .await
    }

    async fn award_birthday_bonuses(&self, today: NaiveDate, bonus: i64) -> AppResult<Vec<BirthdayAward>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let candidates = query_clients(
                &tx,
                &format!("SELECT {} FROM clients WHERE birth_date IS NOT NULL", CLIENT_COLUMNS),
                [],
            )?;

            let mut awards = Vec::new();
            for client in candidates {
                let due = client.birth_date.is_some_and(|b| is_birthday(b, today))
                    && birthday_bonus_due(client.last_birthday_bonus, today);
                if !due {
                    continue;
                }
                let balance = client.balance + bonus;
                tx.execute(
                    "UPDATE clients SET balance = ?1, last_birthday_bonus = ?2 WHERE id = ?3",
                    params![balance, format_date(today), client.id],
                )?;
                insert_transaction(&tx, client.id, bonus, TransactionKind::Birthday, None, None, today)?;
                awards.push(BirthdayAward {
                    client_id: client.id,
                    full_name: client.full_name,
                    points: bonus,
                    balance,
                });
            }
            tx.commit()?;
            Ok(awards)
        })
        .await
    }
}

#[async_trait]
impl StaffDirectory for SqliteStore {
    async fn role_of(&self, user: UserId) -> AppResult<Option<StaffRole>> {
        self.with_conn(move |conn| {
            let role: Option<String> = conn
                .query_row(
                    "SELECT role FROM staff WHERE telegram_id = ?1",
                    params![user.0],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(role.and_then(|r| r.parse::<StaffRole>().ok()))
        })
        .await
    }

    async fn add_staff(&self, member: StaffMember) -> AppResult<()> {
        self.with_conn(move |conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM staff WHERE phone = ?1)",
                params![member.phone],
                |row| row.get(0),
            )?;
            if taken {
                return Err(BusinessError::DuplicatePhone(member.phone).into());
            }
            conn.execute(
                "INSERT INTO staff (telegram_id, full_name, phone, role) VALUES (?1, ?2, ?3, ?4)",
                params![member.telegram_id, member.full_name, member.phone, member.role.as_ref()],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_staff(&self) -> AppResult<Vec<StaffMember>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT telegram_id, full_name, phone, role FROM staff ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                let role: String = row.get(3)?;
                Ok(StaffMember {
                    telegram_id: row.get(0)?,
                    full_name: row.get(1)?,
                    phone: row.get(2)?,
                    role: role.parse::<StaffRole>().unwrap_or(StaffRole::Barista),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn link_telegram(&self, phone: &str, user: UserId) -> AppResult<Option<StaffRole>> {
        let phone = phone.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE staff SET telegram_id = ?1 WHERE phone = ?2",
                params![user.0, phone],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            let role: String = conn.query_row("SELECT role FROM staff WHERE phone = ?1", params![phone], |row| {
                row.get(0)
            })?;
            Ok(role.parse::<StaffRole>().ok())
        })
        .await
    }
}

#[async_trait]
impl StatsProvider for SqliteStore {
    async fn summary(&self, period: StatsPeriod, today: NaiveDate) -> AppResult<StatsSummary> {
        let since = format_date(period.since(today));
        let until = format_date(today);
        self.with_conn(move |conn| {
            let total_clients: i64 = conn.query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?;
            let new_clients: i64 = conn.query_row(
                "SELECT COUNT(*) FROM clients WHERE registered_on BETWEEN ?1 AND ?2",
                params![since, until],
                |row| row.get(0),
            )?;
            let (points_added, points_spent, purchases, revenue): (i64, i64, i64, i64) = conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN kind IN ('spend', 'purchase_redeem') THEN 0 ELSE points END), 0),
                    COALESCE(SUM(CASE WHEN kind IN ('spend', 'purchase_redeem') THEN points ELSE 0 END), 0),
                    COUNT(purchase_amount),
                    COALESCE(SUM(purchase_amount), 0)
                 FROM point_transactions WHERE created_on BETWEEN ?1 AND ?2",
                params![since, until],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

            Ok(StatsSummary {
                total_clients,
                new_clients,
                points_added,
                points_spent,
                purchases,
                revenue,
            })
        })
        .await
    }

    async fn top_clients(&self, limit: usize) -> AppResult<Vec<Client>> {
        self.with_conn(move |conn| {
            Ok(query_clients(
                conn,
                &format!("SELECT {} FROM clients ORDER BY balance DESC, id LIMIT ?1", CLIENT_COLUMNS),
                params![limit as i64],
            )?)
        })
        .await
    }
}
