//! Persistence of received SMS with duplicate suppression.
//!
//! Two messages are duplicates when they share the sender and the
//! [`message_hash`](crate::message::message_hash) and were received within
//! the configured window of each other.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use smsgw_common::config::DatabaseSettings;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

use crate::error::ReceiveError;
use crate::message;

/// A received SMS ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReceivedSms {
    pub sender: String,
    pub message: String,
    pub received_at: NaiveDateTime,
    /// `modems.id` of the receiving modem, when it is registered.
    pub modem_id: Option<i64>,
}

/// A `received_sms` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedSmsRow {
    pub id: u64,
    pub sender: String,
    pub message: String,
    pub received_at: NaiveDateTime,
    pub modem_id: Option<i64>,
    pub message_hash: String,
    pub is_unicode: bool,
    pub parts_count: u32,
}

impl ReceivedSmsRow {
    fn prepare(sms: &NewReceivedSms) -> Self {
        Self {
            id: 0,
            sender: sms.sender.clone(),
            message: sms.message.clone(),
            received_at: sms.received_at,
            modem_id: sms.modem_id,
            message_hash: message::message_hash(&sms.sender, &sms.message, sms.received_at),
            is_unicode: message::contains_unicode(&sms.message),
            parts_count: message::parts_count(&sms.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Inserted with this row id.
    Stored(u64),
    Duplicate,
}

#[async_trait]
pub trait ReceivedSmsStore: Send + Sync {
    /// `modems.id` of the modem registered on `device_path`.
    async fn modem_id_by_device(&self, device_path: &str) -> Result<Option<i64>, ReceiveError>;

    /// Insert `sms` unless it duplicates a stored message.
    async fn store(&self, sms: &NewReceivedSms) -> Result<StoreOutcome, ReceiveError>;
}

// ── MySQL ───────────────────────────────────────────────────────────

/// Store backed by the web application's MySQL schema.
pub struct MySqlStore {
    pool: MySqlPool,
    window: TimeDelta,
}

/// Connection options for the configured credentials.
pub fn connect_options(db: &DatabaseSettings) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .username(&db.user)
        .database(&db.database);
    if db.password.is_empty() {
        options
    } else {
        options.password(&db.password)
    }
}

impl MySqlStore {
    /// Connect with a `mysql://` URL.
    pub async fn connect(database_url: &str, window: TimeDelta) -> Result<Self, ReceiveError> {
        let options: MySqlConnectOptions = database_url.parse()?;
        Self::connect_with(options, window).await
    }

    pub async fn connect_with(
        options: MySqlConnectOptions,
        window: TimeDelta,
    ) -> Result<Self, ReceiveError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;
        tracing::debug!("connected to MySQL");
        Ok(Self::from_pool(pool, window))
    }

    pub fn from_pool(pool: MySqlPool, window: TimeDelta) -> Self {
        Self { pool, window }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ReceivedSmsStore for MySqlStore {
    async fn modem_id_by_device(&self, device_path: &str) -> Result<Option<i64>, ReceiveError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT CAST(id AS SIGNED) FROM modems WHERE device_path = ? LIMIT 1",
        )
        .bind(device_path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn store(&self, sms: &NewReceivedSms) -> Result<StoreOutcome, ReceiveError> {
        let row = ReceivedSmsRow::prepare(sms);
        let (from, until) = window_bounds(row.received_at, self.window);

        let duplicates = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM received_sms \
             WHERE sender = ? AND message_hash = ? AND received_at BETWEEN ? AND ?",
        )
        .bind(&row.sender)
        .bind(&row.message_hash)
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        if duplicates > 0 {
            tracing::info!(sender = %row.sender, "duplicate SMS ignored");
            return Ok(StoreOutcome::Duplicate);
        }

        let result = sqlx::query(
            "INSERT INTO received_sms \
             (sender, message, received_at, modem_id, message_hash, is_unicode, parts_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.sender)
        .bind(&row.message)
        .bind(row.received_at)
        .bind(row.modem_id)
        .bind(&row.message_hash)
        .bind(row.is_unicode)
        .bind(row.parts_count)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id();
        tracing::info!(id, sender = %row.sender, "SMS stored");
        Ok(StoreOutcome::Stored(id))
    }
}

/// `at ± window`, clamped to the representable range.
fn window_bounds(at: NaiveDateTime, window: TimeDelta) -> (NaiveDateTime, NaiveDateTime) {
    (
        at.checked_sub_signed(window).unwrap_or(NaiveDateTime::MIN),
        at.checked_add_signed(window).unwrap_or(NaiveDateTime::MAX),
    )
}

// ── In-memory ───────────────────────────────────────────────────────

/// Store with the same semantics as [`MySqlStore`], kept in memory.
pub struct MemoryStore {
    rows: Mutex<Vec<ReceivedSmsRow>>,
    modems: HashMap<String, i64>,
    window: TimeDelta,
}

impl MemoryStore {
    pub fn new(window: TimeDelta) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            modems: HashMap::new(),
            window,
        }
    }

    /// Register a modem row for `device_path`.
    pub fn with_modem(mut self, device_path: &str, id: i64) -> Self {
        self.modems.insert(device_path.to_string(), id);
        self
    }

    pub fn rows(&self) -> Vec<ReceivedSmsRow> {
        self.rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ReceivedSmsStore for MemoryStore {
    async fn modem_id_by_device(&self, device_path: &str) -> Result<Option<i64>, ReceiveError> {
        Ok(self.modems.get(device_path).copied())
    }

    async fn store(&self, sms: &NewReceivedSms) -> Result<StoreOutcome, ReceiveError> {
        let mut row = ReceivedSmsRow::prepare(sms);
        let (from, until) = window_bounds(row.received_at, self.window);
        let mut rows = self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let duplicate = rows.iter().any(|r| {
            r.sender == row.sender
                && r.message_hash == row.message_hash
                && (from..=until).contains(&r.received_at)
        });
        if duplicate {
            tracing::info!(sender = %row.sender, "duplicate SMS ignored");
            return Ok(StoreOutcome::Duplicate);
        }

        row.id = rows.len() as u64 + 1;
        let id = row.id;
        rows.push(row);
        Ok(StoreOutcome::Stored(id))
    }
}
