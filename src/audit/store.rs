//! Event Store
//!
//! Durable, append-only SQLite persistence for audit events. Writes go
//! through an [`AppendSession`], which holds the store's append lock and an
//! open transaction from the moment the chain tail is read until the new
//! record commits.

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::audit::entry::{format_timestamp, AuditEvent, EventFilter, EventType, StoredRecord};
use crate::error::{AuditError, AuditResult};

pub const AUDIT_LOG_SCHEMA: &str = include_str!("../../migrations/001_audit_log.sql");

/// How far ahead of the clock a tail timestamp may be and still hold back new records
const MAX_TAIL_SKEW_SECS: i64 = 1;

const SELECT_RECORD: &str = "SELECT id, timestamp, event_type, system_name, actor, details, \
                             prev_checksum, checksum FROM audit_log";

/// Connection settings for an on-disk store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            max_connections: 4,
        }
    }
}

/// Checksum and timestamp of the highest-id record
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ChainTail {
    pub id: i64,
    pub timestamp: String,
    pub checksum: String,
}

/// Fields of a record about to be appended; the timestamp comes from the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewRecord<'a> {
    pub event_type: EventType,
    pub system_name: &'a str,
    pub actor: &'a str,
    pub details: &'a str,
    pub prev_checksum: Option<&'a str>,
    pub checksum: &'a str,
}

/// Append-only audit event store backed by SQLite
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
    append_lock: Arc<Mutex<()>>,
}

impl EventStore {
    /// Open (creating if needed) the store at `database_url` and ensure its schema
    pub async fn open(database_url: &str, options: &StoreOptions) -> AuditResult<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect_options)
            .await?;

        let store = Self::from_pool(pool);
        store.run_migrations().await?;
        info!("Audit store opened at {}", database_url);
        Ok(store)
    }

    /// Open a private in-memory store, mainly for tests
    pub async fn new_in_memory() -> AuditResult<Self> {
        // Every connection to `:memory:` is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        let store = Self::from_pool(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn run_migrations(&self) -> AuditResult<()> {
        sqlx::query(AUDIT_LOG_SCHEMA).execute(&self.pool).await?;
        debug!("Audit log schema ensured");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start an append: take the append lock, open a transaction and read the tail.
    ///
    /// Other appends on this store wait until the session is committed or dropped.
    /// The write lock is taken before the tail read, so appends from other
    /// handles on the same file queue behind the busy timeout.
    pub async fn begin_append(&self) -> AuditResult<AppendSession<'_>> {
        let guard = self.append_lock.lock().await;
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let tail: Option<ChainTail> = sqlx::query_as(
            "SELECT id, timestamp, checksum FROM audit_log ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        // Truncated to the stored precision so the returned event equals the stored one
        let assigned_at = next_timestamp(Utc::now().trunc_subsecs(6), tail.as_ref());

        Ok(AppendSession {
            _guard: guard,
            tx,
            timestamp: format_timestamp(&assigned_at),
            assigned_at,
            tail,
        })
    }

    /// Checksum of the most recent record, if any
    pub async fn last_checksum(&self) -> AuditResult<Option<String>> {
        let checksum =
            sqlx::query_scalar("SELECT checksum FROM audit_log ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(checksum)
    }

    /// Events matching every set filter field, newest first, at most `limit`.
    ///
    /// Rows that no longer decode are skipped with a warning; `verify_integrity`
    /// reports them.
    pub async fn query(&self, filter: &EventFilter, limit: u32) -> AuditResult<Vec<AuditEvent>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_RECORD);
        builder.push(" WHERE 1=1");

        if let Some(system_name) = &filter.system_name {
            builder.push(" AND system_name = ").push_bind(system_name.clone());
        }
        if let Some(event_type) = filter.event_type {
            builder.push(" AND event_type = ").push_bind(event_type.as_str());
        }
        if let Some(since) = &filter.since {
            builder.push(" AND timestamp >= ").push_bind(format_timestamp(since));
        }
        builder.push(" ORDER BY id DESC LIMIT ").push_bind(i64::from(limit));

        let records: Vec<StoredRecord> = builder.build_query_as().fetch_all(&self.pool).await?;
        let events = records
            .into_iter()
            .filter_map(|record| match AuditEvent::try_from(record) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Skipping unreadable audit record: {}", e);
                    None
                }
            })
            .collect();
        Ok(events)
    }

    /// Every stored record in ascending id order, read as one snapshot
    pub async fn iterate_all(&self) -> AuditResult<Vec<StoredRecord>> {
        let records = sqlx::query_as(&format!("{} ORDER BY id ASC", SELECT_RECORD))
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    pub async fn count(&self) -> AuditResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// An in-progress append holding the append lock and an open transaction.
///
/// Dropping the session without calling [`AppendSession::append`] rolls the
/// transaction back and releases the lock.
pub struct AppendSession<'a> {
    _guard: MutexGuard<'a, ()>,
    tx: Transaction<'static, Sqlite>,
    assigned_at: DateTime<Utc>,
    timestamp: String,
    tail: Option<ChainTail>,
}

impl<'a> AppendSession<'a> {
    pub fn tail(&self) -> Option<&ChainTail> {
        self.tail.as_ref()
    }

    /// Checksum the next record must chain from
    pub fn last_checksum(&self) -> Option<&str> {
        self.tail.as_ref().map(|t| t.checksum.as_str())
    }

    /// Timestamp assigned to the record, as stored and hashed
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }

    /// Persist the record and commit; returns the new id
    pub async fn append(mut self, record: NewRecord<'_>) -> AuditResult<i64> {
        if record.prev_checksum != self.last_checksum() {
            return Err(AuditError::ChainConflict {
                expected: self.last_checksum().map(str::to_string),
                supplied: record.prev_checksum.map(str::to_string),
            });
        }

        let result = sqlx::query(
            r#"
            INSERT INTO audit_log
            (timestamp, event_type, system_name, actor, details, prev_checksum, checksum)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.timestamp)
        .bind(record.event_type.as_str())
        .bind(record.system_name)
        .bind(record.actor)
        .bind(record.details)
        .bind(record.prev_checksum)
        .bind(record.checksum)
        .execute(&mut *self.tx)
        .await?;

        let id = result.last_insert_rowid();
        self.tx.commit().await?;

        debug!("Appended audit record {} ({})", id, record.event_type);
        Ok(id)
    }
}

/// Current time, held at the tail's timestamp when the tail is only slightly ahead.
///
/// A tail further in the future than `MAX_TAIL_SKEW_SECS` is not trusted.
fn next_timestamp(now: DateTime<Utc>, tail: Option<&ChainTail>) -> DateTime<Utc> {
    let tail_time = tail
        .and_then(|t| DateTime::parse_from_rfc3339(&t.timestamp).ok())
        .map(|t| t.with_timezone(&Utc));

    match tail_time {
        Some(previous) if previous > now => {
            if previous - now <= chrono::Duration::seconds(MAX_TAIL_SKEW_SECS) {
                previous
            } else {
                warn!(
                    "Tail timestamp {} is ahead of the clock; using current time",
                    previous
                );
                now
            }
        }
        _ => now,
    }
}
