use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{Result, TradeError};
use crate::models::{ClaimState, Item, Message, MessageState, Rating, SaleClaim};
use crate::schema::{items, messages, ratings, sale_claims};

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager for handling connections and transactions
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) a database file with default pool settings
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_config(&DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        })
    }

    /// Open (or create) a database file using the given settings
    pub fn with_config(config: &DatabaseConfig) -> Result<Self> {
        let path = strip_sqlite_scheme(&config.url);

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            // Wait on locks before anything else touches the file
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")
        });
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)?;

        // Run migrations
        let conn = pool.get()?;
        Self::run_migrations(&conn)?;

        info!(path, max_connections = config.max_connections, "Database opened");
        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!(
            "../migrations/2025-02-22-000000_create_trade_tables/up.sql"
        ))?;
        debug!("Database migrations complete");
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`; any error rolls
    /// everything back, so rejected mutations never leave partial writes.
    pub fn immediate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run a read-only closure on a pooled connection
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.get_connection()?;
        f(&conn)
    }
}

/// Accept `sqlite://path`, `sqlite:path` or a bare path
fn strip_sqlite_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

/// Ids bound per `IN (...)` lookup, well under SQLite's variable limit
pub(crate) const IN_BATCH: usize = 500;

/// `?, ?, ...` for an `IN` list of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Fixed-width timestamp text; lexical order equals time order
pub(crate) fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_time(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a timestamp column written by `to_db_time`
pub(crate) fn get_time(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let idx = row.as_ref().column_index(column)?;
    let text: String = row.get(idx)?;
    parse_db_time(idx, &text)
}

/// Read a nullable timestamp column
pub(crate) fn get_opt_time(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let idx = row.as_ref().column_index(column)?;
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_db_time(idx, &t)).transpose()
}

/// True if the error is a UNIQUE or PRIMARY KEY violation
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Map a uniqueness violation to `Conflict`, pass everything else through
pub(crate) fn conflict_on_duplicate(err: rusqlite::Error, what: &str) -> TradeError {
    if is_unique_violation(&err) {
        TradeError::Conflict(what.to_string())
    } else {
        TradeError::Database(err)
    }
}

/// Map a database row to an Item
pub(crate) fn map_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(items::ID)?,
        owner_id: row.get(items::OWNER_ID)?,
        name: row.get(items::NAME)?,
        price: row.get(items::PRICE)?,
        updated_at: get_time(row, items::UPDATED_AT)?,
    })
}

/// Map a database row to a SaleClaim
pub(crate) fn map_claim(row: &Row<'_>) -> rusqlite::Result<SaleClaim> {
    Ok(SaleClaim {
        item_id: row.get(sale_claims::ITEM_ID)?,
        buyer_id: row.get(sale_claims::BUYER_ID)?,
        state: ClaimState::from_completed(row.get(sale_claims::IS_COMPLETED)?),
    })
}

/// Map a database row to a Message; the only place `deleted_at` is interpreted
pub(crate) fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(messages::ID)?,
        item_id: row.get(messages::ITEM_ID)?,
        sender_id: row.get(messages::SENDER_ID)?,
        receiver_id: row.get(messages::RECEIVER_ID)?,
        body: row.get(messages::BODY)?,
        attachment_ref: row.get(messages::ATTACHMENT_REF)?,
        is_read: row.get(messages::IS_READ)?,
        is_edited: row.get(messages::IS_EDITED)?,
        edited_at: get_opt_time(row, messages::EDITED_AT)?,
        created_at: get_time(row, messages::CREATED_AT)?,
        state: MessageState::from_deleted_at(get_opt_time(row, messages::DELETED_AT)?),
    })
}

/// Map a database row to a Rating
pub(crate) fn map_rating(row: &Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: row.get(ratings::ID)?,
        rater_id: row.get(ratings::RATER_ID)?,
        rated_user_id: row.get(ratings::RATED_USER_ID)?,
        item_id: row.get(ratings::ITEM_ID)?,
        score: row.get(ratings::SCORE)?,
        comment: row.get(ratings::COMMENT)?,
        created_at: get_time(row, ratings::CREATED_AT)?,
    })
}
