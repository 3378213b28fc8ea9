//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;
use tempfile::TempDir;

use trade_thread::notify::{CompletionNotice, NotificationDispatcher};
use trade_thread::{Database, Item, ManualClock, SqliteListings, TradeService};

pub const SELLER: i64 = 1;
pub const BUYER: i64 = 2;
pub const STRANGER: i64 = 3;
pub const OTHER_BUYER: i64 = 4;

mock! {
    pub Dispatcher {}

    #[async_trait]
    impl NotificationDispatcher for Dispatcher {
        async fn notify_completion(&self, notice: &CompletionNotice) -> anyhow::Result<()>;
    }
}

/// Fixed starting point for every test clock
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// A service over a fresh database in a temporary directory
pub struct Harness {
    pub service: TradeService,
    pub db: Database,
    pub listings: Arc<SqliteListings>,
    pub clock: Arc<ManualClock>,
    // Dropped last so the database file outlives the pool
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_dispatcher(Arc::new(trade_thread::notify::LogNotifier))
    }

    pub fn with_dispatcher(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = dir.path().join("trade.db");
        let db = Database::new(&format!("sqlite://{}", db_path.display()))
            .expect("Failed to create database");
        let listings = Arc::new(SqliteListings::new(db.clone()));
        let clock = Arc::new(ManualClock::new(t0()));
        let service = TradeService::new(db.clone(), listings.clone(), dispatcher, clock.clone());

        Self {
            service,
            db,
            listings,
            clock,
            _dir: dir,
        }
    }

    /// Register an item owned by `owner_id`
    pub fn add_item(&self, id: i64, owner_id: i64) -> Item {
        self.add_item_at(id, owner_id, t0())
    }

    pub fn add_item_at(&self, id: i64, owner_id: i64, updated_at: DateTime<Utc>) -> Item {
        let item = Item {
            id,
            owner_id,
            name: format!("Item {id}"),
            price: 1000 * id,
            updated_at,
        };
        self.listings.upsert_item(&item).expect("Failed to save item");
        item
    }

    /// Bulk-insert `count` items owned by `owner_id`, each claimed by `buyer_id`
    pub fn seed_open_claims(&self, first_id: i64, count: i64, owner_id: i64, buyer_id: i64) {
        self.db
            .immediate(|tx| {
                let mut item = tx.prepare(
                    "INSERT INTO items (id, owner_id, name, price, updated_at) \
                     VALUES (?1, ?2, 'Bulk', 100, '2025-03-01T12:00:00.000000Z')",
                )?;
                let mut claim =
                    tx.prepare("INSERT INTO sale_claims (item_id, buyer_id, is_completed) VALUES (?1, ?2, 0)")?;
                for id in first_id..first_id + count {
                    item.execute(rusqlite::params![id, owner_id])?;
                    claim.execute(rusqlite::params![id, buyer_id])?;
                }
                Ok(())
            })
            .expect("Failed to seed claims");
    }

    /// An item owned by SELLER and claimed by BUYER
    pub fn claimed_item(&self, id: i64) -> Item {
        let item = self.add_item(id, SELLER);
        self.service.claim_item(id, BUYER).expect("Failed to claim item");
        item
    }
}
