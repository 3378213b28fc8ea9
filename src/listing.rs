//! Listing registry seam.
//!
//! Items are owned by an external listing service; this crate only reads
//! them. `SqliteListings` serves them from the local `items` table.

use rusqlite::{params, params_from_iter, OptionalExtension};

use crate::db::{map_item, placeholders, to_db_time, Database, IN_BATCH};
use crate::error::Result;
use crate::models::{Item, ItemId, UserId};
use crate::schema::items;

/// Read-only item lookup
pub trait ListingRegistry: Send + Sync {
    /// Look up a single item
    fn get_item(&self, item_id: ItemId) -> Result<Option<Item>>;

    /// Look up several items; missing ids are skipped
    fn get_items(&self, item_ids: &[ItemId]) -> Result<Vec<Item>> {
        let mut found = Vec::with_capacity(item_ids.len());
        for id in item_ids {
            if let Some(item) = self.get_item(*id)? {
                found.push(item);
            }
        }
        Ok(found)
    }

    /// Ids of every item listed by `owner_id`
    fn item_ids_owned_by(&self, owner_id: UserId) -> Result<Vec<ItemId>>;
}

/// Listing registry backed by the `items` table
#[derive(Clone)]
pub struct SqliteListings {
    db: Database,
}

impl SqliteListings {
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace a listing (local seeding only)
    pub fn upsert_item(&self, item: &Item) -> Result<()> {
        self.db.immediate(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT({}) DO UPDATE SET {} = excluded.{}, {} = excluded.{}, {} = excluded.{}, {} = excluded.{}",
                    items::TABLE,
                    items::ID,
                    items::OWNER_ID,
                    items::NAME,
                    items::PRICE,
                    items::UPDATED_AT,
                    items::ID,
                    items::OWNER_ID,
                    items::OWNER_ID,
                    items::NAME,
                    items::NAME,
                    items::PRICE,
                    items::PRICE,
                    items::UPDATED_AT,
                    items::UPDATED_AT
                ),
                params![item.id, item.owner_id, item.name, item.price, to_db_time(item.updated_at)],
            )?;
            Ok(())
        })
    }
}

impl ListingRegistry for SqliteListings {
    fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        self.db.read(|conn| {
            let item = conn
                .query_row(
                    &format!("SELECT * FROM {} WHERE {} = ?", items::TABLE, items::ID),
                    params![item_id],
                    map_item,
                )
                .optional()?;
            Ok(item)
        })
    }

    fn get_items(&self, item_ids: &[ItemId]) -> Result<Vec<Item>> {
        if item_ids.is_empty() {
            return Ok(vec![]);
        }

        self.db.read(|conn| {
            let mut found = Vec::with_capacity(item_ids.len());
            for batch in item_ids.chunks(IN_BATCH) {
                let mut stmt = conn.prepare(&format!(
                    "SELECT * FROM {} WHERE {} IN ({})",
                    items::TABLE,
                    items::ID,
                    placeholders(batch.len())
                ))?;
                let rows = stmt.query_map(params_from_iter(batch.iter()), map_item)?;
                for row in rows {
                    found.push(row?);
                }
            }
            Ok(found)
        })
    }

    fn item_ids_owned_by(&self, owner_id: UserId) -> Result<Vec<ItemId>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} WHERE {} = ? ORDER BY {}",
                items::ID,
                items::TABLE,
                items::OWNER_ID,
                items::ID
            ))?;
            let ids = stmt
                .query_map(params![owner_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}
