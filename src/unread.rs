//! Unread counters and the open-transaction sidebar.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::claims::ClaimLedger;
use crate::db::{get_opt_time, Database};
use crate::error::Result;
use crate::listing::ListingRegistry;
use crate::models::{ItemId, Participants, TransactionSummary, UnreadCounts, UserId};
use crate::schema::{messages, sale_claims};

/// Per-item activity of one user
struct ItemActivity {
    unread: u64,
    latest: Option<DateTime<Utc>>,
}

/// Aggregates unread messages per user
#[derive(Clone)]
pub struct UnreadCounter {
    db: Database,
    listings: Arc<dyn ListingRegistry>,
}

impl UnreadCounter {
    pub fn new(db: Database, listings: Arc<dyn ListingRegistry>) -> Self {
        Self { db, listings }
    }

    fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<u64> {
        let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    /// Unread messages addressed to `user_id` across all items
    pub fn count_unread(&self, user_id: UserId) -> Result<u64> {
        self.db.read(|conn| {
            Self::count(
                conn,
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE {} = ? AND {} = 0 AND {} IS NULL",
                    messages::TABLE,
                    messages::RECEIVER_ID,
                    messages::IS_READ,
                    messages::DELETED_AT
                ),
                params![user_id],
            )
        })
    }

    /// Unread messages addressed to `user_id` on one item
    pub fn count_unread_for_item(&self, user_id: UserId, item_id: ItemId) -> Result<u64> {
        self.db.read(|conn| {
            Self::count(
                conn,
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE {} = ? AND {} = ? AND {} = 0 AND {} IS NULL",
                    messages::TABLE,
                    messages::RECEIVER_ID,
                    messages::ITEM_ID,
                    messages::IS_READ,
                    messages::DELETED_AT
                ),
                params![user_id, item_id],
            )
        })
    }

    /// Unread messages addressed to `user_id` on transactions still open,
    /// whichever side of them the user is on
    pub fn count_unread_open_transactions(&self, user_id: UserId) -> Result<u64> {
        Ok(self.unread_counts(user_id)?.open_transactions)
    }

    /// All unread counters for a user in one pass
    pub fn unread_counts(&self, user_id: UserId) -> Result<UnreadCounts> {
        let counts = self.db.read(|conn| {
            let (as_buyer, as_seller): (i64, i64) = conn.query_row(
                &format!(
                    "SELECT
                        COALESCE(SUM(CASE WHEN c.{buyer} = ?1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN c.{buyer} <> ?1 THEN 1 ELSE 0 END), 0)
                     FROM {messages} m
                     JOIN {claims} c ON c.{claim_item} = m.{item}
                     WHERE m.{receiver} = ?1 AND m.{read} = 0 AND m.{deleted} IS NULL
                       AND c.{completed} = 0",
                    buyer = sale_claims::BUYER_ID,
                    messages = messages::TABLE,
                    claims = sale_claims::TABLE,
                    claim_item = sale_claims::ITEM_ID,
                    item = messages::ITEM_ID,
                    receiver = messages::RECEIVER_ID,
                    read = messages::IS_READ,
                    deleted = messages::DELETED_AT,
                    completed = sale_claims::IS_COMPLETED
                ),
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let total = Self::count(
                conn,
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE {} = ? AND {} = 0 AND {} IS NULL",
                    messages::TABLE,
                    messages::RECEIVER_ID,
                    messages::IS_READ,
                    messages::DELETED_AT
                ),
                params![user_id],
            )?;

            let as_buyer = u64::try_from(as_buyer).unwrap_or_default();
            let as_seller = u64::try_from(as_seller).unwrap_or_default();
            Ok(UnreadCounts {
                total,
                open_transactions: as_buyer + as_seller,
                as_buyer,
                as_seller,
            })
        })?;

        debug!(user_id, total = counts.total, open = counts.open_transactions, "Unread counts");
        Ok(counts)
    }

    /// Unread count and latest visible message time per item for `user_id`
    fn activity(conn: &Connection, user_id: UserId) -> Result<HashMap<ItemId, ItemActivity>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {item},
                    SUM(CASE WHEN {receiver} = ?1 AND {read} = 0 THEN 1 ELSE 0 END),
                    MAX({created}) AS latest
             FROM {table}
             WHERE {deleted} IS NULL AND ({sender} = ?1 OR {receiver} = ?1)
             GROUP BY {item}",
            item = messages::ITEM_ID,
            receiver = messages::RECEIVER_ID,
            read = messages::IS_READ,
            created = messages::CREATED_AT,
            table = messages::TABLE,
            deleted = messages::DELETED_AT,
            sender = messages::SENDER_ID
        ))?;

        let rows = stmt.query_map(params![user_id], |row| {
            let item_id: ItemId = row.get(0)?;
            let unread: i64 = row.get(1)?;
            Ok((
                item_id,
                ItemActivity {
                    unread: u64::try_from(unread).unwrap_or_default(),
                    latest: get_opt_time(row, "latest")?,
                },
            ))
        })?;

        let activity = rows.collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(activity)
    }

    /// Open transactions `user_id` takes part in, most recently active first.
    ///
    /// Ties on the activity timestamp are broken by ascending item id.
    pub fn sidebar_transactions(
        &self,
        user_id: UserId,
        exclude_item_id: Option<ItemId>,
    ) -> Result<Vec<TransactionSummary>> {
        let owned = self.listings.item_ids_owned_by(user_id)?;
        let open = self.db.read(|conn| ClaimLedger::open_claims_of(conn, user_id, &owned))?;
        let buyers: HashMap<ItemId, UserId> = open
            .iter()
            .filter(|c| Some(c.item_id) != exclude_item_id)
            .map(|c| (c.item_id, c.buyer_id))
            .collect();
        if buyers.is_empty() {
            return Ok(vec![]);
        }

        let item_ids: Vec<ItemId> = buyers.keys().copied().collect();
        let items = self.listings.get_items(&item_ids)?;
        let activity = self.db.read(|conn| Self::activity(conn, user_id))?;

        let mut sidebar: Vec<TransactionSummary> = items
            .into_iter()
            .filter_map(|item| {
                let participants = Participants {
                    owner_id: item.owner_id,
                    buyer_id: buyers.get(&item.id).copied(),
                };
                let role = participants.role_of(user_id)?;
                let counterparty_id = participants.counterparty_of(user_id)?;
                let seen = activity.get(&item.id);
                Some(TransactionSummary {
                    role,
                    counterparty_id,
                    unread_count: seen.map_or(0, |a| a.unread),
                    latest_message_at: seen.and_then(|a| a.latest).unwrap_or(item.updated_at),
                    item,
                })
            })
            .collect();

        sidebar.sort_by(|a, b| {
            b.latest_message_at
                .cmp(&a.latest_message_at)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });

        debug!(user_id, count = sidebar.len(), "Sidebar built");
        Ok(sidebar)
    }

    /// Number of open transactions `user_id` takes part in
    pub fn open_transaction_count(&self, user_id: UserId) -> Result<usize> {
        Ok(self.sidebar_transactions(user_id, None)?.len())
    }
}
