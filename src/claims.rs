//! Sale claim ledger and completion gate.

use std::sync::{Arc, OnceLock};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::db::{conflict_on_duplicate, map_claim, placeholders, Database, IN_BATCH};
use crate::error::{Result, TradeError};
use crate::guard::require_item;
use crate::listing::ListingRegistry;
use crate::metrics::MetricsCollector;
use crate::models::{ClaimState, Item, ItemId, SaleClaim, UserId};
use crate::notify::{CompletionNotice, NotificationDispatcher};
use crate::schema::sale_claims;

/// Outcome of a completion request
#[derive(Debug)]
pub struct Completion {
    /// The claim after the call (always completed)
    pub claim: SaleClaim,
    /// False when the transaction was already completed before this call
    pub newly_completed: bool,
    /// Pending notification task, if one was dispatched
    pub notification: Option<JoinHandle<()>>,
}

/// Records the single buyer of each item and drives completion
#[derive(Clone)]
pub struct ClaimLedger {
    db: Database,
    listings: Arc<dyn ListingRegistry>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    metrics: Arc<MetricsCollector>,
}

impl ClaimLedger {
    pub fn new(
        db: Database,
        listings: Arc<dyn ListingRegistry>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            db,
            listings,
            dispatcher,
            metrics,
        }
    }

    /// Look up the claim on an item using an open connection
    pub fn find(conn: &Connection, item_id: ItemId) -> Result<Option<SaleClaim>> {
        let claim = conn
            .query_row(
                &format!(
                    "SELECT * FROM {} WHERE {} = ?",
                    sale_claims::TABLE,
                    sale_claims::ITEM_ID
                ),
                params![item_id],
                map_claim,
            )
            .optional()?;
        Ok(claim)
    }

    /// Open claims `user_id` takes part in, as buyer or as owner of one of
    /// `owned_item_ids`
    pub fn open_claims_of(
        conn: &Connection,
        user_id: UserId,
        owned_item_ids: &[ItemId],
    ) -> Result<Vec<SaleClaim>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} = ? AND {} = 0",
            sale_claims::TABLE,
            sale_claims::BUYER_ID,
            sale_claims::IS_COMPLETED
        ))?;
        let mut claims = stmt
            .query_map(params![user_id], map_claim)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for batch in owned_item_ids.chunks(IN_BATCH) {
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM {} WHERE {} = 0 AND {} IN ({})",
                sale_claims::TABLE,
                sale_claims::IS_COMPLETED,
                sale_claims::ITEM_ID,
                placeholders(batch.len())
            ))?;
            let rows = stmt.query_map(params_from_iter(batch.iter()), map_claim)?;
            for row in rows {
                claims.push(row?);
            }
        }

        claims.sort_by_key(|c| c.item_id);
        claims.dedup_by_key(|c| c.item_id);
        Ok(claims)
    }

    /// Get the claim on an item, if any
    pub fn get(&self, item_id: ItemId) -> Result<Option<SaleClaim>> {
        self.db.read(|conn| Self::find(conn, item_id))
    }

    /// Reserve an item for `buyer_id`
    pub fn claim(&self, item_id: ItemId, buyer_id: UserId) -> Result<SaleClaim> {
        let item = require_item(self.listings.as_ref(), item_id)?;
        if item.owner_id == buyer_id {
            return Err(TradeError::Forbidden(format!(
                "user {buyer_id} owns item {item_id} and cannot claim it"
            )));
        }

        self.db.immediate(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}, {}, {}) VALUES (?1, ?2, 0)",
                    sale_claims::TABLE,
                    sale_claims::ITEM_ID,
                    sale_claims::BUYER_ID,
                    sale_claims::IS_COMPLETED
                ),
                params![item_id, buyer_id],
            )
            .map_err(|e| conflict_on_duplicate(e, &format!("item {item_id} is already claimed")))?;
            Ok(())
        })?;

        info!(item_id, buyer_id, "Item claimed");
        Ok(SaleClaim {
            item_id,
            buyer_id,
            state: ClaimState::Open,
        })
    }

    /// Buyer confirms the transaction.
    ///
    /// Completing an already completed transaction succeeds without
    /// dispatching a second notice.
    pub fn complete(&self, item_id: ItemId, requester_id: UserId) -> Result<Completion> {
        let item = require_item(self.listings.as_ref(), item_id)?;

        let (claim, newly_completed) = self.db.immediate(|tx| {
            let claim = Self::find(tx, item_id)?.ok_or_else(|| {
                TradeError::Forbidden(format!("item {item_id} has no claim to complete"))
            })?;
            if claim.buyer_id != requester_id {
                return Err(TradeError::Forbidden(format!(
                    "only the buyer may complete item {item_id}"
                )));
            }

            let changed = tx.execute(
                &format!(
                    "UPDATE {} SET {} = 1 WHERE {} = ? AND {} = 0",
                    sale_claims::TABLE,
                    sale_claims::IS_COMPLETED,
                    sale_claims::ITEM_ID,
                    sale_claims::IS_COMPLETED
                ),
                params![item_id],
            )?;
            Ok((claim, changed == 1))
        })?;

        let claim = SaleClaim {
            state: ClaimState::Completed,
            ..claim
        };

        if !newly_completed {
            debug!(item_id, "Transaction already completed");
            return Ok(Completion {
                claim,
                newly_completed,
                notification: None,
            });
        }

        info!(item_id, buyer_id = claim.buyer_id, "Transaction completed");
        let notification = self.dispatch(CompletionNotice {
            buyer_id: claim.buyer_id,
            seller_id: item.owner_id,
            item,
        });

        Ok(Completion {
            claim,
            newly_completed,
            notification,
        })
    }

    /// Items `buyer_id` bought whose transaction is completed
    pub fn completed_purchases(&self, buyer_id: UserId) -> Result<Vec<Item>> {
        let item_ids = self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} WHERE {} = ? AND {} = 1",
                sale_claims::ITEM_ID,
                sale_claims::TABLE,
                sale_claims::BUYER_ID,
                sale_claims::IS_COMPLETED
            ))?;
            let ids = stmt
                .query_map(params![buyer_id], |row| row.get::<_, ItemId>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })?;

        let mut items = self.listings.get_items(&item_ids)?;
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    /// Spawn the notice onto the caller's runtime, or onto a shared
    /// background runtime when there is none; failures are only logged
    fn dispatch(&self, notice: CompletionNotice) -> Option<JoinHandle<()>> {
        let Some(handle) = Handle::try_current()
            .ok()
            .or_else(|| notification_runtime().map(|rt| rt.handle().clone()))
        else {
            error!(item_id = notice.item.id, "No runtime available, completion notice dropped");
            self.metrics.record_notification(false);
            return None;
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let metrics = Arc::clone(&self.metrics);
        Some(handle.spawn(async move {
            match dispatcher.notify_completion(&notice).await {
                Ok(()) => metrics.record_notification(true),
                Err(e) => {
                    error!(item_id = notice.item.id, error = %e, "Completion notice failed");
                    metrics.record_notification(false);
                },
            }
        }))
    }
}

/// Runtime for notices sent from callers outside any tokio context
fn notification_runtime() -> Option<&'static Runtime> {
    static RUNTIME: OnceLock<Option<Runtime>> = OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("trade-thread-notify")
                .enable_all()
                .build()
                .map_err(|e| error!(error = %e, "Failed to start notification runtime"))
                .ok()
        })
        .as_ref()
}
