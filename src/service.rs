use std::sync::Arc;

use tracing::{debug, warn};

use crate::claims::{ClaimLedger, Completion};
use crate::clock::Clock;
use crate::db::Database;
use crate::error::Result;
use crate::guard::{participants_of, require_item};
use crate::listing::ListingRegistry;
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{
    Item, ItemId, Message, MessageId, NewMessage, NewRating, Participants, Rating, RatingStatus,
    RatingSummary, SaleClaim, ThreadView, TransactionSummary, UnreadCounts, UserId,
};
use crate::notify::NotificationDispatcher;
use crate::ratings::RatingLedger;
use crate::thread::ThreadStore;
use crate::unread::UnreadCounter;

/// Entry point for a transport layer.
///
/// Every method takes the authenticated caller explicitly and is timed and
/// counted under its operation name.
pub struct TradeService {
    db: Database,
    listings: Arc<dyn ListingRegistry>,
    claims: ClaimLedger,
    threads: ThreadStore,
    unread: UnreadCounter,
    ratings: RatingLedger,
    metrics: Arc<MetricsCollector>,
}

impl TradeService {
    pub fn new(
        db: Database,
        listings: Arc<dyn ListingRegistry>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        Self {
            claims: ClaimLedger::new(db.clone(), Arc::clone(&listings), dispatcher, Arc::clone(&metrics)),
            threads: ThreadStore::new(db.clone(), Arc::clone(&listings), Arc::clone(&clock)),
            unread: UnreadCounter::new(db.clone(), Arc::clone(&listings)),
            ratings: RatingLedger::new(db.clone(), Arc::clone(&listings), clock),
            db,
            listings,
            metrics,
        }
    }

    /// Process-local operation tallies
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    fn observe<T>(&self, operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let timer = OperationTimer::new(operation);
        let result = f();
        let duration = timer.finish();

        if let Err(e) = &result {
            if e.is_rejection() {
                debug!(operation, kind = e.kind(), error = %e, "Operation rejected");
            } else {
                warn!(operation, error = %e, "Operation failed");
            }
        }
        self.metrics.record_operation(operation, duration, result.as_ref().err());
        result
    }

    pub fn claim_item(&self, item_id: ItemId, buyer_id: UserId) -> Result<SaleClaim> {
        self.observe("claim_item", || self.claims.claim(item_id, buyer_id))
    }

    pub fn complete_transaction(&self, item_id: ItemId, requester_id: UserId) -> Result<Completion> {
        self.observe("complete_transaction", || self.claims.complete(item_id, requester_id))
    }

    pub fn send_message(&self, item_id: ItemId, sender_id: UserId, message: NewMessage) -> Result<Message> {
        self.observe("send_message", || self.threads.send(item_id, sender_id, message))
    }

    pub fn edit_message(&self, message_id: MessageId, requester_id: UserId, body: &str) -> Result<Message> {
        self.observe("edit_message", || self.threads.edit(message_id, requester_id, body))
    }

    pub fn delete_message(&self, message_id: MessageId, requester_id: UserId) -> Result<Message> {
        self.observe("delete_message", || self.threads.soft_delete(message_id, requester_id))
    }

    pub fn list_thread(&self, item_id: ItemId, viewer_id: UserId) -> Result<Vec<Message>> {
        self.observe("list_thread", || self.threads.list_thread(item_id, viewer_id))
    }

    pub fn submit_rating(&self, rater_id: UserId, rating: NewRating) -> Result<Rating> {
        self.observe("submit_rating", || self.ratings.submit(rater_id, rating))
    }

    pub fn get_unread_counts(&self, user_id: UserId) -> Result<UnreadCounts> {
        self.observe("get_unread_counts", || self.unread.unread_counts(user_id))
    }

    pub fn unread_for_item(&self, user_id: UserId, item_id: ItemId) -> Result<u64> {
        self.observe("unread_for_item", || self.unread.count_unread_for_item(user_id, item_id))
    }

    pub fn get_sidebar_transactions(
        &self,
        user_id: UserId,
        exclude_item_id: Option<ItemId>,
    ) -> Result<Vec<TransactionSummary>> {
        self.observe("get_sidebar_transactions", || {
            self.unread.sidebar_transactions(user_id, exclude_item_id)
        })
    }

    pub fn open_transaction_count(&self, user_id: UserId) -> Result<usize> {
        self.observe("open_transaction_count", || self.unread.open_transaction_count(user_id))
    }

    pub fn rating_summary(&self, user_id: UserId) -> Result<RatingSummary> {
        self.observe("rating_summary", || self.ratings.aggregate(user_id))
    }

    pub fn rating_status(&self, item_id: ItemId, user_id: UserId) -> Result<RatingStatus> {
        self.observe("rating_status", || self.ratings.rating_status(item_id, user_id))
    }

    pub fn completed_purchases(&self, buyer_id: UserId) -> Result<Vec<Item>> {
        self.observe("completed_purchases", || self.claims.completed_purchases(buyer_id))
    }

    pub fn participants(&self, item_id: ItemId) -> Result<Participants> {
        self.observe("participants", || {
            let item = require_item(self.listings.as_ref(), item_id)?;
            let (participants, _) = self.db.read(|conn| participants_of(conn, &item))?;
            Ok(participants)
        })
    }

    /// Everything the viewer's chat page shows for one item.
    ///
    /// Listing the thread marks the viewer's messages read, so the sidebar
    /// built afterwards already reflects it.
    pub fn open_thread(&self, item_id: ItemId, viewer_id: UserId) -> Result<ThreadView> {
        self.observe("open_thread", || {
            let messages = self.threads.list_thread(item_id, viewer_id)?;
            let item = require_item(self.listings.as_ref(), item_id)?;
            let claim = self.claims.get(item_id)?;
            let rating = self.ratings.rating_status(item_id, viewer_id)?;
            let other_transactions = self.unread.sidebar_transactions(viewer_id, Some(item_id))?;

            Ok(ThreadView {
                item,
                claim,
                messages,
                rating,
                other_transactions,
            })
        })
    }
}
