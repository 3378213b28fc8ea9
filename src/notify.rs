//! Completion notification seam.
//!
//! Delivery mechanics (mail, push) live outside this crate. The Completion
//! Gate hands a `CompletionNotice` to whatever dispatcher it was built with.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{Item, UserId};

/// What the seller is told when a buyer confirms completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionNotice {
    pub item: Item,
    pub buyer_id: UserId,
    pub seller_id: UserId,
}

impl CompletionNotice {
    #[must_use]
    pub fn subject(&self) -> String {
        format!("Transaction completed - {}", self.item.name)
    }

    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "User {} confirmed completion of the purchase of \"{}\" (price {}). \
             Please rate the buyer (user {}).",
            self.buyer_id, self.item.name, self.item.price, self.buyer_id
        )
    }
}

/// Best-effort delivery of completion notices
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notice to the seller
    async fn notify_completion(&self, notice: &CompletionNotice) -> anyhow::Result<()>;
}

/// Writes the rendered notice to the structured log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify_completion(&self, notice: &CompletionNotice) -> anyhow::Result<()> {
        info!(
            item_id = notice.item.id,
            seller_id = notice.seller_id,
            buyer_id = notice.buyer_id,
            subject = %notice.subject(),
            body = %notice.body(),
            "Completion notice dispatched"
        );
        Ok(())
    }
}

/// Dispatcher used when notifications are switched off in configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl NotificationDispatcher for DisabledNotifier {
    async fn notify_completion(&self, notice: &CompletionNotice) -> anyhow::Result<()> {
        debug!(item_id = notice.item.id, "Notifications disabled, notice dropped");
        Ok(())
    }
}
