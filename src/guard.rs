//! Authorization guard.
//!
//! Every thread, claim and rating operation asks this module who the two
//! participants of an item are. Counterparty resolution lives here and
//! nowhere else.

use rusqlite::Connection;

use crate::claims::ClaimLedger;
use crate::error::{Result, TradeError};
use crate::listing::ListingRegistry;
use crate::models::{Item, ItemId, Participants, SaleClaim, TransactionRole, UserId};

impl Participants {
    /// Build from an item and its claim, if any
    #[must_use]
    pub fn from_parts(item: &Item, claim: Option<&SaleClaim>) -> Self {
        Self {
            owner_id: item.owner_id,
            buyer_id: claim.map(|c| c.buyer_id),
        }
    }

    /// True iff `user_id` is the owner or the claim's buyer
    #[must_use]
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.owner_id == user_id || self.buyer_id == Some(user_id)
    }

    /// The other participant; `None` without a claim or for outsiders
    #[must_use]
    pub fn counterparty_of(&self, user_id: UserId) -> Option<UserId> {
        let buyer_id = self.buyer_id?;
        if user_id == self.owner_id {
            Some(buyer_id)
        } else if user_id == buyer_id {
            Some(self.owner_id)
        } else {
            None
        }
    }

    /// Which side `user_id` is on; `None` for outsiders
    #[must_use]
    pub fn role_of(&self, user_id: UserId) -> Option<TransactionRole> {
        if self.buyer_id == Some(user_id) {
            Some(TransactionRole::Buyer)
        } else if self.owner_id == user_id {
            Some(TransactionRole::Seller)
        } else {
            None
        }
    }
}

/// Fetch an item or fail with `NotFound`
pub fn require_item(registry: &dyn ListingRegistry, item_id: ItemId) -> Result<Item> {
    registry
        .get_item(item_id)?
        .ok_or_else(|| TradeError::NotFound(format!("item {item_id}")))
}

/// Resolve the participants of `item` on an open connection
pub fn participants_of(conn: &Connection, item: &Item) -> Result<(Participants, Option<SaleClaim>)> {
    let claim = ClaimLedger::find(conn, item.id)?;
    Ok((Participants::from_parts(item, claim.as_ref()), claim))
}

/// Fail `Forbidden` unless `user_id` participates in the item's thread
pub fn ensure_participant(participants: &Participants, item_id: ItemId, user_id: UserId) -> Result<()> {
    if participants.is_participant(user_id) {
        Ok(())
    } else {
        Err(TradeError::Forbidden(format!(
            "user {user_id} is not a participant of item {item_id}"
        )))
    }
}
