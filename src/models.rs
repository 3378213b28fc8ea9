//! Data models for claims, messages and ratings
//!
//! This module contains the plain data structures shared by the ledgers, the
//! thread store and the service facade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Listing identifier (owned by the listing registry)
pub type ItemId = i64;
/// External user identifier
pub type UserId = i64;
/// Message primary key
pub type MessageId = i64;
/// Rating primary key
pub type RatingId = i64;

/// A listed item as reported by the listing registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Listing id
    pub id: ItemId,
    /// Seller
    pub owner_id: UserId,
    /// Display name
    pub name: String,
    /// Price in the smallest currency unit
    pub price: i64,
    /// Last time the listing changed
    pub updated_at: DateTime<Utc>,
}

/// Transaction state of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    /// Claimed, buyer has not confirmed completion yet
    Open,
    /// Buyer confirmed completion (terminal)
    Completed,
}

impl ClaimState {
    /// Map the stored completion flag
    #[must_use]
    pub const fn from_completed(is_completed: bool) -> Self {
        if is_completed {
            Self::Completed
        } else {
            Self::Open
        }
    }

    /// True once the transaction is completed
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// The single purchase claim on an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleClaim {
    /// Claimed item
    pub item_id: ItemId,
    /// The buyer
    pub buyer_id: UserId,
    /// Open or completed
    pub state: ClaimState,
}

impl SaleClaim {
    /// Shorthand for `state.is_completed()`
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.state.is_completed()
    }
}

/// Soft-deletion state of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MessageState {
    /// Visible in the thread
    Active,
    /// Removed by its sender
    Deleted {
        /// Deletion time
        at: DateTime<Utc>,
    },
}

impl MessageState {
    /// Build from the nullable `deleted_at` column
    #[must_use]
    pub const fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Self::Deleted { at },
            None => Self::Active,
        }
    }

    /// True if the message was soft-deleted
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

/// A message in an item's thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Database primary key
    pub id: MessageId,
    /// Item the thread belongs to
    pub item_id: ItemId,
    /// Author
    pub sender_id: UserId,
    /// The other participant
    pub receiver_id: UserId,
    /// Message text
    pub body: String,
    /// Reference to a stored image, if any
    pub attachment_ref: Option<String>,
    /// Receiver has viewed the thread since the message arrived
    pub is_read: bool,
    /// Body was changed after sending
    pub is_edited: bool,
    /// Time of the last edit
    pub edited_at: Option<DateTime<Utc>>,
    /// Time of sending; never changes
    pub created_at: DateTime<Utc>,
    /// Active or deleted
    pub state: MessageState,
}

/// Data for sending a new message
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    /// Message text
    pub body: String,
    /// Optional stored image reference
    pub attachment_ref: Option<String>,
}

impl NewMessage {
    /// Text-only message
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attachment_ref: None,
        }
    }

    /// Attach a stored image reference
    #[must_use]
    pub fn with_attachment(mut self, attachment_ref: impl Into<String>) -> Self {
        self.attachment_ref = Some(attachment_ref.into());
        self
    }
}

/// An immutable post-completion rating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// Database primary key
    pub id: RatingId,
    /// Who left the rating
    pub rater_id: UserId,
    /// Who is rated
    pub rated_user_id: UserId,
    /// Transaction the rating belongs to
    pub item_id: ItemId,
    /// 1..=5
    pub score: u8,
    /// Optional free text
    pub comment: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Data for submitting a rating
#[derive(Debug, Clone)]
pub struct NewRating {
    /// Transaction being rated
    pub item_id: ItemId,
    /// Who is rated
    pub rated_user_id: UserId,
    /// 1..=5
    pub score: i64,
    /// Optional free text
    pub comment: Option<String>,
}

/// Aggregate of the ratings a user received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Number of ratings received
    pub count: u64,
    /// Average in tenths, rounded half-up; `None` when `count == 0`
    pub average_tenths: Option<u64>,
}

impl RatingSummary {
    /// Average rounded to one decimal place, `None` without ratings
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Option<f64> {
        self.average_tenths.map(|t| t as f64 / 10.0)
    }

    /// Display form, e.g. `4.3`
    #[must_use]
    pub fn display_average(&self) -> Option<String> {
        self.average_tenths
            .map(|t| format!("{}.{}", t / 10, t % 10))
    }
}

/// The two identities allowed to act on an item's thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    /// Seller
    pub owner_id: UserId,
    /// Buyer, once the item is claimed
    pub buyer_id: Option<UserId>,
}

/// Which side of a transaction a user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionRole {
    /// The claim's buyer
    Buyer,
    /// The item owner
    Seller,
}

/// Unread message counters for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCounts {
    /// All unread messages addressed to the user
    pub total: u64,
    /// Unread messages on transactions that are still open
    pub open_transactions: u64,
    /// Part of `open_transactions` where the user is the buyer
    pub as_buyer: u64,
    /// Part of `open_transactions` where the user is the seller
    pub as_seller: u64,
}

/// One open transaction in a user's sidebar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// The item
    pub item: Item,
    /// The user's side of the transaction
    pub role: TransactionRole,
    /// The other participant
    pub counterparty_id: UserId,
    /// Unread messages addressed to the user on this item
    pub unread_count: u64,
    /// Latest visible message involving the user, else the item's `updated_at`
    pub latest_message_at: DateTime<Utc>,
}

/// Whether a user may still rate their counterparty on an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingStatus {
    /// The transaction is completed
    pub completed: bool,
    /// The user already rated on this item
    pub has_rated: bool,
    /// Completed and not yet rated
    pub can_rate: bool,
    /// Who would be rated, if a claim exists
    pub counterparty_id: Option<UserId>,
}

/// Everything a participant sees when opening an item's thread
#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    /// The item
    pub item: Item,
    /// The claim, if any
    pub claim: Option<SaleClaim>,
    /// Visible messages, oldest first
    pub messages: Vec<Message>,
    /// Rating eligibility of the viewer
    pub rating: RatingStatus,
    /// Viewer's other open transactions
    pub other_transactions: Vec<TransactionSummary>,
}

/// Output format for rendered threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated values format
    Csv,
    /// Plain text format
    Txt,
    /// JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
