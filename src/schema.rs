//! Database schema definitions
//!
//! Constants for table and column names used with rusqlite. The tables
//! themselves are created by the SQL migration under `migrations/`.

/// Local mirror of the listing registry
pub mod items {
    /// Table name
    pub const TABLE: &str = "items";
    /// Primary key column
    pub const ID: &str = "id";
    /// Seller column
    pub const OWNER_ID: &str = "owner_id";
    /// Display name column
    pub const NAME: &str = "name";
    /// Price column
    pub const PRICE: &str = "price";
    /// Last listing update column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Sale claims table schema
pub mod sale_claims {
    /// Table name
    pub const TABLE: &str = "sale_claims";
    /// Primary key column, one claim per item
    pub const ITEM_ID: &str = "item_id";
    /// Buyer column
    pub const BUYER_ID: &str = "buyer_id";
    /// Completion flag column
    pub const IS_COMPLETED: &str = "is_completed";
}

/// Messages table schema
pub mod messages {
    /// Table name
    pub const TABLE: &str = "messages";
    /// Primary key column
    pub const ID: &str = "id";
    /// Thread item column
    pub const ITEM_ID: &str = "item_id";
    /// Author column
    pub const SENDER_ID: &str = "sender_id";
    /// Addressee column
    pub const RECEIVER_ID: &str = "receiver_id";
    /// Message text column
    pub const BODY: &str = "body";
    /// Stored image reference column
    pub const ATTACHMENT_REF: &str = "attachment_ref";
    /// Read flag column
    pub const IS_READ: &str = "is_read";
    /// Edited flag column
    pub const IS_EDITED: &str = "is_edited";
    /// Last edit timestamp column
    pub const EDITED_AT: &str = "edited_at";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Soft-deletion timestamp column
    pub const DELETED_AT: &str = "deleted_at";
}

/// Ratings table schema
pub mod ratings {
    /// Table name
    pub const TABLE: &str = "ratings";
    /// Primary key column
    pub const ID: &str = "id";
    /// Rater column
    pub const RATER_ID: &str = "rater_id";
    /// Rated user column
    pub const RATED_USER_ID: &str = "rated_user_id";
    /// Transaction item column
    pub const ITEM_ID: &str = "item_id";
    /// Score column (1-5)
    pub const SCORE: &str = "score";
    /// Comment column
    pub const COMMENT: &str = "comment";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
}
