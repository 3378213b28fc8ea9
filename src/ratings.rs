//! Post-completion rating ledger.

use std::sync::Arc;

use rusqlite::{params, Connection};
use tracing::info;

use crate::clock::Clock;
use crate::db::{conflict_on_duplicate, map_rating, to_db_time, Database};
use crate::error::{Result, TradeError};
use crate::guard::{ensure_participant, participants_of, require_item};
use crate::listing::ListingRegistry;
use crate::models::{ItemId, NewRating, Rating, RatingStatus, RatingSummary, UserId};
use crate::schema::ratings;
use crate::validation::InputValidator;

/// Average of `sum / count` in tenths, rounded half-up
#[must_use]
pub const fn average_tenths(sum: u64, count: u64) -> Option<u64> {
    if count == 0 {
        return None;
    }
    Some((sum * 20 + count) / (2 * count))
}

/// Records feedback left by transaction participants
#[derive(Clone)]
pub struct RatingLedger {
    db: Database,
    listings: Arc<dyn ListingRegistry>,
    clock: Arc<dyn Clock>,
}

impl RatingLedger {
    pub fn new(db: Database, listings: Arc<dyn ListingRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            listings,
            clock,
        }
    }

    fn has_rated(conn: &Connection, item_id: ItemId, rater_id: UserId) -> Result<bool> {
        let exists: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ? AND {} = ?)",
                ratings::TABLE,
                ratings::RATER_ID,
                ratings::ITEM_ID
            ),
            params![rater_id, item_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Rate the counterparty of a completed transaction
    pub fn submit(&self, rater_id: UserId, rating: NewRating) -> Result<Rating> {
        let score = InputValidator::validate_score(rating.score)?;
        let comment = InputValidator::normalize_comment(rating.comment.as_deref());
        InputValidator::validate_comment(comment.as_deref())?;

        let item_id = rating.item_id;
        let rated_user_id = rating.rated_user_id;
        let item = require_item(self.listings.as_ref(), item_id)?;

        if rater_id == rated_user_id {
            return Err(TradeError::Forbidden(format!("user {rater_id} cannot rate themselves")));
        }

        let now = self.clock.now();
        let stored = self.db.immediate(|tx| {
            let (participants, claim) = participants_of(tx, &item)?;
            ensure_participant(&participants, item_id, rater_id)?;

            if !claim.is_some_and(|c| c.is_completed()) {
                return Err(TradeError::PreconditionFailed(format!(
                    "transaction on item {item_id} is not completed"
                )));
            }
            if participants.counterparty_of(rater_id) != Some(rated_user_id) {
                return Err(TradeError::Forbidden(format!(
                    "user {rated_user_id} is not the counterparty of user {rater_id} on item {item_id}"
                )));
            }

            tx.execute(
                &format!(
                    "INSERT INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    ratings::TABLE,
                    ratings::RATER_ID,
                    ratings::RATED_USER_ID,
                    ratings::ITEM_ID,
                    ratings::SCORE,
                    ratings::COMMENT,
                    ratings::CREATED_AT
                ),
                params![rater_id, rated_user_id, item_id, score, comment, to_db_time(now)],
            )
            .map_err(|e| {
                conflict_on_duplicate(e, &format!("user {rater_id} already rated item {item_id}"))
            })?;

            let id = tx.last_insert_rowid();
            let stored = tx.query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", ratings::TABLE, ratings::ID),
                params![id],
                map_rating,
            )?;
            Ok(stored)
        })?;

        info!(item_id, rater_id, rated_user_id, score, "Rating submitted");
        Ok(stored)
    }

    /// Count and rounded average of the ratings `user_id` received
    pub fn aggregate(&self, user_id: UserId) -> Result<RatingSummary> {
        let (count, sum): (i64, i64) = self.db.read(|conn| {
            Ok(conn.query_row(
                &format!(
                    "SELECT COUNT(*), COALESCE(SUM({}), 0) FROM {} WHERE {} = ?",
                    ratings::SCORE,
                    ratings::TABLE,
                    ratings::RATED_USER_ID
                ),
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })?;

        let count = u64::try_from(count).unwrap_or_default();
        let sum = u64::try_from(sum).unwrap_or_default();
        Ok(RatingSummary {
            count,
            average_tenths: average_tenths(sum, count),
        })
    }

    /// Whether `user_id` may still rate on `item_id`
    pub fn rating_status(&self, item_id: ItemId, user_id: UserId) -> Result<RatingStatus> {
        let item = require_item(self.listings.as_ref(), item_id)?;

        self.db.read(|conn| {
            let (participants, claim) = participants_of(conn, &item)?;
            ensure_participant(&participants, item_id, user_id)?;

            let completed = claim.is_some_and(|c| c.is_completed());
            let has_rated = Self::has_rated(conn, item_id, user_id)?;
            Ok(RatingStatus {
                completed,
                has_rated,
                can_rate: completed && !has_rated,
                counterparty_id: participants.counterparty_of(user_id),
            })
        })
    }
}
