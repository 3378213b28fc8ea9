//! Message threads scoped to a sale claim.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::db::{map_message, to_db_time, Database};
use crate::error::{Result, TradeError};
use crate::guard::{ensure_participant, participants_of, require_item};
use crate::listing::ListingRegistry;
use crate::models::{ItemId, Message, MessageId, NewMessage, UserId};
use crate::schema::messages;
use crate::validation::InputValidator;

/// How long after sending a message its author may still edit or delete it
pub const EDIT_WINDOW: Duration = Duration::minutes(15);

/// True while a message created at `created_at` may still be changed
#[must_use]
pub fn within_edit_window(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at <= EDIT_WINDOW
}

/// Persists messages and produces ordered thread views
#[derive(Clone)]
pub struct ThreadStore {
    db: Database,
    listings: Arc<dyn ListingRegistry>,
    clock: Arc<dyn Clock>,
}

impl ThreadStore {
    pub fn new(db: Database, listings: Arc<dyn ListingRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            listings,
            clock,
        }
    }

    fn find(conn: &Connection, message_id: MessageId) -> Result<Option<Message>> {
        let message = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", messages::TABLE, messages::ID),
                params![message_id],
                map_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Load a message for mutation by `requester_id` at `now`
    fn find_mutable(
        conn: &Connection,
        message_id: MessageId,
        requester_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        let message = Self::find(conn, message_id)?
            .filter(|m| !m.state.is_deleted())
            .ok_or_else(|| TradeError::NotFound(format!("message {message_id}")))?;

        if message.sender_id != requester_id {
            return Err(TradeError::Forbidden(format!(
                "user {requester_id} did not send message {message_id}"
            )));
        }
        if !within_edit_window(message.created_at, now) {
            return Err(TradeError::Expired(format!(
                "message {message_id} can no longer be changed"
            )));
        }
        Ok(message)
    }

    /// Post a message to the other participant of an item's thread
    pub fn send(&self, item_id: ItemId, sender_id: UserId, new_message: NewMessage) -> Result<Message> {
        let body = InputValidator::sanitize_text(&new_message.body);
        InputValidator::validate_body(&body)?;
        if let Some(reference) = new_message.attachment_ref.as_deref() {
            InputValidator::validate_attachment_ref(reference)?;
        }

        let item = require_item(self.listings.as_ref(), item_id)?;
        let now = self.clock.now();

        let message = self.db.immediate(|tx| {
            let (participants, claim) = participants_of(tx, &item)?;
            ensure_participant(&participants, item_id, sender_id)?;

            let Some(claim) = claim else {
                return Err(TradeError::PreconditionFailed(format!(
                    "item {item_id} has not been claimed"
                )));
            };
            if claim.is_completed() {
                return Err(TradeError::PreconditionFailed(format!(
                    "transaction on item {item_id} is completed"
                )));
            }

            let receiver_id = participants.counterparty_of(sender_id).ok_or_else(|| {
                TradeError::Forbidden(format!("user {sender_id} has no counterparty on item {item_id}"))
            })?;

            tx.execute(
                &format!(
                    "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)",
                    messages::TABLE,
                    messages::ITEM_ID,
                    messages::SENDER_ID,
                    messages::RECEIVER_ID,
                    messages::BODY,
                    messages::ATTACHMENT_REF,
                    messages::IS_READ,
                    messages::IS_EDITED,
                    messages::CREATED_AT
                ),
                params![
                    item_id,
                    sender_id,
                    receiver_id,
                    body,
                    new_message.attachment_ref,
                    to_db_time(now)
                ],
            )?;

            let id = tx.last_insert_rowid();
            Self::find(tx, id)?.ok_or_else(|| TradeError::Other(format!("message {id} vanished after insert")))
        })?;

        info!(item_id, message_id = message.id, sender_id, "Message sent");
        Ok(message)
    }

    /// Visible messages of a thread, oldest first.
    ///
    /// Messages addressed to the viewer are marked read in the same
    /// transaction that lists them.
    pub fn list_thread(&self, item_id: ItemId, viewer_id: UserId) -> Result<Vec<Message>> {
        let item = require_item(self.listings.as_ref(), item_id)?;

        let (mut thread, marked) = self.db.immediate(|tx| {
            let (participants, _) = participants_of(tx, &item)?;
            ensure_participant(&participants, item_id, viewer_id)?;

            let mut stmt = tx.prepare(&format!(
                "SELECT * FROM {table} WHERE {item} = ?1 AND {deleted} IS NULL
                 AND ({sender} = ?2 OR {receiver} = ?2)
                 ORDER BY {created} ASC, {id} ASC",
                table = messages::TABLE,
                item = messages::ITEM_ID,
                deleted = messages::DELETED_AT,
                sender = messages::SENDER_ID,
                receiver = messages::RECEIVER_ID,
                created = messages::CREATED_AT,
                id = messages::ID
            ))?;
            let thread = stmt
                .query_map(params![item_id, viewer_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let marked = tx.execute(
                &format!(
                    "UPDATE {table} SET {read} = 1 WHERE {item} = ?1 AND {receiver} = ?2
                     AND {read} = 0 AND {deleted} IS NULL",
                    table = messages::TABLE,
                    read = messages::IS_READ,
                    item = messages::ITEM_ID,
                    receiver = messages::RECEIVER_ID,
                    deleted = messages::DELETED_AT
                ),
                params![item_id, viewer_id],
            )?;
            Ok((thread, marked))
        })?;

        for message in thread.iter_mut().filter(|m| m.receiver_id == viewer_id) {
            message.is_read = true;
        }

        debug!(item_id, viewer_id, count = thread.len(), marked, "Thread listed");
        Ok(thread)
    }

    /// Replace the body of a recently sent message
    pub fn edit(&self, message_id: MessageId, requester_id: UserId, new_body: &str) -> Result<Message> {
        let body = InputValidator::sanitize_text(new_body);
        InputValidator::validate_body(&body)?;
        let now = self.clock.now();

        let message = self.db.immediate(|tx| {
            Self::find_mutable(tx, message_id, requester_id, now)?;
            tx.execute(
                &format!(
                    "UPDATE {} SET {} = ?1, {} = 1, {} = ?2 WHERE {} = ?3",
                    messages::TABLE,
                    messages::BODY,
                    messages::IS_EDITED,
                    messages::EDITED_AT,
                    messages::ID
                ),
                params![body, to_db_time(now), message_id],
            )?;
            Self::find(tx, message_id)?
                .ok_or_else(|| TradeError::NotFound(format!("message {message_id}")))
        })?;

        info!(message_id, requester_id, "Message edited");
        Ok(message)
    }

    /// Hide a recently sent message from the thread
    pub fn soft_delete(&self, message_id: MessageId, requester_id: UserId) -> Result<Message> {
        let now = self.clock.now();

        let message = self.db.immediate(|tx| {
            Self::find_mutable(tx, message_id, requester_id, now)?;
            tx.execute(
                &format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                    messages::TABLE,
                    messages::DELETED_AT,
                    messages::ID
                ),
                params![to_db_time(now), message_id],
            )?;
            Self::find(tx, message_id)?
                .ok_or_else(|| TradeError::NotFound(format!("message {message_id}")))
        })?;

        info!(message_id, requester_id, "Message deleted");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_edit_window_boundary() {
        let sent = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert!(within_edit_window(sent, sent + Duration::minutes(10)));
        assert!(within_edit_window(sent, sent + EDIT_WINDOW));
        assert!(!within_edit_window(sent, sent + EDIT_WINDOW + Duration::microseconds(1)));
        assert!(!within_edit_window(sent, sent + Duration::minutes(16)));
    }
}
