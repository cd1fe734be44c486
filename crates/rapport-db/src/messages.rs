use rapport_types::models::{Message, UserId};
use tracing::debug;

use crate::models::{MESSAGE_COLUMNS, NOW, message_from_row};
use crate::queries::OptionalExt;
use crate::{Database, DbError, Result};

impl Database {
    // -- Message store --

    /// Append a message to a connection's log. Membership of `sender_id` is
    /// the caller's responsibility; see [`Database::post_message`].
    pub fn insert_message(&self, connection_id: i64, sender_id: UserId, content: &str) -> Result<Message> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (connection_id, sender_id, content) VALUES (?1, ?2, ?3)",
                (connection_id, sender_id, content),
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [id],
                message_from_row,
            )
            .optional()?
            .ok_or_else(|| DbError::not_found("message not found"))
        })
    }

    /// Full history of a connection, oldest first.
    pub fn list_messages(&self, connection_id: i64) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE connection_id = ?1
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map([connection_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Validate and persist a message sent by `sender_id` on `connection_id`.
    pub fn post_message(&self, connection_id: i64, sender_id: UserId, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(DbError::validation("message content is required"));
        }

        let connection = self.connection_for_member(connection_id, sender_id)?;
        let message = self.insert_message(connection.id, sender_id, content)?;
        debug!(
            "Message {} stored on connection {} by user {}",
            message.id, connection.id, sender_id
        );
        Ok(message)
    }

    /// Stamp `read_at` on every unread message the reader received on this
    /// connection. Returns how many were updated.
    pub fn mark_read(&self, connection_id: i64, reader_id: UserId) -> Result<usize> {
        let connection = self.connection_for_member(connection_id, reader_id)?;
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE messages SET read_at = {NOW}
                     WHERE connection_id = ?1 AND sender_id <> ?2 AND read_at IS NULL"
                ),
                (connection.id, reader_id),
            )?;
            Ok(updated)
        })
    }
}
