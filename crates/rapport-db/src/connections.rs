use rusqlite::TransactionBehavior;
use tracing::info;

use rapport_types::api::ConnectionEntry;
use rapport_types::models::{Connection, UserId, UserProfile};

use crate::models::{CONNECTION_COLUMNS, connection_from_row};
use crate::queries::OptionalExt;
use crate::requests::query_connection;
use crate::{Database, DbError, Result};

const NOT_FOUND_OR_FORBIDDEN: &str = "connection not found or not authorized";

impl Database {
    pub fn get_connection(&self, connection_id: i64) -> Result<Option<Connection>> {
        self.with_conn(|conn| query_connection(conn, connection_id))
    }

    /// The connection, provided `user_id` is one of its two members.
    /// Non-members get the same `NotFound` as a missing id.
    pub fn connection_for_member(&self, connection_id: i64, user_id: UserId) -> Result<Connection> {
        self.with_conn(|conn| {
            query_connection(conn, connection_id)?
                .filter(|c| c.has_member(user_id))
                .ok_or_else(|| DbError::not_found(NOT_FOUND_OR_FORBIDDEN))
        })
    }

    /// Remove a connection on behalf of one of its members, along with its
    /// message history and the request that created it.
    pub fn delete_connection(&self, connection_id: i64, acting_user_id: UserId) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let connection = query_connection(&tx, connection_id)?
                .filter(|c| c.has_member(acting_user_id))
                .ok_or_else(|| DbError::not_found(NOT_FOUND_OR_FORBIDDEN))?;

            // Dependents first: messages -> connection -> originating request.
            let messages = tx.execute(
                "DELETE FROM messages WHERE connection_id = ?1",
                [connection.id],
            )?;
            tx.execute("DELETE FROM connections WHERE id = ?1", [connection.id])?;
            tx.execute(
                "DELETE FROM connection_requests WHERE id = ?1",
                [connection.connection_request_id],
            )?;

            tx.commit()?;
            info!(
                "Connection {} deleted by user {} ({} messages removed)",
                connection.id, acting_user_id, messages
            );
            Ok(())
        })
    }

    /// The user's connections with the other member's profile, newest first.
    pub fn list_connections(&self, user_id: UserId) -> Result<Vec<ConnectionEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections
                 WHERE user_a = ?1 OR user_b = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let connections = stmt
                .query_map([user_id], connection_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut entries = Vec::with_capacity(connections.len());
            for connection in connections {
                let other = connection.counterpart(user_id);
                let user = conn
                    .query_row(
                        "SELECT name, avatar_url FROM users WHERE id = ?1",
                        [other],
                        |row| {
                            Ok(UserProfile {
                                user_id: other,
                                name: row.get(0)?,
                                avatar_url: row.get(1)?,
                            })
                        },
                    )
                    .optional()?
                    .ok_or_else(|| DbError::not_found("user not found"))?;

                entries.push(ConnectionEntry {
                    id: connection.id,
                    user,
                    created_at: connection.created_at,
                });
            }

            Ok(entries)
        })
    }
}
