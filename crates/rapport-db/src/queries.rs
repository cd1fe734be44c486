use rusqlite::Connection;

use rapport_types::models::{UserId, UserProfile};

use crate::models::{ACTIVE_USER, NOW, profile_from_row};
use crate::{Database, DbError, Result};

impl Database {
    // -- Users --

    /// Insert an active user. Registration proper happens elsewhere; this is
    /// the seeding entry point.
    pub fn create_user(&self, name: &str, avatar_url: &str) -> Result<UserId> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (name, avatar_url) VALUES (?1, ?2)",
                (name, avatar_url),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Soft-delete a user. Inactive users drop out of match lists and can no
    /// longer be sent connection requests.
    pub fn deactivate_user(&self, user_id: UserId) -> Result<()> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                &format!("UPDATE users SET status = 0, deleted_at = {NOW} WHERE id = ?1"),
                [user_id],
            )?;
            if updated == 0 {
                return Err(DbError::not_found("user not found"));
            }
            Ok(())
        })
    }

    /// Profile lookup regardless of account status, for showing the other
    /// side of an existing conversation.
    pub fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, avatar_url FROM users WHERE id = ?1",
                [user_id],
                profile_from_row,
            )
            .optional()
        })
    }
}

pub(crate) fn query_active_profile(conn: &Connection, user_id: UserId) -> Result<Option<UserProfile>> {
    conn.query_row(
        &format!("SELECT id, name, avatar_url FROM users WHERE id = ?1 AND {ACTIVE_USER}"),
        [user_id],
        profile_from_row,
    )
    .optional()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
