//! Row mapping from SQLite into the shared domain models.
//!
//! Timestamps are stored as RFC 3339 text with millisecond precision
//! (`strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`). Rows written by older tooling
//! may carry SQLite's plain `datetime('now')` format, which is accepted too.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use rapport_types::models::{Connection, ConnectionRequest, Message, RequestStatus, UserProfile};

/// SQL expression producing the current time in the stored format.
pub const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub const ACTIVE_USER: &str = "status = 1 AND deleted_at IS NULL";

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    raw.parse::<DateTime<Utc>>().or_else(|_| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_timestamp(&raw).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

fn status(row: &Row<'_>, idx: usize) -> rusqlite::Result<RequestStatus> {
    let code: i64 = row.get(idx)?;
    RequestStatus::try_from(code).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, e.into())
    })
}

pub const REQUEST_COLUMNS: &str =
    "id, requesting_user_id, requested_user_id, status, created_at, answered_at";

pub fn request_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRequest> {
    Ok(ConnectionRequest {
        id: row.get(0)?,
        requesting_user_id: row.get(1)?,
        requested_user_id: row.get(2)?,
        status: status(row, 3)?,
        created_at: timestamp(row, 4)?,
        answered_at: optional_timestamp(row, 5)?,
    })
}

pub const CONNECTION_COLUMNS: &str = "id, user_a, user_b, connection_request_id, created_at";

pub fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<Connection> {
    Ok(Connection {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        connection_request_id: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}

pub const MESSAGE_COLUMNS: &str = "id, connection_id, sender_id, content, created_at, read_at";

pub fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        connection_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        created_at: timestamp(row, 4)?,
        read_at: optional_timestamp(row, 5)?,
    })
}

pub fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        name: row.get(1)?,
        avatar_url: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_formats() {
        let a = parse_timestamp("2024-05-01T10:20:30.125Z").unwrap();
        let b = parse_timestamp("2024-05-01 10:20:30").unwrap();
        assert_eq!(a.timestamp(), b.timestamp());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
