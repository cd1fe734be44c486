//! Connection-request lifecycle: Pending -> Accepted | Denied.
//!
//! Every transition reads and writes inside one IMMEDIATE transaction so the
//! validity checks and the write see the same snapshot.

use rusqlite::{Connection as SqlConnection, TransactionBehavior};
use tracing::{debug, info};

use rapport_types::api::{ConnectionRequestEntry, RequesterProfile};
use rapport_types::models::{Connection, ConnectionRequest, RequestStatus, UserId};

use crate::models::{
    CONNECTION_COLUMNS, NOW, REQUEST_COLUMNS, connection_from_row, parse_timestamp,
    request_from_row,
};
use crate::queries::{OptionalExt, query_active_profile};
use crate::scoring::{query_pair_score, query_relationship};
use crate::{Database, DbError, Result};

impl Database {
    /// Open a new Pending request from `requesting` to `requested`.
    ///
    /// Fails with `NotFound` when the target is missing or inactive, and with
    /// `InvalidState` when the target is the requester or the pair is already
    /// connected or has a pending request in either direction. A previously
    /// denied request does not block a new one.
    pub fn create_request(&self, requesting: UserId, requested: UserId) -> Result<ConnectionRequest> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if query_active_profile(&tx, requested)?.is_none() {
                return Err(DbError::not_found("user not found"));
            }
            if requested == requesting {
                return Err(DbError::invalid_state("cannot send a connection request to yourself"));
            }

            let rel = query_relationship(&tx, requesting, requested)?;
            if rel.has_connection {
                return Err(DbError::invalid_state("users are already connected"));
            }
            if rel.has_pending_request {
                return Err(DbError::invalid_state("a connection request is already pending"));
            }

            tx.execute(
                "INSERT INTO connection_requests (requesting_user_id, requested_user_id, status)
                 VALUES (?1, ?2, ?3)",
                (requesting, requested, RequestStatus::Pending.code()),
            )?;
            let request = query_request(&tx, tx.last_insert_rowid())?
                .ok_or_else(|| DbError::not_found("connection request not found"))?;

            tx.commit()?;
            info!(
                "Connection request {} created: {} -> {}",
                request.id, requesting, requested
            );
            Ok(request)
        })
    }

    /// Accept a pending request addressed to `requested_user_id`, creating the
    /// connection in the same transaction.
    pub fn accept_request(&self, request_id: i64, requested_user_id: UserId) -> Result<Connection> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let request = pending_request_for(&tx, request_id, requested_user_id)?;

            answer_request(&tx, request.id, RequestStatus::Accepted)?;
            tx.execute(
                "INSERT INTO connections (user_a, user_b, connection_request_id) VALUES (?1, ?2, ?3)",
                (request.requesting_user_id, request.requested_user_id, request.id),
            )?;
            let connection = query_connection(&tx, tx.last_insert_rowid())?
                .ok_or_else(|| DbError::not_found("connection not found"))?;

            tx.commit()?;
            info!(
                "Connection request {} accepted, connection {} created",
                request.id, connection.id
            );
            Ok(connection)
        })
    }

    /// Deny a pending request addressed to `requested_user_id`.
    pub fn reject_request(&self, request_id: i64, requested_user_id: UserId) -> Result<ConnectionRequest> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let request = pending_request_for(&tx, request_id, requested_user_id)?;

            answer_request(&tx, request.id, RequestStatus::Denied)?;
            let request = query_request(&tx, request.id)?
                .ok_or_else(|| DbError::not_found("connection request not found"))?;

            tx.commit()?;
            debug!("Connection request {} denied", request.id);
            Ok(request)
        })
    }

    pub fn get_request(&self, request_id: i64) -> Result<Option<ConnectionRequest>> {
        self.with_conn(|conn| query_request(conn, request_id))
    }

    /// Pending requests addressed to `user_id`, newest first, each carrying
    /// the requester's profile and their shared-answer score with `user_id`.
    pub fn list_incoming_requests(&self, user_id: UserId) -> Result<Vec<ConnectionRequestEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cr.id, cr.requesting_user_id, cr.created_at, u.name, u.avatar_url
                 FROM connection_requests cr
                 JOIN users u ON u.id = cr.requesting_user_id
                 WHERE cr.requested_user_id = ?1 AND cr.status = ?2
                 ORDER BY cr.created_at DESC, cr.id DESC",
            )?;

            let rows = stmt
                .query_map((user_id, RequestStatus::Pending.code()), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, UserId>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut entries = Vec::with_capacity(rows.len());
            for (id, requesting_user_id, created_at, name, avatar_url) in rows {
                let created_at = parse_timestamp(&created_at).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
                })?;
                entries.push(ConnectionRequestEntry {
                    id,
                    requesting_user_id,
                    status: RequestStatus::Pending,
                    created_at,
                    requesting_user: RequesterProfile {
                        user_id: requesting_user_id,
                        avatar_url,
                        name,
                        score: query_pair_score(conn, requesting_user_id, user_id)?,
                    },
                });
            }

            Ok(entries)
        })
    }
}

/// Look up a request addressed to `requested_user_id`. Requests addressed to
/// someone else are reported as missing.
fn pending_request_for(
    conn: &SqlConnection,
    request_id: i64,
    requested_user_id: UserId,
) -> Result<ConnectionRequest> {
    let request = conn
        .query_row(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM connection_requests
                 WHERE id = ?1 AND requested_user_id = ?2"
            ),
            (request_id, requested_user_id),
            request_from_row,
        )
        .optional()?
        .ok_or_else(|| DbError::not_found("connection request not found"))?;

    if request.status != RequestStatus::Pending {
        return Err(DbError::invalid_state("connection request was already answered"));
    }
    Ok(request)
}

fn answer_request(conn: &SqlConnection, request_id: i64, status: RequestStatus) -> Result<()> {
    let updated = conn.execute(
        &format!(
            "UPDATE connection_requests SET status = ?1, answered_at = {NOW}
             WHERE id = ?2 AND status = ?3"
        ),
        (status.code(), request_id, RequestStatus::Pending.code()),
    )?;
    if updated == 0 {
        return Err(DbError::invalid_state("connection request was already answered"));
    }
    Ok(())
}

pub(crate) fn query_request(conn: &SqlConnection, request_id: i64) -> Result<Option<ConnectionRequest>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM connection_requests WHERE id = ?1"),
        [request_id],
        request_from_row,
    )
    .optional()
}

pub(crate) fn query_connection(conn: &SqlConnection, connection_id: i64) -> Result<Option<Connection>> {
    conn.query_row(
        &format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = ?1"),
        [connection_id],
        connection_from_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_users(db: &Database) -> (UserId, UserId, UserId) {
        (
            db.create_user("one", "").unwrap(),
            db.create_user("two", "").unwrap(),
            db.create_user("three", "").unwrap(),
        )
    }

    fn connections_between(db: &Database, a: UserId, b: UserId) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM connections
                 WHERE (user_a = ?1 AND user_b = ?2) OR (user_a = ?2 AND user_b = ?1)",
                (a, b),
                |r| r.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn test_create_request_is_pending() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, _) = three_users(&db);

        let req = db.create_request(a, b).unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.requesting_user_id, a);
        assert_eq!(req.requested_user_id, b);
        assert!(req.answered_at.is_none());
    }

    #[test]
    fn test_duplicate_requests_rejected_in_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, _) = three_users(&db);

        let first = db.create_request(a, b).unwrap();
        assert!(matches!(db.create_request(a, b), Err(DbError::InvalidState(_))));
        assert!(matches!(db.create_request(b, a), Err(DbError::InvalidState(_))));
        assert_eq!(db.get_request(first.id).unwrap().unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn test_invalid_targets() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, _) = three_users(&db);

        assert!(matches!(db.create_request(a, a), Err(DbError::InvalidState(_))));
        assert!(matches!(db.create_request(a, 999), Err(DbError::NotFound(_))));

        db.deactivate_user(b).unwrap();
        assert!(matches!(db.create_request(a, b), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_accept_creates_one_connection() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, _) = three_users(&db);

        let req = db.create_request(a, b).unwrap();
        let connection = db.accept_request(req.id, b).unwrap();
        assert_eq!(connection.user_a, a);
        assert_eq!(connection.user_b, b);
        assert_eq!(connection.connection_request_id, req.id);

        let req = db.get_request(req.id).unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Accepted);
        assert!(req.answered_at.is_some());
        assert_eq!(connections_between(&db, a, b), 1);

        // connected pairs cannot re-request
        assert!(matches!(db.create_request(b, a), Err(DbError::InvalidState(_))));
    }

    #[test]
    fn test_only_addressee_may_answer() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, c) = three_users(&db);

        let req = db.create_request(a, b).unwrap();
        assert!(matches!(db.accept_request(req.id, a), Err(DbError::NotFound(_))));
        assert!(matches!(db.accept_request(req.id, c), Err(DbError::NotFound(_))));
        assert!(matches!(db.reject_request(req.id, c), Err(DbError::NotFound(_))));
        assert!(matches!(db.accept_request(12345, b), Err(DbError::NotFound(_))));
        assert_eq!(connections_between(&db, a, b), 0);
    }

    #[test]
    fn test_answered_request_cannot_transition_again() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, _) = three_users(&db);

        let req = db.create_request(a, b).unwrap();
        db.accept_request(req.id, b).unwrap();
        assert!(matches!(db.accept_request(req.id, b), Err(DbError::InvalidState(_))));
        assert!(matches!(db.reject_request(req.id, b), Err(DbError::InvalidState(_))));
        assert_eq!(connections_between(&db, a, b), 1);
    }

    #[test]
    fn test_reject_then_request_again() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, _) = three_users(&db);

        let req = db.create_request(a, b).unwrap();
        let denied = db.reject_request(req.id, b).unwrap();
        assert_eq!(denied.status, RequestStatus::Denied);
        assert!(denied.answered_at.is_some());
        assert_eq!(connections_between(&db, a, b), 0);

        let again = db.create_request(a, b).unwrap();
        assert_ne!(again.id, req.id);
        assert_eq!(again.status, RequestStatus::Pending);
    }

    #[test]
    fn test_failed_connection_insert_leaves_request_pending() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, c) = three_users(&db);

        let req = db.create_request(a, b).unwrap();

        // Plant a conflicting edge for the pair so the connection insert fails.
        let other = db.create_request(c, a).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO connections (user_a, user_b, connection_request_id) VALUES (?1, ?2, ?3)",
                (b, a, other.id),
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(db.accept_request(req.id, b), Err(DbError::Storage(_))));

        let req = db.get_request(req.id).unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(req.answered_at.is_none());
        assert_eq!(connections_between(&db, a, b), 1);
    }

    #[test]
    fn test_incoming_requests_listing() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, c) = three_users(&db);
        let (q, o) = db.create_question("Q", &["x", "y"]).unwrap();
        let pick = |option_id| rapport_types::api::AnswerInput {
            question_id: q,
            option_id,
        };
        db.submit_answers(a, &[pick(o[0])]).unwrap();
        db.submit_answers(b, &[pick(o[0])]).unwrap();
        db.submit_answers(c, &[pick(o[1])]).unwrap();

        let from_a = db.create_request(a, b).unwrap();
        let from_c = db.create_request(c, b).unwrap();

        let incoming = db.list_incoming_requests(b).unwrap();
        assert_eq!(incoming.len(), 2);
        // newest first
        assert_eq!(incoming[0].id, from_c.id);
        assert_eq!(incoming[0].requesting_user.score, 0);
        assert_eq!(incoming[1].id, from_a.id);
        assert_eq!(incoming[1].requesting_user.user_id, a);
        assert_eq!(incoming[1].requesting_user.name, "one");
        assert_eq!(incoming[1].requesting_user.score, 1);

        db.reject_request(from_c.id, b).unwrap();
        assert_eq!(db.list_incoming_requests(b).unwrap().len(), 1);
        assert!(db.list_incoming_requests(a).unwrap().is_empty());
    }
}
