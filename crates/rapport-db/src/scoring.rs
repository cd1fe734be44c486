//! Compatibility scoring: rank other users by identical (question, option)
//! pairs shared with the querying user.

use std::collections::BTreeMap;

use rusqlite::Connection;

use rapport_types::api::MatchEntry;
use rapport_types::models::{QuizAnswer, RequestStatus, UserId};
use rapport_types::pagination::{Page, Pagination};

use crate::queries::query_active_profile;
use crate::{Database, DbError, Result};

/// One other user's answer row that matched one of ours.
#[derive(Debug, Clone)]
pub struct MatchedAnswer {
    pub user_id: UserId,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub user_id: UserId,
    pub name: String,
    pub avatar_url: String,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relationship {
    pub has_connection: bool,
    pub has_pending_request: bool,
}

/// Group matched rows per candidate and rank them: score descending, then
/// user id ascending so equal scores come out in a stable order.
pub fn rank_candidates(rows: impl IntoIterator<Item = MatchedAnswer>) -> Vec<Candidate> {
    let mut by_user: BTreeMap<UserId, Candidate> = BTreeMap::new();
    for row in rows {
        by_user
            .entry(row.user_id)
            .and_modify(|c| c.score += 1)
            .or_insert(Candidate {
                user_id: row.user_id,
                name: row.name,
                avatar_url: row.avatar_url,
                score: 1,
            });
    }

    let mut ranked: Vec<Candidate> = by_user.into_values().collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.user_id.cmp(&b.user_id)));
    ranked
}

impl Database {
    /// Ranked, paginated match list for `user_id` given their answers.
    /// Users who have not answered anything get an empty page.
    pub fn compute_matches(
        &self,
        user_id: UserId,
        answers: &[QuizAnswer],
        window: Pagination,
    ) -> Result<Page<MatchEntry>> {
        if answers.is_empty() {
            return Ok(Page::empty(window));
        }

        self.with_conn(|conn| {
            let rows = query_matching_answers(conn, user_id, answers)?;
            let page = window.apply(rank_candidates(rows));

            // Flags only matter for what is shown, so resolve them per page.
            let mut data = Vec::with_capacity(page.data.len());
            for candidate in page.data {
                let rel = query_relationship(conn, user_id, candidate.user_id)?;
                data.push(MatchEntry {
                    user_id: candidate.user_id,
                    name: candidate.name,
                    avatar_url: candidate.avatar_url,
                    score: candidate.score,
                    has_connection: rel.has_connection,
                    has_pending_connection_request: rel.has_pending_request,
                });
            }

            Ok(Page {
                data,
                page: page.page,
                limit: page.limit,
                total: page.total,
                total_pages: page.total_pages,
            })
        })
    }

    /// Load the user's stored answers and rank against them.
    pub fn matches_for_user(&self, user_id: UserId, window: Pagination) -> Result<Page<MatchEntry>> {
        let answers = self.answers_for_user(user_id)?;
        self.compute_matches(user_id, &answers, window)
    }

    /// Score and relationship flags between the viewer and one other user.
    pub fn pair_compatibility(&self, viewer_id: UserId, other_id: UserId) -> Result<MatchEntry> {
        if viewer_id == other_id {
            return Err(DbError::not_found("user not found"));
        }

        self.with_conn(|conn| {
            let profile = query_active_profile(conn, other_id)?
                .ok_or_else(|| DbError::not_found("user not found"))?;

            let score = query_pair_score(conn, viewer_id, other_id)?;
            let rel = query_relationship(conn, viewer_id, other_id)?;

            Ok(MatchEntry {
                user_id: profile.user_id,
                name: profile.name,
                avatar_url: profile.avatar_url,
                score,
                has_connection: rel.has_connection,
                has_pending_connection_request: rel.has_pending_request,
            })
        })
    }
}

/// Every answer row of another active user that equals one of `answers`.
/// The answers travel as a single JSON array parameter, so the statement
/// stays the same size however many questions the user answered.
fn query_matching_answers(
    conn: &Connection,
    user_id: UserId,
    answers: &[QuizAnswer],
) -> Result<Vec<MatchedAnswer>> {
    let pairs: Vec<[i64; 2]> = answers.iter().map(|a| [a.question_id, a.option_id]).collect();
    let pairs = serde_json::to_string(&pairs)
        .map_err(|e| DbError::validation(format!("answers could not be encoded: {e}")))?;

    let mut stmt = conn.prepare(
        "WITH picked(question_id, option_id) AS (
             SELECT DISTINCT json_extract(value, '$[0]'), json_extract(value, '$[1]')
             FROM json_each(?2)
         )
         SELECT a.user_id, u.name, u.avatar_url
         FROM picked p
         JOIN quiz_answers a ON a.question_id = p.question_id AND a.option_id = p.option_id
         JOIN users u ON u.id = a.user_id
         WHERE u.status = 1 AND u.deleted_at IS NULL
           AND a.user_id <> ?1",
    )?;
    let rows = stmt
        .query_map((user_id, pairs), |row| {
            Ok(MatchedAnswer {
                user_id: row.get(0)?,
                name: row.get(1)?,
                avatar_url: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub(crate) fn query_pair_score(conn: &Connection, a: UserId, b: UserId) -> Result<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM quiz_answers x
         JOIN quiz_answers y ON y.question_id = x.question_id AND y.option_id = x.option_id
         WHERE x.user_id = ?1 AND y.user_id = ?2",
        (a, b),
        |r| r.get(0),
    )?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Existing connection or pending request between two users, either direction.
pub(crate) fn query_relationship(conn: &Connection, a: UserId, b: UserId) -> Result<Relationship> {
    let has_connection: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM connections
             WHERE (user_a = ?1 AND user_b = ?2) OR (user_a = ?2 AND user_b = ?1)
         )",
        (a, b),
        |r| r.get(0),
    )?;

    if has_connection {
        return Ok(Relationship {
            has_connection,
            has_pending_request: false,
        });
    }

    let has_pending_request: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM connection_requests
             WHERE status = ?3
               AND ((requesting_user_id = ?1 AND requested_user_id = ?2)
                 OR (requesting_user_id = ?2 AND requested_user_id = ?1))
         )",
        (a, b, RequestStatus::Pending.code()),
        |r| r.get(0),
    )?;

    Ok(Relationship {
        has_connection,
        has_pending_request,
    })
}
