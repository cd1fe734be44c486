use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, RequestStatus, UserId, UserProfile};

// -- JWT Claims --

/// Claims carried by the bearer token. Issuance lives outside this service;
/// the API middleware and the gateway upgrade only decode them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub exp: usize,
}

// -- Quiz --

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerInput {
    pub question_id: i64,
    pub option_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitAnswersRequest {
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswersResponse {
    pub saved: usize,
}

// -- Matches --

/// A ranked candidate as seen by the querying user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchEntry {
    pub user_id: UserId,
    pub name: String,
    pub avatar_url: String,
    pub score: u32,
    pub has_connection: bool,
    pub has_pending_connection_request: bool,
}

// -- Connection requests --

#[derive(Debug, Clone, Serialize)]
pub struct RequesterProfile {
    pub user_id: UserId,
    pub avatar_url: String,
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRequestEntry {
    pub id: i64,
    pub requesting_user_id: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub requesting_user: RequesterProfile,
}

#[derive(Debug, Serialize)]
pub struct CreatedRequestResponse {
    pub id: i64,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEntry {
    pub id: i64,
    pub user: UserProfile,
    pub created_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageHistory {
    pub messages: Vec<Message>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}
