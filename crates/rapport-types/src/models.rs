use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// One user's chosen option for one quiz question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub user_id: UserId,
    pub question_id: i64,
    pub option_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub options: Vec<QuestionOption>,
}

/// Lifecycle of a connection request. Stored and serialized as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum RequestStatus {
    Denied = 0,
    Accepted = 1,
    Pending = 2,
}

impl RequestStatus {
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl From<RequestStatus> for i64 {
    fn from(status: RequestStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i64> for RequestStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Denied),
            1 => Ok(Self::Accepted),
            2 => Ok(Self::Pending),
            other => Err(format!("unknown request status {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: i64,
    pub requesting_user_id: UserId,
    pub requested_user_id: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

/// An undirected edge between two users. `user_a` is the original requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: i64,
    pub user_a: UserId,
    pub user_b: UserId,
    pub connection_request_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn has_member(&self, user_id: UserId) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The member on the other side of the edge from `user_id`.
    /// Anyone who is not `user_a` is treated as `user_a`'s counterpart.
    pub fn counterpart(&self, user_id: UserId) -> UserId {
        if user_id == self.user_a {
            self.user_b
        } else {
            self.user_a
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub connection_id: i64,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub name: String,
    pub avatar_url: String,
}
