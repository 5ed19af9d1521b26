use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ANONYMOUS_NICKNAME: &str = "Anonymous";

/// `users/{userId}`. Owned by the identity layer; the chat core only reads
/// the nickname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// `chat-queue/{userId}`: one waiting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub user_id: String,
    pub nickname: String,
    /// Microseconds, so arrivals within one millisecond keep their order.
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub enqueued_at: DateTime<Utc>,
}
